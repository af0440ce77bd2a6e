// msg.rs ---

// Copyright (C) 2022 Hussein Ait-Lahcen

// Author: Hussein Ait-Lahcen <hussein.aitlahcen@gmail.com>

// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:

// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.

// Except as contained in this notice, the name(s) of the above copyright
// holders shall not be used in advertising or otherwise to promote the sale,
// use or other dealings in this Software without prior written authorization.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT.  IN NO EVENT SHALL
// THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! Messages a contract hands back to the host, and the response envelope
//! carrying them.

use cosmwasm_std::{Attribute, Binary, Coin, Event, ReplyOn};
use serde::{Deserialize, Serialize};

/// Every message a contract may emit. The set is closed: a host dispatches on
/// the variant and treats anything it cannot serve as unknown.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CosmosMsg {
    Bank(BankMsg),
    /// Chain specific message, opaque to the VM.
    Custom(serde_json::Value),
    Staking(StakingMsg),
    /// Protobuf typed message resolved through the host type registry.
    Stargate {
        type_url: String,
        value: Binary,
    },
    Wasm(WasmMsg),
    Ibc(IbcMsg),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BankMsg {
    Send {
        to_address: String,
        amount: Vec<Coin>,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StakingMsg {
    Delegate {
        validator: String,
        amount: Coin,
    },
    Undelegate {
        validator: String,
        amount: Coin,
    },
    Redelegate {
        src_validator: String,
        dst_validator: String,
        amount: Coin,
    },
    /// Withdraw rewards from `validator`, optionally redirecting them to `recipient`.
    Withdraw {
        validator: String,
        recipient: Option<String>,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WasmMsg {
    Execute {
        contract_addr: String,
        msg: Binary,
        funds: Vec<Coin>,
    },
    Instantiate {
        admin: Option<String>,
        code_id: u64,
        msg: Binary,
        funds: Vec<Coin>,
        label: String,
    },
    Migrate {
        contract_addr: String,
        new_code_id: u64,
        msg: Binary,
    },
    UpdateAdmin {
        contract_addr: String,
        admin: String,
    },
    ClearAdmin {
        contract_addr: String,
    },
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IbcTimeoutBlock {
    pub revision: u64,
    pub height: u64,
}

/// At least one of `block` and `timestamp` should be set for a packet to be
/// relayable. The host does not enforce that for raw packets.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IbcTimeout {
    pub block: Option<IbcTimeoutBlock>,
    /// Nanoseconds since epoch.
    pub timestamp: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IbcMsg {
    /// ICS-20 transfer over `channel_id`.
    Transfer {
        channel_id: String,
        to_address: String,
        amount: Coin,
        timeout: IbcTimeout,
    },
    /// Raw packet on a channel owned by the contract's port.
    SendPacket {
        channel_id: String,
        data: Binary,
        timeout: IbcTimeout,
    },
    CloseChannel {
        channel_id: String,
    },
}

impl CosmosMsg {
    /// Variant name, used in diagnostics only.
    pub fn kind(&self) -> &'static str {
        match self {
            CosmosMsg::Bank(_) => "bank",
            CosmosMsg::Custom(_) => "custom",
            CosmosMsg::Staking(_) => "staking",
            CosmosMsg::Stargate { .. } => "stargate",
            CosmosMsg::Wasm(_) => "wasm",
            CosmosMsg::Ibc(_) => "ibc",
        }
    }
}

/// A message plus the reply policy the emitting contract asked for.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SubMsg {
    pub id: u64,
    pub msg: CosmosMsg,
    pub gas_limit: Option<u64>,
    pub reply_on: ReplyOn,
}

impl SubMsg {
    /// Fire and forget, failure aborts the caller.
    pub fn new(msg: CosmosMsg) -> Self {
        SubMsg {
            id: 0,
            msg,
            gas_limit: None,
            reply_on: ReplyOn::Never,
        }
    }

    pub fn reply_on_success(msg: CosmosMsg, id: u64) -> Self {
        Self::reply(msg, id, ReplyOn::Success)
    }

    pub fn reply_on_error(msg: CosmosMsg, id: u64) -> Self {
        Self::reply(msg, id, ReplyOn::Error)
    }

    pub fn reply_always(msg: CosmosMsg, id: u64) -> Self {
        Self::reply(msg, id, ReplyOn::Always)
    }

    #[must_use]
    pub fn with_gas_limit(mut self, limit: u64) -> Self {
        self.gas_limit = Some(limit);
        self
    }

    fn reply(msg: CosmosMsg, id: u64, reply_on: ReplyOn) -> Self {
        SubMsg {
            id,
            msg,
            gas_limit: None,
            reply_on,
        }
    }
}

/// Successful outcome of instantiate, execute, migrate, sudo and reply.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
    pub messages: Vec<SubMsg>,
    pub attributes: Vec<Attribute>,
    pub events: Vec<Event>,
    pub data: Option<Binary>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys are not checked here, the host rejects reserved ones.
    #[must_use]
    pub fn add_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn add_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    #[must_use]
    pub fn add_message(self, msg: CosmosMsg) -> Self {
        self.add_submessage(SubMsg::new(msg))
    }

    #[must_use]
    pub fn add_submessage(mut self, msg: SubMsg) -> Self {
        self.messages.push(msg);
        self
    }

    #[must_use]
    pub fn set_data(mut self, data: impl Into<Binary>) -> Self {
        self.data = Some(data.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::coin;

    #[test]
    fn messages_use_snake_case_tags() {
        let msg = CosmosMsg::Bank(BankMsg::Send {
            to_address: "link1xyz".into(),
            amount: vec![coin(10, "cony")],
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"bank":{"send":{"to_address":"link1xyz","amount":[{"denom":"cony","amount":"10"}]}}}"#
        );
        let back: CosmosMsg = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn submsg_builders_set_reply_policy() {
        let msg = CosmosMsg::Custom(serde_json::json!({"foo": "bar"}));
        assert_eq!(SubMsg::new(msg.clone()).reply_on, ReplyOn::Never);
        let sub = SubMsg::reply_always(msg, 7).with_gas_limit(1000);
        assert_eq!(sub.id, 7);
        assert_eq!(sub.reply_on, ReplyOn::Always);
        assert_eq!(sub.gas_limit, Some(1000));
    }
}
