//! Translation of contract messages into host messages.
//!
//! Every encoder answers `Ok(None)` for a message it does not handle so the
//! next handler of the chain can try it.

use crate::{
    address::AccountAddress,
    error::Error,
    ibc::Height,
    msgs::{
        convert_coins, HostMsg, MsgBeginRedelegate, MsgChannelCloseInit, MsgClearAdmin, MsgDelegate,
        MsgExecuteContract, MsgInstantiateContract, MsgMigrateContract, MsgSend,
        MsgSetWithdrawAddress, MsgTransfer, MsgUndelegate, MsgUpdateAdmin,
        MsgWithdrawDelegatorReward, TypeRegistry,
    },
};
use cosmwasm_std::Binary;
use std::rc::Rc;
use wasmplus_vm::{BankMsg, CosmosMsg, IbcMsg, StakingMsg, WasmMsg};

pub const DEFAULT_TRANSFER_PORT: &str = "transfer";

pub type EncodeResult = Result<Option<Vec<HostMsg>>, Error>;

pub type BankEncoder = Rc<dyn Fn(&AccountAddress, &BankMsg) -> EncodeResult>;
pub type CustomEncoder = Rc<dyn Fn(&AccountAddress, &serde_json::Value) -> EncodeResult>;
pub type StakingEncoder = Rc<dyn Fn(&AccountAddress, &StakingMsg) -> EncodeResult>;
pub type StargateEncoder = Rc<dyn Fn(&AccountAddress, &str, &Binary) -> EncodeResult>;
pub type WasmEncoder = Rc<dyn Fn(&AccountAddress, &WasmMsg) -> EncodeResult>;
/// Receives the IBC port of the contract, empty when it has none.
pub type IbcEncoder = Rc<dyn Fn(&AccountAddress, &str, &IbcMsg) -> EncodeResult>;

/// One encoder per message family. Fixed after construction.
#[derive(Clone)]
pub struct MessageEncoders {
    pub bank: BankEncoder,
    pub custom: CustomEncoder,
    pub staking: StakingEncoder,
    pub stargate: StargateEncoder,
    pub wasm: WasmEncoder,
    pub ibc: IbcEncoder,
}

/// Replacements for individual encoders, merged over the defaults.
#[derive(Clone, Default)]
pub struct EncoderOverrides {
    pub bank: Option<BankEncoder>,
    pub custom: Option<CustomEncoder>,
    pub staking: Option<StakingEncoder>,
    pub stargate: Option<StargateEncoder>,
    pub wasm: Option<WasmEncoder>,
    pub ibc: Option<IbcEncoder>,
}

impl MessageEncoders {
    pub fn new(registry: TypeRegistry, transfer_port: impl Into<String>) -> Self {
        let transfer_port = transfer_port.into();
        MessageEncoders {
            bank: Rc::new(encode_bank_msg),
            custom: Rc::new(no_custom_msg),
            staking: Rc::new(encode_staking_msg),
            stargate: Rc::new(move |sender: &AccountAddress, type_url: &str, value: &Binary| {
                encode_stargate_msg(&registry, sender, type_url, value)
            }),
            wasm: Rc::new(encode_wasm_msg),
            ibc: Rc::new(move |sender: &AccountAddress, port: &str, msg: &IbcMsg| {
                encode_ibc_msg(&transfer_port, sender, port, msg)
            }),
        }
    }

    #[must_use]
    pub fn merge(mut self, overrides: EncoderOverrides) -> Self {
        if let Some(bank) = overrides.bank {
            self.bank = bank;
        }
        if let Some(custom) = overrides.custom {
            self.custom = custom;
        }
        if let Some(staking) = overrides.staking {
            self.staking = staking;
        }
        if let Some(stargate) = overrides.stargate {
            self.stargate = stargate;
        }
        if let Some(wasm) = overrides.wasm {
            self.wasm = wasm;
        }
        if let Some(ibc) = overrides.ibc {
            self.ibc = ibc;
        }
        self
    }

    pub fn encode(&self, contract: &AccountAddress, contract_ibc_port_id: &str, msg: &CosmosMsg) -> EncodeResult {
        match msg {
            CosmosMsg::Bank(msg) => (self.bank)(contract, msg),
            CosmosMsg::Custom(msg) => (self.custom)(contract, msg),
            CosmosMsg::Staking(msg) => (self.staking)(contract, msg),
            CosmosMsg::Stargate { type_url, value } => (self.stargate)(contract, type_url, value),
            CosmosMsg::Wasm(msg) => (self.wasm)(contract, msg),
            CosmosMsg::Ibc(msg) => (self.ibc)(contract, contract_ibc_port_id, msg),
        }
    }
}

impl Default for MessageEncoders {
    fn default() -> Self {
        MessageEncoders::new(TypeRegistry::default(), DEFAULT_TRANSFER_PORT)
    }
}

pub fn encode_bank_msg(sender: &AccountAddress, msg: &BankMsg) -> EncodeResult {
    match msg {
        BankMsg::Send { amount, .. } if amount.is_empty() => Ok(Some(vec![])),
        BankMsg::Send { to_address, amount } => Ok(Some(vec![MsgSend {
            from_address: sender.to_string(),
            to_address: to_address.clone(),
            amount: convert_coins(amount)?,
        }
        .into()])),
    }
}

pub fn no_custom_msg(_sender: &AccountAddress, _msg: &serde_json::Value) -> EncodeResult {
    Ok(None)
}

pub fn encode_staking_msg(sender: &AccountAddress, msg: &StakingMsg) -> EncodeResult {
    let delegator = sender.to_string();
    let msgs = match msg {
        StakingMsg::Delegate { validator, amount } => vec![MsgDelegate {
            delegator_address: delegator,
            validator_address: validator.clone(),
            amount: amount.clone(),
        }
        .into()],
        StakingMsg::Undelegate { validator, amount } => vec![MsgUndelegate {
            delegator_address: delegator,
            validator_address: validator.clone(),
            amount: amount.clone(),
        }
        .into()],
        StakingMsg::Redelegate {
            src_validator,
            dst_validator,
            amount,
        } => vec![MsgBeginRedelegate {
            delegator_address: delegator,
            validator_src_address: src_validator.clone(),
            validator_dst_address: dst_validator.clone(),
            amount: amount.clone(),
        }
        .into()],
        StakingMsg::Withdraw {
            validator,
            recipient,
        } => {
            let withdraw_address = match recipient {
                Some(recipient) if !recipient.is_empty() => recipient.clone(),
                _ => delegator.clone(),
            };
            vec![
                MsgSetWithdrawAddress {
                    delegator_address: delegator.clone(),
                    withdraw_address,
                }
                .into(),
                MsgWithdrawDelegatorReward {
                    delegator_address: delegator,
                    validator_address: validator.clone(),
                }
                .into(),
            ]
        }
    };
    Ok(Some(msgs))
}

pub fn encode_stargate_msg(
    registry: &TypeRegistry,
    _sender: &AccountAddress,
    type_url: &str,
    value: &Binary,
) -> EncodeResult {
    registry
        .decode(type_url, value.as_slice())
        .map(|msg| Some(vec![msg]))
}

pub fn encode_wasm_msg(sender: &AccountAddress, msg: &WasmMsg) -> EncodeResult {
    let sender = sender.to_string();
    let msg: HostMsg = match msg {
        WasmMsg::Execute {
            contract_addr,
            msg,
            funds,
        } => MsgExecuteContract {
            sender,
            contract: contract_addr.clone(),
            msg: msg.clone(),
            funds: convert_coins(funds)?,
        }
        .into(),
        WasmMsg::Instantiate {
            admin,
            code_id,
            msg,
            funds,
            label,
        } => MsgInstantiateContract {
            sender,
            admin: admin.clone(),
            code_id: *code_id,
            label: label.clone(),
            msg: msg.clone(),
            funds: convert_coins(funds)?,
        }
        .into(),
        WasmMsg::Migrate {
            contract_addr,
            new_code_id,
            msg,
        } => MsgMigrateContract {
            sender,
            contract: contract_addr.clone(),
            code_id: *new_code_id,
            msg: msg.clone(),
        }
        .into(),
        WasmMsg::UpdateAdmin {
            contract_addr,
            admin,
        } => MsgUpdateAdmin {
            sender,
            new_admin: admin.clone(),
            contract: contract_addr.clone(),
        }
        .into(),
        WasmMsg::ClearAdmin { contract_addr } => MsgClearAdmin {
            sender,
            contract: contract_addr.clone(),
        }
        .into(),
    };
    Ok(Some(vec![msg]))
}

/// Raw packets are left to the packet handler.
pub fn encode_ibc_msg(
    transfer_port: &str,
    sender: &AccountAddress,
    contract_ibc_port_id: &str,
    msg: &IbcMsg,
) -> EncodeResult {
    match msg {
        IbcMsg::CloseChannel { channel_id } => Ok(Some(vec![MsgChannelCloseInit {
            port_id: contract_ibc_port_id.to_owned(),
            channel_id: channel_id.clone(),
            signer: sender.to_string(),
        }
        .into()])),
        IbcMsg::Transfer {
            channel_id,
            to_address,
            amount,
            timeout,
        } => Ok(Some(vec![MsgTransfer {
            source_port: transfer_port.to_owned(),
            source_channel: channel_id.clone(),
            token: amount.clone(),
            sender: sender.to_string(),
            receiver: to_address.clone(),
            timeout_height: Height::from(timeout.block),
            timeout_timestamp: timeout.timestamp.unwrap_or_default(),
        }
        .into()])),
        IbcMsg::SendPacket { .. } => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::coin;
    use wasmplus_vm::{IbcTimeout, IbcTimeoutBlock};

    fn contract() -> AccountAddress {
        AccountAddress::from_canonical(&[5; 32]).unwrap()
    }

    #[test]
    fn bank_send_without_coins_is_a_noop() {
        let encoders = MessageEncoders::default();
        let msg = CosmosMsg::Bank(BankMsg::Send {
            to_address: "link1whatever".into(),
            amount: vec![],
        });
        assert_eq!(encoders.encode(&contract(), "", &msg).unwrap(), Some(vec![]));
    }

    #[test]
    fn withdraw_defaults_recipient_to_contract() {
        let encoders = MessageEncoders::default();
        let msg = CosmosMsg::Staking(StakingMsg::Withdraw {
            validator: "linkvaloper1xyz".into(),
            recipient: None,
        });
        let msgs = encoders.encode(&contract(), "", &msg).unwrap().unwrap();
        assert_eq!(msgs.len(), 2);
        match &msgs[0] {
            HostMsg::MsgSetWithdrawAddress(m) => assert_eq!(m.withdraw_address, contract().to_string()),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(msgs[1], HostMsg::MsgWithdrawDelegatorReward(_)));
    }

    #[test]
    fn ibc_messages() {
        let encoders = MessageEncoders::new(TypeRegistry::default(), "myTransferPort");
        let close = CosmosMsg::Ibc(IbcMsg::CloseChannel {
            channel_id: "channel-1".into(),
        });
        let msgs = encoders.encode(&contract(), "wasm.myport", &close).unwrap().unwrap();
        match &msgs[0] {
            HostMsg::MsgChannelCloseInit(m) => assert_eq!(m.port_id, "wasm.myport"),
            other => panic!("unexpected {other:?}"),
        }

        let transfer = CosmosMsg::Ibc(IbcMsg::Transfer {
            channel_id: "channel-1".into(),
            to_address: "cosmos1receiver".into(),
            amount: coin(1, "cony"),
            timeout: IbcTimeout {
                block: Some(IbcTimeoutBlock {
                    revision: 1,
                    height: 2,
                }),
                timestamp: None,
            },
        });
        let msgs = encoders.encode(&contract(), "", &transfer).unwrap().unwrap();
        match &msgs[0] {
            HostMsg::MsgTransfer(m) => {
                assert_eq!(m.source_port, "myTransferPort");
                assert_eq!(m.timeout_height.revision_height, 2);
                assert_eq!(m.timeout_timestamp, 0);
            }
            other => panic!("unexpected {other:?}"),
        }

        let packet = CosmosMsg::Ibc(IbcMsg::SendPacket {
            channel_id: "channel-1".into(),
            data: Binary::from(b"data".to_vec()),
            timeout: IbcTimeout::default(),
        });
        assert_eq!(encoders.encode(&contract(), "", &packet).unwrap(), None);
    }

    #[test]
    fn stargate_and_custom() {
        let encoders = MessageEncoders::default();
        let unknown = CosmosMsg::Stargate {
            type_url: "/cosmos.gov.v1beta1.MsgVote".into(),
            value: Binary::from(b"{}".to_vec()),
        };
        assert!(matches!(
            encoders.encode(&contract(), "", &unknown),
            Err(Error::InvalidMsg(_))
        ));
        let custom = CosmosMsg::Custom(serde_json::json!({"foo": "bar"}));
        assert_eq!(encoders.encode(&contract(), "", &custom).unwrap(), None);

        let overridden = MessageEncoders::default().merge(EncoderOverrides {
            custom: Some(Rc::new(|sender: &AccountAddress, _: &serde_json::Value| {
                Ok(Some(vec![MsgClearAdmin {
                    sender: sender.to_string(),
                    contract: sender.to_string(),
                }
                .into()]))
            })),
            ..Default::default()
        });
        assert_eq!(
            overridden.encode(&contract(), "", &custom).unwrap().map(|m| m.len()),
            Some(1)
        );
    }
}
