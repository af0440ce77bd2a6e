//! The slice of IBC the gateway needs: port ownership, channel lookup and
//! packet sending.

use crate::{address::AccountAddress, context::Context, directory::Transactional, error::Error};
use cosmwasm_std::Binary;
use serde::{Deserialize, Serialize};
use wasmplus_vm::IbcTimeoutBlock;

pub const PORT_ID_PREFIX: &str = "wasm.";

pub fn port_id_for_contract(contract: &AccountAddress) -> String {
    format!("{PORT_ID_PREFIX}{contract}")
}

pub fn port_path(port_id: &str) -> String {
    format!("ports/{port_id}")
}

pub fn channel_capability_path(port_id: &str, channel_id: &str) -> String {
    format!("capabilities/ports/{port_id}/channels/{channel_id}")
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Height {
    pub revision_number: u64,
    pub revision_height: u64,
}

impl Height {
    pub fn is_zero(&self) -> bool {
        self.revision_number == 0 && self.revision_height == 0
    }
}

impl From<Option<IbcTimeoutBlock>> for Height {
    fn from(block: Option<IbcTimeoutBlock>) -> Self {
        block.map_or_else(Height::default, |b| Height {
            revision_number: b.revision,
            revision_height: b.height,
        })
    }
}

/// Opaque proof of ownership handed out by the capability keeper.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Capability {
    pub index: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Init,
    TryOpen,
    Open,
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Counterparty {
    pub port_id: String,
    pub channel_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Channel {
    pub state: ChannelState,
    pub counterparty: Counterparty,
    pub connection_hops: Vec<String>,
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub sequence: u64,
    pub source_port: String,
    pub source_channel: String,
    pub destination_port: String,
    pub destination_channel: String,
    pub data: Binary,
    pub timeout_height: Height,
    pub timeout_timestamp: u64,
}

pub trait ChannelKeeper: Transactional<Error = Error> {
    fn get_next_sequence_send(&self, port_id: &str, channel_id: &str) -> Option<u64>;

    fn get_channel(&self, port_id: &str, channel_id: &str) -> Option<Channel>;

    fn send_packet(&mut self, ctx: &mut Context, capability: &Capability, packet: Packet) -> Result<(), Error>;
}

pub trait CapabilityKeeper: Transactional<Error = Error> {
    fn get_capability(&self, name: &str) -> Option<Capability>;

    /// Bind `port_id` and return the capability for it.
    fn bind_port(&mut self, port_id: &str) -> Result<Capability, Error>;

    fn claim_capability(&mut self, capability: Capability, name: &str) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths() {
        let contract = AccountAddress::from_canonical(&[1; 32]).unwrap();
        let port = port_id_for_contract(&contract);
        assert_eq!(port, format!("wasm.{contract}"));
        assert_eq!(port_path("transfer"), "ports/transfer");
        assert_eq!(
            channel_capability_path("transfer", "channel-0"),
            "capabilities/ports/transfer/channels/channel-0"
        );
        let height = Height::from(Some(IbcTimeoutBlock {
            revision: 1,
            height: 10,
        }));
        assert_eq!(height.revision_height, 10);
        assert!(Height::from(None).is_zero());
    }
}
