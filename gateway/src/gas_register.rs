//! Conversion between host gas and VM gas, and the fixed prices of work the
//! host does on behalf of contracts.

use crate::{error::Error, gas_meter::GasMeter};
use cosmwasm_std::{Attribute, Event, Reply, SubMsgResult};
use serde::{Deserialize, Serialize};
use wasmplus_vm::UFraction;

/// Setup cost of loading a contract that is not pinned.
pub const DEFAULT_INSTANCE_COST: u64 = 40_000;
/// Per byte of uploaded code.
pub const DEFAULT_COMPILE_COST: u64 = 2;
/// VM gas per host gas.
pub const DEFAULT_GAS_MULTIPLIER: u64 = 100;
pub const DEFAULT_EVENT_ATTRIBUTE_DATA_COST: u64 = 1;
pub const DEFAULT_PER_ATTRIBUTE_COST: u64 = 10;
pub const DEFAULT_PER_CUSTOM_EVENT_COST: u64 = 20;
/// Attribute bytes that are free per response.
pub const DEFAULT_EVENT_ATTRIBUTE_FREE_TIER: u64 = 100;
pub const DEFAULT_CONTRACT_MESSAGE_DATA_COST: u64 = 0;
/// Host gas for one canonical to human address conversion.
pub const DEFAULT_GAS_COST_HUMAN_ADDRESS: u64 = 5;
/// Host gas for one human to canonical address conversion.
pub const DEFAULT_GAS_COST_CANONICAL_ADDRESS: u64 = 4;
/// Host gas per byte of JSON the VM deserializes.
pub const DEFAULT_DESERIALIZATION_COST_PER_BYTE: u64 = 1;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WasmGasRegisterConfig {
    pub instance_cost: u64,
    pub compile_cost: u64,
    pub gas_multiplier: u64,
    pub event_per_attribute_cost: u64,
    pub event_attribute_data_cost: u64,
    pub event_attribute_data_free_tier: u64,
    pub contract_message_data_cost: u64,
    pub custom_event_cost: u64,
    pub human_address_cost: u64,
    pub canonical_address_cost: u64,
    pub deserialization_cost_per_byte: u64,
}

impl Default for WasmGasRegisterConfig {
    fn default() -> Self {
        WasmGasRegisterConfig {
            instance_cost: DEFAULT_INSTANCE_COST,
            compile_cost: DEFAULT_COMPILE_COST,
            gas_multiplier: DEFAULT_GAS_MULTIPLIER,
            event_per_attribute_cost: DEFAULT_PER_ATTRIBUTE_COST,
            event_attribute_data_cost: DEFAULT_EVENT_ATTRIBUTE_DATA_COST,
            event_attribute_data_free_tier: DEFAULT_EVENT_ATTRIBUTE_FREE_TIER,
            contract_message_data_cost: DEFAULT_CONTRACT_MESSAGE_DATA_COST,
            custom_event_cost: DEFAULT_PER_CUSTOM_EVENT_COST,
            human_address_cost: DEFAULT_GAS_COST_HUMAN_ADDRESS,
            canonical_address_cost: DEFAULT_GAS_COST_CANONICAL_ADDRESS,
            deserialization_cost_per_byte: DEFAULT_DESERIALIZATION_COST_PER_BYTE,
        }
    }
}

/// Pure price table. All arithmetic is integer and saturating so every node
/// computes the same numbers.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct WasmGasRegister {
    config: WasmGasRegisterConfig,
}

impl WasmGasRegister {
    pub fn new(config: WasmGasRegisterConfig) -> Self {
        WasmGasRegister { config }
    }

    pub fn config(&self) -> &WasmGasRegisterConfig {
        &self.config
    }

    /// Host gas to load a contract and hand it a message of `msg_len` bytes.
    /// Pinned code skips the instance cost.
    pub fn instantiate_contract_costs(&self, pinned: bool, msg_len: usize) -> u64 {
        let data_costs = (msg_len as u64).saturating_mul(self.config.contract_message_data_cost);
        if pinned {
            return data_costs;
        }
        self.config.instance_cost.saturating_add(data_costs)
    }

    pub fn compile_costs(&self, byte_length: usize) -> u64 {
        self.config.compile_cost.saturating_mul(byte_length as u64)
    }

    /// Replies are charged as pinned: the contract was just running.
    pub fn reply_costs(&self, pinned: bool, reply: &Reply) -> u64 {
        let mut event_gas = 0u64;
        let msg_len = match &reply.result {
            SubMsgResult::Err(err) => err.len(),
            SubMsgResult::Ok(response) => {
                let mut attributes = Vec::new();
                for event in &response.events {
                    event_gas = event_gas.saturating_add(
                        (event.ty.len() as u64)
                            .saturating_mul(self.config.event_attribute_data_cost),
                    );
                    attributes.extend(event.attributes.iter().cloned());
                }
                // free tier applies to the whole set, not per event
                event_gas = event_gas.saturating_add(self.event_costs(&attributes, &[]));
                response.data.as_ref().map_or(0, |data| data.len())
            }
        };
        event_gas.saturating_add(self.instantiate_contract_costs(pinned, msg_len))
    }

    /// Cost of the attributes and custom events of a contract response.
    pub fn event_costs(&self, attributes: &[Attribute], events: &[Event]) -> u64 {
        let (mut gas, mut free_tier) =
            self.event_attribute_costs(attributes, self.config.event_attribute_data_free_tier);
        for event in events {
            gas = gas.saturating_add(self.config.custom_event_cost);
            // no free tier for the event type
            gas = gas.saturating_add(
                (event.ty.len() as u64).saturating_mul(self.config.event_attribute_data_cost),
            );
            let (attribute_gas, remaining) =
                self.event_attribute_costs(&event.attributes, free_tier);
            gas = gas.saturating_add(attribute_gas);
            free_tier = remaining;
        }
        gas
    }

    fn event_attribute_costs(&self, attributes: &[Attribute], free_tier: u64) -> (u64, u64) {
        if attributes.is_empty() {
            return (0, free_tier);
        }
        let stored_bytes = attributes
            .iter()
            .map(|a| (a.key.len() + a.value.len()) as u64)
            .fold(0u64, u64::saturating_add);
        let (charged_bytes, free_tier) = if stored_bytes <= free_tier {
            (0, free_tier - stored_bytes)
        } else {
            (stored_bytes - free_tier, 0)
        };
        let gas = charged_bytes
            .saturating_mul(self.config.event_attribute_data_cost)
            .saturating_add(
                (attributes.len() as u64).saturating_mul(self.config.event_per_attribute_cost),
            );
        (gas, free_tier)
    }

    pub fn to_vm_gas(&self, host_gas: u64) -> u64 {
        host_gas.saturating_mul(self.config.gas_multiplier)
    }

    pub fn from_vm_gas(&self, vm_gas: u64) -> u64 {
        if self.config.gas_multiplier == 0 {
            return 0;
        }
        vm_gas / self.config.gas_multiplier
    }

    /// VM gas charged for one canonical to human conversion.
    pub fn humanize_cost(&self) -> u64 {
        self.to_vm_gas(self.config.human_address_cost)
    }

    /// VM gas charged for one human to canonical conversion.
    pub fn canonicalize_cost(&self) -> u64 {
        self.to_vm_gas(self.config.canonical_address_cost)
    }

    /// VM gas per byte of deserialized JSON, as a fraction the VM applies.
    pub fn json_deserialization_cost(&self) -> UFraction {
        UFraction::new(self.to_vm_gas(self.config.deserialization_cost_per_byte), 1)
    }

    pub fn deserialization_cost(&self, len: usize) -> u64 {
        self.json_deserialization_cost().mul(len as u64)
    }

    /// VM gas a contract may spend given what is left on `meter`.
    pub fn runtime_gas_for_contract(&self, meter: &GasMeter) -> u64 {
        if meter.is_out_of_gas() {
            return 0;
        }
        match meter.limit() {
            None => u64::MAX,
            Some(_) => self.to_vm_gas(meter.remaining()),
        }
    }

    /// Charge the host meter for gas the VM reports.
    pub fn consume_runtime_gas(&self, meter: &mut GasMeter, vm_gas: u64) -> Result<(), Error> {
        meter
            .consume_gas(self.from_vm_gas(vm_gas), "wasm contract")
            .map_err(|_| Error::OutOfGas("Wasmer function execution".into()))
    }
}
