//! Per call environment and the storage view handed to the VM.

use crate::{address::AccountAddress, context::Context, error::Error, keeper::Keeper};
use cosmwasm_std::{BlockInfo, Coin, Env, MessageInfo, Order, TransactionInfo};
use wasmplus_vm::{Backend, BackendError, Record, Storage};

/// Snapshot of the block and the called contract.
pub fn new_env(ctx: &Context, contract: &AccountAddress) -> Env {
    let header = ctx.header();
    Env {
        block: BlockInfo {
            height: header.height,
            time: header.time,
            chain_id: header.chain_id.clone(),
        },
        transaction: Some(TransactionInfo {
            index: ctx.tx_index() as u32,
        }),
        contract: cosmwasm_std::ContractInfo {
            address: contract.to_addr(),
        },
    }
}

pub fn new_info(sender: &AccountAddress, funds: &[Coin]) -> MessageInfo {
    MessageInfo {
        sender: sender.to_addr(),
        funds: funds.to_vec(),
    }
}

/// Host side of one contract call: the contract's storage partition, the
/// host API and the querier, all charged on the context gas meter.
pub struct ContractBackend<'a> {
    pub(crate) keeper: &'a mut Keeper,
    pub(crate) ctx: &'a mut Context,
    pub(crate) contract: AccountAddress,
    /// Storage writes and event emitting callable points are refused.
    pub(crate) read_only: bool,
}

impl<'a> ContractBackend<'a> {
    pub fn new(
        keeper: &'a mut Keeper,
        ctx: &'a mut Context,
        contract: AccountAddress,
        read_only: bool,
    ) -> Self {
        ContractBackend {
            keeper,
            ctx,
            contract,
            read_only,
        }
    }

    pub fn contract(&self) -> &AccountAddress {
        &self.contract
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn charge(&mut self, gas: u64, descriptor: &str) -> Result<(), BackendError> {
        self.ctx
            .gas_meter_mut()
            .consume_gas(gas, descriptor)
            .map_err(|_| BackendError::OutOfGas)
    }

    fn ensure_writable(&self) -> Result<(), BackendError> {
        if self.read_only {
            return Err(BackendError::ReadOnly);
        }
        Ok(())
    }
}

/// Gas exhaustion must reach the VM as such, everything else is a plain
/// failure the contract may observe.
pub(crate) fn to_backend_error(e: Error) -> BackendError {
    if e.is_out_of_gas() {
        BackendError::OutOfGas
    } else {
        BackendError::UserErr(e.to_string())
    }
}

impl Storage for ContractBackend<'_> {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        let value = self.keeper.directory.contract_store_ref(&self.contract).get(key);
        let gas = self.keeper.kv_gas.read_costs(key, value.as_deref());
        self.charge(gas, "ReadFlat")?;
        Ok(value)
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), BackendError> {
        self.ensure_writable()?;
        let gas = self.keeper.kv_gas.write_costs(key, value);
        self.charge(gas, "WriteFlat")?;
        self.keeper
            .directory
            .contract_store(&self.contract)
            .set(key, value);
        Ok(())
    }

    fn remove(&mut self, key: &[u8]) -> Result<(), BackendError> {
        self.ensure_writable()?;
        let gas = self.keeper.kv_gas.delete_cost;
        self.charge(gas, "Delete")?;
        self.keeper.directory.contract_store(&self.contract).remove(key);
        Ok(())
    }

    fn scan(
        &mut self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> Result<Vec<Record>, BackendError> {
        let kv_gas = self.keeper.kv_gas;
        self.charge(kv_gas.read_cost_flat, "IterSeek")?;
        let meter = self.ctx.gas_meter_mut();
        let mut records = Vec::new();
        let store = self.keeper.directory.contract_store_ref(&self.contract);
        for (key, value) in store.iter_range(start, end, order) {
            meter
                .consume_gas(kv_gas.iter_next_costs(&key, &value), "IterNextFlat")
                .map_err(|_| BackendError::OutOfGas)?;
            records.push((key, value));
        }
        Ok(records)
    }
}

impl Backend for ContractBackend<'_> {
    fn host_gas_consumed(&self) -> u64 {
        self.ctx.gas_meter().consumed()
    }
}
