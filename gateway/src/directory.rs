//! Code and contract registries, the contract state store and the sequences,
//! with snapshots for transactional execution.

use crate::{
    address::AccountAddress,
    error::Error,
    store::{KvState, PrefixStore, PrefixStoreRef},
    types::{CodeId, CodeInfo, ContractCodeHistoryEntry, ContractInfo},
};
use cosmwasm_std::Order;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use wasmplus_vm::Record;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum Sequence {
    LastCodeId,
    LastInstanceId,
}

impl Sequence {
    pub const ALL: [Sequence; 2] = [Sequence::LastCodeId, Sequence::LastInstanceId];

    pub fn key(self) -> &'static [u8] {
        match self {
            Sequence::LastCodeId => b"lastCodeId",
            Sequence::LastInstanceId => b"lastContractId",
        }
    }

    pub fn from_key(key: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }
}

#[derive(Clone, Default, Debug)]
pub struct Db {
    codes: BTreeMap<CodeId, CodeInfo>,
    pinned: BTreeSet<CodeId>,
    contracts: BTreeMap<AccountAddress, ContractInfo>,
    histories: BTreeMap<AccountAddress, Vec<ContractCodeHistoryEntry>>,
    state: KvState,
    sequences: BTreeMap<Sequence, u64>,
}

pub trait Transactional {
    type Error;
    fn transaction_begin(&mut self) -> Result<(), Self::Error>;
    fn transaction_commit(&mut self) -> Result<(), Self::Error>;
    fn transaction_rollback(&mut self) -> Result<(), Self::Error>;
}

/// Directory of everything the gateway persists.
#[derive(Clone, Default, Debug)]
pub struct ContractDirectory {
    db: Db,
    transactions: VecDeque<Db>,
}

impl ContractDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code_info(&self, code_id: CodeId) -> Option<&CodeInfo> {
        self.db.codes.get(&code_id)
    }

    pub fn set_code_info(&mut self, code_id: CodeId, info: CodeInfo) {
        self.db.codes.insert(code_id, info);
    }

    pub fn codes(&self) -> impl Iterator<Item = (&CodeId, &CodeInfo)> {
        self.db.codes.iter()
    }

    pub fn contract_info(&self, contract: &AccountAddress) -> Option<&ContractInfo> {
        self.db.contracts.get(contract)
    }

    pub fn set_contract_info(&mut self, contract: AccountAddress, info: ContractInfo) {
        self.db.contracts.insert(contract, info);
    }

    pub fn has_contract(&self, contract: &AccountAddress) -> bool {
        self.db.contracts.contains_key(contract)
    }

    pub fn contracts(&self) -> impl Iterator<Item = (&AccountAddress, &ContractInfo)> {
        self.db.contracts.iter()
    }

    /// Contract metadata together with the code it runs.
    pub fn resolve(&self, contract: &AccountAddress) -> Result<(ContractInfo, CodeInfo), Error> {
        let contract_info = self
            .contract_info(contract)
            .ok_or_else(|| Error::NotFound(format!("contract {contract}")))?;
        let code_info = self
            .code_info(contract_info.code_id)
            .ok_or_else(|| Error::NotFound(format!("code {}", contract_info.code_id)))?;
        Ok((contract_info.clone(), code_info.clone()))
    }

    pub fn is_pinned(&self, code_id: CodeId) -> bool {
        self.db.pinned.contains(&code_id)
    }

    pub fn pin(&mut self, code_id: CodeId) {
        self.db.pinned.insert(code_id);
    }

    pub fn unpin(&mut self, code_id: CodeId) {
        self.db.pinned.remove(&code_id);
    }

    pub fn append_history(&mut self, contract: &AccountAddress, entries: Vec<ContractCodeHistoryEntry>) {
        self.db
            .histories
            .entry(contract.clone())
            .or_default()
            .extend(entries);
    }

    pub fn history(&self, contract: &AccountAddress) -> &[ContractCodeHistoryEntry] {
        self.db
            .histories
            .get(contract)
            .map_or(&[], Vec::as_slice)
    }

    /// Next id of `sequence`. Sequences start at 1.
    pub fn auto_increment_id(&mut self, sequence: Sequence) -> u64 {
        let id = self.peek_auto_increment_id(sequence);
        self.db.sequences.insert(sequence, id + 1);
        id
    }

    pub fn peek_auto_increment_id(&self, sequence: Sequence) -> u64 {
        self.db.sequences.get(&sequence).copied().unwrap_or(1)
    }

    pub fn import_auto_increment_id(&mut self, sequence: Sequence, value: u64) -> Result<(), Error> {
        if self.db.sequences.contains_key(&sequence) {
            return Err(Error::Duplicate(format!("autoincrement id: {sequence:?}")));
        }
        self.db.sequences.insert(sequence, value);
        Ok(())
    }

    pub fn contract_store(&mut self, contract: &AccountAddress) -> PrefixStore<'_> {
        PrefixStore::new(&mut self.db.state, contract)
    }

    pub fn contract_store_ref(&self, contract: &AccountAddress) -> PrefixStoreRef<'_> {
        PrefixStoreRef::new(&self.db.state, contract)
    }

    pub fn contract_state(&self, contract: &AccountAddress) -> Vec<Record> {
        self.contract_store_ref(contract)
            .range(None, None, Order::Ascending)
    }

    /// Write imported state. Fails when the contract already holds state.
    pub fn import_contract_state(&mut self, contract: &AccountAddress, records: Vec<Record>) -> Result<(), Error> {
        let mut store = self.contract_store(contract);
        for (key, value) in records {
            if store.has(&key) {
                return Err(Error::Duplicate(format!(
                    "duplicate key: {}",
                    hex::encode_upper(&key)
                )));
            }
            store.set(&key, &value);
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.transactions.len()
    }
}

impl Transactional for ContractDirectory {
    type Error = Error;

    fn transaction_begin(&mut self) -> Result<(), Self::Error> {
        self.transactions.push_back(self.db.clone());
        log::debug!("> Transaction begin: {}", self.transactions.len());
        Ok(())
    }

    fn transaction_commit(&mut self) -> Result<(), Self::Error> {
        self.transactions
            .pop_back()
            .ok_or_else(|| Error::Invalid("commit without transaction".into()))?;
        log::debug!("< Transaction end: {}", self.transactions.len());
        Ok(())
    }

    fn transaction_rollback(&mut self) -> Result<(), Self::Error> {
        self.db = self
            .transactions
            .pop_back()
            .ok_or_else(|| Error::Invalid("rollback without transaction".into()))?;
        log::debug!("< Transaction abort: {}", self.transactions.len());
        Ok(())
    }
}
