//! Contract storage partitions over the shared key value state.

use crate::address::AccountAddress;
use cosmwasm_std::Order;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, ops::Bound};
use wasmplus_vm::Record;

pub const CONTRACT_STORE_PREFIX: u8 = 0x03;

pub type KvState = BTreeMap<Vec<u8>, Vec<u8>>;

/// `0x03 || len(addr) || addr`. The length byte keeps 20 and 32 byte
/// addresses from sharing a prefix.
pub fn contract_store_prefix(contract: &AccountAddress) -> Vec<u8> {
    let bytes = contract.as_bytes();
    let mut prefix = Vec::with_capacity(bytes.len() + 2);
    prefix.push(CONTRACT_STORE_PREFIX);
    prefix.push(bytes.len() as u8);
    prefix.extend_from_slice(bytes);
    prefix
}

/// Smallest key greater than every key starting with `prefix`, `None` when
/// no such key exists.
fn prefix_end_bytes(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

fn prefixed(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut full = Vec::with_capacity(prefix.len() + key.len());
    full.extend_from_slice(prefix);
    full.extend_from_slice(key);
    full
}

/// Records of the partition under `prefix`, yielded lazily so callers can
/// stop part way.
fn scan_prefix<'a>(
    state: &'a KvState,
    prefix: &[u8],
    start: Option<&[u8]>,
    end: Option<&[u8]>,
    order: Order,
) -> Box<dyn Iterator<Item = Record> + 'a> {
    let lower = Bound::Included(prefixed(prefix, start.unwrap_or_default()));
    let upper = match end {
        Some(end) => Bound::Excluded(prefixed(prefix, end)),
        None => match prefix_end_bytes(prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        },
    };
    if let (Bound::Included(l), Bound::Excluded(u)) = (&lower, &upper) {
        if l >= u {
            return Box::new(std::iter::empty());
        }
    }
    let prefix_len = prefix.len();
    let strip = move |(k, v): (&Vec<u8>, &Vec<u8>)| (k[prefix_len..].to_vec(), v.clone());
    let range = state.range((lower, upper));
    match order {
        Order::Ascending => Box::new(range.map(strip)),
        Order::Descending => Box::new(range.rev().map(strip)),
    }
}

/// Mutable view of one contract's partition. Keys never escape the prefix.
pub struct PrefixStore<'a> {
    state: &'a mut KvState,
    prefix: Vec<u8>,
}

impl<'a> PrefixStore<'a> {
    pub fn new(state: &'a mut KvState, contract: &AccountAddress) -> Self {
        PrefixStore {
            state,
            prefix: contract_store_prefix(contract),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state.get(&prefixed(&self.prefix, key)).cloned()
    }

    pub fn has(&self, key: &[u8]) -> bool {
        self.state.contains_key(&prefixed(&self.prefix, key))
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) {
        self.state
            .insert(prefixed(&self.prefix, key), value.to_vec());
    }

    pub fn remove(&mut self, key: &[u8]) {
        self.state.remove(&prefixed(&self.prefix, key));
    }

    pub fn range(&self, start: Option<&[u8]>, end: Option<&[u8]>, order: Order) -> Vec<Record> {
        scan_prefix(self.state, &self.prefix, start, end, order).collect()
    }
}

/// Read only view of one contract's partition.
pub struct PrefixStoreRef<'a> {
    state: &'a KvState,
    prefix: Vec<u8>,
}

impl<'a> PrefixStoreRef<'a> {
    pub fn new(state: &'a KvState, contract: &AccountAddress) -> Self {
        PrefixStoreRef {
            state,
            prefix: contract_store_prefix(contract),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.state.get(&prefixed(&self.prefix, key)).cloned()
    }

    pub fn range(&self, start: Option<&[u8]>, end: Option<&[u8]>, order: Order) -> Vec<Record> {
        self.iter_range(start, end, order).collect()
    }

    pub fn iter_range(
        &self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> Box<dyn Iterator<Item = Record> + 'a> {
        scan_prefix(self.state, &self.prefix, start, end, order)
    }
}

/// Host gas charged for contract storage access.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct KvGasConfig {
    pub has_cost: u64,
    pub delete_cost: u64,
    pub read_cost_flat: u64,
    pub read_cost_per_byte: u64,
    pub write_cost_flat: u64,
    pub write_cost_per_byte: u64,
    pub iter_next_cost_flat: u64,
}

impl Default for KvGasConfig {
    fn default() -> Self {
        KvGasConfig {
            has_cost: 1000,
            delete_cost: 1000,
            read_cost_flat: 1000,
            read_cost_per_byte: 3,
            write_cost_flat: 2000,
            write_cost_per_byte: 30,
            iter_next_cost_flat: 30,
        }
    }
}

impl KvGasConfig {
    pub fn read_costs(&self, key: &[u8], value: Option<&[u8]>) -> u64 {
        let bytes = (key.len() + value.map_or(0, <[u8]>::len)) as u64;
        self.read_cost_flat
            .saturating_add(bytes.saturating_mul(self.read_cost_per_byte))
    }

    pub fn write_costs(&self, key: &[u8], value: &[u8]) -> u64 {
        let bytes = (key.len() + value.len()) as u64;
        self.write_cost_flat
            .saturating_add(bytes.saturating_mul(self.write_cost_per_byte))
    }

    /// A range scan pays `read_cost_flat` to seek, then this per record.
    pub fn iter_next_costs(&self, key: &[u8], value: &[u8]) -> u64 {
        let bytes = (key.len() + value.len()) as u64;
        self.iter_next_cost_flat
            .saturating_add(bytes.saturating_mul(self.read_cost_per_byte))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8, len: usize) -> AccountAddress {
        AccountAddress::from_canonical(&vec![byte; len]).unwrap()
    }

    #[test]
    fn partitions_are_isolated() {
        let mut state = KvState::new();
        let a = addr(1, 20);
        let b = addr(1, 32);
        PrefixStore::new(&mut state, &a).set(b"key", b"from a");
        PrefixStore::new(&mut state, &b).set(b"key", b"from b");

        assert_eq!(PrefixStoreRef::new(&state, &a).get(b"key"), Some(b"from a".to_vec()));
        assert_eq!(PrefixStoreRef::new(&state, &b).get(b"key"), Some(b"from b".to_vec()));
        assert_eq!(PrefixStoreRef::new(&state, &a).range(None, None, Order::Ascending).len(), 1);

        PrefixStore::new(&mut state, &a).remove(b"key");
        assert_eq!(PrefixStoreRef::new(&state, &a).get(b"key"), None);
        assert_eq!(PrefixStoreRef::new(&state, &b).get(b"key"), Some(b"from b".to_vec()));
    }

    #[test]
    fn range_strips_prefix_and_respects_bounds() {
        let mut state = KvState::new();
        let a = addr(0xff, 20);
        let mut store = PrefixStore::new(&mut state, &a);
        for key in [b"a", b"b", b"c", b"d"] {
            store.set(key, key);
        }
        let keys = |records: Vec<Record>| records.into_iter().map(|(k, _)| k).collect::<Vec<_>>();
        assert_eq!(
            keys(store.range(Some(&b"b"[..]), Some(&b"d"[..]), Order::Ascending)),
            vec![b"b".to_vec(), b"c".to_vec()]
        );
        assert_eq!(
            keys(store.range(None, None, Order::Descending)),
            vec![b"d".to_vec(), b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]
        );
        assert!(store.range(Some(&b"d"[..]), Some(&b"a"[..]), Order::Ascending).is_empty());
    }

    #[test]
    fn prefix_end_skips_trailing_max_bytes() {
        assert_eq!(prefix_end_bytes(&[1, 2, 0xff]), Some(vec![1, 3]));
        assert_eq!(prefix_end_bytes(&[0xff, 0xff]), None);
    }

    #[test]
    fn kv_gas_scales_with_bytes() {
        let gas = KvGasConfig::default();
        assert_eq!(gas.read_costs(b"key", None), 1009);
        assert_eq!(gas.read_costs(b"key", Some(&b"value"[..])), 1024);
        assert_eq!(gas.write_costs(b"key", b"value"), 2240);
        assert_eq!(gas.iter_next_costs(b"k", b"v"), 36);
    }
}
