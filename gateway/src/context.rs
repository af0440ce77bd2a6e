//! Per transaction execution context.

use crate::{address::AccountAddress, gas_meter::GasMeter, types::AbsoluteTxPosition};
use cosmwasm_std::{Event, Timestamp};
use std::collections::BTreeSet;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BlockHeader {
    pub height: u64,
    pub time: Timestamp,
    pub chain_id: String,
}

/// Append only event log of one execution frame.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct EventManager {
    events: Vec<Event>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn emit_events(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drop everything emitted after the first `len` events.
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }
}

/// Everything that belongs to one top level transaction: block data, the
/// authoritative gas meter, the event log and the contracts that may not be
/// called right now. Nothing in here outlives the transaction.
#[derive(Clone, Debug)]
pub struct Context {
    header: BlockHeader,
    tx_index: u64,
    gas_meter: GasMeter,
    event_manager: EventManager,
    inactive_contracts: BTreeSet<AccountAddress>,
}

impl Context {
    pub fn new(header: BlockHeader, gas_meter: GasMeter) -> Self {
        Context {
            header,
            tx_index: 0,
            gas_meter,
            event_manager: EventManager::new(),
            inactive_contracts: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_tx_index(mut self, tx_index: u64) -> Self {
        self.tx_index = tx_index;
        self
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn block_height(&self) -> u64 {
        self.header.height
    }

    pub fn tx_index(&self) -> u64 {
        self.tx_index
    }

    pub fn tx_position(&self) -> AbsoluteTxPosition {
        AbsoluteTxPosition {
            block_height: self.header.height,
            tx_index: self.tx_index,
        }
    }

    pub fn gas_meter(&self) -> &GasMeter {
        &self.gas_meter
    }

    pub fn gas_meter_mut(&mut self) -> &mut GasMeter {
        &mut self.gas_meter
    }

    /// Install `meter`, returning the one it replaces.
    pub fn replace_gas_meter(&mut self, meter: GasMeter) -> GasMeter {
        std::mem::replace(&mut self.gas_meter, meter)
    }

    pub fn replace_event_manager(&mut self, event_manager: EventManager) -> EventManager {
        std::mem::replace(&mut self.event_manager, event_manager)
    }

    pub fn event_manager_mut(&mut self) -> &mut EventManager {
        &mut self.event_manager
    }

    pub fn emit_event(&mut self, event: Event) {
        self.event_manager.emit_event(event);
    }

    pub fn emit_events(&mut self, events: impl IntoIterator<Item = Event>) {
        self.event_manager.emit_events(events);
    }

    pub fn events(&self) -> &[Event] {
        self.event_manager.events()
    }

    pub fn is_inactive(&self, contract: &AccountAddress) -> bool {
        self.inactive_contracts.contains(contract)
    }

    pub fn mark_inactive(&mut self, contract: AccountAddress) {
        self.inactive_contracts.insert(contract);
    }

    pub fn clear_inactive(&mut self, contract: &AccountAddress) {
        self.inactive_contracts.remove(contract);
    }

    pub fn clear_all_inactive(&mut self) {
        self.inactive_contracts.clear();
    }

    pub fn inactive_contracts(&self) -> impl Iterator<Item = &AccountAddress> {
        self.inactive_contracts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::new(
            BlockHeader {
                height: 1,
                time: Timestamp::from_seconds(1),
                chain_id: "testing".into(),
            },
            GasMeter::new(1_000),
        )
    }

    #[test]
    fn inactive_set_operations_are_idempotent() {
        let mut ctx = ctx();
        let addr = AccountAddress::from_canonical(&[9; 32]).unwrap();
        ctx.clear_inactive(&addr);
        assert!(!ctx.is_inactive(&addr));

        ctx.mark_inactive(addr.clone());
        ctx.mark_inactive(addr.clone());
        assert!(ctx.is_inactive(&addr));
        assert_eq!(ctx.inactive_contracts().count(), 1);

        ctx.clear_inactive(&addr);
        assert!(!ctx.is_inactive(&addr));
    }

    #[test]
    fn event_manager_swap_and_truncate() {
        let mut ctx = ctx();
        ctx.emit_event(Event::new("first"));
        let parent = ctx.replace_event_manager(EventManager::new());
        ctx.emit_event(Event::new("nested"));
        let nested = ctx.replace_event_manager(parent);
        assert_eq!(nested.len(), 1);
        assert_eq!(ctx.events().len(), 1);

        ctx.emit_events(nested.into_events());
        ctx.event_manager_mut().truncate(1);
        assert_eq!(ctx.events()[0].ty, "first");
    }
}
