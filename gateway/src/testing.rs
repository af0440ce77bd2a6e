//! In-memory engine and host keepers for tests.
//!
//! Contracts are plain closures registered under a code blob. Storing a code
//! whose bytes were registered with [`register_mock`] runs those closures;
//! any other blob starting with the wasm magic runs [`MockContract::default`].

use crate::{
    address::AccountAddress,
    config::WasmConfig,
    context::{BlockHeader, Context},
    directory::Transactional,
    error::Error,
    gas_meter::GasMeter,
    ibc::{port_path, Capability, CapabilityKeeper, Channel, ChannelKeeper, ChannelState, Counterparty, Packet},
    keeper::{Keeper, KeeperOptions},
    ledger::{Ledger, RouterResponse},
    msgs::HostMsg,
};
use cosmwasm_std::{Binary, Coin, ContractResult, Env, Event, MessageInfo, Order, Reply, SystemResult, Timestamp};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet, VecDeque},
    rc::Rc,
};
use wasmplus_vm::{
    AnalysisReport, Backend, BackendApi, BackendError, CallablePointOutput,
    CallablePointProperties, Checksum, EngineResult, GasInfo, Invocation, Querier, QueryRequest,
    Record, Response, Storage, VmError, WasmEngine,
};

pub const MOCK_WASM: &[u8] = b"\0asm\x01\0\0\0";
/// VM gas burned by every entry point before it does anything.
pub const MOCK_VM_GAS: u64 = 1_000;
pub const TEST_GAS_LIMIT: u64 = 100_000_000;

thread_local! {
    static REGISTRY: RefCell<BTreeMap<Checksum, MockContract>> = RefCell::new(BTreeMap::new());
    static NEXT_CODE: Cell<u64> = Cell::new(0);
}

pub fn checksum_of(code: &[u8]) -> Checksum {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&Sha256::digest(code));
    Checksum::from(hash)
}

/// Make `contract` the behaviour of `code` for this thread.
pub fn register_mock(code: &[u8], contract: MockContract) -> Checksum {
    let checksum = checksum_of(code);
    REGISTRY.with(|registry| registry.borrow_mut().insert(checksum, contract));
    checksum
}

/// A code blob no other call on this thread returns.
pub fn unique_code() -> Vec<u8> {
    let n = NEXT_CODE.with(|next| {
        let n = next.get();
        next.set(n + 1);
        n
    });
    let mut code = MOCK_WASM.to_vec();
    code.extend_from_slice(&n.to_be_bytes());
    code
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockError {
    /// Aborts the call like a trap.
    Vm(VmError),
    /// Returned by the contract as `ContractResult::Err`.
    Contract(String),
}

impl From<BackendError> for MockError {
    fn from(e: BackendError) -> Self {
        MockError::Vm(e.into())
    }
}

impl From<&str> for MockError {
    fn from(e: &str) -> Self {
        MockError::Contract(e.into())
    }
}

impl From<String> for MockError {
    fn from(e: String) -> Self {
        MockError::Contract(e)
    }
}

pub type EntryPoint<T> = Rc<dyn Fn(&mut MockVm, &[u8]) -> Result<T, MockError>>;
pub type ReplyEntryPoint = Rc<dyn Fn(&mut MockVm, &Reply) -> Result<Response, MockError>>;

/// Behaviour of one code. Missing entry points succeed with an empty
/// response; the default query echoes its message.
#[derive(Clone, Default)]
pub struct MockContract {
    instantiate: Option<EntryPoint<Response>>,
    execute: Option<EntryPoint<Response>>,
    migrate: Option<EntryPoint<Response>>,
    sudo: Option<EntryPoint<Response>>,
    query: Option<EntryPoint<Binary>>,
    reply: Option<ReplyEntryPoint>,
    callable_points: BTreeMap<String, (bool, EntryPoint<CallablePointOutput>)>,
    has_ibc_entry_points: bool,
    required_capabilities: BTreeSet<String>,
}

impl MockContract {
    #[must_use]
    pub fn with_instantiate(
        mut self,
        f: impl Fn(&mut MockVm, &[u8]) -> Result<Response, MockError> + 'static,
    ) -> Self {
        self.instantiate = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_execute(
        mut self,
        f: impl Fn(&mut MockVm, &[u8]) -> Result<Response, MockError> + 'static,
    ) -> Self {
        self.execute = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_migrate(
        mut self,
        f: impl Fn(&mut MockVm, &[u8]) -> Result<Response, MockError> + 'static,
    ) -> Self {
        self.migrate = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_sudo(
        mut self,
        f: impl Fn(&mut MockVm, &[u8]) -> Result<Response, MockError> + 'static,
    ) -> Self {
        self.sudo = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_query(
        mut self,
        f: impl Fn(&mut MockVm, &[u8]) -> Result<Binary, MockError> + 'static,
    ) -> Self {
        self.query = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_reply(
        mut self,
        f: impl Fn(&mut MockVm, &Reply) -> Result<Response, MockError> + 'static,
    ) -> Self {
        self.reply = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_callable_point(
        mut self,
        name: &str,
        read_only: bool,
        f: impl Fn(&mut MockVm, &[u8]) -> Result<CallablePointOutput, MockError> + 'static,
    ) -> Self {
        self.callable_points
            .insert(name.to_owned(), (read_only, Rc::new(f)));
        self
    }

    #[must_use]
    pub fn with_ibc_entry_points(mut self) -> Self {
        self.has_ibc_entry_points = true;
        self
    }

    #[must_use]
    pub fn with_capability(mut self, capability: &str) -> Self {
        self.required_capabilities.insert(capability.to_owned());
        self
    }

    fn report(&self) -> AnalysisReport {
        AnalysisReport {
            has_ibc_entry_points: self.has_ibc_entry_points,
            required_capabilities: self.required_capabilities.clone(),
            callable_points: self
                .callable_points
                .iter()
                .map(|(name, (read_only, _))| {
                    (
                        name.clone(),
                        CallablePointProperties {
                            read_only: *read_only,
                        },
                    )
                })
                .collect(),
        }
    }
}

/// What a mock entry point sees while it runs.
pub struct MockVm<'a> {
    backend: &'a mut dyn Backend,
    pub env: Env,
    pub info: Option<MessageInfo>,
    /// JSON list of the executing contracts, this one last.
    pub callstack: Vec<u8>,
    gas_limit: u64,
    gas_used: u64,
    externally_used: u64,
}

impl MockVm<'_> {
    pub fn address(&self) -> &str {
        self.env.contract.address.as_str()
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    fn remaining(&self) -> u64 {
        self.gas_limit
            .saturating_sub(self.gas_used)
            .saturating_sub(self.externally_used)
    }

    fn charge(&mut self, gas: GasInfo) -> Result<(), MockError> {
        self.gas_used = self.gas_used.saturating_add(gas.cost);
        self.externally_used = self.externally_used.saturating_add(gas.externally_used);
        if self.gas_used.saturating_add(self.externally_used) > self.gas_limit {
            return Err(MockError::Vm(VmError::OutOfGas));
        }
        Ok(())
    }

    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, MockError> {
        Ok(self.backend.get(key)?)
    }

    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), MockError> {
        Ok(self.backend.set(key, value)?)
    }

    pub fn remove(&mut self, key: &[u8]) -> Result<(), MockError> {
        Ok(self.backend.remove(key)?)
    }

    pub fn scan(&mut self, order: Order) -> Result<Vec<Record>, MockError> {
        Ok(self.backend.scan(None, None, order)?)
    }

    pub fn query(
        &mut self,
        request: &QueryRequest,
    ) -> Result<SystemResult<ContractResult<Binary>>, MockError> {
        let remaining = self.remaining();
        let (result, gas) = self.backend.query(request, remaining);
        self.charge(gas)?;
        Ok(result?)
    }

    /// Call `name` of `contract_addr` with all remaining gas, passing on the
    /// stack this contract runs under.
    pub fn call_callable_point(
        &mut self,
        contract_addr: &str,
        name: &str,
        args: &[u8],
        is_readonly: bool,
    ) -> Result<Binary, MockError> {
        let name = serde_json::to_vec(name).map_err(|e| MockError::Contract(e.to_string()))?;
        let remaining = self.remaining();
        let callstack = self.callstack.clone();
        let (result, gas) = self.backend.call_callable_point(
            contract_addr,
            &name,
            args,
            is_readonly,
            &callstack,
            remaining,
        );
        self.charge(gas)?;
        Ok(result?)
    }

    pub fn validate_interface(
        &mut self,
        contract_addr: &str,
        expected_interface: &[u8],
    ) -> Result<Binary, MockError> {
        let (result, gas) = self
            .backend
            .validate_interface(contract_addr, expected_interface);
        self.charge(gas)?;
        Ok(result?)
    }
}

#[derive(Serialize, Deserialize)]
struct ExpectedCallablePoint {
    name: String,
    read_only: bool,
}

#[derive(Default)]
pub struct MockEngine {
    codes: RefCell<BTreeMap<Checksum, (Vec<u8>, MockContract)>>,
    pinned: RefCell<BTreeSet<Checksum>>,
    calls: Cell<usize>,
}

impl MockEngine {
    /// Entry points run so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn is_pinned(&self, checksum: &Checksum) -> bool {
        self.pinned.borrow().contains(checksum)
    }

    fn contract(&self, checksum: &Checksum) -> Result<MockContract, VmError> {
        self.codes
            .borrow()
            .get(checksum)
            .map(|(_, contract)| contract.clone())
            .ok_or(VmError::CodeNotFound(*checksum))
    }

    fn run<T>(
        &self,
        call: Invocation,
        info: Option<&MessageInfo>,
        callstack: Vec<u8>,
        backend: &mut dyn Backend,
        f: impl FnOnce(&mut MockVm) -> Result<T, MockError>,
    ) -> EngineResult<ContractResult<T>> {
        self.calls.set(self.calls.get() + 1);
        if call.gas_limit < MOCK_VM_GAS {
            return (Err(VmError::OutOfGas), call.gas_limit);
        }
        let mut vm = MockVm {
            backend,
            env: call.env.clone(),
            info: info.cloned(),
            callstack,
            gas_limit: call.gas_limit,
            gas_used: MOCK_VM_GAS,
            externally_used: 0,
        };
        let result = f(&mut vm);
        let gas = vm.gas_used.min(call.gas_limit);
        match result {
            Ok(value) => (Ok(ContractResult::Ok(value)), gas),
            Err(MockError::Contract(e)) => (Ok(ContractResult::Err(e)), gas),
            Err(MockError::Vm(e)) => (Err(e), gas),
        }
    }

    fn run_entry_point<T: Default>(
        &self,
        call: Invocation,
        info: Option<&MessageInfo>,
        backend: &mut dyn Backend,
        select: impl FnOnce(&MockContract) -> Option<EntryPoint<T>>,
        msg: &[u8],
    ) -> EngineResult<ContractResult<T>> {
        let contract = match self.contract(call.checksum) {
            Ok(contract) => contract,
            Err(e) => return (Err(e), 0),
        };
        let entry_point = select(&contract);
        let callstack = top_level_callstack(call.env);
        self.run(call, info, callstack, backend, |vm| match entry_point {
            Some(f) => f(vm, msg),
            None => Ok(T::default()),
        })
    }
}

fn top_level_callstack(env: &Env) -> Vec<u8> {
    serde_json::to_vec(&[env.contract.address.as_str()]).unwrap_or_default()
}

impl WasmEngine for MockEngine {
    fn create(&self, code: &[u8]) -> Result<Checksum, VmError> {
        let checksum = checksum_of(code);
        let registered = REGISTRY.with(|registry| registry.borrow().get(&checksum).cloned());
        let contract = match registered {
            Some(contract) => contract,
            None if code.starts_with(b"\0asm") => MockContract::default(),
            None => return Err(VmError::CompileErr("magic header not detected".into())),
        };
        self.codes
            .borrow_mut()
            .insert(checksum, (code.to_vec(), contract));
        Ok(checksum)
    }

    fn analyze_code(&self, checksum: &Checksum) -> Result<AnalysisReport, VmError> {
        Ok(self.contract(checksum)?.report())
    }

    fn get_code(&self, checksum: &Checksum) -> Result<Vec<u8>, VmError> {
        self.codes
            .borrow()
            .get(checksum)
            .map(|(code, _)| code.clone())
            .ok_or(VmError::CodeNotFound(*checksum))
    }

    fn pin(&self, checksum: &Checksum) -> Result<(), VmError> {
        self.contract(checksum)?;
        self.pinned.borrow_mut().insert(*checksum);
        Ok(())
    }

    fn unpin(&self, checksum: &Checksum) -> Result<(), VmError> {
        self.pinned.borrow_mut().remove(checksum);
        Ok(())
    }

    fn instantiate(
        &self,
        call: Invocation,
        info: &MessageInfo,
        msg: &[u8],
        backend: &mut dyn Backend,
    ) -> EngineResult<ContractResult<Response>> {
        self.run_entry_point(call, Some(info), backend, |c| c.instantiate.clone(), msg)
    }

    fn execute(
        &self,
        call: Invocation,
        info: &MessageInfo,
        msg: &[u8],
        backend: &mut dyn Backend,
    ) -> EngineResult<ContractResult<Response>> {
        self.run_entry_point(call, Some(info), backend, |c| c.execute.clone(), msg)
    }

    fn query(
        &self,
        call: Invocation,
        msg: &[u8],
        backend: &mut dyn Backend,
    ) -> EngineResult<ContractResult<Binary>> {
        let echo: EntryPoint<Binary> = Rc::new(|_: &mut MockVm, msg: &[u8]| Ok(Binary::from(msg)));
        self.run_entry_point(
            call,
            None,
            backend,
            |c| Some(c.query.clone().unwrap_or(echo)),
            msg,
        )
    }

    fn migrate(
        &self,
        call: Invocation,
        msg: &[u8],
        backend: &mut dyn Backend,
    ) -> EngineResult<ContractResult<Response>> {
        self.run_entry_point(call, None, backend, |c| c.migrate.clone(), msg)
    }

    fn sudo(
        &self,
        call: Invocation,
        msg: &[u8],
        backend: &mut dyn Backend,
    ) -> EngineResult<ContractResult<Response>> {
        self.run_entry_point(call, None, backend, |c| c.sudo.clone(), msg)
    }

    fn reply(
        &self,
        call: Invocation,
        reply: &Reply,
        backend: &mut dyn Backend,
    ) -> EngineResult<ContractResult<Response>> {
        let contract = match self.contract(call.checksum) {
            Ok(contract) => contract,
            Err(e) => return (Err(e), 0),
        };
        let callstack = top_level_callstack(call.env);
        self.run(call, None, callstack, backend, |vm| match contract.reply {
            Some(f) => f(vm, reply),
            None => Ok(Response::default()),
        })
    }

    fn call_callable_point(
        &self,
        call: Invocation,
        name: &[u8],
        is_readonly: bool,
        callstack: &[u8],
        args: &[u8],
        backend: &mut dyn Backend,
    ) -> EngineResult<CallablePointOutput> {
        let entry: String = match serde_json::from_slice(name) {
            Ok(entry) => entry,
            Err(e) => return (Err(VmError::InvalidInput(e.to_string())), 0),
        };
        let contract = match self.contract(call.checksum) {
            Ok(contract) => contract,
            Err(e) => return (Err(e), 0),
        };
        let Some((read_only, f)) = contract.callable_points.get(&entry).cloned() else {
            return (Err(VmError::CallablePointNotFound(entry)), 0);
        };
        if is_readonly && !read_only {
            return (Err(VmError::ReadOnlyViolation(entry)), 0);
        }
        let (result, gas) = self.run(call, None, callstack.to_vec(), backend, |vm| f(vm, args));
        let result = match result {
            Ok(ContractResult::Ok(output)) => Ok(output),
            Ok(ContractResult::Err(e)) => Err(VmError::Generic(e)),
            Err(e) => Err(e),
        };
        (result, gas)
    }

    fn validate_dynamic_link_interface(
        &self,
        checksum: &Checksum,
        expected_interface: &[u8],
    ) -> Result<Option<Binary>, VmError> {
        let expected: Vec<ExpectedCallablePoint> = serde_json::from_slice(expected_interface)
            .map_err(|e| VmError::InvalidInput(e.to_string()))?;
        let contract = self.contract(checksum)?;
        let missing: Vec<&ExpectedCallablePoint> = expected
            .iter()
            .filter(|point| {
                contract
                    .callable_points
                    .get(&point.name)
                    .map(|(read_only, _)| *read_only)
                    != Some(point.read_only)
            })
            .collect();
        if missing.is_empty() {
            return Ok(None);
        }
        serde_json::to_vec(&missing)
            .map(|report| Some(Binary::from(report)))
            .map_err(|e| VmError::Generic(e.to_string()))
    }
}

/// State shared between clones, with a stack of snapshots.
#[derive(Default)]
struct Journal<T> {
    state: T,
    snapshots: VecDeque<T>,
}

struct Journaled<T>(Rc<RefCell<Journal<T>>>);

impl<T> Clone for Journaled<T> {
    fn clone(&self) -> Self {
        Journaled(self.0.clone())
    }
}

impl<T: Default> Default for Journaled<T> {
    fn default() -> Self {
        Journaled(Rc::new(RefCell::new(Journal::default())))
    }
}

impl<T: Clone> Journaled<T> {
    fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.borrow().state)
    }

    fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut().state)
    }

    fn begin(&self) {
        let mut journal = self.0.borrow_mut();
        let snapshot = journal.state.clone();
        journal.snapshots.push_back(snapshot);
    }

    fn commit(&self) -> Result<(), Error> {
        self.0
            .borrow_mut()
            .snapshots
            .pop_back()
            .map(drop)
            .ok_or_else(|| Error::Invalid("commit without transaction".into()))
    }

    fn rollback(&self) -> Result<(), Error> {
        let mut journal = self.0.borrow_mut();
        journal.state = journal
            .snapshots
            .pop_back()
            .ok_or_else(|| Error::Invalid("rollback without transaction".into()))?;
        Ok(())
    }
}

macro_rules! journaled_transactional {
    ($ty:ty) => {
        impl Transactional for $ty {
            type Error = Error;

            fn transaction_begin(&mut self) -> Result<(), Self::Error> {
                self.0.begin();
                Ok(())
            }

            fn transaction_commit(&mut self) -> Result<(), Self::Error> {
                self.0.commit()
            }

            fn transaction_rollback(&mut self) -> Result<(), Self::Error> {
                self.0.rollback()
            }
        }
    };
}

#[derive(Clone, Default)]
struct LedgerState {
    accounts: BTreeSet<AccountAddress>,
    balances: BTreeMap<(AccountAddress, String), u128>,
}

/// Bank with a `message` event per routed send and a staking stub that only
/// reports events.
#[derive(Clone, Default)]
pub struct MockLedger(Journaled<LedgerState>);

journaled_transactional!(MockLedger);

impl MockLedger {
    pub fn fund(&self, address: &AccountAddress, coins: &[Coin]) {
        self.0.write(|state| {
            state.accounts.insert(address.clone());
            for coin in coins {
                *state
                    .balances
                    .entry((address.clone(), coin.denom.clone()))
                    .or_default() += coin.amount.u128();
            }
        });
    }
}

fn coins_to_string(coins: &[Coin]) -> String {
    coins
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

impl Ledger for MockLedger {
    fn account_exists(&self, address: &AccountAddress) -> bool {
        self.0.read(|state| state.accounts.contains(address))
    }

    fn create_account(&mut self, address: &AccountAddress) -> Result<(), Error> {
        if self.0.write(|state| state.accounts.insert(address.clone())) {
            Ok(())
        } else {
            Err(Error::AccountExists(address.to_string()))
        }
    }

    fn transfer(
        &mut self,
        ctx: &mut Context,
        from: &AccountAddress,
        to: &AccountAddress,
        amount: &[Coin],
    ) -> Result<(), Error> {
        self.0.write(|state| {
            for coin in amount {
                let have = state
                    .balances
                    .get(&(from.clone(), coin.denom.clone()))
                    .copied()
                    .unwrap_or_default();
                if have < coin.amount.u128() {
                    return Err(Error::InsufficientFunds(format!(
                        "{have}{} is smaller than {coin}",
                        coin.denom
                    )));
                }
            }
            for coin in amount {
                *state
                    .balances
                    .entry((from.clone(), coin.denom.clone()))
                    .or_default() -= coin.amount.u128();
                *state
                    .balances
                    .entry((to.clone(), coin.denom.clone()))
                    .or_default() += coin.amount.u128();
            }
            state.accounts.insert(to.clone());
            Ok(())
        })?;
        ctx.emit_event(
            Event::new("transfer")
                .add_attribute("recipient", to.to_string())
                .add_attribute("sender", from.to_string())
                .add_attribute("amount", coins_to_string(amount)),
        );
        Ok(())
    }

    fn balance(&self, address: &AccountAddress, denom: &str) -> Coin {
        let amount = self.0.read(|state| {
            state
                .balances
                .get(&(address.clone(), denom.to_owned()))
                .copied()
                .unwrap_or_default()
        });
        Coin::new(amount, denom)
    }

    fn all_balances(&self, address: &AccountAddress) -> Vec<Coin> {
        self.0.read(|state| {
            state
                .balances
                .iter()
                .filter(|((owner, _), amount)| owner == address && **amount > 0)
                .map(|((_, denom), amount)| Coin::new(*amount, denom.clone()))
                .collect()
        })
    }

    fn route(&mut self, ctx: &mut Context, msg: &HostMsg) -> Result<RouterResponse, Error> {
        match msg {
            HostMsg::MsgSend(send) => {
                let from = AccountAddress::from_bech32(&send.from_address)?;
                let to = AccountAddress::from_bech32(&send.to_address)?;
                self.transfer(ctx, &from, &to, &send.amount)?;
                ctx.emit_event(
                    Event::new("message")
                        .add_attribute("module", "bank")
                        .add_attribute("sender", from.to_string()),
                );
                Ok(RouterResponse::default())
            }
            HostMsg::MsgDelegate(delegate) => Ok(RouterResponse {
                events: vec![Event::new("delegate")
                    .add_attribute("validator", &delegate.validator_address)
                    .add_attribute("amount", delegate.amount.to_string())],
                data: None,
            }),
            other => Err(Error::UnknownRequest(format!(
                "unrecognized message type: {}",
                other.type_url()
            ))),
        }
    }
}

#[derive(Clone, Default)]
struct ChannelStore {
    channels: BTreeMap<(String, String), Channel>,
    next_sequence_send: BTreeMap<(String, String), u64>,
    sent: Vec<Packet>,
}

#[derive(Clone, Default)]
pub struct MockChannelKeeper(Journaled<ChannelStore>);

journaled_transactional!(MockChannelKeeper);

impl MockChannelKeeper {
    pub fn open_channel(
        &self,
        port_id: &str,
        channel_id: &str,
        counterparty_port_id: &str,
        counterparty_channel_id: &str,
    ) {
        let key = (port_id.to_owned(), channel_id.to_owned());
        self.0.write(|store| {
            store.channels.insert(
                key.clone(),
                Channel {
                    state: ChannelState::Open,
                    counterparty: Counterparty {
                        port_id: counterparty_port_id.to_owned(),
                        channel_id: counterparty_channel_id.to_owned(),
                    },
                    connection_hops: vec!["connection-0".into()],
                    version: "v1".into(),
                },
            );
            store.next_sequence_send.insert(key, 1);
        });
    }

    pub fn sent_packets(&self) -> Vec<Packet> {
        self.0.read(|store| store.sent.clone())
    }
}

impl ChannelKeeper for MockChannelKeeper {
    fn get_next_sequence_send(&self, port_id: &str, channel_id: &str) -> Option<u64> {
        self.0.read(|store| {
            store
                .next_sequence_send
                .get(&(port_id.to_owned(), channel_id.to_owned()))
                .copied()
        })
    }

    fn get_channel(&self, port_id: &str, channel_id: &str) -> Option<Channel> {
        self.0.read(|store| {
            store
                .channels
                .get(&(port_id.to_owned(), channel_id.to_owned()))
                .cloned()
        })
    }

    fn send_packet(
        &mut self,
        ctx: &mut Context,
        _capability: &Capability,
        packet: Packet,
    ) -> Result<(), Error> {
        let key = (packet.source_port.clone(), packet.source_channel.clone());
        self.0.write(|store| {
            let next = store
                .next_sequence_send
                .get_mut(&key)
                .ok_or_else(|| Error::SequenceSendNotFound {
                    port: key.0.clone(),
                    channel: key.1.clone(),
                })?;
            if *next != packet.sequence {
                return Err(Error::Invalid(format!(
                    "packet sequence {} != next send sequence {next}",
                    packet.sequence
                )));
            }
            *next += 1;
            Ok(())
        })?;
        ctx.emit_event(
            Event::new("send_packet")
                .add_attribute("packet_sequence", packet.sequence.to_string())
                .add_attribute("packet_src_port", &packet.source_port)
                .add_attribute("packet_src_channel", &packet.source_channel),
        );
        self.0.write(|store| store.sent.push(packet));
        Ok(())
    }
}

#[derive(Clone, Default)]
struct CapabilityStore {
    owned: BTreeMap<String, Capability>,
    bound_ports: BTreeSet<String>,
    next_index: u64,
}

#[derive(Clone, Default)]
pub struct MockCapabilityKeeper(Journaled<CapabilityStore>);

journaled_transactional!(MockCapabilityKeeper);

impl MockCapabilityKeeper {
    /// Create a capability and claim it under `name`.
    pub fn grant(&self, name: &str) -> Result<Capability, Error> {
        let capability = self.0.write(|store| {
            store.next_index += 1;
            Capability {
                index: store.next_index,
            }
        });
        let mut keeper = self.clone();
        keeper.claim_capability(capability, name)?;
        Ok(capability)
    }
}

impl CapabilityKeeper for MockCapabilityKeeper {
    fn get_capability(&self, name: &str) -> Option<Capability> {
        self.0.read(|store| store.owned.get(name).copied())
    }

    fn bind_port(&mut self, port_id: &str) -> Result<Capability, Error> {
        self.0.write(|store| {
            if !store.bound_ports.insert(port_id.to_owned()) {
                return Err(Error::Invalid(format!(
                    "port is already bound: {}",
                    port_path(port_id)
                )));
            }
            store.next_index += 1;
            Ok(Capability {
                index: store.next_index,
            })
        })
    }

    fn claim_capability(&mut self, capability: Capability, name: &str) -> Result<(), Error> {
        self.0.write(|store| {
            if store.owned.contains_key(name) {
                return Err(Error::Duplicate(format!("capability name already taken: {name}")));
            }
            store.owned.insert(name.to_owned(), capability);
            Ok(())
        })
    }
}

/// Handles on every collaborator of a keeper built with [`Mocks::keeper`].
#[derive(Clone, Default)]
pub struct Mocks {
    pub engine: Rc<MockEngine>,
    pub ledger: MockLedger,
    pub channels: MockChannelKeeper,
    pub capabilities: MockCapabilityKeeper,
}

impl Mocks {
    pub fn keeper(&self) -> Keeper {
        self.keeper_with(WasmConfig::default(), KeeperOptions::default())
    }

    pub fn keeper_with(&self, config: WasmConfig, options: KeeperOptions) -> Keeper {
        Keeper::new(
            self.engine.clone(),
            Box::new(self.ledger.clone()),
            Box::new(self.channels.clone()),
            Box::new(self.capabilities.clone()),
            config,
            options,
        )
    }
}

pub fn test_keeper() -> Keeper {
    Mocks::default().keeper()
}

pub fn test_context() -> Context {
    Context::new(
        BlockHeader {
            height: 12_345,
            time: Timestamp::from_seconds(1_571_797_419),
            chain_id: "testing".into(),
        },
        GasMeter::new(TEST_GAS_LIMIT),
    )
}

pub fn mock_creator() -> AccountAddress {
    AccountAddress::module("creator", b"mock")
}

/// Store `contract` under a fresh code and instantiate it, admin being
/// [`mock_creator`].
pub fn instantiate_mock(keeper: &mut Keeper, ctx: &mut Context, contract: MockContract) -> AccountAddress {
    let code = unique_code();
    register_mock(&code, contract);
    let creator = mock_creator();
    let (code_id, _) = keeper
        .store_code(ctx, &creator, &code, None)
        .expect("store mock code");
    let (address, _) = keeper
        .instantiate(ctx, code_id, &creator, Some(creator.clone()), b"{}", "mock", &[])
        .expect("instantiate mock");
    address
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmwasm_std::coin;

    #[test]
    fn ledger_follows_snapshots() {
        let mut ledger = MockLedger::default();
        let mut ctx = test_context();
        let a = AccountAddress::from_canonical(&[1; 20]).unwrap();
        let b = AccountAddress::from_canonical(&[2; 20]).unwrap();
        ledger.fund(&a, &[coin(10, "cony")]);

        ledger.transaction_begin().unwrap();
        ledger.transfer(&mut ctx, &a, &b, &[coin(4, "cony")]).unwrap();
        assert_eq!(ledger.balance(&b, "cony"), coin(4, "cony"));
        ledger.transaction_rollback().unwrap();
        assert_eq!(ledger.balance(&b, "cony"), coin(0, "cony"));
        assert_eq!(ledger.all_balances(&a), vec![coin(10, "cony")]);

        let err = ledger.transfer(&mut ctx, &a, &b, &[coin(11, "cony")]);
        assert!(matches!(err, Err(Error::InsufficientFunds(_))));
        assert!(ledger.transaction_commit().is_err());
    }

    #[test]
    fn unknown_blobs_do_not_compile() {
        let engine = MockEngine::default();
        assert!(matches!(engine.create(b"garbage"), Err(VmError::CompileErr(_))));
        let checksum = engine.create(MOCK_WASM).unwrap();
        assert_eq!(engine.get_code(&checksum).unwrap(), MOCK_WASM);
        assert_eq!(engine.analyze_code(&checksum).unwrap(), AnalysisReport::default());
    }
}
