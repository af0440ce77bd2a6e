//! Queries issued by contracts, and the smart and raw contract queries.

use crate::{
    address::AccountAddress,
    context::{Context, EventManager},
    env::ContractBackend,
    error::Error,
    gas_meter::GasMeter,
    keeper::Keeper,
    ledger::Ledger,
};
use cosmwasm_std::{to_binary, Binary, ContractResult, SystemError, SystemResult};
use std::{
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};
use wasmplus_vm::{
    AllBalanceResponse, BackendError, BackendResult, BalanceResponse, BankQuery, Checksum,
    ContractInfoResponse, GasInfo, Querier, QueryRequest, StakingQuery, WasmQuery,
};

pub type BankQuerier = Rc<dyn Fn(&dyn Ledger, &BankQuery) -> Result<Binary, Error>>;
pub type CustomQuerier = Rc<dyn Fn(&Context, &serde_json::Value) -> Result<Binary, Error>>;
pub type StakingQuerier = Rc<dyn Fn(&Context, &StakingQuery) -> Result<Binary, Error>>;
pub type StargateQuerier = Rc<dyn Fn(&Context, &str, &Binary) -> Result<Binary, Error>>;

/// Serves the non wasm query kinds. Wasm queries are always answered by the
/// keeper itself.
#[derive(Clone)]
pub struct QueryPlugins {
    pub bank: BankQuerier,
    pub custom: CustomQuerier,
    pub staking: StakingQuerier,
    pub stargate: StargateQuerier,
}

/// Replacements for individual plugins; `None` keeps the default.
#[derive(Clone, Default)]
pub struct QueryPluginOverrides {
    pub bank: Option<BankQuerier>,
    pub custom: Option<CustomQuerier>,
    pub staking: Option<StakingQuerier>,
    pub stargate: Option<StargateQuerier>,
}

impl Default for QueryPlugins {
    fn default() -> Self {
        QueryPlugins {
            bank: Rc::new(bank_querier),
            custom: Rc::new(|_: &Context, _: &serde_json::Value| {
                Err(Error::UnsupportedRequest("custom".into()))
            }),
            staking: Rc::new(|_: &Context, _: &StakingQuery| {
                Err(Error::UnsupportedRequest("staking".into()))
            }),
            stargate: Rc::new(|_: &Context, _: &str, _: &Binary| {
                Err(Error::UnsupportedRequest("Stargate queries are disabled".into()))
            }),
        }
    }
}

impl QueryPlugins {
    #[must_use]
    pub fn merge(self, overrides: QueryPluginOverrides) -> Self {
        QueryPlugins {
            bank: overrides.bank.unwrap_or(self.bank),
            custom: overrides.custom.unwrap_or(self.custom),
            staking: overrides.staking.unwrap_or(self.staking),
            stargate: overrides.stargate.unwrap_or(self.stargate),
        }
    }
}

fn bank_querier(ledger: &dyn Ledger, query: &BankQuery) -> Result<Binary, Error> {
    let response = match query {
        BankQuery::Balance { address, denom } => {
            let address = AccountAddress::from_bech32(address)?;
            to_binary(&BalanceResponse {
                amount: ledger.balance(&address, denom),
            })
        }
        BankQuery::AllBalances { address } => {
            let address = AccountAddress::from_bech32(address)?;
            to_binary(&AllBalanceResponse {
                amount: ledger.all_balances(&address),
            })
        }
    };
    response.map_err(|e| Error::Invalid(e.to_string()))
}

impl Keeper {
    /// Answer `request` from `caller` within `gas_limit` VM gas. The query runs
    /// on its own meter and event log; what it consumed is charged to the
    /// context meter afterwards. Returns the host gas charged.
    pub fn handle_query(
        &mut self,
        ctx: &mut Context,
        caller: &AccountAddress,
        request: &QueryRequest,
        gas_limit: u64,
    ) -> (Result<Binary, Error>, u64) {
        let sub_limit = self.gas_register.from_vm_gas(gas_limit);
        let parent_meter = ctx.replace_gas_meter(GasMeter::new(sub_limit));
        let parent_events = ctx.replace_event_manager(EventManager::new());

        let result = self.dispatch_query(ctx, caller, request);

        ctx.replace_event_manager(parent_events);
        let sub_meter = ctx.replace_gas_meter(parent_meter);
        let used = sub_meter.consumed_to_limit();
        if let Err(e) = ctx.gas_meter_mut().consume_gas(used, "contract sub-query") {
            return (Err(e), used);
        }
        log::debug!("query from {caller} used {used} gas");
        (result, used)
    }

    fn dispatch_query(
        &mut self,
        ctx: &mut Context,
        caller: &AccountAddress,
        request: &QueryRequest,
    ) -> Result<Binary, Error> {
        let plugins = self.query_plugins.clone();
        match request {
            QueryRequest::Bank(query) => (plugins.bank)(self.ledger.as_ref(), query),
            QueryRequest::Custom(query) => (plugins.custom)(ctx, query),
            QueryRequest::Staking(query) => (plugins.staking)(ctx, query),
            QueryRequest::Stargate { path, data } => (plugins.stargate)(ctx, path, data),
            QueryRequest::Wasm(query) => self.handle_wasm_query(ctx, caller, query),
        }
    }

    fn handle_wasm_query(
        &mut self,
        ctx: &mut Context,
        caller: &AccountAddress,
        query: &WasmQuery,
    ) -> Result<Binary, Error> {
        let no_such_contract = |contract_addr: &str| {
            let contract_addr = contract_addr.to_owned();
            move |e: Error| match e.root() {
                Error::NotFound(_) => Error::NoSuchContract(contract_addr),
                _ => e,
            }
        };
        match query {
            WasmQuery::Smart { contract_addr, msg } => {
                let contract = AccountAddress::from_bech32(contract_addr)?;
                log::debug!("smart query from {caller} to {contract}");
                self.query_smart(ctx, &contract, msg)
                    .map_err(no_such_contract(contract_addr.as_str()))
            }
            WasmQuery::Raw { contract_addr, key } => {
                let contract = AccountAddress::from_bech32(contract_addr)?;
                self.query_raw(ctx, &contract, key)
                    .map(|value| value.map(Binary::from).unwrap_or_default())
                    .map_err(no_such_contract(contract_addr.as_str()))
            }
            WasmQuery::ContractInfo { contract_addr } => {
                let contract = AccountAddress::from_bech32(contract_addr)?;
                let info = self
                    .directory
                    .contract_info(&contract)
                    .ok_or_else(|| Error::NoSuchContract(contract_addr.clone()))?;
                to_binary(&ContractInfoResponse {
                    code_id: info.code_id,
                    creator: info.creator.to_string(),
                    admin: info.admin.as_ref().map(ToString::to_string),
                    pinned: self.directory.is_pinned(info.code_id),
                    ibc_port: info.ibc_port_id.clone(),
                })
                .map_err(|e| Error::Invalid(e.to_string()))
            }
        }
    }

    /// Run the `query` entry point of `contract`. The call is bounded by the
    /// smart query gas ceiling on top of the context meter. A panicking VM
    /// is reported as [`Error::Panic`].
    pub fn query_smart(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        msg: &[u8],
    ) -> Result<Binary, Error> {
        if serde_json::from_slice::<serde_json::Value>(msg).is_err() {
            return Err(Error::QueryFailed("query data must be json".into()));
        }
        let (contract_info, code_info) = self.directory.resolve(contract)?;
        let pinned = self.directory.is_pinned(contract_info.code_id);

        let limit = self
            .config
            .smart_query_gas_limit
            .min(ctx.gas_meter().remaining());
        let parent_meter = ctx.replace_gas_meter(GasMeter::new(limit));
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_query(ctx, contract, &code_info.code_hash, pinned, msg)
        }));
        let sub_meter = ctx.replace_gas_meter(parent_meter);
        ctx.gas_meter_mut()
            .consume_gas(sub_meter.consumed_to_limit(), "smart query")?;
        result.unwrap_or_else(|_| {
            log::error!("Recovered from panic in smart query of {contract}");
            Err(Error::Panic)
        })
    }

    fn run_query(
        &mut self,
        ctx: &mut Context,
        contract: &AccountAddress,
        checksum: &Checksum,
        pinned: bool,
        msg: &[u8],
    ) -> Result<Binary, Error> {
        let setup_cost = self.gas_register.instantiate_contract_costs(pinned, msg.len());
        ctx.gas_meter_mut()
            .consume_gas(setup_cost, "Loading CosmWasm module: query")?;

        self.call_engine(
            ctx,
            contract,
            checksum,
            true,
            Error::QueryFailed,
            |engine, call, backend| engine.query(call, msg, backend),
        )
    }

    /// Value under `key` in the storage of `contract`. A missing key is
    /// `None`, an unknown contract is an error. No code runs.
    pub fn query_raw(
        &self,
        ctx: &mut Context,
        contract: &AccountAddress,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, Error> {
        if !self.directory.has_contract(contract) {
            return Err(Error::NotFound(format!("contract {contract}")));
        }
        let value = self.directory.contract_store_ref(contract).get(key);
        ctx.gas_meter_mut()
            .consume_gas(self.kv_gas.read_costs(key, value.as_deref()), "ReadFlat")?;
        Ok(value)
    }
}

impl Querier for ContractBackend<'_> {
    fn query_raw(
        &mut self,
        request: &[u8],
        gas_limit: u64,
    ) -> BackendResult<SystemResult<ContractResult<Binary>>> {
        let parsed: QueryRequest = match serde_json::from_slice(request) {
            Ok(parsed) => parsed,
            Err(e) => {
                let err = SystemError::InvalidRequest {
                    error: e.to_string(),
                    request: Binary::from(request),
                };
                return (Ok(SystemResult::Err(err)), GasInfo::free());
            }
        };
        let (result, used) = self
            .keeper
            .handle_query(self.ctx, &self.contract, &parsed, gas_limit);
        let gas = GasInfo::with_externally_used(self.keeper.gas_register.to_vm_gas(used));
        let result = match result {
            Ok(data) => SystemResult::Ok(ContractResult::Ok(data)),
            Err(e) if e.is_out_of_gas() => return (Err(BackendError::OutOfGas), gas),
            Err(e) => match e.root() {
                Error::NoSuchContract(addr) => SystemResult::Err(SystemError::NoSuchContract {
                    addr: addr.clone(),
                }),
                Error::UnsupportedRequest(kind) => {
                    SystemResult::Err(SystemError::UnsupportedRequest { kind: kind.clone() })
                }
                _ => {
                    log::info!("Redacting query error: {e}");
                    SystemResult::Ok(ContractResult::Err(e.redact()))
                }
            },
        };
        (Ok(result), gas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MockContract, Mocks};
    use cosmwasm_std::coin;

    #[test]
    fn smart_query_rejects_non_json_before_vm() {
        let mocks = Mocks::default();
        let mut keeper = mocks.keeper();
        let mut ctx = testing::test_context();
        let target = testing::instantiate_mock(&mut keeper, &mut ctx, MockContract::default());
        let calls = mocks.engine.calls();
        let err = keeper
            .query_smart(&mut ctx, &target, b"not a json string")
            .unwrap_err();
        assert!(matches!(err, Error::QueryFailed(_)));
        assert_eq!(mocks.engine.calls(), calls);
    }

    #[test]
    fn panicking_query_fails_and_restores_the_meter() {
        let mut keeper = testing::test_keeper();
        let mut ctx = testing::test_context();
        let target = testing::instantiate_mock(
            &mut keeper,
            &mut ctx,
            MockContract::default().with_query(|_, _| panic!("contract trap")),
        );
        let limit = ctx.gas_meter().limit();
        let before = ctx.gas_meter().consumed();

        let err = keeper.query_smart(&mut ctx, &target, b"{}").unwrap_err();
        assert_eq!(err, Error::Panic);
        assert_eq!(ctx.gas_meter().limit(), limit);
        // the setup cost was spent before the contract ran
        assert!(ctx.gas_meter().consumed() - before >= 40_000);
        assert!(!ctx.gas_meter().is_out_of_gas());
    }

    #[test]
    fn raw_query_distinguishes_missing_key_and_contract() {
        let mut keeper = testing::test_keeper();
        let mut ctx = testing::test_context();
        let target = testing::instantiate_mock(&mut keeper, &mut ctx, MockContract::default());
        keeper
            .directory
            .contract_store(&target)
            .set(b"config", b"{}");

        assert_eq!(
            keeper.query_raw(&mut ctx, &target, b"config").unwrap(),
            Some(b"{}".to_vec())
        );
        assert_eq!(keeper.query_raw(&mut ctx, &target, b"missing").unwrap(), None);
        let unknown = AccountAddress::from_canonical(&[8; 32]).unwrap();
        assert!(matches!(
            keeper.query_raw(&mut ctx, &unknown, b"config"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn contract_queries_map_system_errors() {
        let mut keeper = testing::test_keeper();
        let mut ctx = testing::test_context();
        let caller = testing::instantiate_mock(&mut keeper, &mut ctx, MockContract::default());
        let unknown = AccountAddress::from_canonical(&[8; 32]).unwrap().to_string();
        let mut backend = ContractBackend::new(&mut keeper, &mut ctx, caller, false);

        let (res, _) = backend.query(
            &QueryRequest::Wasm(WasmQuery::ContractInfo {
                contract_addr: unknown.clone(),
            }),
            1_000_000_000,
        );
        assert_eq!(
            res.unwrap(),
            SystemResult::Err(SystemError::NoSuchContract { addr: unknown })
        );

        let (res, _) = backend.query(
            &QueryRequest::Stargate {
                path: "/cosmos.bank.v1beta1.Query/Balance".into(),
                data: Binary::default(),
            },
            1_000_000_000,
        );
        assert!(matches!(
            res.unwrap(),
            SystemResult::Err(SystemError::UnsupportedRequest { .. })
        ));

        let (res, gas) = backend.query_raw(b"{not json", 1_000_000_000);
        assert!(matches!(res.unwrap(), SystemResult::Err(SystemError::InvalidRequest { .. })));
        assert_eq!(gas, GasInfo::free());
    }

    #[test]
    fn bank_queries_read_the_ledger() {
        let mocks = Mocks::default();
        let mut keeper = mocks.keeper();
        let mut ctx = testing::test_context();
        let caller = testing::instantiate_mock(&mut keeper, &mut ctx, MockContract::default());
        let holder = AccountAddress::from_canonical(&[5; 20]).unwrap();
        mocks.ledger.fund(&holder, &[coin(7, "cony")]);

        let request = QueryRequest::Bank(BankQuery::Balance {
            address: holder.to_string(),
            denom: "cony".into(),
        });
        let (res, used) = keeper.handle_query(&mut ctx, &caller, &request, 1_000_000_000);
        let res: BalanceResponse = cosmwasm_std::from_binary(&res.unwrap()).unwrap();
        assert_eq!(res.amount, coin(7, "cony"));
        assert_eq!(used, 0);
    }

    #[test]
    fn sub_query_cannot_exceed_its_limit() {
        let mut keeper = testing::test_keeper();
        let mut ctx = testing::test_context();
        let target = testing::instantiate_mock(&mut keeper, &mut ctx, MockContract::default());
        let before = ctx.gas_meter().consumed();
        let request = QueryRequest::Wasm(WasmQuery::Smart {
            contract_addr: target.to_string(),
            msg: Binary::from(b"{}".to_vec()),
        });
        // below the setup cost of an unpinned contract
        let (res, used) = keeper.handle_query(&mut ctx, &target, &request, 100 * 100);
        assert!(res.unwrap_err().is_out_of_gas());
        assert_eq!(used, 100);
        assert_eq!(ctx.gas_meter().consumed(), before + 100);
    }
}
