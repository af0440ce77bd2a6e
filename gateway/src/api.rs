//! Host functions the VM calls back into while a contract runs.
//!
//! Every function returns the VM gas it charged next to its outcome, failures
//! included, so the caller's meter never drifts.

use crate::{
    address::AccountAddress,
    context::Context,
    env::{new_env, to_backend_error, ContractBackend},
    error::Error,
    events::{new_callable_point_event, new_custom_callable_point_events},
    keeper::Keeper,
};
use cosmwasm_std::Binary;
use wasmplus_vm::{BackendApi, BackendResult, CallablePointOutput, Checksum, GasInfo, Invocation, VmError};

/// Everything needed to enter a callable point, resolved before any code runs.
struct CallablePointCall {
    target: AccountAddress,
    checksum: Checksum,
    callstack: Vec<u8>,
    setup_cost: u64,
}

impl Keeper {
    pub fn human_address(&self, canonical: &[u8]) -> (Result<String, Error>, u64) {
        let gas = self.gas_register.humanize_cost();
        let human = AccountAddress::from_canonical(canonical).map(|a| a.to_string());
        (human, gas)
    }

    pub fn canonical_address(&self, human: &str) -> (Result<Vec<u8>, Error>, u64) {
        let gas = self.gas_register.canonicalize_cost();
        let canonical = AccountAddress::from_bech32(human).map(|a| a.as_bytes().to_vec());
        (canonical, gas)
    }

    /// Target of a host call: resolved and not blocked.
    fn active_contract(
        &self,
        ctx: &Context,
        contract_addr: &str,
    ) -> Result<(AccountAddress, Checksum, bool), Error> {
        let target = AccountAddress::from_bech32(contract_addr)?;
        let (contract_info, code_info) = self.directory.resolve(&target)?;
        if ctx.is_inactive(&target) {
            return Err(Error::ExecutionBlocked(target.to_string()));
        }
        let pinned = self.directory.is_pinned(contract_info.code_id);
        Ok((target, code_info.code_hash, pinned))
    }

    #[allow(clippy::too_many_arguments)]
    fn prepare_callable_point(
        &self,
        ctx: &Context,
        contract_addr: &str,
        name: &[u8],
        args: &[u8],
        is_readonly: bool,
        callstack: &[u8],
        gas_limit: u64,
    ) -> Result<CallablePointCall, Error> {
        let (target, checksum, pinned) = self.active_contract(ctx, contract_addr)?;

        let mut stack: Vec<AccountAddress> = if callstack.is_empty() {
            Vec::new()
        } else {
            serde_json::from_slice(callstack)
                .map_err(|e| Error::Invalid(format!("callstack: {e}")))?
        };
        if stack.contains(&target) {
            return Err(Error::Reentrancy(target.to_string()));
        }

        let entry: String = serde_json::from_slice(name)
            .map_err(|e| Error::Invalid(format!("callable point name: {e}")))?;
        let report = self
            .engine
            .analyze_code(&checksum)
            .map_err(|e| Error::CallablePointFailed(e.to_string()))?;
        let properties = report
            .callable_points
            .get(&entry)
            .ok_or_else(|| Error::CallablePointNotFound(entry.clone()))?;
        if is_readonly && !properties.read_only {
            return Err(Error::ReadOnlyViolation(entry));
        }

        let setup_cost = self
            .gas_register
            .to_vm_gas(self.gas_register.instantiate_contract_costs(pinned, args.len()));
        if gas_limit < setup_cost {
            return Err(Error::InsufficientGas {
                limit: gas_limit,
                required: setup_cost,
            });
        }

        stack.push(target.clone());
        let callstack = serde_json::to_vec(&stack)
            .map_err(|e| Error::Invalid(format!("callstack: {e}")))?;
        Ok(CallablePointCall {
            target,
            checksum,
            callstack,
            setup_cost,
        })
    }

    /// Run the callable point `name` of `contract_addr`. The setup cost is
    /// taken from `gas_limit` before the callee starts and is part of the
    /// returned gas.
    #[allow(clippy::too_many_arguments)]
    pub fn call_callable_point(
        &mut self,
        ctx: &mut Context,
        contract_addr: &str,
        name: &[u8],
        args: &[u8],
        is_readonly: bool,
        callstack: &[u8],
        gas_limit: u64,
    ) -> (Result<Binary, Error>, u64) {
        let call = match self.prepare_callable_point(
            ctx,
            contract_addr,
            name,
            args,
            is_readonly,
            callstack,
            gas_limit,
        ) {
            Ok(call) => call,
            Err(e) => return (Err(e), 0),
        };
        log::debug!("callable point {} of {}", String::from_utf8_lossy(name), call.target);

        let env = new_env(ctx, &call.target);
        let invocation = Invocation {
            checksum: &call.checksum,
            env: &env,
            gas_limit: gas_limit - call.setup_cost,
            deserialization_cost: self.gas_register.json_deserialization_cost(),
        };
        let engine = self.engine.clone();
        let (output, vm_gas) = {
            let mut backend = ContractBackend::new(self, ctx, call.target.clone(), is_readonly);
            engine.call_callable_point(
                invocation,
                name,
                is_readonly,
                &call.callstack,
                args,
                &mut backend,
            )
        };
        let gas = vm_gas.saturating_add(call.setup_cost);
        let output = match output {
            Ok(output) => output,
            Err(VmError::OutOfGas) => {
                return (Err(Error::OutOfGas("callable point".into())), gas);
            }
            Err(e) => return (Err(Error::CallablePointFailed(e.to_string())), gas),
        };

        if !is_readonly {
            // events are tagged with the stack the callee was entered from
            if let Err(e) = emit_callable_point_events(ctx, &call.target, callstack, &output) {
                return (Err(e), gas);
            }
        }
        (Ok(output.data), gas)
    }

    /// `null` when `contract_addr` implements `expected_interface`, otherwise
    /// the report of what is missing. No code runs.
    pub fn validate_interface(
        &self,
        ctx: &Context,
        contract_addr: &str,
        expected_interface: &[u8],
    ) -> (Result<Binary, Error>, u64) {
        let result = self
            .active_contract(ctx, contract_addr)
            .and_then(|(_, checksum, _)| {
                self.engine
                    .validate_dynamic_link_interface(&checksum, expected_interface)
                    .map_err(|e| Error::Invalid(e.to_string()))
            })
            .map(|report| report.unwrap_or_else(|| Binary::from(b"null".to_vec())));
        (result, 0)
    }
}

fn emit_callable_point_events(
    ctx: &mut Context,
    contract: &AccountAddress,
    callstack: &[u8],
    output: &CallablePointOutput,
) -> Result<(), Error> {
    if !output.attributes.is_empty() {
        let event = new_callable_point_event(&output.attributes, contract, callstack)?;
        ctx.emit_event(event);
    }
    if !output.events.is_empty() {
        let events = new_custom_callable_point_events(&output.events, contract, callstack)?;
        ctx.emit_events(events);
    }
    Ok(())
}

impl BackendApi for ContractBackend<'_> {
    fn addr_canonicalize(&self, human: &str) -> BackendResult<Vec<u8>> {
        let (result, gas) = self.keeper.canonical_address(human);
        (result.map_err(to_backend_error), GasInfo::with_cost(gas))
    }

    fn addr_humanize(&self, canonical: &[u8]) -> BackendResult<String> {
        let (result, gas) = self.keeper.human_address(canonical);
        (result.map_err(to_backend_error), GasInfo::with_cost(gas))
    }

    fn call_callable_point(
        &mut self,
        contract_addr: &str,
        name: &[u8],
        args: &[u8],
        is_readonly: bool,
        callstack: &[u8],
        gas_limit: u64,
    ) -> BackendResult<Binary> {
        if self.read_only && !is_readonly {
            let err = Error::ReadOnlyViolation(String::from_utf8_lossy(name).into_owned());
            return (Err(to_backend_error(err)), GasInfo::free());
        }
        let (result, gas) = self.keeper.call_callable_point(
            self.ctx,
            contract_addr,
            name,
            args,
            is_readonly,
            callstack,
            gas_limit,
        );
        (result.map_err(to_backend_error), GasInfo::with_cost(gas))
    }

    fn validate_interface(
        &mut self,
        contract_addr: &str,
        expected_interface: &[u8],
    ) -> BackendResult<Binary> {
        let (result, gas) = self
            .keeper
            .validate_interface(self.ctx, contract_addr, expected_interface);
        (result.map_err(to_backend_error), GasInfo::with_cost(gas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, MockContract};
    use cosmwasm_std::{attr, Event};

    fn callstack(addrs: &[&AccountAddress]) -> Vec<u8> {
        serde_json::to_vec(addrs).unwrap()
    }

    #[test]
    fn address_conversion_charges_fixed_cost() {
        let keeper = testing::test_keeper();
        let addr = AccountAddress::from_canonical(&[3; 20]).unwrap();
        let (canonical, gas) = keeper.canonical_address(&addr.to_string());
        assert_eq!(canonical.unwrap(), vec![3; 20]);
        assert_eq!(gas, 400);
        let (human, gas) = keeper.human_address(&[3; 20]);
        assert_eq!(human.unwrap(), addr.to_string());
        assert_eq!(gas, 500);

        let (bad, gas) = keeper.canonical_address("link1invalid");
        assert!(matches!(bad, Err(Error::InvalidAddress(_))));
        assert_eq!(gas, 400);
        let (bad, gas) = keeper.human_address(&[1, 2, 3]);
        assert!(bad.is_err());
        assert_eq!(gas, 500);
    }

    #[test]
    fn callable_point_emits_tagged_events() {
        let mut keeper = testing::test_keeper();
        let mut ctx = testing::test_context();
        let contract = MockContract::default().with_callable_point("add", false, |_, args| {
            Ok(CallablePointOutput {
                data: Binary::from(args.to_vec()),
                events: vec![Event::new("calc").add_attribute("op", "add")],
                attributes: vec![attr("result", "3")],
            })
        });
        let target = testing::instantiate_mock(&mut keeper, &mut ctx, contract);
        let caller = AccountAddress::from_canonical(&[9; 32]).unwrap();
        let stack = callstack(&[&caller]);

        let (result, gas) = keeper.call_callable_point(
            &mut ctx,
            &target.to_string(),
            b"\"add\"",
            b"[1,2]",
            false,
            &stack,
            10_000_000,
        );
        assert_eq!(result.unwrap(), Binary::from(b"[1,2]".to_vec()));
        assert_eq!(gas, 4_000_000 + testing::MOCK_VM_GAS);

        let events = ctx.events();
        let n = events.len();
        assert_eq!(events[n - 2].ty, "wasm-callablepoint");
        assert_eq!(events[n - 2].attributes[0].key, "_contract_address");
        assert_eq!(events[n - 2].attributes[1].key, "_callstack");
        assert_eq!(events[n - 2].attributes[1].value, String::from_utf8(stack).unwrap());
        assert_eq!(events[n - 1].ty, "wasm-callablepoint-calc");
    }

    #[test]
    fn callable_point_preconditions() {
        let mut keeper = testing::test_keeper();
        let mut ctx = testing::test_context();
        let contract = MockContract::default()
            .with_callable_point("get", true, |_, _| Ok(Default::default()))
            .with_callable_point("set", false, |_, _| Ok(Default::default()));
        let target = testing::instantiate_mock(&mut keeper, &mut ctx, contract);
        let addr = target.to_string();
        let mut call = |ctx: &mut Context, name: &[u8], readonly: bool, stack: &[u8], limit: u64| {
            keeper
                .call_callable_point(ctx, &addr, name, b"[]", readonly, stack, limit)
                .0
        };

        let unknown = AccountAddress::from_canonical(&[8; 32]).unwrap().to_string();
        let (err, gas) = testing::test_keeper().call_callable_point(
            &mut ctx, &unknown, b"\"get\"", b"[]", true, b"", 10_000_000,
        );
        assert!(matches!(err, Err(Error::NotFound(_))));
        assert_eq!(gas, 0);

        assert!(matches!(call(&mut ctx, b"\"nope\"", true, b"", 10_000_000), Err(Error::CallablePointNotFound(_))));
        assert!(matches!(call(&mut ctx, b"\"set\"", true, b"", 10_000_000), Err(Error::ReadOnlyViolation(_))));
        assert!(matches!(call(&mut ctx, b"\"get\"", true, b"", 10), Err(Error::InsufficientGas { .. })));
        let stack = callstack(&[&target]);
        assert!(matches!(call(&mut ctx, b"\"get\"", true, &stack, 10), Err(Error::Reentrancy(_))));

        ctx.mark_inactive(target.clone());
        assert!(matches!(call(&mut ctx, b"\"get\"", true, b"", 10_000_000), Err(Error::ExecutionBlocked(_))));
        ctx.clear_inactive(&target);
        assert!(call(&mut ctx, b"\"get\"", true, b"", 10_000_000).is_ok());
    }

    #[test]
    fn validate_interface_reports_null_or_missing() {
        let mut keeper = testing::test_keeper();
        let mut ctx = testing::test_context();
        let contract = MockContract::default().with_callable_point("get", true, |_, _| Ok(Default::default()));
        let target = testing::instantiate_mock(&mut keeper, &mut ctx, contract);

        let ok = serde_json::to_vec(&serde_json::json!([{"name": "get", "read_only": true}])).unwrap();
        let (report, gas) = keeper.validate_interface(&ctx, &target.to_string(), &ok);
        assert_eq!(report.unwrap(), Binary::from(b"null".to_vec()));
        assert_eq!(gas, 0);

        let missing = serde_json::to_vec(&serde_json::json!([{"name": "put", "read_only": false}])).unwrap();
        let (report, _) = keeper.validate_interface(&ctx, &target.to_string(), &missing);
        assert_ne!(report.unwrap(), Binary::from(b"null".to_vec()));

        ctx.mark_inactive(target.clone());
        let (report, _) = keeper.validate_interface(&ctx, &target.to_string(), &ok);
        assert!(matches!(report, Err(Error::ExecutionBlocked(_))));
    }
}
