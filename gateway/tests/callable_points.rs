mod helpers;

use cosmwasm_std::{attr, Binary};
use helpers::{account, attribute, events_of, setup};
use wasmplus_gateway::testing::{
    self, instantiate_mock, mock_creator, MockContract, MockError, MOCK_VM_GAS,
};
use wasmplus_vm::{BackendError, CallablePointOutput, Response, VmError};

fn output(data: &[u8], from: &str) -> CallablePointOutput {
    CallablePointOutput {
        data: Binary::from(data.to_vec()),
        events: vec![],
        attributes: vec![attr("from", from)],
    }
}

#[test]
fn nested_calls_emit_innermost_first() {
    setup();
    let mut keeper = testing::test_keeper();
    let mut ctx = testing::test_context();

    let c = instantiate_mock(
        &mut keeper,
        &mut ctx,
        MockContract::default().with_callable_point("c", false, |_, args| Ok(output(args, "c"))),
    );
    let c_addr = c.to_string();
    let b = instantiate_mock(
        &mut keeper,
        &mut ctx,
        MockContract::default().with_callable_point("b", false, move |vm, args| {
            let data = vm.call_callable_point(&c_addr, "c", args, false)?;
            Ok(output(&data, "b"))
        }),
    );
    let b_addr = b.to_string();
    let a = instantiate_mock(
        &mut keeper,
        &mut ctx,
        MockContract::default().with_execute(move |vm, _| {
            let data = vm.call_callable_point(&b_addr, "b", b"[42]", false)?;
            Ok(Response::new().set_data(data))
        }),
    );

    let data = keeper
        .execute(&mut ctx, &a, &mock_creator(), b"{}", &[])
        .unwrap();
    assert_eq!(data, Some(Binary::from(b"[42]".to_vec())));

    let events = events_of(&ctx, "wasm-callablepoint");
    assert_eq!(events.len(), 2);
    assert_eq!(attribute(events[0], "_contract_address"), Some(c.to_string().as_str()));
    assert_eq!(attribute(events[0], "from"), Some("c"));
    let stack_ab = serde_json::to_string(&[a.to_string(), b.to_string()]).unwrap();
    assert_eq!(attribute(events[0], "_callstack"), Some(stack_ab.as_str()));

    assert_eq!(attribute(events[1], "_contract_address"), Some(b.to_string().as_str()));
    let stack_a = serde_json::to_string(&[a.to_string()]).unwrap();
    assert_eq!(attribute(events[1], "_callstack"), Some(stack_a.as_str()));
}

#[test]
fn calling_back_into_the_stack_is_rejected() {
    setup();
    let mut keeper = testing::test_keeper();
    let mut ctx = testing::test_context();

    let a = instantiate_mock(&mut keeper, &mut ctx, MockContract::default());
    let a_addr = a.to_string();
    let b = instantiate_mock(
        &mut keeper,
        &mut ctx,
        MockContract::default().with_callable_point("b", false, move |vm, _| {
            match vm.call_callable_point(&a_addr, "a", b"[]", false) {
                Err(MockError::Vm(VmError::BackendErr(BackendError::UserErr(msg)))) => {
                    Ok(output(msg.as_bytes(), "b"))
                }
                other => Err(format!("unexpected {other:?}").into()),
            }
        }),
    );
    let b_addr = b.to_string();

    let code = testing::unique_code();
    testing::register_mock(
        &code,
        MockContract::default()
            .with_callable_point("a", false, |_, _| Ok(CallablePointOutput::default()))
            .with_execute(move |vm, _| {
                let data = vm.call_callable_point(&b_addr, "b", b"[]", false)?;
                Ok(Response::new().set_data(data))
            }),
    );
    let creator = mock_creator();
    let (code_id, _) = keeper.store_code(&mut ctx, &creator, &code, None).unwrap();
    keeper.migrate(&mut ctx, &a, &creator, code_id, b"{}").unwrap();

    let data = keeper
        .execute(&mut ctx, &a, &creator, b"{}", &[])
        .unwrap()
        .unwrap();
    let msg = String::from_utf8(data.to_vec()).unwrap();
    assert_eq!(
        msg,
        format!("a contract can only be called once per one call stack: {a}")
    );
}

#[test]
fn read_only_calls_cannot_write() {
    setup();
    let mut keeper = testing::test_keeper();
    let mut ctx = testing::test_context();

    let counter = instantiate_mock(
        &mut keeper,
        &mut ctx,
        MockContract::default()
            .with_callable_point("get", true, |vm, _| {
                let value = vm.get(b"count")?.unwrap_or_default();
                Ok(CallablePointOutput {
                    data: Binary::from(value),
                    ..Default::default()
                })
            })
            .with_callable_point("sneaky", true, |vm, _| {
                vm.set(b"count", b"1")?;
                Ok(CallablePointOutput::default())
            }),
    );
    let counter_addr = counter.to_string();
    let caller = instantiate_mock(
        &mut keeper,
        &mut ctx,
        MockContract::default().with_execute(move |vm, msg| {
            let name = std::str::from_utf8(msg).map_err(|e| e.to_string())?;
            match vm.call_callable_point(&counter_addr, name, b"[]", true) {
                Ok(data) => Ok(Response::new().set_data(data)),
                Err(e) => Err(format!("{e:?}").into()),
            }
        }),
    );

    keeper
        .execute(&mut ctx, &caller, &mock_creator(), b"get", &[])
        .unwrap();
    let err = keeper
        .execute(&mut ctx, &caller, &mock_creator(), b"sneaky", &[])
        .unwrap_err();
    assert!(err.to_string().contains("ReadOnly"), "{err}");
    assert_eq!(keeper.query_raw(&mut ctx, &counter, b"count").unwrap(), None);
    // read only calls leave no events behind
    assert!(events_of(&ctx, "wasm-callablepoint").is_empty());
}

#[test]
fn pinning_only_changes_the_setup_cost() {
    setup();
    let mut keeper = testing::test_keeper();
    let mut ctx = testing::test_context();
    let target = instantiate_mock(
        &mut keeper,
        &mut ctx,
        MockContract::default().with_callable_point("get", true, |_, _| Ok(CallablePointOutput::default())),
    );
    let code_id = keeper.contract_info(&target).unwrap().code_id;
    let stack = serde_json::to_vec(&[account(9).to_string()]).unwrap();
    let args = b"[]";

    let register = keeper.gas_register();
    let cost = |pinned| {
        register.to_vm_gas(register.instantiate_contract_costs(pinned, args.len())) + MOCK_VM_GAS
    };
    let (unpinned_cost, pinned_cost) = (cost(false), cost(true));

    let (result, unpinned) = keeper.call_callable_point(
        &mut ctx,
        &target.to_string(),
        b"\"get\"",
        args,
        true,
        &stack,
        10_000_000,
    );
    result.unwrap();
    assert_eq!(unpinned, unpinned_cost);

    keeper.pin_code(&mut ctx, code_id).unwrap();
    let (result, pinned) = keeper.call_callable_point(
        &mut ctx,
        &target.to_string(),
        b"\"get\"",
        args,
        true,
        &stack,
        10_000_000,
    );
    result.unwrap();
    assert_eq!(pinned, pinned_cost);
    assert_eq!(unpinned - pinned, 4_000_000);
}
