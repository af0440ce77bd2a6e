mod helpers;

use cosmwasm_std::{coin, to_binary, Binary};
use helpers::{account, attribute, events_of, setup};
use wasmplus_gateway::{
    ibc::{port_id_for_contract, port_path, CapabilityKeeper},
    ledger::Ledger,
    msgs::{HostMsg, MsgExecuteContract, MsgExecuteContractResponse},
    testing::{self, instantiate_mock, mock_creator, register_mock, unique_code, MockContract, MockError, Mocks},
    types::{AccessConfig, ContractCodeHistoryOperationType},
    Error,
};
use wasmplus_vm::{BackendError, Response, VmError};

#[test]
fn instantiate_execute_query() {
    setup();
    let mut keeper = testing::test_keeper();
    let mut ctx = testing::test_context();
    let contract = MockContract::default()
        .with_instantiate(|vm, msg| {
            vm.set(b"config", msg)?;
            Ok(Response::new().add_attribute("action", "init"))
        })
        .with_execute(|vm, msg| {
            vm.set(b"last", msg)?;
            Ok(Response::new()
                .add_attribute("action", "execute")
                .set_data(b"done".to_vec()))
        })
        .with_query(|vm, _| Ok(Binary::from(vm.get(b"last")?.unwrap_or_default())));
    let addr = instantiate_mock(&mut keeper, &mut ctx, contract);
    let creator = mock_creator();

    let data = keeper
        .execute(&mut ctx, &addr, &creator, br#"{"ping":{}}"#, &[])
        .unwrap();
    assert_eq!(data, Some(Binary::from(b"done".to_vec())));
    assert_eq!(
        keeper.query_smart(&mut ctx, &addr, b"{}").unwrap(),
        Binary::from(br#"{"ping":{}}"#.to_vec())
    );
    assert_eq!(
        keeper.query_raw(&mut ctx, &addr, b"config").unwrap(),
        Some(b"{}".to_vec())
    );
    assert_eq!(keeper.query_raw(&mut ctx, &addr, b"missing").unwrap(), None);
    assert_eq!(
        keeper.query_smart(&mut ctx, &addr, b"not json").unwrap_err(),
        Error::QueryFailed("query data must be json".into())
    );

    let wasm = events_of(&ctx, "wasm");
    assert_eq!(wasm.len(), 2);
    assert_eq!(wasm[1].attributes[0].key, "_contract_address");
    assert_eq!(attribute(wasm[1], "_contract_address"), Some(addr.to_string().as_str()));
    assert_eq!(attribute(wasm[1], "action"), Some("execute"));
    assert_eq!(events_of(&ctx, "execute").len(), 1);
}

#[test]
fn only_address_may_instantiate() {
    setup();
    let mut keeper = testing::test_keeper();
    let mut ctx = testing::test_context();
    let creator = mock_creator();
    let (code_id, checksum) = keeper
        .store_code(
            &mut ctx,
            &creator,
            &unique_code(),
            Some(AccessConfig::OnlyAddress(creator.clone())),
        )
        .unwrap();
    let store = events_of(&ctx, "store_code");
    assert_eq!(attribute(store[0], "code_checksum"), Some(checksum.to_hex().as_str()));
    assert_eq!(attribute(store[0], "code_id"), Some("1"));

    let err = keeper
        .instantiate(&mut ctx, code_id, &account(7), None, b"{}", "other", &[])
        .unwrap_err();
    assert_eq!(err, Error::Unauthorized("can not instantiate".into()));
    keeper
        .instantiate(&mut ctx, code_id, &creator, None, b"{}", "mine", &[])
        .unwrap();
}

#[test]
fn deposit_moves_to_contract() {
    setup();
    let mocks = Mocks::default();
    let mut keeper = mocks.keeper();
    let mut ctx = testing::test_context();
    let creator = mock_creator();
    mocks.ledger.fund(&creator, &[coin(100, "cony")]);

    let (_, contract, _) = keeper
        .store_code_and_instantiate(
            &mut ctx,
            &creator,
            &unique_code(),
            None,
            None,
            b"{}",
            "funded",
            &[coin(40, "cony")],
        )
        .unwrap();
    assert_eq!(mocks.ledger.balance(&contract, "cony"), coin(40, "cony"));
    assert_eq!(mocks.ledger.balance(&creator, "cony"), coin(60, "cony"));

    let err = keeper
        .execute(&mut ctx, &contract, &creator, b"{}", &[coin(61, "cony")])
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientFunds(_)));
}

#[test]
fn migrate_blocks_the_contract_while_running() {
    setup();
    let mut keeper = testing::test_keeper();
    let mut ctx = testing::test_context();
    let addr = instantiate_mock(&mut keeper, &mut ctx, MockContract::default());
    let creator = mock_creator();

    let code = unique_code();
    register_mock(
        &code,
        MockContract::default().with_migrate(|vm, _| {
            let me = vm.address().to_owned();
            match vm.validate_interface(&me, b"[]") {
                Err(MockError::Vm(VmError::BackendErr(BackendError::UserErr(msg)))) => {
                    Ok(Response::new().set_data(msg.into_bytes()))
                }
                other => Err(format!("unexpected {other:?}").into()),
            }
        }),
    );
    let (new_code_id, _) = keeper.store_code(&mut ctx, &creator, &code, None).unwrap();

    let err = keeper
        .migrate(&mut ctx, &addr, &account(9), new_code_id, b"{}")
        .unwrap_err();
    assert_eq!(err, Error::Unauthorized("can not migrate".into()));

    let data = keeper
        .migrate(&mut ctx, &addr, &creator, new_code_id, b"{}")
        .unwrap()
        .unwrap();
    let msg = String::from_utf8(data.to_vec()).unwrap();
    assert!(msg.starts_with("called contract cannot be executed"), "{msg}");
    assert!(!ctx.is_inactive(&addr));

    assert_eq!(keeper.contract_info(&addr).unwrap().code_id, new_code_id);
    let history = keeper.contract_history(&addr);
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].operation, ContractCodeHistoryOperationType::Migrate);
    assert_eq!(history[1].code_id, new_code_id);
}

#[test]
fn admin_can_be_handed_over_and_cleared() {
    setup();
    let mut keeper = testing::test_keeper();
    let mut ctx = testing::test_context();
    let addr = instantiate_mock(&mut keeper, &mut ctx, MockContract::default());
    let creator = mock_creator();

    keeper
        .update_contract_admin(&mut ctx, &addr, &creator, &account(5))
        .unwrap();
    assert_eq!(keeper.contract_info(&addr).unwrap().admin, Some(account(5)));
    let err = keeper.clear_contract_admin(&mut ctx, &addr, &creator).unwrap_err();
    assert_eq!(err, Error::Unauthorized("can not modify contract".into()));

    keeper.clear_contract_admin(&mut ctx, &addr, &account(5)).unwrap();
    assert_eq!(keeper.contract_info(&addr).unwrap().admin, None);
    let events = events_of(&ctx, "update_contract_admin");
    assert_eq!(attribute(events[0], "new_admin_address"), Some(account(5).to_string().as_str()));
    assert_eq!(attribute(events[1], "new_admin_address"), Some(""));
}

#[test]
fn pinned_code_is_cheaper_to_run() {
    setup();
    let mut keeper = testing::test_keeper();
    let mut ctx = testing::test_context();
    let addr = instantiate_mock(&mut keeper, &mut ctx, MockContract::default());
    let creator = mock_creator();
    let code_id = keeper.contract_info(&addr).unwrap().code_id;

    let before = ctx.gas_meter().consumed();
    keeper.execute(&mut ctx, &addr, &creator, b"{}", &[]).unwrap();
    let unpinned = ctx.gas_meter().consumed() - before;

    keeper.pin_code(&mut ctx, code_id).unwrap();
    assert!(keeper.is_pinned_code(code_id));
    let before = ctx.gas_meter().consumed();
    keeper.execute(&mut ctx, &addr, &creator, b"{}", &[]).unwrap();
    let pinned = ctx.gas_meter().consumed() - before;
    assert_eq!(unpinned - pinned, 40_000);

    keeper.unpin_code(&mut ctx, code_id).unwrap();
    assert!(!keeper.is_pinned_code(code_id));
    assert_eq!(events_of(&ctx, "pin_code").len(), 1);
    assert_eq!(events_of(&ctx, "unpin_code").len(), 1);
    assert!(matches!(keeper.pin_code(&mut ctx, 99), Err(Error::NotFound(_))));
}

#[test]
fn ibc_contracts_get_a_port() {
    setup();
    let mocks = Mocks::default();
    let mut keeper = mocks.keeper();
    let mut ctx = testing::test_context();
    let addr = instantiate_mock(
        &mut keeper,
        &mut ctx,
        MockContract::default().with_ibc_entry_points(),
    );
    let port_id = port_id_for_contract(&addr);
    assert_eq!(keeper.contract_info(&addr).unwrap().ibc_port_id, Some(port_id.clone()));
    assert!(mocks.capabilities.get_capability(&port_path(&port_id)).is_some());

    let (plain_code, _) = keeper
        .store_code(&mut ctx, &mock_creator(), &unique_code(), None)
        .unwrap();
    let err = keeper
        .migrate(&mut ctx, &addr, &mock_creator(), plain_code, b"{}")
        .unwrap_err();
    assert_eq!(err, Error::MigrationFailed("requires ibc callbacks".into()));
}

#[test]
fn failed_transaction_leaves_no_trace() {
    setup();
    let mut keeper = testing::test_keeper();
    let mut ctx = testing::test_context();
    let addr = instantiate_mock(
        &mut keeper,
        &mut ctx,
        MockContract::default().with_execute(|vm, _| {
            vm.set(b"written", b"1")?;
            Err("nope".into())
        }),
    );
    let events = ctx.events().len();

    let err = keeper
        .run_tx(&mut ctx, |keeper, ctx| {
            keeper.execute(ctx, &addr, &mock_creator(), b"{}", &[])
        })
        .unwrap_err();
    assert_eq!(err, Error::ExecuteFailed("nope".into()));
    assert_eq!(keeper.query_raw(&mut ctx, &addr, b"written").unwrap(), None);
    assert_eq!(ctx.events().len(), events);
}

#[test]
fn panics_burn_the_remaining_gas() {
    setup();
    let mut keeper = testing::test_keeper();
    let mut ctx = testing::test_context();
    let addr = instantiate_mock(
        &mut keeper,
        &mut ctx,
        MockContract::default().with_execute(|vm, _| {
            vm.set(b"written", b"1")?;
            panic!("contract host bug");
        }),
    );

    let err = keeper
        .run_tx(&mut ctx, |keeper, ctx| {
            keeper.execute(ctx, &addr, &mock_creator(), b"{}", &[])
        })
        .unwrap_err();
    assert_eq!(err, Error::Panic);
    assert!(ctx.gas_meter().is_out_of_gas());
    let mut fresh = testing::test_context();
    assert_eq!(keeper.query_raw(&mut fresh, &addr, b"written").unwrap(), None);
}

#[test]
fn delivered_messages_run_in_their_own_transaction() {
    setup();
    let mut keeper = testing::test_keeper();
    let mut ctx = testing::test_context();
    let addr = instantiate_mock(
        &mut keeper,
        &mut ctx,
        MockContract::default().with_execute(|vm, msg| {
            vm.set(b"last", msg)?;
            Ok(Response::new().set_data(b"ok".to_vec()))
        }),
    );
    let execute = |msg: &[u8]| -> HostMsg {
        MsgExecuteContract {
            sender: mock_creator().to_string(),
            contract: addr.to_string(),
            msg: Binary::from(msg.to_vec()),
            funds: vec![],
        }
        .into()
    };

    let response = keeper.deliver(&mut ctx, &execute(b"{}")).unwrap();
    let expected = to_binary(&MsgExecuteContractResponse {
        data: Some(Binary::from(b"ok".to_vec())),
    })
    .unwrap();
    assert_eq!(response.data, Some(expected));
    let message = events_of(&ctx, "message");
    assert_eq!(attribute(message[0], "module"), Some("wasm"));
    assert_eq!(attribute(message[0], "sender"), Some(mock_creator().to_string().as_str()));

    let events = ctx.events().len();
    let err = keeper.deliver(&mut ctx, &execute(b"not json")).unwrap_err();
    assert_eq!(err, Error::Invalid("msg json".into()));
    assert_eq!(ctx.events().len(), events);
    assert_eq!(keeper.query_raw(&mut ctx, &addr, b"last").unwrap(), Some(b"{}".to_vec()));
}
