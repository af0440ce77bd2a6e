mod helpers;

use std::collections::BTreeMap;

use helpers::setup;
use proptest::prelude::*;
use wasmplus_gateway::{
    address::AccountAddress,
    store::KvGasConfig,
    testing::{self, instantiate_mock, mock_creator, MockContract},
    Error,
};
use wasmplus_vm::Response;

const SET: u8 = 0;
const GET: u8 = 1;
const REMOVE: u8 = 2;

type Op = (u8, Vec<u8>, Vec<u8>);

fn op() -> impl Strategy<Value = Op> {
    (
        prop_oneof![Just(SET), Just(GET), Just(REMOVE)],
        prop::collection::vec(any::<u8>(), 1..4),
        prop::collection::vec(any::<u8>(), 0..16),
    )
}

/// Runs the storage operations it is sent, in order.
fn storage_contract() -> MockContract {
    MockContract::default().with_execute(|vm, msg| {
        let ops: Vec<Op> = serde_json::from_slice(msg).map_err(|e| e.to_string())?;
        for (kind, key, value) in ops {
            match kind {
                SET => vm.set(&key, &value)?,
                GET => {
                    vm.get(&key)?;
                }
                _ => vm.remove(&key)?,
            }
        }
        Ok(Response::new())
    })
}

fn expected_storage_gas(ops: &[Op]) -> u64 {
    let config = KvGasConfig::default();
    let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
    ops.iter()
        .map(|(kind, key, value)| match *kind {
            SET => {
                model.insert(key.clone(), value.clone());
                config.write_costs(key, value)
            }
            GET => config.read_costs(key, model.get(key).map(Vec::as_slice)),
            _ => {
                model.remove(key);
                config.delete_cost
            }
        })
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn storage_gas_is_charged_per_access(ops in prop::collection::vec(op(), 0..24)) {
        setup();
        let mut keeper = testing::test_keeper();
        let mut ctx = testing::test_context();
        let contract = instantiate_mock(&mut keeper, &mut ctx, storage_contract());

        let before = ctx.gas_meter().consumed();
        keeper.execute(&mut ctx, &contract, &mock_creator(), b"[]", &[]).unwrap();
        let baseline = ctx.gas_meter().consumed() - before;

        let msg = serde_json::to_vec(&ops).unwrap();
        let before = ctx.gas_meter().consumed();
        keeper.execute(&mut ctx, &contract, &mock_creator(), &msg, &[]).unwrap();
        let used = ctx.gas_meter().consumed() - before;
        prop_assert_eq!(used - baseline, expected_storage_gas(&ops));
    }

    #[test]
    fn a_contract_on_the_stack_cannot_be_entered(
        others in prop::collection::vec(prop::collection::vec(any::<u8>(), 20..=20), 0..6),
        position in any::<prop::sample::Index>(),
    ) {
        setup();
        let mut keeper = testing::test_keeper();
        let mut ctx = testing::test_context();
        let target = instantiate_mock(
            &mut keeper,
            &mut ctx,
            MockContract::default().with_callable_point("f", false, |_, _| Ok(Default::default())),
        );
        let mut stack: Vec<AccountAddress> = others
            .iter()
            .map(|bytes| AccountAddress::from_canonical(bytes).unwrap())
            .collect();
        stack.insert(position.index(stack.len() + 1), target.clone());
        let callstack = serde_json::to_vec(&stack).unwrap();
        let events = ctx.events().len();

        let (result, gas) = keeper.call_callable_point(
            &mut ctx,
            &target.to_string(),
            b"\"f\"",
            b"[]",
            false,
            &callstack,
            u64::MAX,
        );
        prop_assert_eq!(result, Err(Error::Reentrancy(target.to_string())));
        prop_assert_eq!(gas, 0);
        prop_assert_eq!(ctx.events().len(), events);
    }

    #[test]
    fn inactive_marks_are_idempotent(marks in prop::collection::vec(0u8..4, 1..12)) {
        let mut ctx = testing::test_context();
        let accounts: Vec<AccountAddress> = marks
            .iter()
            .map(|byte| AccountAddress::from_canonical(&[*byte; 20]).unwrap())
            .collect();
        for account in &accounts {
            ctx.mark_inactive(account.clone());
        }
        for account in &accounts {
            prop_assert!(ctx.is_inactive(account));
        }
        let first = accounts[0].clone();
        ctx.clear_inactive(&first);
        prop_assert!(!ctx.is_inactive(&first));
        ctx.clear_all_inactive();
        prop_assert_eq!(ctx.inactive_contracts().count(), 0);
    }

    #[test]
    fn redaction_never_reveals_the_message(msg in ".*") {
        let err = Error::ExecuteFailed(msg.clone()).wrap("dispatch");
        prop_assert_eq!(err.redact(), "codespace: wasm, code: 5");
        let system = Error::NoSuchContract(msg.clone());
        prop_assert_eq!(system.redact(), format!("no such contract: {msg}"));
    }
}
