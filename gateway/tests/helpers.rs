#![allow(dead_code)]

use std::sync::Once;

use cosmwasm_std::{Binary, Event};
use wasmplus_gateway::{address::AccountAddress, context::Context};
use wasmplus_vm::{CosmosMsg, WasmMsg};

static INIT: Once = Once::new();

pub fn setup() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub fn account(byte: u8) -> AccountAddress {
    AccountAddress::from_canonical(&[byte; 20]).unwrap()
}

pub fn wasm_execute(contract: &AccountAddress, msg: &[u8]) -> CosmosMsg {
    CosmosMsg::Wasm(WasmMsg::Execute {
        contract_addr: contract.to_string(),
        msg: Binary::from(msg.to_vec()),
        funds: vec![],
    })
}

pub fn events_of<'a>(ctx: &'a Context, ty: &str) -> Vec<&'a Event> {
    ctx.events().iter().filter(|e| e.ty == ty).collect()
}

pub fn attribute<'a>(event: &'a Event, key: &str) -> Option<&'a str> {
    event
        .attributes
        .iter()
        .find(|a| a.key == key)
        .map(|a| a.value.as_str())
}
