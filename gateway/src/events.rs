//! Translation of contract emitted attributes and events into host events.

use crate::{address::AccountAddress, error::Error};
use cosmwasm_std::{Attribute, Event};

pub const WASM_MODULE_EVENT_TYPE: &str = "wasm";
/// Custom contract events are namespaced so they cannot pose as system events.
pub const CUSTOM_CONTRACT_EVENT_PREFIX: &str = "wasm-";
pub const CALLABLE_POINT_EVENT_TYPE: &str = "wasm-callablepoint";
pub const CUSTOM_CALLABLE_POINT_EVENT_PREFIX: &str = "wasm-callablepoint-";

pub const EVENT_TYPE_STORE_CODE: &str = "store_code";
pub const EVENT_TYPE_INSTANTIATE: &str = "instantiate";
pub const EVENT_TYPE_EXECUTE: &str = "execute";
pub const EVENT_TYPE_MIGRATE: &str = "migrate";
pub const EVENT_TYPE_PIN_CODE: &str = "pin_code";
pub const EVENT_TYPE_UNPIN_CODE: &str = "unpin_code";
pub const EVENT_TYPE_SUDO: &str = "sudo";
pub const EVENT_TYPE_REPLY: &str = "reply";
pub const EVENT_TYPE_UPDATE_ADMIN: &str = "update_contract_admin";

pub const ATTRIBUTE_RESERVED_PREFIX: &str = "_";
pub const ATTRIBUTE_KEY_CONTRACT_ADDR: &str = "_contract_address";
pub const ATTRIBUTE_KEY_CALLSTACK: &str = "_callstack";
pub const ATTRIBUTE_KEY_CODE_ID: &str = "code_id";
pub const ATTRIBUTE_KEY_CHECKSUM: &str = "code_checksum";
pub const ATTRIBUTE_KEY_NEW_ADMIN: &str = "new_admin_address";

/// Event types of this length or shorter are rejected after trimming.
pub const EVENT_TYPE_MIN_LENGTH: usize = 2;

/// The `wasm` event carrying the plain attributes of a response. `None`
/// when there are none.
pub fn new_wasm_module_event(
    attributes: &[Attribute],
    contract: &AccountAddress,
) -> Result<Option<Event>, Error> {
    if attributes.is_empty() {
        return Ok(None);
    }
    let attributes = contract_event_attributes(attributes, contract)?;
    Ok(Some(Event::new(WASM_MODULE_EVENT_TYPE).add_attributes(attributes)))
}

/// One `wasm-<type>` event per contract event.
pub fn new_custom_events(events: &[Event], contract: &AccountAddress) -> Result<Vec<Event>, Error> {
    events
        .iter()
        .map(|event| {
            let ty = event_type(&event.ty)?;
            let attributes = contract_event_attributes(&event.attributes, contract)?;
            Ok(Event::new(format!("{CUSTOM_CONTRACT_EVENT_PREFIX}{ty}")).add_attributes(attributes))
        })
        .collect()
}

/// The `wasm-callablepoint` event for the attributes a callable point
/// returned.
pub fn new_callable_point_event(
    attributes: &[Attribute],
    contract: &AccountAddress,
    callstack: &[u8],
) -> Result<Event, Error> {
    let attributes = callable_point_event_attributes(attributes, contract, callstack)?;
    Ok(Event::new(CALLABLE_POINT_EVENT_TYPE).add_attributes(attributes))
}

/// One `wasm-callablepoint-<type>` event per event a callable point returned.
pub fn new_custom_callable_point_events(
    events: &[Event],
    contract: &AccountAddress,
    callstack: &[u8],
) -> Result<Vec<Event>, Error> {
    events
        .iter()
        .map(|event| {
            let ty = event_type(&event.ty)?;
            let attributes = callable_point_event_attributes(&event.attributes, contract, callstack)?;
            Ok(Event::new(format!("{CUSTOM_CALLABLE_POINT_EVENT_PREFIX}{ty}"))
                .add_attributes(attributes))
        })
        .collect()
}

fn event_type(ty: &str) -> Result<&str, Error> {
    let ty = ty.trim();
    if ty.len() <= EVENT_TYPE_MIN_LENGTH {
        return Err(Error::InvalidEvent(format!("Event type too short: '{ty}'")));
    }
    Ok(ty)
}

/// `_contract_address` first, then the trimmed contract attributes in order.
pub fn contract_event_attributes(
    attributes: &[Attribute],
    contract: &AccountAddress,
) -> Result<Vec<Attribute>, Error> {
    let mut out = Vec::with_capacity(attributes.len() + 1);
    out.push(attribute(ATTRIBUTE_KEY_CONTRACT_ADDR, contract.to_string()));
    for attr in attributes {
        let key = attr.key.trim();
        if key.is_empty() {
            return Err(Error::InvalidEvent("Empty attribute key".into()));
        }
        let value = attr.value.trim();
        if value.is_empty() {
            return Err(Error::InvalidEvent(format!("Empty attribute value. Key: {key}")));
        }
        if key.starts_with(ATTRIBUTE_RESERVED_PREFIX) {
            return Err(Error::InvalidEvent(format!(
                "Attribute key starts with reserved prefix {ATTRIBUTE_RESERVED_PREFIX}: '{key}'"
            )));
        }
        out.push(attribute(key, value));
    }
    Ok(out)
}

fn callable_point_event_attributes(
    attributes: &[Attribute],
    contract: &AccountAddress,
    callstack: &[u8],
) -> Result<Vec<Attribute>, Error> {
    let mut out = contract_event_attributes(attributes, contract)?;
    out.insert(
        1,
        attribute(ATTRIBUTE_KEY_CALLSTACK, String::from_utf8_lossy(callstack)),
    );
    Ok(out)
}

/// `Attribute::new` refuses reserved keys, which the host itself sets.
fn attribute(key: impl Into<String>, value: impl Into<String>) -> Attribute {
    Attribute {
        key: key.into(),
        value: value.into(),
    }
}
