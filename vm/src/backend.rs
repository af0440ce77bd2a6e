// backend.rs ---

// Copyright (C) 2022 Hussein Ait-Lahcen

// Author: Hussein Ait-Lahcen <hussein.aitlahcen@gmail.com>

// Permission is hereby granted, free of charge, to any person obtaining a
// copy of this software and associated documentation files (the "Software"),
// to deal in the Software without restriction, including without limitation
// the rights to use, copy, modify, merge, publish, distribute, sublicense,
// and/or sell copies of the Software, and to permit persons to whom the
// Software is furnished to do so, subject to the following conditions:

// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.

// Except as contained in this notice, the name(s) of the above copyright
// holders shall not be used in advertising or otherwise to promote the sale,
// use or other dealings in this Software without prior written authorization.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT.  IN NO EVENT SHALL
// THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
// FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

//! What the host offers a VM for the duration of one contract call.

use crate::query::QueryRequest;
use cosmwasm_std::{Binary, ContractResult, Order, SystemResult};
use std::fmt::Display;

pub type Record = (Vec<u8>, Vec<u8>);

/// Gas attached to a host call, in VM units.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct GasInfo {
    /// Gas the VM must charge itself for the call.
    pub cost: u64,
    /// Gas the host already charged on its own meter. The VM only counts it
    /// against its limit and never reports it back as used.
    pub externally_used: u64,
}

impl GasInfo {
    pub const fn with_cost(cost: u64) -> Self {
        GasInfo {
            cost,
            externally_used: 0,
        }
    }

    pub const fn with_externally_used(externally_used: u64) -> Self {
        GasInfo {
            cost: 0,
            externally_used,
        }
    }

    pub const fn free() -> Self {
        GasInfo {
            cost: 0,
            externally_used: 0,
        }
    }
}

/// Every host call returns its gas next to the outcome, so the VM can charge
/// even failed calls.
pub type BackendResult<T> = (Result<T, BackendError>, GasInfo);

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum BackendError {
    /// The host meter is exhausted. The VM must abort the whole call.
    OutOfGas,
    /// Write attempted through a read-only view.
    ReadOnly,
    BadArgument(String),
    /// Recoverable failure reported to contract code.
    UserErr(String),
    Unknown(String),
}

impl Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Key value storage of the executing contract. Keys are relative to the
/// contract namespace.
pub trait Storage {
    fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), BackendError>;

    fn remove(&mut self, key: &[u8]) -> Result<(), BackendError>;

    /// Records in `[start, end)` in the requested order.
    fn scan(
        &mut self,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        order: Order,
    ) -> Result<Vec<Record>, BackendError>;
}

pub trait BackendApi {
    fn addr_canonicalize(&self, human: &str) -> BackendResult<Vec<u8>>;

    fn addr_humanize(&self, canonical: &[u8]) -> BackendResult<String>;

    /// Invoke the callable point `name` (JSON encoded string) of
    /// `contract_addr`.
    ///
    /// * `args`: JSON encoded argument list.
    /// * `is_readonly`: the callee must not write state nor emit events.
    /// * `callstack`: JSON array of the contract addresses already executing.
    /// * `gas_limit`: VM gas the callee may spend, setup cost included.
    fn call_callable_point(
        &mut self,
        contract_addr: &str,
        name: &[u8],
        args: &[u8],
        is_readonly: bool,
        callstack: &[u8],
        gas_limit: u64,
    ) -> BackendResult<Binary>;

    /// Check `contract_addr` against an interface description. A JSON `null`
    /// means the contract implements all of it.
    fn validate_interface(
        &mut self,
        contract_addr: &str,
        expected_interface: &[u8],
    ) -> BackendResult<Binary>;
}

pub trait Querier {
    /// `request` is a JSON encoded [`QueryRequest`].
    fn query_raw(
        &mut self,
        request: &[u8],
        gas_limit: u64,
    ) -> BackendResult<SystemResult<ContractResult<Binary>>>;

    fn query(
        &mut self,
        request: &QueryRequest,
        gas_limit: u64,
    ) -> BackendResult<SystemResult<ContractResult<Binary>>> {
        match serde_json::to_vec(request) {
            Ok(raw) => self.query_raw(&raw, gas_limit),
            Err(e) => (Err(BackendError::BadArgument(e.to_string())), GasInfo::free()),
        }
    }
}

pub trait Backend: Storage + BackendApi + Querier {
    /// Gas consumed so far on the host meter, in host units.
    fn host_gas_consumed(&self) -> u64;
}
