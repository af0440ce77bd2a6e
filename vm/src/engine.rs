// engine.rs ---

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

use crate::{
    backend::{Backend, BackendError},
    msg::Response,
    types::{AnalysisReport, Checksum, UFraction},
};
use cosmwasm_std::{Attribute, Binary, ContractResult, Env, Event, MessageInfo, Reply};
use std::fmt::Display;

/// Errors raised by the VM itself, as opposed to errors returned by contract
/// code, which travel inside [`ContractResult::Err`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum VmError {
    OutOfGas,
    CodeNotFound(Checksum),
    CompileErr(String),
    StaticValidationErr(String),
    InvalidInput(String),
    /// The contract trapped or panicked.
    ContractTrap(String),
    CallablePointNotFound(String),
    ReadOnlyViolation(String),
    BackendErr(BackendError),
    Generic(String),
}

impl From<BackendError> for VmError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::OutOfGas => VmError::OutOfGas,
            e => VmError::BackendErr(e),
        }
    }
}

impl Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Outcome plus VM gas used. Gas is reported on failure too.
pub type EngineResult<T> = (Result<T, VmError>, u64);

/// Inputs shared by every entry point call.
#[derive(Clone, Copy, Debug)]
pub struct Invocation<'a> {
    pub checksum: &'a Checksum,
    pub env: &'a Env,
    /// VM gas available to the call.
    pub gas_limit: u64,
    /// Price of deserializing one byte of host supplied JSON.
    pub deserialization_cost: UFraction,
}

/// Output of a callable point.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallablePointOutput {
    pub data: Binary,
    pub events: Vec<Event>,
    pub attributes: Vec<Attribute>,
}

/// A deterministic, gas metered WebAssembly engine.
///
/// Implementations own compiled code keyed by [`Checksum`]. Every entry
/// point receives the host [`Backend`] of the contract being called and must
/// report the gas it used even when it fails.
pub trait WasmEngine {
    /// Compile and persist `code`.
    fn create(&self, code: &[u8]) -> Result<Checksum, VmError>;

    fn analyze_code(&self, checksum: &Checksum) -> Result<AnalysisReport, VmError>;

    /// Original bytecode of a stored code.
    fn get_code(&self, checksum: &Checksum) -> Result<Vec<u8>, VmError>;

    /// Keep the compiled module resident.
    fn pin(&self, checksum: &Checksum) -> Result<(), VmError>;

    fn unpin(&self, checksum: &Checksum) -> Result<(), VmError>;

    fn instantiate(
        &self,
        call: Invocation,
        info: &MessageInfo,
        msg: &[u8],
        backend: &mut dyn Backend,
    ) -> EngineResult<ContractResult<Response>>;

    fn execute(
        &self,
        call: Invocation,
        info: &MessageInfo,
        msg: &[u8],
        backend: &mut dyn Backend,
    ) -> EngineResult<ContractResult<Response>>;

    fn query(
        &self,
        call: Invocation,
        msg: &[u8],
        backend: &mut dyn Backend,
    ) -> EngineResult<ContractResult<Binary>>;

    fn migrate(
        &self,
        call: Invocation,
        msg: &[u8],
        backend: &mut dyn Backend,
    ) -> EngineResult<ContractResult<Response>>;

    fn sudo(
        &self,
        call: Invocation,
        msg: &[u8],
        backend: &mut dyn Backend,
    ) -> EngineResult<ContractResult<Response>>;

    fn reply(
        &self,
        call: Invocation,
        reply: &Reply,
        backend: &mut dyn Backend,
    ) -> EngineResult<ContractResult<Response>>;

    /// Run callable point `name` (JSON encoded string).
    fn call_callable_point(
        &self,
        call: Invocation,
        name: &[u8],
        is_readonly: bool,
        callstack: &[u8],
        args: &[u8],
        backend: &mut dyn Backend,
    ) -> EngineResult<CallablePointOutput>;

    /// `None` when the code implements `expected_interface`, otherwise a JSON
    /// report of what is missing.
    fn validate_dynamic_link_interface(
        &self,
        checksum: &Checksum,
        expected_interface: &[u8],
    ) -> Result<Option<Binary>, VmError>;
}
