// lib.rs ---

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

//! Boundary between a host chain and an embedded CosmWasm virtual machine.
//!
//! The host implements [`Backend`] for one contract call, the VM implements
//! [`WasmEngine`]. Everything else in this crate is the data exchanged across
//! that boundary.

pub mod backend;
pub mod engine;
pub mod msg;
pub mod query;
pub mod types;

pub use backend::{Backend, BackendApi, BackendError, BackendResult, GasInfo, Querier, Record, Storage};
pub use engine::{CallablePointOutput, EngineResult, Invocation, VmError, WasmEngine};
pub use msg::{
    BankMsg, CosmosMsg, IbcMsg, IbcTimeout, IbcTimeoutBlock, Response, StakingMsg, SubMsg, WasmMsg,
};
pub use query::{
    AllBalanceResponse, BalanceResponse, BankQuery, ContractInfoResponse, QueryRequest,
    StakingQuery, WasmQuery,
};
pub use types::{AnalysisReport, CallablePointProperties, Checksum, UFraction};
