//! Execution gateway between a Cosmos style host chain and CosmWasm
//! contracts.
//!
//! [`Keeper`] owns the code and contract registries and drives the engine
//! through the [`wasmplus_vm`] boundary. Every host function a running
//! contract calls is charged on the [`context::Context`] gas meter, and every
//! message a contract emits is dispatched in its own transaction.

pub mod address;
pub mod api;
pub mod authz;
pub mod config;
pub mod context;
pub mod directory;
pub mod encoders;
pub mod env;
pub mod error;
pub mod events;
pub mod gas_meter;
pub mod gas_register;
pub mod genesis;
pub mod handler;
pub mod ibc;
pub mod keeper;
pub mod ledger;
pub mod msgs;
pub mod querier;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use error::Error;
pub use keeper::{Keeper, KeeperOptions};
