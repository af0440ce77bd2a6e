//! Node local configuration and chain parameters.

use crate::{
    error::Error,
    gas_register::WasmGasRegisterConfig,
    store::KvGasConfig,
    types::{AccessConfig, AccessType},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SMART_QUERY_GAS_LIMIT: u64 = 3_000_000;
/// MiB.
pub const DEFAULT_MEMORY_CACHE_SIZE: u32 = 100;
pub const DEFAULT_MAX_WASM_CODE_SIZE: u64 = 1_228_800;

/// Settings each node picks for itself. They must not change state
/// transitions, only how they are computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WasmConfig {
    /// Host gas ceiling of one smart query, applied on top of the caller's
    /// own limit.
    pub smart_query_gas_limit: u64,
    pub memory_cache_size: u32,
    /// Print contract debug output.
    pub contract_debug_mode: bool,
}

impl Default for WasmConfig {
    fn default() -> Self {
        WasmConfig {
            smart_query_gas_limit: DEFAULT_SMART_QUERY_GAS_LIMIT,
            memory_cache_size: DEFAULT_MEMORY_CACHE_SIZE,
            contract_debug_mode: false,
        }
    }
}

/// Parameters agreed on chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub code_upload_access: AccessConfig,
    pub instantiate_default_permission: AccessType,
    pub max_wasm_code_size: u64,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            code_upload_access: AccessConfig::Everybody,
            instantiate_default_permission: AccessType::Everybody,
            max_wasm_code_size: DEFAULT_MAX_WASM_CODE_SIZE,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<(), Error> {
        self.code_upload_access.validate_basic()?;
        if self.max_wasm_code_size == 0 {
            return Err(Error::Invalid("max wasm code size must be positive".into()));
        }
        Ok(())
    }
}

/// Everything a node reads from its `wasm` configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub wasm: WasmConfig,
    pub gas: WasmGasRegisterConfig,
    pub store_gas: KvGasConfig,
}

impl GatewayConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, Error> {
        toml::from_str(contents).map_err(|e| Error::Invalid(format!("config: {e}")))
    }

    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Invalid(format!("config file '{}': {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Invalid(format!("config: {e}")))
    }
}
