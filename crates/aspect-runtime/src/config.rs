//! Runtime configuration
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

use crate::error::RuntimeError;
use serde::{Deserialize, Serialize};
use strum_macros::{EnumString, IntoStaticStr};

/// Default ratio between one unit of EVM gas and WASM gas.
pub const DEFAULT_GAS_MULTIPLIER: i64 = 100;
/// Default name of the guest-exported gas counter global.
pub const DEFAULT_GAS_COUNTER_GLOBAL: &str = "__gas_counter__";
/// Default cap on the linear memory of one instance.
pub const DEFAULT_MAX_MEMORY_SIZE: usize = 32 * 1024 * 1024;

/// How WASM gas is counted inside the guest.
#[derive(
    IntoStaticStr, EnumString, Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GasMetering {
    /// An `i64` global injected and decremented by the instrumentation pass.
    #[strum(serialize = "counter", serialize = "globalcounter")]
    GlobalCounter,
    /// The engine's native fuel.
    Fuel,
}

/// Gas accounting parameters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    /// WASM gas units per EVM gas unit.  Pinned per deployed bytecode version.
    pub multiplier: i64,
    pub metering: GasMetering,
    /// Name of the exported counter global when metering with `GlobalCounter`.
    pub counter_global: String,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            multiplier: DEFAULT_GAS_MULTIPLIER,
            metering: GasMetering::GlobalCounter,
            counter_global: DEFAULT_GAS_COUNTER_GLOBAL.to_string(),
        }
    }
}

/// Configuration shared by every instance a runtime or pool creates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub gas: GasConfig,
    /// Upper bound on linear memory growth, in bytes.
    pub max_memory_size: usize,
    pub static_memory_maximum_size: u64,
    pub memory_guard_size: u64,
    pub dynamic_memory_reserved_for_growth: u64,
    /// Export invoked before every guest method.  Skipped if the guest does
    /// not export it.
    pub init_export: String,
    pub allocator_export: String,
    pub memory_export: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gas: GasConfig::default(),
            max_memory_size: DEFAULT_MAX_MEMORY_SIZE,
            static_memory_maximum_size: 10 * 1024 * 1024,
            memory_guard_size: 64 * 1024,
            dynamic_memory_reserved_for_growth: 1024 * 1024,
            init_export: "__aspect_start__".to_string(),
            allocator_export: "allocate".to_string(),
            memory_export: "memory".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Parses and validates a JSON configuration.  Missing fields take their
    /// default values.
    pub fn from_json(json: &str) -> Result<Self, RuntimeError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RuntimeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.gas.multiplier <= 0 {
            return Err(RuntimeError::Config(format!(
                "gas multiplier must be positive, got {}",
                self.gas.multiplier
            )));
        }
        if self.gas.metering == GasMetering::GlobalCounter && self.gas.counter_global.is_empty()
        {
            return Err(RuntimeError::Config(
                "gas counter global name is empty".to_string(),
            ));
        }
        if self.allocator_export.is_empty() || self.memory_export.is_empty() {
            return Err(RuntimeError::Config(
                "allocator and memory export names are required".to_string(),
            ));
        }
        if self.max_memory_size == 0 {
            return Err(RuntimeError::Config("max_memory_size is 0".to_string()));
        }
        Ok(())
    }
}
