//! Bytecode validation with Wasmtime
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

use super::engine_config;
use crate::{
    config::RuntimeConfig, engines::common::EngineKind, error::RuntimeError,
    validator::Validator,
};
use wasmtime::{Engine, ExternType, Module, ValType};

/// Checks that bytecode compiles under the runtime's engine settings and
/// exports what the host ABI needs.
pub struct WasmtimeValidator {
    engine: Engine,
    config: RuntimeConfig,
}

impl WasmtimeValidator {
    pub fn new(config: &RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let engine = Engine::new(&engine_config(config))
            .map_err(|e| RuntimeError::Validation(format!("{:#}", e)))?;
        Ok(Self {
            engine,
            config: config.clone(),
        })
    }
}

impl Validator for WasmtimeValidator {
    fn validate(&self, code: &[u8]) -> Result<(), RuntimeError> {
        let module = Module::new(&self.engine, code)
            .map_err(|e| RuntimeError::Compilation(format!("{:#}", e)))?;

        match module.get_export(&self.config.memory_export) {
            Some(ExternType::Memory(_)) => (),
            _ => {
                return Err(RuntimeError::Validation(format!(
                    "missing memory export '{}'",
                    self.config.memory_export
                )))
            }
        }

        let allocator = match module.get_export(&self.config.allocator_export) {
            Some(ExternType::Func(ty)) => ty,
            _ => {
                return Err(RuntimeError::Validation(format!(
                    "missing allocator export '{}'",
                    self.config.allocator_export
                )))
            }
        };
        let params: Vec<ValType> = allocator.params().collect();
        let results: Vec<ValType> = allocator.results().collect();
        if !matches!(params.as_slice(), [ValType::I32])
            || !matches!(results.as_slice(), [ValType::I32])
        {
            return Err(RuntimeError::Validation(format!(
                "allocator '{}' must have type (i32) -> i32, found {:?}",
                self.config.allocator_export, allocator
            )));
        }
        Ok(())
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Wasmtime
    }
}
