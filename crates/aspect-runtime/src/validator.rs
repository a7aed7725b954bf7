//! Bytecode validators
//!
//! Validators are cached per engine kind and configuration, so repeated
//! deployments share one compiled engine configuration.
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

use crate::{config::RuntimeConfig, engines::common::EngineKind, error::RuntimeError};
use lazy_static::lazy_static;
use log::info;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Checks Aspect bytecode before it is deployed.
pub trait Validator: Send + Sync {
    /// Fails with `Compilation` for malformed bytecode, and with `Validation`
    /// if the module does not fit the host ABI.
    fn validate(&self, code: &[u8]) -> Result<(), RuntimeError>;

    fn kind(&self) -> EngineKind;
}

lazy_static! {
    static ref VALIDATORS: Mutex<HashMap<(EngineKind, RuntimeConfig), Arc<dyn Validator>>> =
        Mutex::new(HashMap::new());
}

/// Returns the validator for `kind` and `config`, creating it on first use.
pub fn new_validator(
    kind: EngineKind,
    config: &RuntimeConfig,
) -> Result<Arc<dyn Validator>, RuntimeError> {
    let key = (kind, config.clone());
    let mut validators = VALIDATORS.lock()?;
    if let Some(validator) = validators.get(&key) {
        return Ok(Arc::clone(validator));
    }
    let validator = create_validator(kind, config)?;
    info!(
        "created {} validator ({} metering)",
        kind.name(),
        <&'static str>::from(config.gas.metering)
    );
    validators.insert(key, Arc::clone(&validator));
    Ok(validator)
}

cfg_if::cfg_if! {
    if #[cfg(feature = "wasmtime")] {
        fn create_validator(
            kind: EngineKind,
            config: &RuntimeConfig,
        ) -> Result<Arc<dyn Validator>, RuntimeError> {
            match kind {
                EngineKind::Wasmtime => Ok(Arc::new(
                    crate::engines::wasmtime::validator::WasmtimeValidator::new(config)?,
                )),
            }
        }
    } else {
        fn create_validator(
            kind: EngineKind,
            _config: &RuntimeConfig,
        ) -> Result<Arc<dyn Validator>, RuntimeError> {
            Err(RuntimeError::UnsupportedEngine(kind.name().to_string()))
        }
    }
}
