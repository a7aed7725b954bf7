//! The Aspect WASM host runtime
//!
//! Aspects are WebAssembly modules that run alongside a blockchain's EVM.
//! This crate compiles and runs them, and lets them call back into the host:
//!
//! - values cross the linear memory boundary in a self-describing encoding
//!   (`codec`, `memory`);
//! - host functions are native closures exposed to the guest as imports
//!   taking and returning pointers (`host`);
//! - gas is tracked in EVM units outside the guest and in WASM units inside
//!   it, and converted at every boundary crossing (`gas`);
//! - compiled runtimes are reused through an LRU pool (`pool`).
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

#[macro_use]
extern crate num_derive;

pub mod codec;
pub mod config;
pub mod engines;
pub mod error;
pub mod gas;
pub mod host;
pub mod memory;
pub mod pool;
pub mod validator;

pub use crate::{
    codec::{Marshal, TypeKind, Value},
    config::{GasConfig, GasMetering, RuntimeConfig},
    engines::common::{AspectRuntime, CallOutput, EngineKind, LifecycleState},
    error::{CallError, DecodeError, GasError, MemoryError, RuntimeError},
    gas::{GasMeter, GasQuota, GasRule, HostContext},
    host::{HostApi, HostApiRegistry, HostFunction, IntoHostFunction, Signature},
    pool::{pool_key, RuntimePool},
    validator::{new_validator, Validator},
};

/// Compiles `code` on the engine `kind`, links `apis` and instantiates the
/// result.  This is the interface the pool and other clients rely on.
pub fn new_aspect_runtime(
    kind: EngineKind,
    code: &[u8],
    apis: &HostApiRegistry,
    config: &RuntimeConfig,
) -> Result<Box<dyn AspectRuntime>, RuntimeError> {
    build_runtime(kind, code, apis, config)
}

cfg_if::cfg_if! {
    if #[cfg(feature = "wasmtime")] {
        fn build_runtime(
            kind: EngineKind,
            code: &[u8],
            apis: &HostApiRegistry,
            config: &RuntimeConfig,
        ) -> Result<Box<dyn AspectRuntime>, RuntimeError> {
            match kind {
                EngineKind::Wasmtime => Ok(Box::new(
                    engines::wasmtime::WasmtimeRuntime::new(code, apis, config)?,
                )),
            }
        }
    } else {
        fn build_runtime(
            kind: EngineKind,
            _code: &[u8],
            _apis: &HostApiRegistry,
            _config: &RuntimeConfig,
        ) -> Result<Box<dyn AspectRuntime>, RuntimeError> {
            Err(RuntimeError::UnsupportedEngine(kind.name().to_string()))
        }
    }
}
