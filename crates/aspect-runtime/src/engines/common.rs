//! Common code for any implementation of the Aspect runtime:
//! - The set of supported engines.
//! - The lifecycle of a runtime.
//! - An interface for calling into a compiled Aspect.
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

use crate::{
    codec::Value,
    error::{CallError, RuntimeError},
    host::HostApiRegistry,
};
use serde::{Deserialize, Serialize};
use strum_macros::{EnumString, IntoStaticStr};

////////////////////////////////////////////////////////////////////////////////
// Engines and lifecycle.
////////////////////////////////////////////////////////////////////////////////

/// The WASM engines a runtime can be built on.  Converts to and from its
/// lowercase name via `strum`.
#[derive(
    IntoStaticStr,
    EnumString,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Copy,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Wasmtime,
}

impl EngineKind {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Where a runtime is in its life.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Compiled, with no live instance.
    Uninstantiated,
    /// Compiled and instantiated; calls are accepted.
    Ready,
    /// Every engine resource has been released.  Terminal.
    Destroyed,
}

////////////////////////////////////////////////////////////////////////////////
// The runtime interface.
////////////////////////////////////////////////////////////////////////////////

/// The success half of a guest call.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct CallOutput {
    /// `None` if the method returned nothing or the null pointer.
    pub value: Option<Value>,
    /// EVM gas left after the call.
    pub gas_remaining: i64,
}

/// A compiled Aspect.  Implementations serialise calls on one runtime;
/// distinct runtimes run in parallel.
pub trait AspectRuntime: Send + Sync {
    /// Calls the guest export `method` with `gas` EVM units.  Each argument
    /// is written into freshly allocated guest memory and passed by pointer.
    fn call(&self, method: &str, gas: i64, args: &[Value]) -> Result<CallOutput, CallError>;

    /// Drops the live instance, if any, and instantiates the compiled code
    /// again with `apis` linked.  Guest state does not survive.
    fn reset_store(&self, apis: &HostApiRegistry) -> Result<(), RuntimeError>;

    /// Drops the live instance, keeping the compiled code.
    fn release_store(&self);

    /// Releases everything.  Later calls fail with `RuntimeError::Destroyed`.
    fn destroy(&self);

    fn state(&self) -> LifecycleState;

    fn kind(&self) -> EngineKind;
}
