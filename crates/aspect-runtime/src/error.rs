//! Errors raised by the Aspect runtime
//!
//! Lower layers (codec, linear memory, gas) each have their own error family.
//! All of them fold into `RuntimeError`, which is what the public API returns.
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

use err_derive::Error;
use serde::{Deserialize, Serialize};

////////////////////////////////////////////////////////////////////////////////
// Wire format errors.
////////////////////////////////////////////////////////////////////////////////

/// Errors raised while decoding a typed value from its wire representation.
/// These are always caused by malformed guest-supplied bytes, never by host
/// wiring bugs.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeError {
    #[error(display = "DecodeError: header needs {} bytes, found {}.", expected, found)]
    TruncatedHeader { expected: usize, found: usize },
    #[error(display = "DecodeError: body needs {} bytes, found {}.", expected, found)]
    TruncatedBody { expected: usize, found: usize },
    #[error(display = "DecodeError: negative body length {}.", _0)]
    NegativeLength(i32),
    #[error(display = "DecodeError: unknown type kind tag {}.", _0)]
    UnknownKind(i16),
    #[error(display = "DecodeError: expected kind {}, found {}.", expected, found)]
    KindMismatch { expected: String, found: String },
    #[error(
        display = "DecodeError: kind {} needs a {}-byte body, found {}.",
        kind,
        expected,
        found
    )]
    WidthMismatch {
        kind: String,
        expected: usize,
        found: usize,
    },
    #[error(display = "DecodeError: invalid boolean byte {}.", _0)]
    InvalidBool(u8),
    #[error(display = "DecodeError: string body is not valid UTF-8.")]
    InvalidUtf8,
}

////////////////////////////////////////////////////////////////////////////////
// Linear memory errors.
////////////////////////////////////////////////////////////////////////////////

/// Errors raised by a linear memory accessor.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryError {
    /// The span `[ptr, ptr + size)` is not inside the linear memory.
    #[error(
        display = "MemoryError: access of {} bytes at {} exceeds memory of {} bytes.",
        size,
        ptr,
        memory_size
    )]
    OutOfBounds {
        ptr: i64,
        size: i64,
        memory_size: usize,
    },
    #[error(display = "MemoryError: guest does not export memory '{}'.", _0)]
    NoMemoryExport(String),
    #[error(display = "MemoryError: guest does not export allocator '{}'.", _0)]
    NoAllocator(String),
    /// The guest allocator handed back the reserved null pointer.
    #[error(display = "MemoryError: allocation of {} bytes returned pointer 0.", _0)]
    AllocationFailed(i32),
    #[error(display = "MemoryError: engine failure: {}.", _0)]
    Engine(String),
}

////////////////////////////////////////////////////////////////////////////////
// Gas errors.
////////////////////////////////////////////////////////////////////////////////

/// Errors raised by the gas bridge.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum GasError {
    #[error(display = "GasError: out of gas.")]
    OutOfGas,
    #[error(display = "GasError: gas amount {} overflows the maximum of {}.", amount, max)]
    Overflow { amount: i64, max: i64 },
    #[error(display = "GasError: gas counter unavailable: {}.", _0)]
    CounterUnavailable(String),
}

////////////////////////////////////////////////////////////////////////////////
// Runtime errors.
////////////////////////////////////////////////////////////////////////////////

/// The error taxonomy of the runtime.  Traps raised inside a guest call are
/// classified into `OutOfGas` and `ExecutionTrap`; everything else describes a
/// failure of the host side.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeError {
    /// Malformed or unsupported bytecode.
    #[error(display = "RuntimeError: compilation failed: {}.", _0)]
    Compilation(String),
    /// A host function could not be linked, or a guest import is unresolved.
    #[error(display = "RuntimeError: link failed: {}.", _0)]
    Link(String),
    #[error(display = "RuntimeError: {}", _0)]
    Memory(#[error(source)] MemoryError),
    #[error(display = "RuntimeError: {}", _0)]
    Decode(#[error(source)] DecodeError),
    #[error(display = "RuntimeError: gas overflow: {}", _0)]
    GasOverflow(String),
    #[error(display = "RuntimeError: gas counter unavailable: {}", _0)]
    GasUnavailable(String),
    /// Gas ran out, either inside a host call or in the guest itself.
    #[error(display = "RuntimeError: out of gas.")]
    OutOfGas,
    /// Any other guest trap, wrapping the trap message.
    #[error(display = "RuntimeError: execution trap: {}", _0)]
    ExecutionTrap(String),
    #[error(display = "RuntimeError: method '{}' not found.", _0)]
    MethodNotFound(String),
    /// The arguments do not fit the guest method's signature.
    #[error(display = "RuntimeError: bad arguments: {}.", _0)]
    BadArguments(String),
    /// Error text returned by a host function; raised as a trap in the guest.
    #[error(display = "{}", _0)]
    HostFunction(String),
    #[error(display = "RuntimeError: host function not supported: {}.", _0)]
    HostFunctionNotSupported(String),
    #[error(display = "RuntimeError: host function '{}' is already registered.", _0)]
    DuplicateHostFunction(String),
    #[error(display = "RuntimeError: invalid configuration: {}.", _0)]
    Config(String),
    #[error(display = "RuntimeError: bytecode rejected: {}.", _0)]
    Validation(String),
    #[error(display = "RuntimeError: runtime engine '{}' not supported.", _0)]
    UnsupportedEngine(String),
    #[error(display = "RuntimeError: the runtime has been destroyed.")]
    Destroyed,
    #[error(display = "RuntimeError: the runtime has no live instance.")]
    NotInstantiated,
    #[error(display = "RuntimeError: failed to obtain lock on the engine.")]
    FailedLockEngine,
}

impl From<GasError> for RuntimeError {
    fn from(error: GasError) -> Self {
        match error {
            GasError::OutOfGas => RuntimeError::OutOfGas,
            GasError::Overflow { .. } => RuntimeError::GasOverflow(error.to_string()),
            GasError::CounterUnavailable(reason) => RuntimeError::GasUnavailable(reason),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for RuntimeError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        RuntimeError::FailedLockEngine
    }
}

/// The failure half of a guest call: the error, plus the best-known remaining
/// gas in EVM units (0 if it could not be determined).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error(display = "{} (gas remaining: {})", error, gas_remaining)]
pub struct CallError {
    pub error: RuntimeError,
    pub gas_remaining: i64,
}

impl CallError {
    pub(crate) fn new(error: RuntimeError, gas_remaining: i64) -> Self {
        Self {
            error,
            gas_remaining,
        }
    }

    /// Whether the call ended because gas ran out.
    pub fn is_out_of_gas(&self) -> bool {
        self.error == RuntimeError::OutOfGas
    }
}
