//! Engine-specific functionality
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

pub mod common;
#[cfg(feature = "wasmtime")]
pub mod wasmtime;
