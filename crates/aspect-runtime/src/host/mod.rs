//! Host APIs exposed to Aspects
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

pub mod dispatch;
pub mod function;
pub mod registry;

pub use self::{
    dispatch::dispatch,
    function::{HostApi, HostFunction, IntoHostFunction, Signature, MAX_HOST_FUNCTION_PARAMS},
    registry::{import_name, HostApiRegistry},
};
