//! Tests of bytecode validation
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

mod common;

use aspect_runtime::{new_validator, EngineKind, GasMetering, RuntimeConfig, RuntimeError};
use common::*;
use std::sync::Arc;

#[test]
fn test_accepts_guest() {
    init_logger();
    let validator = new_validator(EngineKind::Wasmtime, &RuntimeConfig::default()).unwrap();
    assert_eq!(validator.kind(), EngineKind::Wasmtime);
    validator.validate(&guest_wasm()).unwrap();
    validator.validate(&fuel_guest_wasm()).unwrap();
}

#[test]
fn test_validators_are_cached() {
    init_logger();
    let first = new_validator(EngineKind::Wasmtime, &RuntimeConfig::default()).unwrap();
    let second = new_validator(EngineKind::Wasmtime, &RuntimeConfig::default()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_validators_follow_their_config() {
    init_logger();
    let default = new_validator(EngineKind::Wasmtime, &RuntimeConfig::default()).unwrap();

    let mut renamed = RuntimeConfig::default();
    renamed.allocator_export = "malloc".to_string();
    let validator = new_validator(EngineKind::Wasmtime, &renamed).unwrap();
    assert!(!Arc::ptr_eq(&default, &validator));
    assert!(matches!(
        validator.validate(&guest_wasm()),
        Err(RuntimeError::Validation(_))
    ));
    default.validate(&guest_wasm()).unwrap();

    let mut fuel = RuntimeConfig::default();
    fuel.gas.metering = GasMetering::Fuel;
    let validator = new_validator(EngineKind::Wasmtime, &fuel).unwrap();
    assert!(!Arc::ptr_eq(&default, &validator));
    validator.validate(&fuel_guest_wasm()).unwrap();
}

#[test]
fn test_rejects_malformed_code() {
    init_logger();
    let validator = new_validator(EngineKind::Wasmtime, &RuntimeConfig::default()).unwrap();
    assert!(matches!(
        validator.validate(b"not wasm at all"),
        Err(RuntimeError::Compilation(_))
    ));
}

#[test]
fn test_rejects_missing_exports() {
    init_logger();
    let validator = new_validator(EngineKind::Wasmtime, &RuntimeConfig::default()).unwrap();

    let no_memory = wat::parse_str(
        r#"(module (func (export "allocate") (param i32) (result i32) (local.get 0)))"#,
    )
    .unwrap();
    assert!(matches!(
        validator.validate(&no_memory),
        Err(RuntimeError::Validation(_))
    ));

    let no_allocator = wat::parse_str(r#"(module (memory (export "memory") 1))"#).unwrap();
    assert!(matches!(
        validator.validate(&no_allocator),
        Err(RuntimeError::Validation(_))
    ));

    let bad_allocator = wat::parse_str(
        r#"(module
             (memory (export "memory") 1)
             (func (export "allocate") (param i64) (result i32) (i32.const 0)))"#,
    )
    .unwrap();
    assert!(matches!(
        validator.validate(&bad_allocator),
        Err(RuntimeError::Validation(_))
    ));
}
