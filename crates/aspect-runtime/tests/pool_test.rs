//! Tests of the runtime pool
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

use aspect_runtime::{pool_key, EngineKind, LifecycleState, RuntimeConfig, RuntimePool, Value};
use common::*;
use std::thread;

#[test]
fn test_reuse_resets_guest_state() {
    init_logger();
    let pool = RuntimePool::new(10, RuntimeConfig::default());
    let code = guest_wasm();
    let apis = registry();

    for _ in 0..2 {
        let (key, runtime) = pool.runtime(EngineKind::Wasmtime, &code, &apis).unwrap();
        assert_eq!(key, pool_key(EngineKind::Wasmtime, &code));
        assert!(!pool.contains(&key));
        let output = runtime.call("testIncrease", 1000, &[]).unwrap();
        assert_eq!(output.value, Some(Value::Int32(10)));

        pool.return_runtime(key.clone(), runtime);
        assert!(pool.contains(&key));
        assert_eq!(pool.len(), 1);
    }
}

#[test]
fn test_returned_runtimes_are_released() {
    init_logger();
    let pool = RuntimePool::new(2, RuntimeConfig::default());
    let code = guest_wasm();
    let apis = registry();

    let (key, runtime) = pool.runtime(EngineKind::Wasmtime, &code, &apis).unwrap();
    assert_eq!(runtime.state(), LifecycleState::Ready);
    pool.return_runtime(key, runtime);

    let (_, runtime) = pool.runtime(EngineKind::Wasmtime, &code, &apis).unwrap();
    assert_eq!(runtime.state(), LifecycleState::Ready);
    assert!(pool.is_empty());
}

#[test]
fn test_lru_eviction() {
    init_logger();
    let pool = RuntimePool::new(2, RuntimeConfig::default());
    let apis = registry();
    let codes: Vec<Vec<u8>> = (0..3).map(guest_wasm_variant).collect();

    let mut keys = Vec::new();
    for code in &codes {
        let (key, runtime) = pool.runtime(EngineKind::Wasmtime, code, &apis).unwrap();
        keys.push(key.clone());
        pool.return_runtime(key, runtime);
    }
    assert_eq!(pool.capacity(), 2);
    assert_eq!(pool.len(), 2);
    assert!(!pool.contains(&keys[0]));
    assert!(pool.contains(&keys[1]));
    assert!(pool.contains(&keys[2]));

    // Checking out and returning the second entry makes the third the least
    // recently returned.
    let (key, runtime) = pool.runtime(EngineKind::Wasmtime, &codes[1], &apis).unwrap();
    pool.return_runtime(key, runtime);
    let (key, runtime) = pool.runtime(EngineKind::Wasmtime, &codes[0], &apis).unwrap();
    pool.return_runtime(key, runtime);
    assert!(pool.contains(&keys[0]));
    assert!(pool.contains(&keys[1]));
    assert!(!pool.contains(&keys[2]));
}

#[test]
fn test_force_refresh() {
    init_logger();
    let pool = RuntimePool::new(2, RuntimeConfig::default());
    let code = guest_wasm();
    let apis = registry();

    let (key, runtime) = pool.runtime(EngineKind::Wasmtime, &code, &apis).unwrap();
    pool.return_runtime(key.clone(), runtime);

    let (fresh_key, runtime) = pool
        .runtime_with_refresh(EngineKind::Wasmtime, &code, &apis, true)
        .unwrap();
    assert_eq!(fresh_key, key);
    assert!(!pool.contains(&key));
    assert!(runtime.call("nothing", 1, &[]).is_ok());
}

#[test]
fn test_duplicate_returns_keep_one_entry() {
    init_logger();
    let pool = RuntimePool::new(4, RuntimeConfig::default());
    let code = guest_wasm();
    let apis = registry();

    let (first_key, first) = pool.runtime(EngineKind::Wasmtime, &code, &apis).unwrap();
    let (second_key, second) = pool.runtime(EngineKind::Wasmtime, &code, &apis).unwrap();
    pool.return_runtime(first_key, first);
    pool.return_runtime(second_key, second);
    assert_eq!(pool.len(), 1);
}

#[test]
fn test_concurrent_checkout_and_return() {
    init_logger();
    let pool = RuntimePool::new(4, RuntimeConfig::default());
    let codes: Vec<Vec<u8>> = (0..2).map(guest_wasm_variant).collect();
    let apis = registry();

    thread::scope(|scope| {
        for worker in 0..8 {
            let pool = &pool;
            let code = &codes[worker % codes.len()];
            let apis = &apis;
            scope.spawn(move || {
                for round in 0..4 {
                    let (key, runtime) = pool.runtime(EngineKind::Wasmtime, code, apis).unwrap();
                    let arg = format!("w{}r{}", worker, round);
                    let output = runtime.call("greet", 1000, &[Value::from(arg.as_str())]).unwrap();
                    assert_eq!(
                        output.value,
                        Some(Value::String(format!("hello-greet-{}-hello-greet", arg)))
                    );
                    pool.return_runtime(key, runtime);
                }
            });
        }
    });

    assert!(pool.len() <= 2);
}
