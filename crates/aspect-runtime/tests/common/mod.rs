//! Shared fixtures for the runtime integration tests
//!
//! The guest Aspects are written in WebAssembly text.  They implement by hand
//! what gas instrumentation would inject: an exported `__gas_counter__`
//! global that loops decrement.
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

#![allow(dead_code)]

use aspect_runtime::{GasError, GasQuota, GasRule, HostApi, HostApiRegistry, IntoHostFunction};
use std::sync::Arc;

pub const TEST_MODULE: &str = "runtime_test";

/// A guest exercising the host ABI.  Pre-encoded string values live in the
/// data segments below the heap.
const GUEST_WAT: &str = r#"
(module
  (import "runtime_test" "test.hello" (func $hello (param i32) (result i32)))
  (import "runtime_test" "test.hello3" (func $hello3 (param i32)))
  (import "runtime_test" "test.fail" (func $fail (result i32)))
  (import "runtime_test" "test.echo" (func $echo (param i32) (result i32)))
  (import "runtime_test" "test.burn" (func $burn (param i32) (result i32)))
  (import "env" "abort" (func $abort (param i32 i32 i32 i32)))

  (memory (export "memory") 4)
  (global $heap (mut i32) (i32.const 1024))
  (global $gas (export "__gas_counter__") (mut i64) (i64.const 0))
  (global $counter (mut i32) (i32.const 0))
  (;variant;)

  (data (i32.const 16) "\0a\00\06\00\00\00greet-")
  (data (i32.const 32) "\0a\00\06\00\00\00-greet")
  (data (i32.const 48) "\0a\00\07\00\00\00greet3-")
  (data (i32.const 64) "\0a\00\06\00\00\00greet3")

  ;; A bump allocator over the initial pages.  Hands out 0 when full.
  (func $allocate (export "allocate") (param $size i32) (result i32)
    (local $ptr i32)
    (local $next i32)
    (local.set $ptr (global.get $heap))
    (local.set $next
      (i32.and
        (i32.add (i32.add (local.get $ptr) (local.get $size)) (i32.const 7))
        (i32.const -8)))
    (if (i32.gt_u (local.get $next) (i32.mul (memory.size) (i32.const 65536)))
      (then (return (i32.const 0))))
    (global.set $heap (local.get $next))
    (local.get $ptr))

  (func (export "__aspect_start__")
    (global.set $heap (i32.const 1024)))

  ;; Concatenates two string values into a new one.
  (func $concat (param $a i32) (param $b i32) (result i32)
    (local $la i32)
    (local $lb i32)
    (local $p i32)
    (local.set $la (i32.load offset=2 (local.get $a)))
    (local.set $lb (i32.load offset=2 (local.get $b)))
    (local.set $p
      (call $allocate (i32.add (i32.const 6) (i32.add (local.get $la) (local.get $lb)))))
    (i32.store16 (local.get $p) (i32.const 10))
    (i32.store offset=2 (local.get $p) (i32.add (local.get $la) (local.get $lb)))
    (memory.copy
      (i32.add (local.get $p) (i32.const 6))
      (i32.add (local.get $a) (i32.const 6))
      (local.get $la))
    (memory.copy
      (i32.add (i32.add (local.get $p) (i32.const 6)) (local.get $la))
      (i32.add (local.get $b) (i32.const 6))
      (local.get $lb))
    (local.get $p))

  ;; An Int32 value.
  (func $int32 (param $n i32) (result i32)
    (local $p i32)
    (local.set $p (call $allocate (i32.const 10)))
    (i32.store16 (local.get $p) (i32.const 3))
    (i32.store offset=2 (local.get $p) (i32.const 4))
    (i32.store offset=6 (local.get $p) (local.get $n))
    (local.get $p))

  (func (export "greet") (param $arg i32) (result i32)
    (call $concat
      (call $hello (call $concat (i32.const 16) (local.get $arg)))
      (i32.const 32)))

  (func (export "greet3") (param $arg i32) (result i32)
    (call $hello3 (call $concat (i32.const 48) (local.get $arg)))
    (i32.const 64))

  (func (export "greet4") (result i32)
    (call $fail))

  (func (export "echo") (param $arg i32) (result i32)
    (call $echo (local.get $arg)))

  (func (export "burn") (param $arg i32) (result i32)
    (call $burn (local.get $arg)))

  ;; Increments every byte of a byte array in place.
  (func (export "testBytes") (param $arg i32) (result i32)
    (local $i i32)
    (local $len i32)
    (local $at i32)
    (local.set $len (i32.load offset=2 (local.get $arg)))
    (block $done
      (loop $next
        (br_if $done (i32.ge_u (local.get $i) (local.get $len)))
        (local.set $at (i32.add (i32.add (local.get $arg) (i32.const 6)) (local.get $i)))
        (i32.store8 (local.get $at) (i32.add (i32.load8_u (local.get $at)) (i32.const 1)))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (br $next)))
    (local.get $arg))

  (func (export "testIncrease") (result i32)
    (global.set $counter (i32.add (global.get $counter) (i32.const 10)))
    (call $int32 (global.get $counter)))

  (func (export "nothing"))

  (func (export "infiniteLoop")
    (loop $spin
      (global.set $gas (i64.sub (global.get $gas) (i64.const 1)))
      (if (i64.lt_s (global.get $gas) (i64.const 0))
        (then
          (global.set $gas (i64.const -1))
          (unreachable)))
      (br $spin)))

  (func (export "assertFail")
    (call $abort (i32.const 1) (i32.const 2) (i32.const 3) (i32.const 4))
    (unreachable))
)
"#;

/// A guest without a gas counter, for fuel metering.
const FUEL_GUEST_WAT: &str = r#"
(module
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))

  (func $allocate (export "allocate") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (local.get $ptr) (local.get $size)))
    (local.get $ptr))

  (func (export "answer") (result i32)
    (local $p i32)
    (local.set $p (call $allocate (i32.const 10)))
    (i32.store16 (local.get $p) (i32.const 3))
    (i32.store offset=2 (local.get $p) (i32.const 4))
    (i32.store offset=6 (local.get $p) (i32.const 42))
    (local.get $p))

  (func (export "spin")
    (loop $l (br $l)))
)
"#;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn guest_wasm() -> Vec<u8> {
    wat::parse_str(GUEST_WAT).unwrap()
}

/// The guest with an extra export, so each `n` hashes to its own pool key.
pub fn guest_wasm_variant(n: u32) -> Vec<u8> {
    let variant = format!("(global (export \"variant\") i32 (i32.const {}))", n);
    wat::parse_str(GUEST_WAT.replace("(;variant;)", &variant)).unwrap()
}

pub fn fuel_guest_wasm() -> Vec<u8> {
    wat::parse_str(FUEL_GUEST_WAT).unwrap()
}

/// The host APIs the guest imports.
///
/// - `hello(s)` returns `"hello-" + s + "-hello"`, charging one WASM unit
///   per payload byte;
/// - `hello3(s)` returns nothing, and fails on strings ending in `fail`;
/// - `fail()` always fails with `"error"`;
/// - `echo(b)` returns its bytes, charging one WASM unit per payload byte;
/// - `burn(n)` spends `n` EVM units of its own gas quota and returns `n`.
pub fn registry() -> HostApiRegistry {
    let per_byte = GasRule::Dynamic {
        fixed_cost: 0,
        multiplier: 1,
    };
    let mut apis = HostApiRegistry::new();
    apis.add_api(
        TEST_MODULE,
        "test",
        "hello",
        |s: String| format!("hello-{}-hello", s),
        per_byte,
    )
    .unwrap();
    apis.add_api(
        TEST_MODULE,
        "test",
        "hello3",
        |s: String| -> Result<(), String> {
            if s.ends_with("fail") {
                Err(format!("rejected {}", s))
            } else {
                Ok(())
            }
        },
        GasRule::free(),
    )
    .unwrap();
    apis.add_api(
        TEST_MODULE,
        "test",
        "fail",
        || -> Result<String, String> { Err("error".to_string()) },
        GasRule::free(),
    )
    .unwrap();
    apis.add_api(TEST_MODULE, "test", "echo", |b: Vec<u8>| b, per_byte)
        .unwrap();

    let quota = Arc::new(GasQuota::new());
    let charged = Arc::clone(&quota);
    let burn = HostApi::new(
        (move |n: u64| -> Result<u64, GasError> {
            charged.consume(n)?;
            Ok(n)
        })
        .into_host_function(),
        GasRule::free(),
    )
    .with_host_context(quota);
    apis.register(TEST_MODULE, "test", "burn", burn).unwrap();
    apis
}
