//! An implementation of the Aspect runtime on top of Wasmtime
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

pub(crate) mod context;
mod link;
pub(crate) mod validator;

use self::context::{Context, HostState};
use crate::{
    codec::Value,
    config::{GasMetering, RuntimeConfig},
    engines::common::{AspectRuntime, CallOutput, EngineKind, LifecycleState},
    error::{CallError, RuntimeError},
    gas::GasMeter,
    host::HostApiRegistry,
    memory::{read_value, write_value, Pointer, NULL_POINTER},
};
use log::{debug, info};
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};
use wasmtime::{
    AsContextMut, Config, Engine, Instance, Linker, Module, OptLevel, Store, StoreLimitsBuilder,
    Val, ValType,
};

/// Most linear memories or tables one store may create.
const MAX_STORE_INSTANCES: usize = 100;

////////////////////////////////////////////////////////////////////////////////
// Engine configuration.
////////////////////////////////////////////////////////////////////////////////

/// The Wasmtime configuration for `config`.  Proposals with non-deterministic
/// or shared-state semantics are switched off.
pub(crate) fn engine_config(config: &RuntimeConfig) -> Config {
    let mut engine_config = Config::new();
    engine_config
        .wasm_simd(false)
        .wasm_relaxed_simd(false)
        .wasm_threads(false)
        .wasm_multi_memory(false)
        .wasm_multi_value(true)
        .cranelift_opt_level(OptLevel::SpeedAndSize)
        .consume_fuel(config.gas.metering == GasMetering::Fuel)
        .static_memory_maximum_size(config.static_memory_maximum_size)
        .static_memory_guard_size(config.memory_guard_size)
        .dynamic_memory_guard_size(config.memory_guard_size)
        .dynamic_memory_reserved_for_growth(config.dynamic_memory_reserved_for_growth);
    engine_config
}

////////////////////////////////////////////////////////////////////////////////
// Compiled code and live instances.
////////////////////////////////////////////////////////////////////////////////

struct Compiled {
    engine: Engine,
    module: Module,
    apis: HostApiRegistry,
}

impl Compiled {
    fn new(
        code: &[u8],
        apis: &HostApiRegistry,
        config: &RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        let engine = Engine::new(&engine_config(config))
            .map_err(|e| RuntimeError::Compilation(format!("{:#}", e)))?;
        let module =
            Module::new(&engine, code).map_err(|e| RuntimeError::Compilation(format!("{:#}", e)))?;
        Ok(Self {
            engine,
            module,
            apis: apis.clone(),
        })
    }

    /// Links the host APIs and instantiates the module in a fresh store.
    fn instantiate(&self, config: &Arc<RuntimeConfig>) -> Result<Session, RuntimeError> {
        let mut linker = Linker::new(&self.engine);
        link::link_host_apis(&mut linker, &self.apis)?;
        link::link_abort(&mut linker)?;

        let limits = StoreLimitsBuilder::new()
            .memory_size(config.max_memory_size)
            .memories(MAX_STORE_INSTANCES)
            .tables(MAX_STORE_INSTANCES)
            .instances(MAX_STORE_INSTANCES)
            .build();
        let mut store = Store::new(&self.engine, HostState::new(limits, Arc::clone(config)));
        store.limiter(|state| &mut state.limits);
        if config.gas.metering == GasMetering::Fuel {
            store
                .set_fuel(0)
                .map_err(|e| RuntimeError::GasUnavailable(e.to_string()))?;
        }

        let instance = linker
            .instantiate(&mut store, &self.module)
            .map_err(|e| RuntimeError::Link(format!("{:#}", e)))?;
        store.data_mut().instance = Some(instance);
        Ok(Session { store, instance })
    }
}

/// One live instance and its store.
struct Session {
    store: Store<HostState>,
    instance: Instance,
}

impl Session {
    /// Runs `method`, returning its result and the EVM gas left.
    fn call(
        &mut self,
        config: &RuntimeConfig,
        method: &str,
        gas: i64,
        args: &[Value],
    ) -> Result<CallOutput, CallError> {
        let outcome = self.run(config, method, gas, args);
        let mut ctx = Context::new(self.store.as_context_mut());
        let error = match outcome {
            Ok(value) => {
                let gas_remaining = ctx
                    .remaining_evm_gas()
                    .map_err(|e| CallError::new(e.into(), 0))?;
                return Ok(CallOutput {
                    value,
                    gas_remaining,
                });
            }
            Err(error) => classify(&mut ctx, error),
        };
        let gas_remaining = match error {
            RuntimeError::OutOfGas => 0,
            _ => ctx.remaining_evm_gas().unwrap_or(0),
        };
        Err(CallError::new(error, gas_remaining))
    }

    fn run(
        &mut self,
        config: &RuntimeConfig,
        method: &str,
        gas: i64,
        args: &[Value],
    ) -> Result<Option<Value>, anyhow::Error> {
        Context::new(self.store.as_context_mut())
            .fund_evm_gas(gas)
            .map_err(|e| anyhow::Error::new(RuntimeError::from(e)))?;

        if let Some(init) = self.instance.get_func(&mut self.store, &config.init_export) {
            let mut results = vec![Val::I32(0); init.ty(&self.store).results().len()];
            init.call(&mut self.store, &[], &mut results)?;
        }

        let func = self
            .instance
            .get_func(&mut self.store, method)
            .ok_or_else(|| RuntimeError::MethodNotFound(method.to_string()))?;
        let ty = func.ty(&self.store);
        if ty.params().len() != args.len() || ty.params().any(|p| !matches!(p, ValType::I32)) {
            return Err(RuntimeError::BadArguments(format!(
                "{} takes {} pointer arguments, got {} values",
                method,
                ty.params().len(),
                args.len()
            ))
            .into());
        }
        if ty.results().len() > 1 || ty.results().any(|r| !matches!(r, ValType::I32)) {
            return Err(RuntimeError::BadArguments(format!(
                "{} must return at most one pointer",
                method
            ))
            .into());
        }

        let mut params = Vec::with_capacity(args.len());
        for arg in args {
            let mut ctx = Context::new(self.store.as_context_mut());
            params.push(Val::I32(write_value(&mut ctx, arg)?));
        }
        let mut results = vec![Val::I32(NULL_POINTER); ty.results().len()];
        func.call(&mut self.store, &params, &mut results)?;

        let ptr: Pointer = match results.first() {
            Some(Val::I32(ptr)) => *ptr,
            _ => NULL_POINTER,
        };
        if ptr == NULL_POINTER {
            return Ok(None);
        }
        let mut ctx = Context::new(self.store.as_context_mut());
        Ok(Some(read_value(&mut ctx, ptr)?.0))
    }
}

/// Sorts a failed call into the runtime's error taxonomy.
fn classify(ctx: &mut Context<'_>, error: anyhow::Error) -> RuntimeError {
    if ctx.note_trap(&error) {
        return RuntimeError::OutOfGas;
    }
    if let Some(runtime_error) = error.downcast_ref::<RuntimeError>() {
        return match runtime_error {
            RuntimeError::OutOfGas => RuntimeError::OutOfGas,
            RuntimeError::MethodNotFound(_)
            | RuntimeError::BadArguments(_)
            | RuntimeError::GasOverflow(_)
            | RuntimeError::Decode(_) => runtime_error.clone(),
            other => {
                if ctx.remaining_wasm_gas().is_err() {
                    RuntimeError::OutOfGas
                } else {
                    RuntimeError::ExecutionTrap(other.to_string())
                }
            }
        };
    }
    // Instrumented guests trap on their own once the counter goes negative.
    if matches!(ctx.wasm_gas_counter(), Ok(gas) if gas < 0) {
        return RuntimeError::OutOfGas;
    }
    RuntimeError::ExecutionTrap(error.root_cause().to_string())
}

////////////////////////////////////////////////////////////////////////////////
// The runtime.
////////////////////////////////////////////////////////////////////////////////

struct Inner {
    compiled: Option<Compiled>,
    session: Option<Session>,
}

/// A compiled Aspect with at most one live instance.
pub struct WasmtimeRuntime {
    config: Arc<RuntimeConfig>,
    inner: Mutex<Inner>,
}

impl WasmtimeRuntime {
    /// Compiles `code`, links `apis` and instantiates the result.
    pub fn new(
        code: &[u8],
        apis: &HostApiRegistry,
        config: &RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        config.validate()?;
        let started = Instant::now();
        let config = Arc::new(config.clone());
        let compiled = Compiled::new(code, apis, &config)?;
        let session = compiled.instantiate(&config)?;
        info!(
            "Wasmtime runtime ready: {} bytes of code, {} host APIs, in {:?}",
            code.len(),
            apis.len(),
            started.elapsed()
        );
        Ok(Self {
            config,
            inner: Mutex::new(Inner {
                compiled: Some(compiled),
                session: Some(session),
            }),
        })
    }
}

impl AspectRuntime for WasmtimeRuntime {
    fn call(&self, method: &str, gas: i64, args: &[Value]) -> Result<CallOutput, CallError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| CallError::new(RuntimeError::FailedLockEngine, 0))?;
        if inner.compiled.is_none() {
            return Err(CallError::new(RuntimeError::Destroyed, 0));
        }
        let session = inner
            .session
            .as_mut()
            .ok_or_else(|| CallError::new(RuntimeError::NotInstantiated, 0))?;
        let started = Instant::now();
        let result = session.call(&self.config, method, gas, args);
        debug!(
            "call {} done in {:?}: {}",
            method,
            started.elapsed(),
            match &result {
                Ok(output) => format!("ok, {} gas left", output.gas_remaining),
                Err(e) => e.to_string(),
            }
        );
        result
    }

    fn reset_store(&self, apis: &HostApiRegistry) -> Result<(), RuntimeError> {
        let mut guard = self.inner.lock()?;
        let inner = &mut *guard;
        let compiled = inner.compiled.as_mut().ok_or(RuntimeError::Destroyed)?;
        inner.session = None;
        compiled.apis = apis.clone();
        inner.session = Some(compiled.instantiate(&self.config)?);
        Ok(())
    }

    fn release_store(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.session = None;
    }

    fn destroy(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.session = None;
        inner.compiled = None;
    }

    fn state(&self) -> LifecycleState {
        match self.inner.lock() {
            Ok(inner) => match (&inner.compiled, &inner.session) {
                (None, _) => LifecycleState::Destroyed,
                (Some(_), None) => LifecycleState::Uninstantiated,
                (Some(_), Some(_)) => LifecycleState::Ready,
            },
            Err(_) => LifecycleState::Destroyed,
        }
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Wasmtime
    }
}
