//! The execution context of a live Wasmtime instance
//!
//! `HostState` is the store data of one activation.  `Context` borrows a
//! store, either from the runtime itself or from a `Caller` inside a host
//! call, and exposes the instance's linear memory and gas counter through
//! `LinearMemory` and `GasMeter`.
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
    config::{GasMetering, RuntimeConfig},
    error::{GasError, MemoryError},
    gas::{GasMeter, OUT_OF_GAS_SENTINEL},
    memory::{check_bounds, LinearMemory, Pointer, NULL_POINTER},
};
use std::{convert::TryFrom, sync::Arc};
use wasmtime::{Global, Instance, Memory, StoreContextMut, StoreLimits, Trap, Val};

////////////////////////////////////////////////////////////////////////////////
// Store data.
////////////////////////////////////////////////////////////////////////////////

/// Per-activation state stored in the Wasmtime store.
pub(crate) struct HostState {
    pub(crate) limits: StoreLimits,
    /// Set once instantiation has succeeded.
    pub(crate) instance: Option<Instance>,
    /// The guest gas counter, resolved on first use.
    gas_counter: Option<Global>,
    /// Fuel cannot go negative, so an exhausted fuel meter is flagged here.
    fuel_exhausted: bool,
    config: Arc<RuntimeConfig>,
}

impl HostState {
    pub(crate) fn new(limits: StoreLimits, config: Arc<RuntimeConfig>) -> Self {
        Self {
            limits,
            instance: None,
            gas_counter: None,
            fuel_exhausted: false,
            config,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// The execution context.
////////////////////////////////////////////////////////////////////////////////

pub(crate) struct Context<'a> {
    store: StoreContextMut<'a, HostState>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(store: StoreContextMut<'a, HostState>) -> Self {
        Self { store }
    }

    fn instance(&self) -> Result<Instance, MemoryError> {
        self.store
            .data()
            .instance
            .ok_or_else(|| MemoryError::Engine("instance is not ready".to_string()))
    }

    fn memory(&mut self) -> Result<Memory, MemoryError> {
        let instance = self.instance()?;
        let config = Arc::clone(&self.store.data().config);
        instance
            .get_memory(&mut self.store, &config.memory_export)
            .ok_or_else(|| MemoryError::NoMemoryExport(config.memory_export.clone()))
    }

    fn gas_counter(&mut self) -> Result<Global, GasError> {
        if let Some(global) = self.store.data().gas_counter {
            return Ok(global);
        }
        let instance = self
            .instance()
            .map_err(|e| GasError::CounterUnavailable(e.to_string()))?;
        let config = Arc::clone(&self.store.data().config);
        let global = instance
            .get_global(&mut self.store, &config.gas.counter_global)
            .ok_or_else(|| {
                GasError::CounterUnavailable(format!(
                    "guest does not export global '{}'",
                    config.gas.counter_global
                ))
            })?;
        self.store.data_mut().gas_counter = Some(global);
        Ok(global)
    }

    /// Marks the meter as exhausted if `error` is a fuel trap.
    pub(crate) fn note_trap(&mut self, error: &anyhow::Error) -> bool {
        let out_of_fuel = matches!(error.downcast_ref::<Trap>(), Some(Trap::OutOfFuel));
        if out_of_fuel {
            self.store.data_mut().fuel_exhausted = true;
        }
        out_of_fuel
    }
}

impl<'a> LinearMemory for Context<'a> {
    fn memory_size(&mut self) -> Result<usize, MemoryError> {
        let memory = self.memory()?;
        Ok(memory.data_size(&self.store))
    }

    fn read(&mut self, ptr: Pointer, size: i32) -> Result<Vec<u8>, MemoryError> {
        let memory = self.memory()?;
        let start = check_bounds(ptr as i64, size as i64, memory.data_size(&self.store))?;
        let mut buffer = vec![0u8; size as usize];
        memory
            .read(&self.store, start, &mut buffer)
            .map_err(|e| MemoryError::Engine(e.to_string()))?;
        Ok(buffer)
    }

    fn write(&mut self, ptr: Pointer, bytes: &[u8]) -> Result<(), MemoryError> {
        let memory = self.memory()?;
        let start = check_bounds(
            ptr as i64,
            bytes.len() as i64,
            memory.data_size(&self.store),
        )?;
        memory
            .write(&mut self.store, start, bytes)
            .map_err(|e| MemoryError::Engine(e.to_string()))
    }

    fn allocate(&mut self, size: i32) -> Result<Pointer, MemoryError> {
        let instance = self.instance()?;
        let config = Arc::clone(&self.store.data().config);
        let allocate = instance
            .get_typed_func::<i32, i32>(&mut self.store, &config.allocator_export)
            .map_err(|_| MemoryError::NoAllocator(config.allocator_export.clone()))?;
        let ptr = match allocate.call(&mut self.store, size) {
            Ok(ptr) => ptr,
            Err(error) => {
                self.note_trap(&error);
                return Err(MemoryError::Engine(format!("{:#}", error)));
            }
        };
        if ptr == NULL_POINTER {
            return Err(MemoryError::AllocationFailed(size));
        }
        Ok(ptr)
    }
}

impl<'a> GasMeter for Context<'a> {
    fn multiplier(&self) -> i64 {
        self.store.data().config.gas.multiplier
    }

    fn wasm_gas_counter(&mut self) -> Result<i64, GasError> {
        match self.store.data().config.gas.metering {
            GasMetering::GlobalCounter => {
                let global = self.gas_counter()?;
                global.get(&mut self.store).i64().ok_or_else(|| {
                    GasError::CounterUnavailable("gas counter is not an i64".to_string())
                })
            }
            GasMetering::Fuel => {
                if self.store.data().fuel_exhausted {
                    return Ok(OUT_OF_GAS_SENTINEL);
                }
                let fuel = self
                    .store
                    .get_fuel()
                    .map_err(|e| GasError::CounterUnavailable(e.to_string()))?;
                Ok(i64::try_from(fuel).unwrap_or(i64::MAX))
            }
        }
    }

    fn store_wasm_gas_counter(&mut self, gas: i64) -> Result<(), GasError> {
        match self.store.data().config.gas.metering {
            GasMetering::GlobalCounter => {
                let global = self.gas_counter()?;
                global
                    .set(&mut self.store, Val::I64(gas))
                    .map_err(|e| GasError::CounterUnavailable(e.to_string()))
            }
            GasMetering::Fuel => {
                self.store.data_mut().fuel_exhausted = gas < 0;
                self.store
                    .set_fuel(gas.max(0) as u64)
                    .map_err(|e| GasError::CounterUnavailable(e.to_string()))
            }
        }
    }
}
