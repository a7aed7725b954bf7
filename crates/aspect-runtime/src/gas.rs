//! The gas bridge
//!
//! Two metering domains meet here: the outer unit ("EVM gas") that callers
//! budget in, and the inner unit ("WASM gas") that the guest burns.  One EVM
//! gas unit is worth `multiplier` WASM gas units.  Inside a call the WASM
//! counter is the source of truth, and EVM amounts are always derived from it
//! by integer division.
//!
//! A counter that has run dry is parked at `OUT_OF_GAS_SENTINEL` so that
//! every later read reports `GasError::OutOfGas`.
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

use crate::error::GasError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter value of an exhausted meter.
pub const OUT_OF_GAS_SENTINEL: i64 = -1;

////////////////////////////////////////////////////////////////////////////////
// The meter interface.
////////////////////////////////////////////////////////////////////////////////

/// A WASM gas counter with its EVM conversion.  Implementors provide raw
/// access to the counter; the accounting rules are provided here.
pub trait GasMeter {
    /// WASM gas units per EVM gas unit.  Always positive.
    fn multiplier(&self) -> i64;

    /// Reads the raw counter, sentinel included.
    fn wasm_gas_counter(&mut self) -> Result<i64, GasError>;

    /// Overwrites the raw counter.
    fn store_wasm_gas_counter(&mut self, gas: i64) -> Result<(), GasError>;

    /// Largest EVM amount whose WASM equivalent fits in an `i64`.
    fn max_evm_gas(&self) -> i64 {
        i64::MAX / self.multiplier()
    }

    fn remaining_wasm_gas(&mut self) -> Result<i64, GasError> {
        match self.wasm_gas_counter()? {
            gas if gas < 0 => Err(GasError::OutOfGas),
            gas => Ok(gas),
        }
    }

    fn remaining_evm_gas(&mut self) -> Result<i64, GasError> {
        Ok(self.remaining_wasm_gas()? / self.multiplier())
    }

    /// Burns `gas` WASM units.  Burning more than what is left exhausts the
    /// meter.
    fn consume_wasm_gas(&mut self, gas: i64) -> Result<(), GasError> {
        let left = self.remaining_wasm_gas()?;
        if gas < 0 || left < gas {
            self.store_wasm_gas_counter(OUT_OF_GAS_SENTINEL)?;
            return Err(GasError::OutOfGas);
        }
        self.store_wasm_gas_counter(left - gas)
    }

    /// Sets the WASM counter.  A negative amount exhausts the meter.
    fn set_wasm_gas(&mut self, gas: i64) -> Result<(), GasError> {
        if gas < 0 {
            return self.store_wasm_gas_counter(OUT_OF_GAS_SENTINEL);
        }
        let max = self.max_evm_gas() * self.multiplier();
        if gas > max {
            return Err(GasError::Overflow { amount: gas, max });
        }
        self.store_wasm_gas_counter(gas)
    }

    /// Replaces whatever is left with `gas` EVM units.
    fn fund_evm_gas(&mut self, gas: i64) -> Result<(), GasError> {
        let max = self.max_evm_gas();
        if gas < 0 || gas > max {
            return Err(GasError::Overflow { amount: gas, max });
        }
        self.store_wasm_gas_counter(gas * self.multiplier())
    }

    /// Adds `gas` EVM units on top of what is left.  An exhausted meter
    /// restarts from zero.
    fn add_evm_gas(&mut self, gas: i64) -> Result<(), GasError> {
        let max = self.max_evm_gas();
        if gas < 0 || gas > max {
            return Err(GasError::Overflow { amount: gas, max });
        }
        let current = self.wasm_gas_counter()?.max(0);
        let total = gas
            .checked_mul(self.multiplier())
            .and_then(|g| g.checked_add(current))
            .filter(|total| *total <= max * self.multiplier())
            .ok_or(GasError::Overflow { amount: gas, max })?;
        self.store_wasm_gas_counter(total)
    }
}

/// A plain host-side gas meter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GasCounter {
    counter: i64,
    multiplier: i64,
}

impl GasCounter {
    /// An empty meter.  `multiplier` must be positive.
    pub fn new(multiplier: i64) -> Self {
        assert!(multiplier > 0, "gas multiplier must be positive");
        Self {
            counter: 0,
            multiplier,
        }
    }
}

impl GasMeter for GasCounter {
    #[inline]
    fn multiplier(&self) -> i64 {
        self.multiplier
    }

    #[inline]
    fn wasm_gas_counter(&mut self) -> Result<i64, GasError> {
        Ok(self.counter)
    }

    #[inline]
    fn store_wasm_gas_counter(&mut self, gas: i64) -> Result<(), GasError> {
        self.counter = gas;
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Per host-call charging rules.
////////////////////////////////////////////////////////////////////////////////

/// What a host call costs on top of its own internal accounting, charged in
/// WASM units against the payload the guest passed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GasRule {
    /// A fixed cost per call.
    Static { cost: i64 },
    /// `fixed_cost + payload_bytes * multiplier`.
    Dynamic { fixed_cost: i64, multiplier: i64 },
}

impl GasRule {
    pub fn free() -> Self {
        GasRule::Static { cost: 0 }
    }

    /// Cost of a call carrying `payload` bytes, or `None` if it does not fit
    /// in an `i64`.
    pub fn cost(&self, payload: i64) -> Option<i64> {
        match *self {
            GasRule::Static { cost } => Some(cost),
            GasRule::Dynamic {
                fixed_cost,
                multiplier,
            } => payload
                .checked_mul(multiplier)
                .and_then(|c| c.checked_add(fixed_cost)),
        }
    }

    /// Charges a call carrying `payload` bytes against `meter`.
    pub fn consume(&self, meter: &mut dyn GasMeter, payload: i64) -> Result<(), GasError> {
        match self.cost(payload) {
            Some(cost) => meter.consume_wasm_gas(cost),
            None => {
                meter.store_wasm_gas_counter(OUT_OF_GAS_SENTINEL)?;
                Err(GasError::OutOfGas)
            }
        }
    }
}

impl Default for GasRule {
    fn default() -> Self {
        GasRule::free()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Host-side gas context.
////////////////////////////////////////////////////////////////////////////////

/// The EVM gas budget a host function sees while it runs.  Before the call
/// it is loaded with what the guest has left; whatever it holds afterwards
/// is written back to the guest counter.
pub trait HostContext: Send + Sync {
    fn set_gas(&self, gas: u64);

    fn remaining_gas(&self) -> u64;
}

/// The default `HostContext`: an atomic EVM gas quota that host functions can
/// charge their own work against.
#[derive(Debug, Default)]
pub struct GasQuota {
    gas: AtomicU64,
}

impl GasQuota {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charges `gas` EVM units.  On failure the quota is drained.
    pub fn consume(&self, gas: u64) -> Result<(), GasError> {
        self.gas
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(gas)
            })
            .map(|_| ())
            .map_err(|_| {
                self.gas.store(0, Ordering::SeqCst);
                GasError::OutOfGas
            })
    }
}

impl HostContext for GasQuota {
    fn set_gas(&self, gas: u64) {
        self.gas.store(gas, Ordering::SeqCst);
    }

    fn remaining_gas(&self) -> u64 {
        self.gas.load(Ordering::SeqCst)
    }
}
