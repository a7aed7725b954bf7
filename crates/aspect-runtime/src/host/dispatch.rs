//! Dispatching a guest import to its host function
//!
//! Guests pass only pointers to typed values.  One host call:
//!
//! 1. decodes every argument pointer and sums the body sizes,
//! 2. charges the host API's gas rule for that payload,
//! 3. loads the guest's remaining gas, in EVM units, into the host context,
//! 4. runs the host function,
//! 5. writes the host context's remaining gas back to the guest counter,
//!    keeping the sub-EVM-unit remainder,
//!    or parks the counter at the out-of-gas sentinel when the function
//!    failed with its context drained,
//! 6. writes the result, if any, into guest memory and returns its pointer.
//!
//! Any failure aborts the guest call; the caller turns it into a trap.
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

use super::function::HostApi;
use crate::{
    error::{GasError, RuntimeError},
    gas::{GasMeter, OUT_OF_GAS_SENTINEL},
    memory::{read_value, write_value, LinearMemory, Pointer},
};
use log::debug;
use std::{convert::TryFrom, time::Instant};

/// Serves one guest call of `api` through `ctx`.  `name` is only used for
/// logging.  Returns the result pointer, or `None` for a void import.
pub fn dispatch<C>(
    ctx: &mut C,
    name: &str,
    api: &HostApi,
    args: &[Pointer],
) -> Result<Option<Pointer>, RuntimeError>
where
    C: LinearMemory + GasMeter,
{
    let started = Instant::now();

    let mut values = Vec::with_capacity(args.len());
    let mut payload: i64 = 0;
    for ptr in args {
        let (value, body_len) = read_value(ctx, *ptr)?;
        payload = payload.saturating_add(body_len as i64);
        values.push(value);
    }

    if payload > 0 {
        api.gas_rule.consume(ctx, payload)?;
    }

    let multiplier = ctx.multiplier();
    let remaining = ctx.remaining_wasm_gas()?;
    let remainder = remaining % multiplier;
    api.host_context.set_gas((remaining / multiplier) as u64);

    let outcome = api.function.call(values);

    let left = api.host_context.remaining_gas();
    if outcome.is_err() && left == 0 {
        debug!("host function out of gas: {}", name);
        ctx.set_wasm_gas(OUT_OF_GAS_SENTINEL)?;
        return Err(RuntimeError::OutOfGas);
    }
    let reconciled = i64::try_from(left)
        .ok()
        .and_then(|gas| gas.checked_mul(multiplier))
        .and_then(|gas| gas.checked_add(remainder))
        .ok_or(GasError::Overflow {
            amount: i64::try_from(left).unwrap_or(i64::MAX),
            max: ctx.max_evm_gas(),
        })?;
    ctx.set_wasm_gas(reconciled)?;

    let result = match outcome? {
        Some(value) => Some(write_value(ctx, &value)?),
        None => None,
    };

    debug!(
        "host function done: {} in {:?}, payload {} bytes",
        name,
        started.elapsed(),
        payload
    );
    Ok(result)
}
