//! Linking host APIs into a Wasmtime linker
//!
//! Every registered host API becomes one import taking one `i32` pointer
//! per parameter and returning an `i32` result pointer, or nothing for
//! side-effect-only functions.
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

use super::context::{Context, HostState};
use crate::{
    error::RuntimeError,
    host::{dispatch::dispatch, function::HostApi, registry::import_name, HostApiRegistry},
    memory::{Pointer, NULL_POINTER},
};
use log::debug;
use std::sync::Arc;
use wasmtime::{AsContextMut, Caller, Linker};

/// Module and name of the abort hook emitted by AssemblyScript guests.
const ABORT_MODULE: &str = "env";
const ABORT_NAME: &str = "abort";

/// Defines every host API of `apis` in `linker`.
pub(crate) fn link_host_apis(
    linker: &mut Linker<HostState>,
    apis: &HostApiRegistry,
) -> Result<(), RuntimeError> {
    for (module, namespace, method, api) in apis.iter() {
        let import = import_name(namespace, method);
        link_api(linker, module, &import, Arc::clone(api)).map_err(|e| {
            RuntimeError::Link(format!("cannot link {}::{}: {:#}", module, import, e))
        })?;
    }
    Ok(())
}

fn link_api(
    linker: &mut Linker<HostState>,
    module: &str,
    import: &str,
    api: Arc<HostApi>,
) -> anyhow::Result<()> {
    let name = format!("{}::{}", module, import);
    let arity = api.function().signature().params.len();
    let returns = api.function().signature().returns_value();

    macro_rules! wrap {
        (returns $($p:ident)*) => {{
            let name = name.clone();
            let api = Arc::clone(&api);
            linker.func_wrap(
                module,
                import,
                move |mut caller: Caller<'_, HostState> $(, $p: Pointer)*| -> anyhow::Result<Pointer> {
                    let mut ctx = Context::new(caller.as_context_mut());
                    let result = dispatch(&mut ctx, &name, &api, &[$($p),*])
                        .map_err(anyhow::Error::new)?;
                    Ok(result.unwrap_or(NULL_POINTER))
                },
            )
        }};
        (void $($p:ident)*) => {{
            let name = name.clone();
            let api = Arc::clone(&api);
            linker.func_wrap(
                module,
                import,
                move |mut caller: Caller<'_, HostState> $(, $p: Pointer)*| -> anyhow::Result<()> {
                    let mut ctx = Context::new(caller.as_context_mut());
                    dispatch(&mut ctx, &name, &api, &[$($p),*]).map_err(anyhow::Error::new)?;
                    Ok(())
                },
            )
        }};
    }

    match (arity, returns) {
        (0, true) => wrap!(returns),
        (1, true) => wrap!(returns a),
        (2, true) => wrap!(returns a b),
        (3, true) => wrap!(returns a b c),
        (0, false) => wrap!(void),
        (1, false) => wrap!(void a),
        (2, false) => wrap!(void a b),
        (3, false) => wrap!(void a b c),
        _ => {
            return Err(anyhow::anyhow!(
                "unsupported signature {}",
                api.function().signature()
            ))
        }
    }?;
    Ok(())
}

/// Defines `env.abort`, which AssemblyScript guests import to report a
/// failed assertion before trapping.
pub(crate) fn link_abort(linker: &mut Linker<HostState>) -> Result<(), RuntimeError> {
    linker
        .func_wrap(
            ABORT_MODULE,
            ABORT_NAME,
            |_caller: Caller<'_, HostState>, message: i32, file: i32, line: i32, column: i32| {
                debug!(
                    "guest abort: message at {}, file at {}, line {}, column {}",
                    message, file, line, column
                );
            },
        )
        .map_err(|e| RuntimeError::Link(format!("cannot link env::abort: {:#}", e)))?;
    Ok(())
}
