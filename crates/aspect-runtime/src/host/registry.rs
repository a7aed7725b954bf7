//! The host API registry
//!
//! Host functions are registered under a module, a namespace and a method
//! name.  Guests import them as `import "<module>" "<namespace>.<method>"`.
//!
//! ## Authors
//!
//! The Aspect Runtime Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Aspect Runtime root directory for
//! information on licensing and copyright.

use super::function::{HostApi, HostFunction, IntoHostFunction};
use crate::{error::RuntimeError, gas::GasRule};
use std::{collections::BTreeMap, sync::Arc};

type Methods = BTreeMap<String, Arc<HostApi>>;
type Namespaces = BTreeMap<String, Methods>;

/// The guest import name of a host function.
pub fn import_name(namespace: &str, method: &str) -> String {
    format!("{}.{}", namespace, method)
}

/// Module -> namespace -> method -> host API.  Cloning is cheap: the host APIs
/// themselves are shared.
#[derive(Clone, Debug, Default)]
pub struct HostApiRegistry {
    modules: BTreeMap<String, Namespaces>,
}

impl HostApiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a native closure under `module`/`namespace`/`method`.
    pub fn add_api<Args, Marker, F>(
        &mut self,
        module: &str,
        namespace: &str,
        method: &str,
        function: F,
        gas_rule: GasRule,
    ) -> Result<(), RuntimeError>
    where
        F: IntoHostFunction<Args, Marker>,
    {
        self.register(
            module,
            namespace,
            method,
            HostApi::new(function.into_host_function(), gas_rule),
        )
    }

    /// Registers a host function described at runtime.
    pub fn add_host_function(
        &mut self,
        module: &str,
        namespace: &str,
        method: &str,
        function: HostFunction,
        gas_rule: GasRule,
    ) -> Result<(), RuntimeError> {
        self.register(module, namespace, method, HostApi::new(function, gas_rule))
    }

    /// Registers a fully assembled host API.  Fails if its signature does not
    /// fit the guest calling convention, or if the name is taken.
    pub fn register(
        &mut self,
        module: &str,
        namespace: &str,
        method: &str,
        api: HostApi,
    ) -> Result<(), RuntimeError> {
        let qualified = format!("{}::{}", module, import_name(namespace, method));
        api.function().signature().check().map_err(|reason| {
            RuntimeError::HostFunctionNotSupported(format!("{}: {}", qualified, reason))
        })?;

        let methods = self
            .modules
            .entry(module.to_string())
            .or_default()
            .entry(namespace.to_string())
            .or_default();
        if methods.contains_key(method) {
            return Err(RuntimeError::DuplicateHostFunction(qualified));
        }
        methods.insert(method.to_string(), Arc::new(api));
        Ok(())
    }

    pub fn get(&self, module: &str, namespace: &str, method: &str) -> Option<&Arc<HostApi>> {
        self.modules.get(module)?.get(namespace)?.get(method)
    }

    /// Every registered API as `(module, namespace, method, api)`, in name
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &str, &Arc<HostApi>)> {
        self.modules.iter().flat_map(|(module, namespaces)| {
            namespaces.iter().flat_map(move |(namespace, methods)| {
                methods.iter().map(move |(method, api)| {
                    (module.as_str(), namespace.as_str(), method.as_str(), api)
                })
            })
        })
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
