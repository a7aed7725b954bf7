//! A pool of reusable runtimes
//!
//! Compiling an Aspect is far more expensive than instantiating it again, so
//! runtimes are cached by engine kind and bytecode.  A runtime taken from the
//! pool belongs to its caller until it is handed back; a cached runtime is
//! always re-instantiated before it is handed out, so no guest state leaks
//! from one checkout to the next.
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
    config::RuntimeConfig,
    engines::common::{AspectRuntime, EngineKind},
    error::RuntimeError,
    host::HostApiRegistry,
    new_aspect_runtime,
};
use log::{debug, warn};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::{num::NonZeroUsize, sync::Mutex};

/// The pool key of `code` run on `kind`: lowercase hex SHA-256 over the
/// engine name followed by the bytecode.
pub fn pool_key(kind: EngineKind, code: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.name().as_bytes());
    hasher.update(code);
    hex::encode(hasher.finalize())
}

/// An LRU cache of idle runtimes.  Misses always build a new runtime; only
/// the number of idle runtimes kept for reuse is bounded.
pub struct RuntimePool {
    config: RuntimeConfig,
    cache: Mutex<LruCache<String, Box<dyn AspectRuntime>>>,
}

impl RuntimePool {
    /// A pool keeping at most `capacity` idle runtimes, at least one.
    pub fn new(capacity: usize, config: RuntimeConfig) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Checks out a runtime for `code`, reusing an idle one if possible.
    pub fn runtime(
        &self,
        kind: EngineKind,
        code: &[u8],
        apis: &HostApiRegistry,
    ) -> Result<(String, Box<dyn AspectRuntime>), RuntimeError> {
        self.runtime_with_refresh(kind, code, apis, false)
    }

    /// As `runtime`, but with `force_refresh` set any idle runtime for `code`
    /// is destroyed and a new one is built.
    pub fn runtime_with_refresh(
        &self,
        kind: EngineKind,
        code: &[u8],
        apis: &HostApiRegistry,
        force_refresh: bool,
    ) -> Result<(String, Box<dyn AspectRuntime>), RuntimeError> {
        let key = pool_key(kind, code);
        let cached = self.cache.lock()?.pop(&key);

        if let Some(runtime) = cached {
            if force_refresh {
                debug!("pool refresh: {}", key);
                runtime.destroy();
            } else {
                match runtime.reset_store(apis) {
                    Ok(()) => {
                        debug!("pool hit: {}", key);
                        return Ok((key, runtime));
                    }
                    Err(e) => {
                        warn!("pooled runtime {} failed to reset, rebuilding: {}", key, e);
                        runtime.destroy();
                    }
                }
            }
        } else {
            debug!("pool miss: {}", key);
        }

        let runtime = new_aspect_runtime(kind, code, apis, &self.config)?;
        Ok((key, runtime))
    }

    /// Hands a runtime back for reuse.  Its live instance is released first.
    /// Whatever the insert displaces, the least recently returned runtime or
    /// an older runtime under the same key, is destroyed.
    pub fn return_runtime(&self, key: String, runtime: Box<dyn AspectRuntime>) {
        runtime.release_store();
        let displaced = match self.cache.lock() {
            Ok(mut cache) => cache.push(key, runtime),
            Err(_) => {
                warn!("pool lock poisoned, dropping returned runtime {}", key);
                runtime.destroy();
                return;
            }
        };
        if let Some((evicted, old)) = displaced {
            debug!("pool evict: {}", evicted);
            old.destroy();
        }
    }

    /// Number of idle runtimes.
    pub fn len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.cache
            .lock()
            .map(|cache| cache.cap().get())
            .unwrap_or(0)
    }

    /// Whether an idle runtime is cached under `key`.  Does not touch the
    /// LRU order.
    pub fn contains(&self, key: &str) -> bool {
        self.cache
            .lock()
            .map(|cache| cache.contains(key))
            .unwrap_or(false)
    }
}
