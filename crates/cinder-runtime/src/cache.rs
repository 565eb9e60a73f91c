//! Thread-safe compiled-module cache keyed by deployment identifier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use uuid::Uuid;
use wasmtime::Module;

use crate::error::{Result, SandboxError};

/// Maps deployment identifiers to compiled module handles.
///
/// Readers share the lock and never block each other; `add` and `remove`
/// take the write side. A `Module` is an immutable handle that is cheap to
/// clone and safe to instantiate from many threads at once, so the cache
/// hands out clones rather than guarded references.
///
/// The cache is shared across every in-flight request, so a poisoned lock
/// (a panic elsewhere while holding it) surfaces as an error on the
/// affected request rather than panicking and taking the host with it.
#[derive(Default)]
pub struct ModuleCache {
    modules: RwLock<HashMap<Uuid, Module>>,
    // Per-deployment compile gates for get_or_insert_with; entries are
    // transient and removed once the compile completes.
    in_flight: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

fn poisoned<G>(e: PoisonError<G>) -> SandboxError {
    SandboxError::Internal(format!("module cache lock poisoned: {e}"))
}

impl ModuleCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a handle exists for `id`.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the cache lock is poisoned.
    pub fn has(&self, id: Uuid) -> Result<bool> {
        Ok(self.modules.read().map_err(poisoned)?.contains_key(&id))
    }

    /// The handle for `id`, if present.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the cache lock is poisoned.
    pub fn get(&self, id: Uuid) -> Result<Option<Module>> {
        Ok(self.modules.read().map_err(poisoned)?.get(&id).cloned())
    }

    /// Insert a handle for `id`. Idempotent; overwriting an existing entry
    /// drops the prior handle.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the cache lock is poisoned.
    pub fn add(&self, id: Uuid, module: Module) -> Result<()> {
        self.modules.write().map_err(poisoned)?.insert(id, module);
        Ok(())
    }

    /// Remove the handle for `id`, dropping it. A no-op on absent keys.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the cache lock is poisoned.
    pub fn remove(&self, id: Uuid) -> Result<()> {
        self.modules.write().map_err(poisoned)?.remove(&id);
        Ok(())
    }

    /// Fetch the handle for `id`, compiling and inserting it on a miss.
    ///
    /// At most one compilation per identifier is in flight at a time;
    /// concurrent first requests for the same deployment wait on the
    /// winner's result instead of compiling again. Distinct identifiers
    /// never serialize against each other.
    ///
    /// # Errors
    ///
    /// Propagates the compile closure's error (nothing is inserted then),
    /// or an internal error if a cache lock is poisoned.
    pub fn get_or_insert_with<F>(&self, id: Uuid, compile: F) -> Result<Module>
    where
        F: FnOnce() -> Result<Module>,
    {
        if let Some(module) = self.get(id)? {
            return Ok(module);
        }

        let gate = {
            let mut in_flight = self.in_flight.lock().map_err(poisoned)?;
            Arc::clone(in_flight.entry(id).or_default())
        };
        let _guard = gate.lock().map_err(poisoned)?;

        // Someone else may have compiled while we waited on the gate.
        if let Some(module) = self.get(id)? {
            return Ok(module);
        }

        let result = compile();
        if let Ok(ref module) = result {
            self.add(id, module.clone())?;
        }
        self.in_flight.lock().map_err(poisoned)?.remove(&id);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wasmtime::Engine;

    fn trivial_module(engine: &Engine) -> Module {
        Module::new(engine, "(module)").unwrap()
    }

    #[test]
    fn add_get_has_remove() {
        let engine = Engine::default();
        let cache = ModuleCache::new();
        let id = Uuid::new_v4();

        assert!(!cache.has(id).unwrap());
        assert!(cache.get(id).unwrap().is_none());

        cache.add(id, trivial_module(&engine)).unwrap();
        assert!(cache.has(id).unwrap());
        assert!(cache.get(id).unwrap().is_some());

        cache.remove(id).unwrap();
        assert!(!cache.has(id).unwrap());
    }

    #[test]
    fn add_is_idempotent_and_overwrites() {
        let engine = Engine::default();
        let cache = ModuleCache::new();
        let id = Uuid::new_v4();

        let module = trivial_module(&engine);
        cache.add(id, module.clone()).unwrap();
        cache.add(id, module).unwrap();
        assert!(cache.has(id).unwrap());

        // Overwriting with a different handle is permitted.
        cache.add(id, trivial_module(&engine)).unwrap();
        assert!(cache.has(id).unwrap());
    }

    #[test]
    fn remove_absent_is_noop() {
        let cache = ModuleCache::new();
        cache.remove(Uuid::new_v4()).unwrap();
    }

    #[test]
    fn get_or_insert_compiles_once() {
        let engine = Engine::default();
        let cache = ModuleCache::new();
        let id = Uuid::new_v4();
        let compiles = AtomicUsize::new(0);

        for _ in 0..3 {
            let module = cache
                .get_or_insert_with(id, || {
                    compiles.fetch_add(1, Ordering::SeqCst);
                    Ok(trivial_module(&engine))
                })
                .unwrap();
            drop(module);
        }
        assert_eq!(compiles.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn get_or_insert_single_flight_under_contention() {
        let engine = Engine::default();
        let cache = Arc::new(ModuleCache::new());
        let id = Uuid::new_v4();
        let compiles = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let cache = Arc::clone(&cache);
                let compiles = Arc::clone(&compiles);
                let engine = engine.clone();
                scope.spawn(move || {
                    cache
                        .get_or_insert_with(id, || {
                            compiles.fetch_add(1, Ordering::SeqCst);
                            // Widen the race window a little.
                            std::thread::sleep(std::time::Duration::from_millis(10));
                            Ok(trivial_module(&engine))
                        })
                        .unwrap();
                });
            }
        });

        assert_eq!(compiles.load(Ordering::SeqCst), 1);
        assert!(cache.has(id).unwrap());
    }

    #[test]
    fn failed_compile_inserts_nothing() {
        let cache = ModuleCache::new();
        let id = Uuid::new_v4();
        let result = cache.get_or_insert_with(id, || {
            Err(SandboxError::Compile(anyhow::anyhow!("bad")))
        });
        assert!(result.is_err());
        assert!(!cache.has(id).unwrap());
    }

    #[test]
    fn poisoned_lock_is_an_error_not_a_panic() {
        let engine = Engine::default();
        let cache = Arc::new(ModuleCache::new());
        let id = Uuid::new_v4();

        // Poison the modules lock by panicking while holding the write side.
        let poisoner = Arc::clone(&cache);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.modules.write().unwrap();
            panic!("poison");
        })
        .join();

        assert!(matches!(
            cache.has(id),
            Err(SandboxError::Internal(_))
        ));
        assert!(matches!(
            cache.add(id, trivial_module(&engine)),
            Err(SandboxError::Internal(_))
        ));
        assert!(matches!(
            cache.get_or_insert_with(id, || Ok(trivial_module(&engine))),
            Err(SandboxError::Internal(_))
        ));
    }
}
