//! Engine selector and the shared wasm host.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use wasmtime::{Config, Engine, Module, OptLevel};

use crate::cache::ModuleCache;
use crate::caps::CapabilityConfig;
use crate::error::{Result, SandboxError};
use crate::sandbox::{Sandbox, SandboxArgs};

/// How a deployment's blob is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// The blob is the guest module itself.
    Native,
    /// The blob is source text; the guest module is the host-provided
    /// language runtime, and the source is injected as `-e <source>`.
    Scripted,
}

/// Options for building a [`WasmHost`].
#[derive(Default)]
pub struct RuntimeOptions {
    /// Bytes of the fixed language-runtime module used by scripted
    /// deployments. Scripted sandboxes fail with a config error when
    /// this is absent.
    pub script_runtime: Option<Vec<u8>>,
    /// Capability surface granted to every sandbox.
    pub caps: CapabilityConfig,
}

/// The long-lived execution substrate: one compilation engine, the shared
/// module cache, the scripted-runtime module, and capability defaults.
///
/// Compiled modules are bound to the engine that built them, so the
/// engine is shared across requests and all per-request state lives in
/// each sandbox's store.
pub struct WasmHost {
    engine: Engine,
    cache: ModuleCache,
    script_runtime: Option<Vec<u8>>,
    caps: CapabilityConfig,
}

impl WasmHost {
    /// Build the host. Compilation is ahead-of-time with the on-disk
    /// compilation cache enabled; an unusable cache degrades to cold
    /// compiles rather than failing startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine itself cannot be constructed.
    pub fn new(opts: RuntimeOptions) -> anyhow::Result<Self> {
        let mut config = Config::new();
        config.cranelift_opt_level(OptLevel::Speed);
        if let Err(e) = config.cache_config_load_default() {
            tracing::warn!(error = %e, "compilation cache unavailable, compiling cold");
        }
        let engine = Engine::new(&config).context("failed to create wasm engine")?;

        Ok(Self {
            engine,
            cache: ModuleCache::new(),
            script_runtime: opts.script_runtime,
            caps: opts.caps,
        })
    }

    #[must_use]
    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// Build a sandbox for one request: fetch the deployment's compiled
    /// module from the cache (compiling on first use) and wrap it with
    /// this host's capability configuration.
    ///
    /// # Errors
    ///
    /// `Compile` for an invalid blob; `Config` for a scripted deployment
    /// when no runtime module is configured.
    pub fn sandbox(&self, args: SandboxArgs<'_>) -> Result<Sandbox> {
        let module = match args.engine {
            EngineKind::Native => self.cache.get_or_insert_with(args.deployment_id, || {
                Module::new(&self.engine, args.blob).map_err(SandboxError::Compile)
            })?,
            EngineKind::Scripted => {
                let runtime = self.script_runtime.as_deref().ok_or_else(|| {
                    SandboxError::Config("no script runtime module configured".to_string())
                })?;
                self.cache.get_or_insert_with(args.deployment_id, || {
                    Module::new(&self.engine, runtime).map_err(SandboxError::Compile)
                })?
            }
        };

        tracing::debug!(
            deployment = %args.deployment_id,
            engine = ?args.engine,
            "sandbox built"
        );

        Ok(Sandbox::new(
            self.engine.clone(),
            module,
            args.engine,
            self.caps.clone(),
            args.stdout,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_kind_serde_is_snake_case() {
        assert_eq!(serde_json::to_string(&EngineKind::Native).unwrap(), "\"native\"");
        assert_eq!(
            serde_json::from_str::<EngineKind>("\"scripted\"").unwrap(),
            EngineKind::Scripted
        );
    }
}
