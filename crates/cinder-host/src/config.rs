//! Host configuration: YAML with `${VAR}` environment substitution.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use cinder_runtime::CapabilityConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::deployment::Deployment;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Top-level host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Listener address for the HTTP edge.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Path to the fixed language-runtime module for scripted
    /// deployments. Optional; scripted deployments fail without it.
    #[serde(default)]
    pub script_runtime: Option<PathBuf>,
    /// Capability surface granted to every sandbox.
    #[serde(default)]
    pub capabilities: CapabilityConfig,
    /// The deployment table: route → deployment.
    #[serde(default)]
    pub deployments: Vec<Deployment>,
}

fn default_listen() -> String {
    "127.0.0.1:6969".to_string()
}

/// Substitute `${VAR}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut missing = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => result = result.replace(&cap[0], &val),
            Err(_) => missing.push(var_name.to_string()),
        }
    }

    if !missing.is_empty() {
        anyhow::bail!("missing environment variable(s): {}", missing.join(", "));
    }
    Ok(result)
}

/// Parse a host config from a YAML string (after env substitution).
///
/// # Errors
///
/// Returns an error if substitution fails or the YAML is invalid.
pub fn parse_config_str(yaml: &str) -> Result<HostConfig> {
    let substituted = substitute_env_vars(yaml)?;
    serde_yaml::from_str(&substituted).context("failed to parse host config YAML")
}

/// Load a host config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<HostConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_config_str(&content)
}
