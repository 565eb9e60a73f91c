//! Capability configuration for sandboxed guests.
//!
//! Everything here is deny-by-default: a guest gets the POSIX-subset WASI
//! surface (stdio, clock, random, env, args) and nothing else unless the
//! deployment's configuration opens it up.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default DNS upstream reported to guests by the sockets extension.
pub const DEFAULT_DNS_UPSTREAM: &str = "1.1.1.1:53";

/// Capability surface granted to every sandbox built by a host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub filesystem: FsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub dns: DnsConfig,
}

/// Outbound/inbound network allow-lists, as `host:port` patterns.
///
/// The host part may be exact (`db.internal`), a suffix wildcard
/// (`*.internal`), an IP literal, or `*`; the port part may be a number or
/// `*` and defaults to `*` when omitted. An empty list means no access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub dial_allow: Vec<String>,
    #[serde(default)]
    pub listen_allow: Vec<String>,
}

/// Host directories made visible to the guest, plus a soft cap on the
/// descriptors a guest can hold open through host extensions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FsConfig {
    #[serde(default)]
    pub mounts: Vec<Mount>,
    #[serde(default)]
    pub max_open_files: Option<u32>,
}

/// One preopened directory mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    /// Directory on the host.
    pub host: PathBuf,
    /// Path the guest sees it under.
    pub guest: String,
}

/// Outbound HTTP-client extension. Installed only when `enabled` and the
/// guest module actually imports the host HTTP functions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Host patterns the guest may call; empty means no destinations.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
}

/// Resolver settings for the sockets extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Upstream nameserver reported to guests that resolve names
    /// themselves.
    #[serde(default = "default_dns_upstream")]
    pub upstream: String,
}

fn default_dns_upstream() -> String {
    DEFAULT_DNS_UPSTREAM.to_string()
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            upstream: default_dns_upstream(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deny_everything() {
        let caps = CapabilityConfig::default();
        assert!(caps.network.dial_allow.is_empty());
        assert!(caps.network.listen_allow.is_empty());
        assert!(caps.filesystem.mounts.is_empty());
        assert!(!caps.http.enabled);
        assert_eq!(caps.dns.upstream, DEFAULT_DNS_UPSTREAM);
    }

    #[test]
    fn dns_upstream_is_config_driven() {
        let caps: CapabilityConfig =
            serde_yaml::from_str("dns:\n  upstream: \"8.8.8.8:53\"\n").unwrap();
        assert_eq!(caps.dns.upstream, "8.8.8.8:53");
    }

    #[test]
    fn yaml_shape_parses() {
        let yaml = r#"
network:
  dial_allow: ["db.internal:5432", "*.svc:*"]
filesystem:
  mounts:
    - host: /var/data
      guest: /data
  max_open_files: 64
http:
  enabled: true
  allowed_hosts: ["api.example.com"]
"#;
        let caps: CapabilityConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(caps.network.dial_allow.len(), 2);
        assert_eq!(caps.filesystem.mounts[0].guest, "/data");
        assert_eq!(caps.filesystem.max_open_files, Some(64));
        assert!(caps.http.enabled);
    }
}
