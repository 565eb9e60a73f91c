//! Sandboxed execution substrate for the cinder function host.
//!
//! A [`WasmHost`] owns one compilation engine and the shared
//! [`ModuleCache`]; each request builds a [`Sandbox`] around the cached
//! module, provisions its capability surface, bridges stdio over OS
//! pipes, and drives the guest's entry point to completion.

pub mod acl;
pub mod cache;
pub mod caps;
pub mod engine;
pub mod error;
mod guest_mem;
pub mod httpext;
pub mod sandbox;
pub mod sockets;
pub mod stdio;

pub use cache::ModuleCache;
pub use caps::{
    CapabilityConfig, DnsConfig, FsConfig, HttpConfig, Mount, NetworkConfig, DEFAULT_DNS_UPSTREAM,
};
pub use engine::{EngineKind, RuntimeOptions, WasmHost};
pub use error::SandboxError;
pub use sandbox::{Sandbox, SandboxArgs};
pub use stdio::SharedBuffer;
