//! Host-side dispatch for the cinder function host: per-request routing
//! into sandboxed guests and the thin serving edge around it.

pub mod config;
pub mod deployment;
pub mod dispatch;
pub mod error;
pub mod server;

pub use config::{load_config, HostConfig};
pub use deployment::Deployment;
pub use dispatch::dispatch;
pub use error::DispatchError;
pub use server::{build_host, build_router, serve};
