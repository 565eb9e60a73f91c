//! Dispatcher error model.
//!
//! Every variant's display string is short and internals-free: it is
//! exactly what goes into the `{"error": ...}` body of a 500. The full
//! cause chain stays in the log.

use cinder_runtime::SandboxError;
use cinder_wire::WireError;

/// A failure while dispatching one request into a guest.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The request body could not be read in full.
    #[error("failed to read request body")]
    BodyRead(#[source] axum::Error),

    /// The deployment artifact could not be read.
    #[error("failed to read deployment artifact")]
    ArtifactRead(#[source] std::io::Error),

    /// Sandbox construction or guest execution failed.
    #[error("failed to execute guest")]
    Sandbox(#[from] SandboxError),

    /// The guest's stdout was not a valid wire response.
    #[error("failed to decode guest response")]
    WireDecode(#[from] WireError),

    /// The blocking worker running the guest went away.
    #[error("guest execution aborted")]
    Worker,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_strings_leak_nothing() {
        let err = DispatchError::ArtifactRead(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "/secret/path/deploy.wasm",
        ));
        assert_eq!(err.to_string(), "failed to read deployment artifact");
    }
}
