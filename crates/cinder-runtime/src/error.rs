//! Sandbox error types.

/// Errors from sandbox construction, capability provisioning, and
/// invocation. None of these are retryable and none kill the host
/// process; each fails exactly one request.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The guest blob is not a valid module.
    #[error("failed to compile guest module")]
    Compile(#[source] anyhow::Error),

    /// Unresolved import, capability-provisioning failure, or a runtime
    /// trap inside the guest.
    #[error("failed to instantiate guest module")]
    Instantiate(#[source] anyhow::Error),

    /// Invalid sandbox configuration (scripted engine without source,
    /// scripted engine without a runtime module).
    #[error("sandbox configuration: {0}")]
    Config(String),

    /// OS-level pipe creation or stdio-copy failure.
    #[error("stdio pipe failure")]
    Pipe(#[source] std::io::Error),

    /// Host-side invariant failure, e.g. a poisoned lock left behind by a
    /// panic elsewhere. Fails the affected request; the host stays up.
    #[error("internal: {0}")]
    Internal(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SandboxError>;
