/// Errors surfaced by backend adapter reads and writes.
///
/// Every variant is recoverable at the per-server level: the runner logs
/// it, counts zero changes for the affected resource, and moves on.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The addressed resource does not exist on this server.
    #[error("resource not found")]
    NotFound,

    /// Connection-level failure (refused, timeout, DNS).
    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// The server answered with an unexpected status.
    #[error("unexpected backend status {status}")]
    Status { status: u16 },

    /// The body did not parse as the expected document shape.
    #[error("malformed backend response: {0}")]
    Malformed(String),

    /// The resource selector does not apply to this backend family.
    #[error("unsupported resource for this backend family")]
    Unsupported,
}
