use thiserror::Error;

/// Library error type. Session admission and property writes surface these
/// synchronously; asynchronous hardware failures are logged and never reach
/// a caller.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed request (bad address, invalid UTF-8 name, ...).
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The operation requires a powered radio.
    #[error("adapter is not ready")]
    NotReady,
    /// A single-slot guard (mode change, trust-bypass authorization) is
    /// occupied. Retryable by the caller.
    #[error("operation already in progress")]
    Busy,
    /// Release without a matching claim.
    #[error("operation not in progress")]
    NotInProgress,
    /// Escalation without a registered agent, or an operation requiring
    /// trust.
    #[error("not authorized")]
    NotAuthorized,
    /// Authorization requested for a peer that is not connected.
    #[error("peer is not connected")]
    NotConnected,
    /// The hardware rejected a command; carries the controller's reason.
    #[error("operation failed: {0}")]
    Failed(String),
    /// Peer identity conflicts.
    #[error("already exists")]
    AlreadyExists,
    #[error("does not exist")]
    DoesNotExist,
}
