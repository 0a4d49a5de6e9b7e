//! Error types for the sync primitives.

/// Errors produced by single-resolution signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    /// `resolve` was called on a signal that already carries a value.
    #[error("signal already resolved")]
    AlreadyResolved,

    /// The resolving side was dropped without ever resolving.
    /// The waiter will never receive a value.
    #[error("signal abandoned before resolution")]
    Abandoned,
}
