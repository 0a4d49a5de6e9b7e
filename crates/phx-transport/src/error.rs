use std::time::Duration;

use phx_protocol::ProtocolError;

/// Errors that can occur in the transport layer.
///
/// `Clone` because a single connect failure is reported twice: once
/// through the link's `ready` signal and once as the result of `run()`.
/// Underlying library errors are therefore kept as messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The URL can't be used to reach a server.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Establishing the physical link failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The link did not become ready in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Reading from the link failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The link is gone.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// A frame could not be encoded for this link.
    #[error("codec error: {0}")]
    Codec(String),
}

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        Self::Codec(err.to_string())
    }
}
