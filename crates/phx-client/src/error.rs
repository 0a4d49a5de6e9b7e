//! Unified error type for phx.

use phx_protocol::ProtocolError;
use phx_session::SessionError;
use phx_sync::SignalError;
use phx_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// The `#[from]` conversions let `?` lift errors from any layer into this
/// one type.
#[derive(Debug, thiserror::Error)]
pub enum PhxError {
    /// Connecting, sending, joining or waiting for a reply.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The link itself.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encoding or decoding frames.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Single-resolution signals.
    #[error(transparent)]
    Signal(#[from] SignalError),
}
