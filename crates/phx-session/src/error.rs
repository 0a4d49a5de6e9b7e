//! Error types for the session layer.

use phx_protocol::{Payload, Ref, ReplyStatus};
use phx_transport::TransportError;

/// Errors returned by sockets, channels and pushes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// `connect` was called while a connection exists.
    #[error("socket is already connected")]
    AlreadyConnected,

    /// The operation needs a connection and there is none.
    #[error("socket is not connected")]
    NotConnected,

    /// No transport is registered for the URL scheme.
    #[error("no transport registered for scheme {0:?}")]
    UnsupportedScheme(String),

    /// The socket URL does not parse.
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),

    /// The server refused to let the channel join.
    #[error("join of {topic} rejected: {response}")]
    JoinFailure {
        /// The channel's topic.
        topic: String,
        /// The rejection's response payload.
        response: Payload,
    },

    /// The server refused the leave.
    #[error("leave of {topic} rejected: {response}")]
    LeaveFailure {
        /// The channel's topic.
        topic: String,
        /// The rejection's response payload.
        response: Payload,
    },

    /// A request was answered with a status other than `"ok"`.
    #[error("reply with status {status}: {response}")]
    ReplyRejected {
        /// The status the server sent.
        status: ReplyStatus,
        /// The response payload, or the raw payload if it wasn't a
        /// well-formed reply envelope.
        response: Payload,
    },

    /// No reply arrived in time.
    #[error("no reply to ref {0} in time")]
    ReplyTimeout(Ref),

    /// The channel's message queue is closed.
    #[error("channel {0} is closed")]
    ChannelClosed(String),

    /// The socket this handle belongs to was dropped.
    #[error("socket was dropped")]
    SocketDropped,

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    TaskFailed(String),

    /// The underlying link failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// An inbound frame the router could not deliver.
///
/// Misses are logged and counted, never returned to a caller: a server
/// answering late or pushing to a topic nobody joined must not break the
/// connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingMiss {
    /// A reply for a ref nobody is waiting on.
    #[error("no pending request for ref {0}")]
    UnknownRef(Ref),

    /// A reply without a ref.
    #[error("reply on {0} carries no ref")]
    MissingRef(String),

    /// A push for a topic with no registered channel.
    #[error("no channel registered for {0}")]
    UnknownTopic(String),

    /// The channel for the topic stopped receiving.
    #[error("channel {0} no longer receives")]
    ChannelGone(String),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_transport_error_converts() {
        let err: SessionError = TransportError::ConnectFailed("refused".into()).into();
        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(err.to_string(), "connect failed: refused");
    }

    #[test]
    fn test_join_failure_names_topic() {
        let err = SessionError::JoinFailure {
            topic: "room:1".into(),
            response: json!({"reason": "unauthorized"}),
        };
        assert_eq!(
            err.to_string(),
            r#"join of room:1 rejected: {"reason":"unauthorized"}"#
        );
    }

    #[test]
    fn test_routing_miss_display() {
        assert_eq!(
            RoutingMiss::UnknownRef(Ref(9)).to_string(),
            "no pending request for ref 9"
        );
    }
}
