//! Error types for the protocol layer.
//!
//! Each phx crate defines its own error enum. A `ProtocolError` always
//! means the bytes or the payload shape were wrong, never the network.

/// The underlying error a [`Codec`](crate::Codec) reports. Any codec can
/// use its own error type here.
pub type CodecError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a frame into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] CodecError),

    /// Deserialization failed (turning bytes into a frame).
    ///
    /// Common causes: malformed input, missing `event`/`topic`, or a
    /// truncated message.
    #[error("decode failed: {0}")]
    Decode(#[source] CodecError),

    /// The message decoded but breaks protocol rules, e.g. a reply
    /// payload without a `status`.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// Wraps a codec's serialization error.
    pub fn encode(error: impl Into<CodecError>) -> Self {
        Self::Encode(error.into())
    }

    /// Wraps a codec's parse error.
    pub fn decode(error: impl Into<CodecError>) -> Self {
        Self::Decode(error.into())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("length prefix says {0} bytes")]
    struct BadLength(usize);

    #[test]
    fn test_any_codec_error_can_be_reported() {
        let err = ProtocolError::decode(BadLength(9));
        assert_eq!(err.to_string(), "decode failed: length prefix says 9 bytes");

        let source = err.source().unwrap();
        assert!(source.downcast_ref::<BadLength>().is_some());
    }

    #[test]
    fn test_plain_messages_become_errors() {
        let err = ProtocolError::encode("frame too large");
        assert!(matches!(err, ProtocolError::Encode(_)));
        assert_eq!(err.to_string(), "encode failed: frame too large");
    }
}
