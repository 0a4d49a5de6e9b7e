//! Codec trait and implementations for turning frames into bytes.
//!
//! A "codec" (coder/decoder) converts between [`Frame`]s and the raw bytes
//! a transport writes. Transports hold a `dyn Codec`, so the trait is
//! object safe: it works on frames directly instead of being generic over
//! any serde type. Swapping codecs changes nothing above the transport.

use crate::{Frame, ProtocolError};

/// Encodes frames to bytes and decodes bytes back into frames.
///
/// `Send + Sync + 'static` because one codec instance is shared by the
/// socket and the transport's pump tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a frame.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the frame can't be represented
    /// in this format.
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, ProtocolError>;

    /// Parses one frame out of `data`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are malformed or
    /// don't describe a frame.
    fn decode(&self, data: &[u8]) -> Result<Frame, ProtocolError>;

    /// Whether encoded frames are UTF-8 text.
    ///
    /// Message-oriented transports use this to choose between text and
    /// binary messages.
    fn is_text(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// This is the reference wire format: one JSON object per message,
/// `{"event", "topic", "ref", "payload"}`.
///
/// ## Example
///
/// ```rust
/// use phx_protocol::{Codec, Frame, JsonCodec, Ref};
///
/// let codec = JsonCodec;
/// let frame = Frame::new("room:lobby", "ping", serde_json::json!({}), Some(Ref(1)));
///
/// let bytes = codec.encode(&frame).unwrap();
/// assert_eq!(codec.decode(&bytes).unwrap(), frame);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(frame).map_err(ProtocolError::encode)
    }

    fn decode(&self, data: &[u8]) -> Result<Frame, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::decode)
    }
}
