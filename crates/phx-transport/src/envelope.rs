//! Outgoing envelopes: a frame plus its send acknowledgement.

use phx_protocol::Frame;
use phx_sync::{signal, Resolver, Waiter};

use crate::TransportError;

/// Resolved by the transport once the frame hit the wire (or failed to).
pub type SendAck = Resolver<Result<(), TransportError>>;

/// The sender's side of a [`SendAck`].
pub type SendAckWaiter = Waiter<Result<(), TransportError>>;

/// A frame queued for the transport.
///
/// The socket creates the envelope and keeps the waiter; the transport
/// owns the envelope from the moment it leaves the queue. [`acknowledge`]
/// and [`fail`] consume the envelope, so a transport settles each
/// acknowledgement exactly once and can't touch it afterwards.
///
/// An envelope dropped without either call (e.g. still queued when the
/// transport dies) shows up as an abandoned waiter.
///
/// [`acknowledge`]: Self::acknowledge
/// [`fail`]: Self::fail
#[derive(Debug)]
pub struct OutgoingEnvelope {
    frame: Frame,
    sent: SendAck,
}

impl OutgoingEnvelope {
    /// Wraps `frame` and returns the waiter for its acknowledgement.
    pub fn new(frame: Frame) -> (Self, SendAckWaiter) {
        let (sent, waiter) = signal();
        (Self { frame, sent }, waiter)
    }

    /// The frame to write.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Reports a successful write.
    pub fn acknowledge(self) {
        let _ = self.sent.resolve(Ok(()));
    }

    /// Reports a failed write.
    pub fn fail(self, error: TransportError) {
        let _ = self.sent.resolve(Err(error));
    }

    /// Splits the envelope for transports that acknowledge elsewhere.
    pub fn into_parts(self) -> (Frame, SendAck) {
        (self.frame, self.sent)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn frame() -> Frame {
        Frame::new("t", "e", json!({}), None)
    }

    #[tokio::test]
    async fn test_acknowledge_resolves_ok() {
        let (envelope, waiter) = OutgoingEnvelope::new(frame());
        assert_eq!(envelope.frame().topic(), "t");
        envelope.acknowledge();
        assert_eq!(waiter.await, Ok(Ok(())));
    }

    #[tokio::test]
    async fn test_fail_resolves_err() {
        let (envelope, waiter) = OutgoingEnvelope::new(frame());
        envelope.fail(TransportError::SendFailed("pipe".into()));
        assert_eq!(
            waiter.await,
            Ok(Err(TransportError::SendFailed("pipe".into())))
        );
    }

    #[tokio::test]
    async fn test_dropped_envelope_abandons_waiter() {
        let (envelope, waiter) = OutgoingEnvelope::new(frame());
        drop(envelope);
        assert!(waiter.await.is_err());
    }
}
