//! Messages the server pushes to a channel.

use std::fmt;
use std::sync::Weak;

use phx_protocol::{Frame, Payload, Ref, Reply, ReplyStatus};

use crate::shared::Shared;
use crate::SessionError;

/// A frame delivered to a channel, plus a way to answer it.
pub struct IncomingMessage {
    frame: Frame,
    shared: Weak<Shared>,
}

impl IncomingMessage {
    pub(crate) fn new(frame: Frame, shared: Weak<Shared>) -> Self {
        Self { frame, shared }
    }

    /// The event name, e.g. `new_msg`.
    pub fn event(&self) -> &str {
        self.frame.event()
    }

    /// The topic it arrived on.
    pub fn topic(&self) -> &str {
        self.frame.topic()
    }

    /// The message body.
    pub fn payload(&self) -> &Payload {
        self.frame.payload()
    }

    /// The ref the server sent, if it expects an answer.
    pub fn reference(&self) -> Option<Ref> {
        self.frame.reference()
    }

    /// The whole frame as received.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Consumes the message, returning its frame.
    pub fn into_frame(self) -> Frame {
        self.frame
    }

    /// Answers this message with a `phx_reply` on the same topic and ref.
    ///
    /// Replies are fire-and-forget: nothing waits for an answer to them.
    /// Returns once the transport has written the reply.
    ///
    /// # Errors
    /// [`SessionError::SocketDropped`] if the socket is gone, otherwise
    /// whatever sending on the socket reports.
    pub async fn reply(
        &self,
        status: ReplyStatus,
        response: Payload,
    ) -> Result<(), SessionError> {
        let shared = self.shared.upgrade().ok_or(SessionError::SocketDropped)?;
        let frame = Frame::reply(
            self.frame.topic(),
            self.frame.reference(),
            Reply { status, response },
        );
        shared.transmit(frame).await
    }
}

impl fmt::Debug for IncomingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IncomingMessage").field(&self.frame).finish()
    }
}
