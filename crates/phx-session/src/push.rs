//! Handles to requests that expect a reply.

use std::sync::Weak;
use std::time::Duration;

use phx_protocol::{Payload, Ref};

use crate::shared::{ReplyWaiter, Shared};
use crate::SessionError;

/// A sent request waiting for its `phx_reply`.
///
/// Returned once the transport has written the request. Await one of the
/// `response` methods to get the server's answer, or drop the push if you
/// don't care about it: dropping unregisters the pending reply.
#[derive(Debug)]
#[must_use = "dropping a Push discards the reply"]
pub struct Push {
    reference: Ref,
    reply: Option<ReplyWaiter>,
    shared: Weak<Shared>,
    reply_timeout: Option<Duration>,
}

impl Push {
    pub(crate) fn new(
        shared: Weak<Shared>,
        reference: Ref,
        reply: ReplyWaiter,
        reply_timeout: Option<Duration>,
    ) -> Self {
        Self {
            reference,
            reply: Some(reply),
            shared,
            reply_timeout,
        }
    }

    /// The ref the request was sent with.
    pub fn reference(&self) -> Ref {
        self.reference
    }

    /// Waits for the reply, bounded by the socket's reply timeout.
    ///
    /// # Errors
    /// - [`SessionError::ReplyRejected`] if the status isn't `"ok"`
    /// - [`SessionError::ReplyTimeout`] if no reply arrived in time
    /// - [`SessionError::Transport`] or [`SessionError::NotConnected`] if
    ///   the link went away first
    /// - [`SessionError::SocketDropped`] if the socket was dropped
    pub async fn response(self) -> Result<Payload, SessionError> {
        let timeout = self.reply_timeout;
        self.wait(timeout).await
    }

    /// Waits for the reply for at most `timeout`.
    ///
    /// # Errors
    /// Same as [`response`](Self::response).
    pub async fn response_within(self, timeout: Duration) -> Result<Payload, SessionError> {
        self.wait(Some(timeout)).await
    }

    /// Waits for the reply with no time limit.
    ///
    /// # Errors
    /// Same as [`response`](Self::response), minus the timeout.
    pub async fn response_unbounded(self) -> Result<Payload, SessionError> {
        self.wait(None).await
    }

    async fn wait(mut self, timeout: Option<Duration>) -> Result<Payload, SessionError> {
        let Some(reply) = self.reply.as_mut() else {
            return Err(SessionError::SocketDropped);
        };
        let settled = match timeout {
            Some(limit) => match tokio::time::timeout(limit, reply).await {
                Ok(settled) => settled,
                Err(_) => {
                    tracing::debug!(reference = %self.reference, "reply timed out");
                    return Err(SessionError::ReplyTimeout(self.reference));
                }
            },
            None => reply.await,
        };
        // An abandoned slot means the socket (and its table) is gone.
        settled.unwrap_or(Err(SessionError::SocketDropped))
    }
}

impl Drop for Push {
    fn drop(&mut self) {
        // The waiter must go first so the slot reads as abandoned.
        drop(self.reply.take());
        if let Some(shared) = self.shared.upgrade() {
            shared.release_pending(self.reference);
        }
    }
}
