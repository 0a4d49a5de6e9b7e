//! Channels: one topic's conversation over a shared socket.
//!
//! A channel's lifecycle lives in its type:
//!
//! ```text
//!   Channel<Unjoined> ──join()──→ Channel<Joined> ──leave()──→ Channel<Left>
//!                                  push / receive              │
//!                                       ↑                      │
//!                                       └──────join()──────────┘
//! ```
//!
//! Pushing or receiving on a channel that isn't joined doesn't compile.

use std::fmt;
use std::future::Future;
use std::sync::Weak;

use phx_protocol::{ChannelEvent, Payload, Ref};
use tokio::sync::mpsc;

use crate::message::IncomingMessage;
use crate::push::Push;
use crate::shared::Shared;
use crate::SessionError;

mod sealed {
    pub trait Sealed {}
}

/// Marker for the lifecycle states of a [`Channel`].
pub trait ChannelState: sealed::Sealed + fmt::Debug + Send + 'static {}

/// States a channel can join from.
pub trait Joinable: ChannelState {}

/// Created, never joined.
#[derive(Debug)]
pub struct Unjoined;

/// Joined. Carries the ref of the successful join.
#[derive(Debug)]
pub struct Joined {
    join_ref: Ref,
}

/// Left after having been joined.
#[derive(Debug)]
pub struct Left;

impl sealed::Sealed for Unjoined {}
impl sealed::Sealed for Joined {}
impl sealed::Sealed for Left {}
impl ChannelState for Unjoined {}
impl ChannelState for Joined {}
impl ChannelState for Left {}
impl Joinable for Unjoined {}
impl Joinable for Left {}

/// A topic on a socket. Created by [`Socket::channel`](crate::Socket::channel).
pub struct Channel<S: ChannelState = Unjoined> {
    shared: Weak<Shared>,
    topic: String,
    params: Payload,
    messages: mpsc::UnboundedReceiver<IncomingMessage>,
    state: S,
}

impl<S: ChannelState> Channel<S> {
    /// The topic this channel talks on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The payload sent with every join and leave.
    pub fn params(&self) -> &Payload {
        &self.params
    }

    fn with_state<T: ChannelState>(self, state: T) -> Channel<T> {
        Channel {
            shared: self.shared,
            topic: self.topic,
            params: self.params,
            messages: self.messages,
            state,
        }
    }
}

impl Channel<Unjoined> {
    pub(crate) fn new(
        shared: Weak<Shared>,
        topic: String,
        params: Payload,
        messages: mpsc::UnboundedReceiver<IncomingMessage>,
    ) -> Self {
        Self {
            shared,
            topic,
            params,
            messages,
            state: Unjoined,
        }
    }

    /// Joins, runs `body` on the joined channel, then leaves.
    ///
    /// The leave happens exactly once however the scope ends. After `body`
    /// returns (`Ok` or `Err`) it is sent inline. If `body` panics or this
    /// future is dropped mid-way, it is spawned onto the runtime instead.
    /// `body` must not leave the channel itself.
    ///
    /// # Errors
    /// The join's error, else `body`'s error, else the leave's error.
    pub async fn scoped<F, Fut, T>(self, body: F) -> Result<T, SessionError>
    where
        F: FnOnce(Channel<Joined>, Payload) -> Fut,
        Fut: Future<Output = Result<T, SessionError>>,
    {
        let (channel, response) = self.join().await?;
        let guard = LeaveGuard {
            shared: channel.shared.clone(),
            topic: channel.topic.clone(),
            params: channel.params.clone(),
            armed: true,
        };

        let outcome = body(channel, response).await;
        let left = guard.leave().await;
        match (outcome, left) {
            (Err(e), _) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
        }
    }
}

impl<S: Joinable> Channel<S> {
    /// Sends `phx_join` with the channel's params and waits for the reply.
    ///
    /// Returns the joined channel and the server's join response.
    ///
    /// # Errors
    /// [`SessionError::JoinFailure`] if the server rejects the join; any
    /// socket or reply error otherwise. The channel is consumed either
    /// way: open a new one from the socket to retry.
    pub async fn join(self) -> Result<(Channel<Joined>, Payload), SessionError> {
        let push = send(
            &self.shared,
            &self.topic,
            ChannelEvent::Join.as_str(),
            self.params.clone(),
        )
        .await?;
        let join_ref = push.reference();

        match push.response().await {
            Ok(response) => {
                tracing::info!(topic = %self.topic, %join_ref, "channel joined");
                Ok((self.with_state(Joined { join_ref }), response))
            }
            Err(SessionError::ReplyRejected { response, .. }) => {
                tracing::warn!(topic = %self.topic, %response, "join rejected");
                Err(SessionError::JoinFailure {
                    topic: self.topic,
                    response,
                })
            }
            Err(e) => Err(e),
        }
    }
}

impl Channel<Joined> {
    /// The ref of the join that got this channel in.
    pub fn join_ref(&self) -> Ref {
        self.state.join_ref
    }

    /// Sends `event` on this channel's topic.
    ///
    /// Returns once the request is written; await the [`Push`] for the
    /// reply.
    ///
    /// # Errors
    /// Any error of [`Socket::send`](crate::Socket::send), or
    /// [`SessionError::SocketDropped`].
    pub async fn push(&self, event: &str, payload: Payload) -> Result<Push, SessionError> {
        send(&self.shared, &self.topic, event, payload).await
    }

    /// Waits for the next message the server pushed to this topic.
    ///
    /// # Errors
    /// [`SessionError::ChannelClosed`] once the socket is gone or another
    /// channel took over the topic.
    pub async fn receive(&mut self) -> Result<IncomingMessage, SessionError> {
        self.messages
            .recv()
            .await
            .ok_or_else(|| SessionError::ChannelClosed(self.topic.clone()))
    }

    /// Takes the next pushed message if one is queued.
    ///
    /// # Errors
    /// Same as [`receive`](Self::receive).
    pub fn try_receive(&mut self) -> Result<Option<IncomingMessage>, SessionError> {
        match self.messages.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(SessionError::ChannelClosed(self.topic.clone()))
            }
        }
    }

    /// Sends `phx_leave` with the channel's params and waits for the
    /// reply.
    ///
    /// # Errors
    /// [`SessionError::LeaveFailure`] if the server rejects the leave; any
    /// socket or reply error otherwise.
    pub async fn leave(self) -> Result<Channel<Left>, SessionError> {
        leave(&self.shared, &self.topic, self.params.clone()).await?;
        Ok(self.with_state(Left))
    }
}

impl<S: ChannelState> fmt::Debug for Channel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("topic", &self.topic)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

async fn send(
    shared: &Weak<Shared>,
    topic: &str,
    event: &str,
    payload: Payload,
) -> Result<Push, SessionError> {
    let shared = shared.upgrade().ok_or(SessionError::SocketDropped)?;
    shared.send(topic, event, payload, None).await
}

async fn leave(shared: &Weak<Shared>, topic: &str, params: Payload) -> Result<(), SessionError> {
    let push = send(shared, topic, ChannelEvent::Leave.as_str(), params).await?;
    match push.response().await {
        Ok(_) => {
            tracing::info!(%topic, "channel left");
            Ok(())
        }
        Err(SessionError::ReplyRejected { response, .. }) => Err(SessionError::LeaveFailure {
            topic: topic.to_string(),
            response,
        }),
        Err(e) => Err(e),
    }
}

/// Leaves a scoped channel if the scope ends without doing so.
struct LeaveGuard {
    shared: Weak<Shared>,
    topic: String,
    params: Payload,
    armed: bool,
}

impl LeaveGuard {
    async fn leave(mut self) -> Result<(), SessionError> {
        self.armed = false;
        let params = std::mem::take(&mut self.params);
        leave(&self.shared, &self.topic, params).await
    }
}

impl Drop for LeaveGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let shared = self.shared.clone();
        let topic = std::mem::take(&mut self.topic);
        let params = std::mem::take(&mut self.params);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = leave(&shared, &topic, params).await {
                        tracing::warn!(%topic, error = %e, "leave after aborted scope failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(%topic, "no runtime to leave aborted scope");
            }
        }
    }
}
