//! State shared between a socket, its background tasks and its handles.
//!
//! The [`Socket`](crate::Socket) and its two tasks hold strong references.
//! Channels, pushes and incoming messages hold weak ones, so dropping the
//! socket tears everything down even while handles are still around.
//!
//! Locks are `parking_lot` mutexes held only for a table operation, never
//! across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use phx_protocol::{Frame, Payload, Ref, Reply, ReplyStatus};
use phx_sync::{race_fetch, signal, CancellationToken, Fetched, Resolver, Waiter};
use phx_transport::{OutgoingEnvelope, SendAckWaiter, TransportError};
use tokio::sync::mpsc;

use crate::message::IncomingMessage;
use crate::push::Push;
use crate::{RoutingMiss, SessionError};

/// Settled by the router when the reply for a ref arrives.
pub(crate) type ReplySlot = Resolver<Result<Payload, SessionError>>;

/// The waiting side of a [`ReplySlot`].
pub(crate) type ReplyWaiter = Waiter<Result<Payload, SessionError>>;

/// Where the link currently stands.
enum Phase {
    /// No connection.
    Idle,
    /// Connected. `down` is cancelled once the transport task has ended.
    Live {
        outbound: mpsc::UnboundedSender<OutgoingEnvelope>,
        down: CancellationToken,
    },
    /// The transport failed and the socket wasn't disconnected yet.
    Failed(TransportError),
}

pub(crate) struct Shared {
    next_ref: AtomicU64,
    pending: Mutex<HashMap<Ref, ReplySlot>>,
    channels: Mutex<HashMap<String, mpsc::UnboundedSender<IncomingMessage>>>,
    phase: Mutex<Phase>,
    routing_misses: AtomicU64,
    reply_timeout: Option<Duration>,
}

impl Shared {
    pub(crate) fn new(reply_timeout: Option<Duration>) -> Self {
        Self {
            next_ref: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            phase: Mutex::new(Phase::Idle),
            routing_misses: AtomicU64::new(0),
            reply_timeout,
        }
    }

    // -- Refs and pending replies ---------------------------------------

    /// Hands out the next ref. Never blocks, never repeats.
    pub(crate) fn next_ref(&self) -> Ref {
        Ref(self.next_ref.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn pending_replies(&self) -> usize {
        self.pending.lock().len()
    }

    fn register_pending(&self, reference: Ref) -> ReplyWaiter {
        let (slot, waiter) = signal();
        if self.pending.lock().insert(reference, slot).is_some() {
            tracing::warn!(%reference, "ref reused while a reply was pending");
        }
        waiter
    }

    /// Removes the slot for `reference` if its waiter is gone.
    ///
    /// A slot whose waiter still exists belongs to someone else who reused
    /// the ref, and stays.
    pub(crate) fn release_pending(&self, reference: Ref) {
        let mut pending = self.pending.lock();
        if pending.get(&reference).is_some_and(Resolver::is_abandoned) {
            pending.remove(&reference);
        }
    }

    /// Settles every pending reply with an error from `error`.
    pub(crate) fn fail_pending(&self, error: impl Fn() -> SessionError) {
        let drained: Vec<ReplySlot> =
            self.pending.lock().drain().map(|(_, slot)| slot).collect();
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "failing pending replies");
        }
        for slot in drained {
            let _ = slot.resolve(Err(error()));
        }
    }

    // -- Link phase -------------------------------------------------------

    pub(crate) fn go_live(
        &self,
        outbound: mpsc::UnboundedSender<OutgoingEnvelope>,
        down: CancellationToken,
    ) {
        *self.phase.lock() = Phase::Live { outbound, down };
    }

    pub(crate) fn go_idle(&self) {
        *self.phase.lock() = Phase::Idle;
    }

    /// Records a transport failure and fails everything waiting on a reply.
    pub(crate) fn fail_link(&self, error: &TransportError) {
        *self.phase.lock() = Phase::Failed(error.clone());
        self.fail_pending(|| SessionError::Transport(error.clone()));
    }

    pub(crate) fn failure(&self) -> Option<TransportError> {
        match &*self.phase.lock() {
            Phase::Failed(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// What a send that lost its link should report.
    fn link_error(&self) -> SessionError {
        self.failure()
            .map_or(SessionError::NotConnected, SessionError::Transport)
    }

    // -- Sending ----------------------------------------------------------

    fn enqueue(
        &self,
        frame: Frame,
    ) -> Result<(SendAckWaiter, CancellationToken), SessionError> {
        let phase = self.phase.lock();
        match &*phase {
            Phase::Idle => Err(SessionError::NotConnected),
            Phase::Failed(error) => Err(SessionError::Transport(error.clone())),
            Phase::Live { outbound, down } => {
                let (envelope, sent) = OutgoingEnvelope::new(frame);
                outbound
                    .send(envelope)
                    .map_err(|_| SessionError::NotConnected)?;
                Ok((sent, down.clone()))
            }
        }
    }

    /// Queues `frame` and waits until the transport wrote it.
    pub(crate) async fn transmit(&self, frame: Frame) -> Result<(), SessionError> {
        tracing::trace!(event = frame.event(), topic = frame.topic(), "sending frame");
        let (sent, down) = self.enqueue(frame)?;
        match sent.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(SessionError::Transport(error)),
            Err(_) => {
                // The envelope was dropped with the transport. Wait until
                // its task has recorded why.
                down.cancelled().await;
                Err(self.link_error())
            }
        }
    }

    /// Sends a request and returns the handle to its reply.
    ///
    /// The ref is taken before the first suspension, so refs are ordered
    /// by call order. The pending entry lives in the returned [`Push`]; on
    /// any failure (or if this future is dropped) the push goes away and
    /// takes the entry with it.
    pub(crate) async fn send(
        self: &Arc<Self>,
        topic: &str,
        event: &str,
        payload: Payload,
        reference: Option<Ref>,
    ) -> Result<Push, SessionError> {
        let reference = reference.unwrap_or_else(|| self.next_ref());
        let push = Push::new(
            Arc::downgrade(self),
            reference,
            self.register_pending(reference),
            self.reply_timeout,
        );
        self.transmit(Frame::new(topic, event, payload, Some(reference)))
            .await?;
        Ok(push)
    }

    // -- Channels -------------------------------------------------------

    /// Registers the queue for `topic`, replacing any earlier one.
    ///
    /// Queues of dropped channels are pruned here as well.
    pub(crate) fn register_channel(
        &self,
        topic: &str,
    ) -> mpsc::UnboundedReceiver<IncomingMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut channels = self.channels.lock();
        channels.retain(|_, queue| !queue.is_closed());
        if channels.insert(topic.to_string(), tx).is_some() {
            tracing::warn!(%topic, "channel replaced an existing registration");
        }
        rx
    }

    // -- Routing --------------------------------------------------------

    pub(crate) fn routing_misses(&self) -> u64 {
        self.routing_misses.load(Ordering::Relaxed)
    }

    /// Hands one inbound frame to whoever waits for it.
    pub(crate) fn route(self: &Arc<Self>, frame: Frame) -> Result<(), RoutingMiss> {
        if frame.is_reply() {
            self.settle_reply(frame)
        } else {
            self.deliver(frame)
        }
    }

    fn settle_reply(&self, frame: Frame) -> Result<(), RoutingMiss> {
        let reference = frame
            .reference()
            .ok_or_else(|| RoutingMiss::MissingRef(frame.topic().to_string()))?;
        let slot = self
            .pending
            .lock()
            .remove(&reference)
            .ok_or(RoutingMiss::UnknownRef(reference))?;

        let payload = frame.into_payload();
        let outcome = match Reply::from_payload(payload.clone()) {
            Ok(reply) if reply.is_ok() => Ok(reply.response),
            Ok(reply) => Err(SessionError::ReplyRejected {
                status: reply.status,
                response: reply.response,
            }),
            Err(e) => {
                tracing::debug!(%reference, error = %e, "malformed reply");
                Err(SessionError::ReplyRejected {
                    status: ReplyStatus::Other,
                    response: payload,
                })
            }
        };
        tracing::trace!(%reference, ok = outcome.is_ok(), "reply settled");
        // The requester may have given up in the meantime.
        let _ = slot.resolve(outcome);
        Ok(())
    }

    fn deliver(self: &Arc<Self>, frame: Frame) -> Result<(), RoutingMiss> {
        let topic = frame.topic().to_string();
        let mut channels = self.channels.lock();
        let queue = channels
            .get(&topic)
            .ok_or_else(|| RoutingMiss::UnknownTopic(topic.clone()))?;

        let message = IncomingMessage::new(frame, Arc::downgrade(self));
        if queue.send(message).is_err() {
            channels.remove(&topic);
            return Err(RoutingMiss::ChannelGone(topic));
        }
        Ok(())
    }

    pub(crate) fn record_miss(&self, miss: &RoutingMiss) {
        self.routing_misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%miss, "dropping inbound frame");
    }
}

/// The routing loop: runs until `shutdown` is cancelled or the inbound
/// queue closes.
pub(crate) async fn route_inbound(
    shared: Arc<Shared>,
    mut inbound: mpsc::UnboundedReceiver<Frame>,
    shutdown: CancellationToken,
) {
    loop {
        let frame = match race_fetch(inbound.recv(), &shutdown).await {
            Fetched::Done | Fetched::Item(None) => break,
            Fetched::Item(Some(frame)) => frame,
        };
        if let Err(miss) = shared.route(frame) {
            shared.record_miss(&miss);
        }
    }
    tracing::debug!("router stopped");
}
