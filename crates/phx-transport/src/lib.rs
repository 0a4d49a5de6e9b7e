//! Transport abstraction layer for phx.
//!
//! A transport moves frames between a socket and the server. It never
//! interprets them: it decodes whatever arrives and queues it, and encodes
//! whatever is queued and writes it.
//!
//! ```text
//!            LinkHandle (socket side)          Link (transport side)
//!   outbound ─── OutgoingEnvelope ──────────→  encode → write ─→ wire
//!   inbound  ←── Frame ──────────────────────  decode ← read  ←─ wire
//!   ready    ←── Ok / connect error ─────────  after connecting
//!   stop     ─── cancel ─────────────────────→ pumps return
//! ```
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`
//! - `tls`: `wss://` support through rustls

mod endpoint;
mod envelope;
mod error;
pub mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use endpoint::Endpoint;
pub use envelope::{OutgoingEnvelope, SendAck, SendAckWaiter};
pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use phx_protocol::{Codec, Frame};
use phx_sync::{signal, CancellationToken, Resolver, Waiter};
use tokio::sync::mpsc;

/// Counter for generating unique link IDs.
static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for one physical link, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(u64);

impl LinkId {
    fn next() -> Self {
        Self(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Signals the outcome of establishing the link.
pub type ReadySignal = Resolver<Result<(), TransportError>>;

/// Everything a transport is constructed with.
pub struct Link {
    /// Identifies this link in logs.
    pub id: LinkId,
    /// Where decoded inbound frames go.
    pub inbound: mpsc::UnboundedSender<Frame>,
    /// Where envelopes to write come from.
    pub outbound: mpsc::UnboundedReceiver<OutgoingEnvelope>,
    /// Must be resolved once: `Ok` when connected, `Err` if connecting
    /// failed.
    pub ready: ReadySignal,
    /// Cancelled when the transport should shut down.
    pub stop: CancellationToken,
    /// Turns frames into bytes and back.
    pub codec: Arc<dyn Codec>,
}

/// The socket's end of a [`Link`].
pub struct LinkHandle {
    /// Identifies this link in logs.
    pub id: LinkId,
    /// Frames read off the wire.
    pub inbound: mpsc::UnboundedReceiver<Frame>,
    /// Envelopes to write.
    pub outbound: mpsc::UnboundedSender<OutgoingEnvelope>,
    /// Settles once the transport connected or failed to.
    pub ready: Waiter<Result<(), TransportError>>,
    /// Cancel to stop the transport.
    pub stop: CancellationToken,
}

impl Link {
    /// Creates a fresh pair of queues, a ready signal and a stop token.
    pub fn new(codec: Arc<dyn Codec>) -> (Link, LinkHandle) {
        let id = LinkId::next();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = signal();
        let stop = CancellationToken::new();

        let link = Link {
            id,
            inbound: inbound_tx,
            outbound: outbound_rx,
            ready: ready_tx,
            stop: stop.clone(),
            codec,
        };
        let handle = LinkHandle {
            id,
            inbound: inbound_rx,
            outbound: outbound_tx,
            ready: ready_rx,
            stop,
        };
        (link, handle)
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link").field("id", &self.id).finish_non_exhaustive()
    }
}

impl fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// A physical link that can carry frames.
///
/// `run` owns the whole life of the link:
///
/// 1. Connect, then resolve `link.ready` with `Ok(())`. If connecting
///    fails, resolve `ready` with the error (never leave it unresolved)
///    and return the same error.
/// 2. Pump both directions concurrently: decode inbound data onto
///    `link.inbound`; take envelopes from `link.outbound`, encode, write,
///    and acknowledge or fail each one.
/// 3. Return `Ok(())` promptly once `link.stop` is cancelled, or `Err` on
///    an unrecoverable fault in either direction.
pub trait Transport: Send + 'static {
    /// Connects and runs the link until stopped or broken.
    fn run(
        self,
        link: Link,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// The running future of a started transport.
pub type RunFuture = BoxFuture<'static, Result<(), TransportError>>;

/// Builds and starts transports for one URL scheme.
///
/// Sockets keep a table of scheme → factory; this trait is object safe so
/// that table can hold different transports side by side. Any
/// `Fn(Endpoint) -> T` where `T: Transport` is a factory.
pub trait TransportFactory: Send + Sync + 'static {
    /// Creates a transport for `endpoint` and returns its `run` future.
    fn start(&self, endpoint: Endpoint, link: Link) -> RunFuture;
}

impl<F, T> TransportFactory for F
where
    F: Fn(Endpoint) -> T + Send + Sync + 'static,
    T: Transport,
{
    fn start(&self, endpoint: Endpoint, link: Link) -> RunFuture {
        Box::pin(self(endpoint).run(link))
    }
}
