//! In-process transport for tests and embedding.
//!
//! No bytes are involved: frames go straight from the socket to a
//! [`MemoryPeer`], which plays the server. The peer sees every outgoing
//! envelope, decides when (and whether) to acknowledge it, injects inbound
//! frames, can hold back `ready`, and can kill the transport with an error.
//!
//! ```ignore
//! let (connector, mut peers) = memory::pair();
//! // register `connector` for a scheme, connect a socket, then:
//! let mut peer = peers.accept().await.unwrap();
//! let join = peer.next_frame().await.unwrap();
//! peer.push(Frame::reply(join.topic(), join.reference(), Reply::ok(json!({}))));
//! ```

use phx_protocol::{Frame, Reply};
use phx_sync::{signal, Resolver};
use tokio::sync::mpsc;

use crate::{
    Endpoint, Link, OutgoingEnvelope, ReadySignal, RunFuture, Transport,
    TransportError, TransportFactory,
};

/// Creates a memory transport factory and the stream of peers it produces.
///
/// Every connect through the factory hands one [`MemoryPeer`] to
/// [`MemoryPeers::accept`].
pub fn pair() -> (MemoryConnector, MemoryPeers) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryConnector {
            peers: tx,
            hold_ready: false,
        },
        MemoryPeers { peers: rx },
    )
}

/// The factory half of [`pair`]. Register it for a URL scheme.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
    hold_ready: bool,
}

impl MemoryConnector {
    /// Leaves `ready` unresolved until the peer calls
    /// [`MemoryPeer::resolve_ready`] or [`MemoryPeer::fail_ready`].
    pub fn holding_ready(mut self) -> Self {
        self.hold_ready = true;
        self
    }
}

impl TransportFactory for MemoryConnector {
    fn start(&self, endpoint: Endpoint, link: Link) -> RunFuture {
        let transport = MemoryTransport {
            endpoint,
            peers: self.peers.clone(),
            hold_ready: self.hold_ready,
        };
        Box::pin(transport.run(link))
    }
}

/// Receives the peer of every memory transport started by a connector.
#[derive(Debug)]
pub struct MemoryPeers {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryPeers {
    /// Waits for the next connect.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// Takes a peer if a connect already happened.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }
}

/// One memory link, as seen by a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryTransport {
    endpoint: Endpoint,
    peers: mpsc::UnboundedSender<MemoryPeer>,
    hold_ready: bool,
}

impl Transport for MemoryTransport {
    async fn run(self, link: Link) -> Result<(), TransportError> {
        let Link {
            id,
            inbound,
            outbound,
            ready,
            stop,
            codec: _,
        } = link;
        let (kill, killed) = signal();

        let (held, immediate) = if self.hold_ready {
            (Some(ready), None)
        } else {
            (None, Some(ready))
        };
        let peer = MemoryPeer {
            endpoint: self.endpoint,
            inbound,
            outbound,
            ready: held,
            kill,
        };

        if let Err(mpsc::error::SendError(peer)) = self.peers.send(peer) {
            let err = TransportError::ConnectFailed("no memory peer listening".into());
            if let Some(ready) = peer.ready.as_ref().or(immediate.as_ref()) {
                let _ = ready.resolve(Err(err.clone()));
            }
            return Err(err);
        }
        if let Some(ready) = immediate {
            let _ = ready.resolve(Ok(()));
        }
        tracing::debug!(%id, "memory link up");

        tokio::select! {
            biased;
            () = stop.cancelled() => Ok(()),
            outcome = killed => match outcome {
                Ok(error) => Err(error),
                Err(_) => Err(TransportError::ConnectionClosed(
                    "memory peer dropped".into(),
                )),
            },
        }
    }
}

/// The far end of a memory link.
#[derive(Debug)]
pub struct MemoryPeer {
    endpoint: Endpoint,
    inbound: mpsc::UnboundedSender<Frame>,
    outbound: mpsc::UnboundedReceiver<OutgoingEnvelope>,
    ready: Option<ReadySignal>,
    kill: Resolver<TransportError>,
}

impl MemoryPeer {
    /// The endpoint the socket connected to, including its parameters.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Resolves a held `ready` with success.
    ///
    /// Returns `false` if `ready` was not held or is already settled.
    pub fn resolve_ready(&mut self) -> bool {
        self.ready
            .take()
            .is_some_and(|ready| ready.resolve(Ok(())).is_ok())
    }

    /// Resolves a held `ready` with `error`.
    ///
    /// Returns `false` if `ready` was not held or is already settled.
    pub fn fail_ready(&mut self, error: TransportError) -> bool {
        self.ready
            .take()
            .is_some_and(|ready| ready.resolve(Err(error)).is_ok())
    }

    /// Waits for the next outgoing envelope. The caller must acknowledge
    /// or fail it.
    pub async fn recv(&mut self) -> Option<OutgoingEnvelope> {
        self.outbound.recv().await
    }

    /// Takes an outgoing envelope if one is queued.
    pub fn try_recv(&mut self) -> Option<OutgoingEnvelope> {
        self.outbound.try_recv().ok()
    }

    /// Waits for the next outgoing frame and acknowledges it.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        let envelope = self.recv().await?;
        let frame = envelope.frame().clone();
        envelope.acknowledge();
        Some(frame)
    }

    /// Delivers `frame` to the socket as if it came off the wire.
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectionClosed`] if the socket side is
    /// gone.
    pub fn push(&self, frame: Frame) -> Result<(), TransportError> {
        self.inbound.send(frame).map_err(|_| {
            TransportError::ConnectionClosed("socket side dropped".into())
        })
    }

    /// Takes the next outgoing frame, acknowledges it and answers it with
    /// `reply` on the same topic and ref. Returns the request frame.
    pub async fn reply(&mut self, reply: Reply) -> Option<Frame> {
        let request = self.next_frame().await?;
        self.push(Frame::reply(request.topic(), request.reference(), reply))
            .ok()?;
        Some(request)
    }

    /// Breaks the link: the transport's `run` returns `error`.
    pub fn fail(&self, error: TransportError) {
        let _ = self.kill.resolve(error);
    }
}
