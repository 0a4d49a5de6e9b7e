//! The socket: one physical link shared by many channels.
//!
//! ```text
//!   connect()
//!     ├─ spawn transport (supervised) ──→ wire
//!     ├─ await ready (connect_timeout)
//!     └─ spawn router: inbound frames ──→ pending replies / channel queues
//!   disconnect()
//!     └─ cancel both, await both, fail leftover replies
//! ```

use std::sync::Arc;

use phx_protocol::{Payload, Ref};
use phx_sync::CancellationToken;
use phx_transport::{Endpoint, Link, LinkHandle, LinkId, RunFuture, TransportError};
use tokio::task::JoinHandle;
use url::Url;

use crate::channel::{Channel, Unjoined};
use crate::config::{SocketBuilder, SocketConfig};
use crate::push::Push;
use crate::shared::{route_inbound, Shared};
use crate::SessionError;

/// Where a socket's link stands, as reported by [`Socket::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected, or disconnected.
    Disconnected,
    /// The link is up.
    Connected,
    /// The link failed. Call [`Socket::disconnect`] to collect the error
    /// before connecting again.
    Failed,
}

/// The background tasks of one connection.
struct Connection {
    id: LinkId,
    transport: JoinHandle<Result<(), TransportError>>,
    router: JoinHandle<()>,
    /// Stops the transport.
    stop: CancellationToken,
    /// Stops the router.
    shutdown: CancellationToken,
    /// Cancelled by the transport task when it ends.
    down: CancellationToken,
}

/// A client connection to a channels server.
///
/// Connect once, then open any number of [`Channel`]s over the same link.
/// Dropping the socket stops its background tasks; channel and push
/// handles still around start failing with
/// [`SessionError::SocketDropped`].
pub struct Socket {
    endpoint: Endpoint,
    config: SocketConfig,
    shared: Arc<Shared>,
    connection: Option<Connection>,
}

impl Socket {
    /// Creates a disconnected socket for `url`.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidUrl`] if `url` doesn't parse.
    pub fn new(url: &str, config: SocketConfig) -> Result<Self, SessionError> {
        let parsed =
            Url::parse(url).map_err(|e| SessionError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self {
            endpoint: Endpoint::new(parsed, config.params.clone()),
            shared: Arc::new(Shared::new(config.reply_timeout)),
            config,
            connection: None,
        })
    }

    /// Starts building a socket for `url`.
    pub fn builder(url: impl Into<String>) -> SocketBuilder {
        SocketBuilder::new(url)
    }

    /// The URL as configured.
    pub fn url(&self) -> &Url {
        self.endpoint.url()
    }

    /// The configuration the socket was built with.
    pub fn config(&self) -> &SocketConfig {
        &self.config
    }

    /// Connects the link and starts routing inbound frames.
    ///
    /// Returns once the transport reports it is ready. On failure the
    /// transport is stopped and the socket stays disconnected.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyConnected`] if a connection exists (also a
    ///   failed one that wasn't disconnected)
    /// - [`SessionError::UnsupportedScheme`] if no transport is registered
    ///   for the URL scheme
    /// - [`SessionError::Transport`] if connecting failed or timed out
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        if self.connection.is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        let scheme = self.endpoint.scheme();
        let factory = self
            .config
            .transports
            .get(scheme)
            .cloned()
            .ok_or_else(|| SessionError::UnsupportedScheme(scheme.to_string()))?;

        let (link, handle) = Link::new(Arc::clone(&self.config.codec));
        let LinkHandle {
            id,
            inbound,
            outbound,
            ready,
            stop,
        } = handle;
        let shutdown = CancellationToken::new();
        let down = CancellationToken::new();

        tracing::debug!(%id, url = %self.endpoint.url(), "connecting");
        self.shared.go_live(outbound, down.clone());
        let run = factory.start(self.endpoint.clone(), link);
        let transport = tokio::spawn(supervise(
            Arc::clone(&self.shared),
            id,
            run,
            stop.clone(),
            shutdown.clone(),
            down.clone(),
        ));

        let limit = self.config.connect_timeout;
        let outcome = match tokio::time::timeout(limit, ready).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(error))) => Err(error),
            Ok(Err(_)) => Err(TransportError::ConnectionClosed(
                "transport ended before it was ready".into(),
            )),
            Err(_) => Err(TransportError::ConnectTimeout(limit)),
        };
        if let Err(error) = outcome {
            tracing::warn!(%id, error = %error, "connect failed");
            stop.cancel();
            // A transport stuck in its connect attempt may not notice `stop`.
            transport.abort();
            let _ = transport.await;
            down.cancel();
            self.shared.go_idle();
            return Err(error.into());
        }

        let router = tokio::spawn(route_inbound(
            Arc::clone(&self.shared),
            inbound,
            shutdown.clone(),
        ));
        self.connection = Some(Connection {
            id,
            transport,
            router,
            stop,
            shutdown,
            down,
        });
        tracing::info!(%id, url = %self.endpoint.url(), "socket connected");
        Ok(())
    }

    /// Stops the link and both background tasks.
    ///
    /// Requests still waiting for a reply fail with
    /// [`SessionError::NotConnected`]. Channel registrations survive, so
    /// channels can join again after the next `connect`.
    ///
    /// # Errors
    /// - [`SessionError::NotConnected`] if there is no connection
    /// - [`SessionError::Transport`] if the transport had failed
    /// - [`SessionError::TaskFailed`] if a background task panicked
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        let connection = self.connection.take().ok_or(SessionError::NotConnected)?;
        connection.shutdown.cancel();
        connection.stop.cancel();

        let (transport, router) = tokio::join!(connection.transport, connection.router);
        self.shared.go_idle();
        connection.down.cancel();
        self.shared.fail_pending(|| SessionError::NotConnected);
        tracing::info!(id = %connection.id, "socket disconnected");

        match (transport, router) {
            (Ok(Err(error)), _) => Err(SessionError::Transport(error)),
            (Err(e), _) | (_, Err(e)) => Err(SessionError::TaskFailed(e.to_string())),
            (Ok(Ok(())), Ok(())) => Ok(()),
        }
    }

    /// Where the link currently stands.
    pub fn state(&self) -> ConnectionState {
        match (&self.connection, self.shared.failure()) {
            (None, _) => ConnectionState::Disconnected,
            (Some(_), Some(_)) => ConnectionState::Failed,
            (Some(_), None) => ConnectionState::Connected,
        }
    }

    /// Whether the link is up and hasn't failed.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connects, runs `body` on the connected socket, then disconnects.
    ///
    /// The disconnect happens whether `body` succeeded or not. If this
    /// future is dropped while `body` runs, the socket stays connected until
    /// it is disconnected or dropped.
    ///
    /// # Errors
    /// The connect error, else `body`'s error, else the disconnect error.
    pub async fn scoped<F, T>(&mut self, body: F) -> Result<T, SessionError>
    where
        F: AsyncFnOnce(&Socket) -> Result<T, SessionError>,
    {
        self.connect().await?;
        let outcome = body(&*self).await;
        let disconnected = self.disconnect().await;
        match (outcome, disconnected) {
            (Err(e), _) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    /// Creates a channel for `topic` and registers it for inbound frames.
    ///
    /// One channel per topic: registering a topic again replaces the old
    /// channel, whose [`receive`](Channel::receive) then reports
    /// [`SessionError::ChannelClosed`].
    pub fn channel(&self, topic: impl Into<String>, params: Payload) -> Channel<Unjoined> {
        let topic = topic.into();
        let messages = self.shared.register_channel(&topic);
        Channel::new(Arc::downgrade(&self.shared), topic, params, messages)
    }

    /// Sends `event` on `topic` and returns once the transport wrote it.
    ///
    /// Uses `reference` if given, otherwise the next ref of this socket.
    ///
    /// # Errors
    /// [`SessionError::NotConnected`] without a connection, or
    /// [`SessionError::Transport`] if the link failed.
    pub async fn send(
        &self,
        topic: &str,
        event: &str,
        payload: Payload,
        reference: Option<Ref>,
    ) -> Result<Push, SessionError> {
        self.shared.send(topic, event, payload, reference).await
    }

    /// The next ref this socket will hand out. Consumes it.
    pub fn next_ref(&self) -> Ref {
        self.shared.next_ref()
    }

    /// How many requests are waiting for a reply.
    pub fn pending_replies(&self) -> usize {
        self.shared.pending_replies()
    }

    /// How many inbound frames could not be delivered so far.
    pub fn routing_misses(&self) -> u64 {
        self.shared.routing_misses()
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        if let Some(connection) = &self.connection {
            connection.shutdown.cancel();
            connection.stop.cancel();
            self.shared.go_idle();
            connection.down.cancel();
        }
        // Handles may keep the shared core alive; nobody will answer them.
        self.shared.fail_pending(|| SessionError::SocketDropped);
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("url", &self.endpoint.url().as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Runs the transport and turns a failure into socket state.
///
/// A failed link fails every pending reply right away and stops the
/// router; later sends fail with the same error until `disconnect`.
async fn supervise(
    shared: Arc<Shared>,
    id: LinkId,
    run: RunFuture,
    stop: CancellationToken,
    shutdown: CancellationToken,
    down: CancellationToken,
) -> Result<(), TransportError> {
    let result = match run.await {
        Ok(()) if !stop.is_cancelled() => Err(TransportError::ConnectionClosed(
            "transport ended on its own".into(),
        )),
        other => other,
    };
    if let Err(error) = &result {
        tracing::error!(%id, error = %error, "transport failed");
        shared.fail_link(error);
        shutdown.cancel();
    }
    down.cancel();
    result
}
