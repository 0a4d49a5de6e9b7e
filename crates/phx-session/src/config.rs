//! Socket configuration and builder.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use phx_protocol::{Codec, JsonCodec};
use phx_transport::{TransportFactory, WebSocketTransport};

use crate::{SessionError, Socket};

/// Configuration for a [`Socket`].
///
/// `SocketConfig::default()` speaks JSON over WebSocket (`ws` and `wss`)
/// and is usually all you need; override fields as required.
#[derive(Clone)]
pub struct SocketConfig {
    /// Query parameters sent when connecting, e.g. an auth token.
    pub params: BTreeMap<String, String>,

    /// Transport factory per URL scheme.
    pub transports: HashMap<String, Arc<dyn TransportFactory>>,

    /// Frame encoding handed to the transport.
    pub codec: Arc<dyn Codec>,

    /// How long `connect` waits for the transport to become ready.
    ///
    /// Default: 30 seconds.
    pub connect_timeout: Duration,

    /// How long [`Push::response`](crate::Push::response) waits for a
    /// reply. `None` waits forever.
    ///
    /// Default: 10 seconds.
    pub reply_timeout: Option<Duration>,
}

impl SocketConfig {
    /// The transports registered by default: WebSocket for `ws` and `wss`.
    pub fn default_transports() -> HashMap<String, Arc<dyn TransportFactory>> {
        let websocket: Arc<dyn TransportFactory> = Arc::new(WebSocketTransport::new);
        HashMap::from([
            ("ws".to_string(), Arc::clone(&websocket)),
            ("wss".to_string(), websocket),
        ])
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            params: BTreeMap::new(),
            transports: Self::default_transports(),
            codec: Arc::new(JsonCodec),
            connect_timeout: Duration::from_secs(30),
            reply_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl fmt::Debug for SocketConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<&str> =
            self.transports.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        f.debug_struct("SocketConfig")
            .field("params", &self.params)
            .field("transports", &schemes)
            .field("connect_timeout", &self.connect_timeout)
            .field("reply_timeout", &self.reply_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`Socket`]. Created by [`Socket::builder`].
///
/// ```rust,no_run
/// # fn main() -> Result<(), phx_session::SessionError> {
/// use std::time::Duration;
/// use phx_session::Socket;
///
/// let socket = Socket::builder("ws://localhost:4000/socket/websocket")
///     .param("token", "s3cret")
///     .connect_timeout(Duration::from_secs(5))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SocketBuilder {
    url: String,
    config: SocketConfig,
}

impl SocketBuilder {
    pub(crate) fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            config: SocketConfig::default(),
        }
    }

    /// Adds a connection query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.params.insert(key.into(), value.into());
        self
    }

    /// Registers `factory` for URL scheme `scheme`, replacing any
    /// existing registration.
    pub fn transport(
        mut self,
        scheme: impl Into<String>,
        factory: impl TransportFactory,
    ) -> Self {
        self.config
            .transports
            .insert(scheme.into(), Arc::new(factory));
        self
    }

    /// Sets the frame codec.
    pub fn codec(mut self, codec: impl Codec) -> Self {
        self.config.codec = Arc::new(codec);
        self
    }

    /// Sets how long `connect` waits for the transport.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the default reply timeout. `None` waits forever.
    pub fn reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.reply_timeout = timeout;
        self
    }

    /// Builds the socket. It starts disconnected.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidUrl`] if the URL doesn't parse.
    pub fn build(self) -> Result<Socket, SessionError> {
        Socket::new(&self.url, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SocketConfig::default();
        assert!(config.params.is_empty());
        assert!(config.transports.contains_key("ws"));
        assert!(config.transports.contains_key("wss"));
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.reply_timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_debug_lists_schemes() {
        let debug = format!("{:?}", SocketConfig::default());
        assert!(debug.contains(r#"transports: ["ws", "wss"]"#));
    }

    #[test]
    fn test_builder_sets_fields() {
        let builder = SocketBuilder::new("ws://localhost/socket")
            .param("user_id", "7")
            .connect_timeout(Duration::from_secs(1))
            .reply_timeout(None);
        assert_eq!(builder.config.params["user_id"], "7");
        assert_eq!(builder.config.connect_timeout, Duration::from_secs(1));
        assert_eq!(builder.config.reply_timeout, None);
    }
}
