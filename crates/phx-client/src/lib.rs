//! # phx
//!
//! Client for Phoenix-style multiplexed channels: many topic-scoped
//! conversations over one connection.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use phx_client::prelude::*;
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), PhxError> {
//! let mut socket = Socket::builder("ws://localhost:4000/socket/websocket")
//!     .param("user_id", "7")
//!     .build()?;
//! socket.connect().await?;
//!
//! let reply = socket
//!     .channel("room:lobby", json!({}))
//!     .scoped(|channel, _joined| async move {
//!         channel.push("ping", json!({})).await?.response().await
//!     })
//!     .await?;
//! println!("{reply}");
//!
//! socket.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! - [`sync`]: single-resolution signals and cancellable waits
//! - [`protocol`]: frames, refs, reply envelopes and codecs
//! - [`transport`]: the transport trait, WebSocket and in-memory links
//! - [`session`]: sockets, channels and pushes

mod error;

pub use error::PhxError;

pub use phx_protocol as protocol;
pub use phx_session as session;
pub use phx_sync as sync;
pub use phx_transport as transport;

pub use phx_protocol::{Codec, Frame, JsonCodec, Payload, Ref, Reply, ReplyStatus};
pub use phx_session::{
    Channel, ConnectionState, IncomingMessage, Joined, Left, Push, SessionError, Socket,
    SocketBuilder, SocketConfig, Unjoined,
};
pub use phx_transport::{Transport, TransportError, TransportFactory};

/// Convenient imports for phx users.
///
/// ```rust
/// use phx_client::prelude::*;
/// ```
pub mod prelude {
    pub use crate::PhxError;
    pub use phx_protocol::{Frame, Payload, Ref, Reply, ReplyStatus};
    pub use phx_session::{
        Channel, ConnectionState, IncomingMessage, Joined, Left, Push, SessionError, Socket,
        SocketConfig, Unjoined,
    };
}
