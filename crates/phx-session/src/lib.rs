//! Socket and channel sessions for phx.
//!
//! A [`Socket`] owns one physical link to a channels server. Any number of
//! [`Channel`]s share it, each bound to a topic:
//!
//! ```text
//! Channel layer (Channel<S>, Push, IncomingMessage)
//!     ↕  refs, pending replies, per-topic queues
//! Socket layer (Socket, router task, transport supervisor)
//!     ↕  Link: frame queues + ready + stop
//! Transport layer (phx-transport)
//! ```
//!
//! ```rust,no_run
//! use phx_session::{SessionError, Socket};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), SessionError> {
//! let mut socket = Socket::builder("ws://localhost:4000/socket/websocket").build()?;
//! socket.connect().await?;
//!
//! let (mut lobby, _) = socket.channel("room:lobby", json!({})).join().await?;
//! let reply = lobby.push("ping", json!({})).await?.response().await?;
//! println!("{reply}");
//! let message = lobby.receive().await?;
//! println!("{}: {}", message.event(), message.payload());
//!
//! lobby.leave().await?;
//! socket.disconnect().await
//! # }
//! ```

mod channel;
mod config;
mod error;
mod message;
mod push;
mod shared;
mod socket;

pub use channel::{Channel, ChannelState, Joinable, Joined, Left, Unjoined};
pub use config::{SocketBuilder, SocketConfig};
pub use error::{RoutingMiss, SessionError};
pub use message::IncomingMessage;
pub use push::Push;
pub use socket::{ConnectionState, Socket};
