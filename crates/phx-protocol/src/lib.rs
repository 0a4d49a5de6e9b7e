//! Wire protocol for phx.
//!
//! This crate defines the "language" a channels client speaks:
//!
//! - **Types** ([`Frame`], [`Ref`], [`ChannelEvent`], [`Reply`]): the
//!   message structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames are converted
//!   to and from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and session
//! (sockets and channels). It doesn't know about connections or topics
//! being joined; it only knows how frames look.
//!
//! ```text
//! Transport (bytes) → Protocol (Frame) → Session (Socket, Channel)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::{CodecError, ProtocolError};
pub use types::{ChannelEvent, Frame, Payload, Ref, Reply, ReplyStatus};

/// Protocol version sent as the `vsn` connection parameter.
pub const PROTOCOL_VERSION: &str = "1.0.0";
