//! Synchronization primitives shared by every phx layer.
//!
//! Two small building blocks live here:
//!
//! - **Signals** ([`signal`], [`Resolver`], [`Waiter`]): a value that is
//!   delivered at most once across a task boundary. Used for "the transport
//!   is ready", "this frame was written" and "the reply arrived".
//! - **Cancellable fetch** ([`race_fetch`], [`Fetched`]): wait for the next
//!   item from a queue unless a shutdown token fires first.
//!
//! # How it fits in the stack
//!
//! ```text
//! Session Layer   ← pending replies, routing loop shutdown
//!     ↕
//! Transport Layer ← ready / send acknowledgement, pump shutdown
//!     ↕
//! Sync (this crate)
//! ```

mod error;
mod race;
mod signal;

pub use error::SignalError;
pub use race::{race_fetch, Fetched};
pub use signal::{signal, Resolver, Waiter};

/// Re-exported so callers name the same token type the primitives take.
pub use tokio_util::sync::CancellationToken;
