//! Racing a fetch against a cancellation token.
//!
//! Background loops in phx all look the same: wait for the next item from
//! a queue, handle it, repeat, until someone asks the loop to stop. A bare
//! `queue.recv().await` cannot be interrupted, so every loop goes through
//! [`race_fetch`] instead.

use std::future::Future;

use tokio_util::sync::CancellationToken;

/// The outcome of [`race_fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    /// The fetch completed first and produced this value.
    Item(T),
    /// The token was cancelled first. Nothing was fetched.
    Done,
}

impl<T> Fetched<T> {
    /// Returns `true` for [`Fetched::Done`].
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Converts into an `Option`, mapping `Done` to `None`.
    pub fn into_item(self) -> Option<T> {
        match self {
            Self::Item(item) => Some(item),
            Self::Done => None,
        }
    }
}

/// Waits for `fetch` unless `cancel` fires first.
///
/// - If `cancel` is already cancelled, returns [`Fetched::Done`] without
///   polling `fetch` even once. Cancellation wins ties, so a stopping loop
///   never picks up one more item.
/// - If `cancel` fires while waiting, the in-flight `fetch` is dropped and
///   [`Fetched::Done`] is returned.
/// - If `fetch` completes first, its value is returned and `cancel` is left
///   untouched.
///
/// `fetch` must be cancel-safe (e.g. `mpsc::UnboundedReceiver::recv` or
/// `StreamExt::next`): dropping it before completion must not lose an item.
pub async fn race_fetch<F>(
    fetch: F,
    cancel: &CancellationToken,
) -> Fetched<F::Output>
where
    F: Future,
{
    if cancel.is_cancelled() {
        return Fetched::Done;
    }

    tokio::select! {
        biased;
        () = cancel.cancelled() => Fetched::Done,
        item = fetch => Fetched::Item(item),
    }
}
