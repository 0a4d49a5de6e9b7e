//! Single-resolution signals.
//!
//! A signal is a one-shot channel with an explicit "already resolved"
//! error. The [`Resolver`] half can be shared (`resolve` takes `&self`), so
//! whoever holds it can settle the signal exactly once; every later attempt
//! is reported instead of silently ignored.
//!
//! ```text
//!   Resolver ──resolve(value)──→ Waiter.await == Ok(value)
//!   Resolver ──drop──────────→ Waiter.await == Err(Abandoned)
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::SignalError;

/// Creates a new unresolved signal.
pub fn signal<T>() -> (Resolver<T>, Waiter<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Resolver {
            sender: Mutex::new(Some(tx)),
        },
        Waiter { receiver: rx },
    )
}

/// The resolving half of a signal.
pub struct Resolver<T> {
    /// `None` once the signal has been resolved.
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Resolver<T> {
    /// Delivers `value` to the waiter.
    ///
    /// Resolving after the waiter was dropped still counts as the one
    /// resolution and returns `Ok`: nobody is listening, but the signal is
    /// settled.
    ///
    /// # Errors
    /// Returns [`SignalError::AlreadyResolved`] on every call after the first.
    pub fn resolve(&self, value: T) -> Result<(), SignalError> {
        let sender = self
            .sender
            .lock()
            .take()
            .ok_or(SignalError::AlreadyResolved)?;
        let _ = sender.send(value);
        Ok(())
    }

    /// Returns `true` once [`resolve`](Self::resolve) has succeeded.
    pub fn is_resolved(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Returns `true` if the waiter is gone and the signal is still open.
    pub fn is_abandoned(&self) -> bool {
        self.sender
            .lock()
            .as_ref()
            .is_some_and(oneshot::Sender::is_closed)
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// The waiting half of a signal. Await it to get the value.
#[derive(Debug)]
pub struct Waiter<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> Waiter<T> {
    /// Takes the value if it is already there, without waiting.
    ///
    /// # Errors
    /// Returns [`SignalError::Abandoned`] if the resolver was dropped.
    pub fn try_take(&mut self) -> Result<Option<T>, SignalError> {
        match self.receiver.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => {
                Err(SignalError::Abandoned)
            }
        }
    }
}

impl<T> Future for Waiter<T> {
    type Output = Result<T, SignalError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map_err(|_| SignalError::Abandoned)
    }
}
