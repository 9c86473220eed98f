//! Single-completion asynchronous operations.
//!
//! A submitted deploy, invoke or query is represented by a [`PendingTx`]
//! future on the caller's side and a [`Completer`] on the network's side.
//! The completer may be cloned, but only the first `complete` or `fail`
//! settles the operation; every later attempt is ignored and logged.

use crate::network::LedgerError;
use log::warn;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

type Outcome<T> = Result<T, LedgerError>;

/// Creates a linked completer and pending future for one operation.
pub fn pending<T>(operation: &'static str) -> (Completer<T>, PendingTx<T>) {
    let (tx, rx) = oneshot::channel();
    let completer = Completer {
        operation,
        slot: Arc::new(Mutex::new(Some(tx))),
    };
    (completer, PendingTx { operation, rx })
}

pub struct Completer<T> {
    operation: &'static str,
    slot: Arc<Mutex<Option<oneshot::Sender<Outcome<T>>>>>,
}

impl<T> Clone for Completer<T> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation,
            slot: self.slot.clone(),
        }
    }
}

impl<T> Completer<T> {
    /// Settles the operation successfully. Returns false if it was already
    /// settled or the caller stopped waiting.
    pub fn complete(&self, value: T) -> bool {
        self.settle(Ok(value), "complete")
    }

    /// Settles the operation with a failure. Returns false if it was
    /// already settled or the caller stopped waiting.
    pub fn fail(&self, error: LedgerError) -> bool {
        self.settle(Err(error), "error")
    }

    pub fn is_settled(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn settle(&self, outcome: Outcome<T>, signal: &str) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match sender {
            Some(tx) => {
                if tx.send(outcome).is_err() {
                    warn!(
                        "{} '{}' signal arrived after the caller stopped waiting; dropped",
                        self.operation, signal
                    );
                    return false;
                }
                true
            }
            None => {
                warn!(
                    "inconsistent {} signals: '{}' fired after the operation settled; ignored",
                    self.operation, signal
                );
                false
            }
        }
    }
}

/// Caller side of an operation. Resolves exactly once, to the first
/// outcome signalled, or to [`LedgerError::Abandoned`] if every completer
/// is dropped without signalling.
pub struct PendingTx<T> {
    operation: &'static str,
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> Future for PendingTx<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let operation = self.operation;
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(LedgerError::Abandoned(operation))),
            Poll::Pending => Poll::Pending,
        }
    }
}
