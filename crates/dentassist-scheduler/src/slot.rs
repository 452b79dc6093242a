// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A claimed worker slot.
//!
//! Owning a [`Slot`] IS owning the worker: the semaphore permit inside is
//! released when the slot drops, never earlier. Streaming callers move the
//! slot into the task that consumes the token stream, so the worker stays
//! claimed for the stream's whole lifetime.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dentassist_core::DentassistError;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

use crate::queue::QueueKind;

/// Deadline stand-in when the caller supplies none.
const NO_DEADLINE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A claimed worker on one queue.
pub struct Slot {
    kind: QueueKind,
    ticket: u64,
    _permit: OwnedSemaphorePermit,
    _running: RunningGuard,
    abort: CancellationToken,
    shutdown: CancellationToken,
}

impl Slot {
    pub(crate) fn new(
        kind: QueueKind,
        ticket: u64,
        permit: OwnedSemaphorePermit,
        running: RunningGuard,
        abort: CancellationToken,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            kind,
            ticket,
            _permit: permit,
            _running: running,
            abort,
            shutdown,
        }
    }

    /// Queue this slot belongs to.
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Monotonic submission ticket.
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// A token that fires when the caller aborts or shutdown begins.
    ///
    /// Streaming callers hand this to the backend so token production halts
    /// on client disconnect. The linkage task exits when the slot drops.
    pub fn cancellation(&self) -> CancellationToken {
        let merged = CancellationToken::new();
        let child = merged.clone();
        let abort = self.abort.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = abort.cancelled() => child.cancel(),
                _ = shutdown.cancelled() => child.cancel(),
                _ = child.cancelled() => {}
            }
        });
        merged
    }

    /// Runs a unary backend call on this worker.
    ///
    /// When the caller's abort or the deadline fires mid-call, the token
    /// handed to `work` is cancelled and the future is still driven to
    /// completion -- the backend must never be abandoned mid-call -- then the
    /// result is discarded in favour of `inference/cancelled`.
    pub async fn run<T, F, Fut>(
        self,
        deadline: Option<Duration>,
        work: F,
    ) -> Result<T, DentassistError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, DentassistError>>,
    {
        let backend_cancel = CancellationToken::new();
        let fut = work(backend_cancel.clone());
        tokio::pin!(fut);

        let timer = tokio::time::sleep(deadline.unwrap_or(NO_DEADLINE));
        tokio::pin!(timer);

        let mut cancelled = false;
        let result = loop {
            tokio::select! {
                result = &mut fut => break result,
                _ = self.abort.cancelled(), if !cancelled => {
                    tracing::debug!(queue = %self.kind, ticket = self.ticket, "abort received, draining");
                    backend_cancel.cancel();
                    cancelled = true;
                }
                _ = self.shutdown.cancelled(), if !cancelled => {
                    backend_cancel.cancel();
                    cancelled = true;
                }
                _ = &mut timer, if !cancelled => {
                    tracing::debug!(queue = %self.kind, ticket = self.ticket, "deadline expired, draining");
                    backend_cancel.cancel();
                    cancelled = true;
                }
            }
        };

        if cancelled {
            Err(DentassistError::InferenceCancelled)
        } else {
            result
        }
    }
}

/// Increments the queue's running gauge for the slot's lifetime.
pub(crate) struct RunningGuard {
    counter: Arc<AtomicUsize>,
}

impl RunningGuard {
    pub(crate) fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { counter }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}
