// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-queue admission: bounded worker permits plus a bounded waiting list.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dentassist_core::DentassistError;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::{Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

use crate::slot::{RunningGuard, Slot};
use crate::status::QueueStatus;

/// The scheduler's logical work-streams.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    Speech,
    Generate,
    Embed,
}

/// Tuning for one queue.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Worker pool size.
    pub workers: usize,
    /// Bounded waiting list size.
    pub wait_cap: usize,
    /// How long a submission may wait before it is rejected with `busy`.
    pub wait_budget: Duration,
    /// Retry hint returned with `busy` rejections.
    pub retry_after_secs: u64,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            wait_cap: 16,
            wait_budget: Duration::from_secs(30),
            retry_after_secs: 5,
        }
    }
}

/// Per-queue options for the whole scheduler.
#[derive(Debug, Clone, Default)]
pub struct SchedulerOptions {
    pub speech: QueueOptions,
    pub generate: QueueOptions,
    pub embed: QueueOptions,
}

pub(crate) struct Queue {
    kind: QueueKind,
    capacity: usize,
    wait_cap: usize,
    wait_budget: Duration,
    retry_after_secs: u64,
    permits: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    tickets: AtomicU64,
}

impl Queue {
    pub(crate) fn new(kind: QueueKind, options: QueueOptions) -> Self {
        let capacity = options.workers.max(1);
        Self {
            kind,
            capacity,
            wait_cap: options.wait_cap,
            wait_budget: options.wait_budget,
            retry_after_secs: options.retry_after_secs,
            permits: Arc::new(Semaphore::new(capacity)),
            waiting: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            tickets: AtomicU64::new(0),
        }
    }

    /// The admission contract: immediate claim, FIFO wait under the cap and
    /// budget, or an immediate `busy` rejection.
    pub(crate) async fn admit(
        &self,
        abort: &CancellationToken,
        shutdown: &CancellationToken,
    ) -> Result<Slot, DentassistError> {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed) + 1;

        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(DentassistError::InferenceCancelled),
            Err(TryAcquireError::NoPermits) => {
                // Join the waiting list, unless it is already at capacity.
                let joined = self
                    .waiting
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |w| {
                        (w < self.wait_cap).then_some(w + 1)
                    });
                if joined.is_err() {
                    tracing::debug!(queue = %self.kind, ticket, "waiting list full, shedding");
                    return Err(DentassistError::InferenceBusy {
                        retry_after_secs: self.retry_after_secs,
                    });
                }
                let _waiting = CounterGuard::new(Arc::clone(&self.waiting));

                // tokio's Semaphore queues acquirers FIFO, which is exactly
                // the start-order guarantee.
                tokio::select! {
                    acquired = tokio::time::timeout(
                        self.wait_budget,
                        Arc::clone(&self.permits).acquire_owned(),
                    ) => match acquired {
                        Ok(Ok(permit)) => permit,
                        Ok(Err(_closed)) => return Err(DentassistError::InferenceCancelled),
                        Err(_elapsed) => {
                            tracing::debug!(queue = %self.kind, ticket, "wait budget exhausted");
                            return Err(DentassistError::InferenceBusy {
                                retry_after_secs: self.retry_after_secs,
                            });
                        }
                    },
                    _ = abort.cancelled() => return Err(DentassistError::InferenceCancelled),
                    _ = shutdown.cancelled() => return Err(DentassistError::InferenceCancelled),
                }
            }
        };

        tracing::trace!(queue = %self.kind, ticket, "worker claimed");
        Ok(Slot::new(
            self.kind,
            ticket,
            permit,
            RunningGuard::new(Arc::clone(&self.running)),
            abort.clone(),
            shutdown.clone(),
        ))
    }

    pub(crate) fn status(&self) -> QueueStatus {
        QueueStatus {
            running: self.running.load(Ordering::Acquire),
            waiting: self.waiting.load(Ordering::Acquire),
            capacity: self.capacity,
            overloaded: self.is_overloaded(),
        }
    }

    /// A zero wait-cap queue is never "overloaded" at the edge -- admission
    /// itself sheds once the workers are taken.
    pub(crate) fn is_overloaded(&self) -> bool {
        self.wait_cap > 0 && self.waiting.load(Ordering::Acquire) >= self.wait_cap
    }

    pub(crate) fn running_now(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Wakes every queued acquirer with a closed error. Used at shutdown.
    pub(crate) fn close(&self) {
        self.permits.close();
    }
}

/// Decrements a counter on drop; used for the waiting-list gauge.
struct CounterGuard {
    counter: Arc<AtomicUsize>,
}

impl CounterGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        Self { counter }
    }
}

impl Drop for CounterGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}
