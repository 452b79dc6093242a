// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded-concurrency scheduler for the three model queues.
//!
//! Model backends are scarce, expensive, and thread-hostile. The scheduler is
//! the only component allowed to run them: three logical queues (speech,
//! generate, embed), each owning a bounded worker pool, a bounded FIFO
//! waiting list, and a monotonic ticket counter.
//!
//! Admission contract:
//! 1. A free worker runs the submission immediately.
//! 2. Otherwise the submission waits FIFO while the waiting list has room,
//!    bounded by the wait budget.
//! 3. Otherwise it fails immediately with `busy` and a retry hint.
//!
//! Cancellation while waiting removes the submission without touching the
//! backend. Cancellation while running requests best-effort abort: streaming
//! backends halt token production; unary calls drain to completion and the
//! result is discarded, so the worker is never left mid-call.

mod queue;
mod slot;
mod status;

pub use queue::{QueueKind, QueueOptions, SchedulerOptions};
pub use slot::Slot;
pub use status::{QueueStatus, SchedulerStatus};

use std::sync::Arc;
use std::time::Duration;

use dentassist_core::{DentassistError, HardwareProfile};
use tokio_util::sync::CancellationToken;

use queue::Queue;

/// The inference scheduler. One instance per process, shared by reference.
pub struct Scheduler {
    speech: Queue,
    generate: Queue,
    embed: Queue,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Builds a scheduler from per-queue options.
    pub fn new(options: SchedulerOptions) -> Self {
        Self {
            speech: Queue::new(QueueKind::Speech, options.speech),
            generate: Queue::new(QueueKind::Generate, options.generate),
            embed: Queue::new(QueueKind::Embed, options.embed),
            shutdown: CancellationToken::new(),
        }
    }

    /// Builds a scheduler with the default ratios for a hardware profile:
    /// speech=1, generate=1 (2 on `high_vram`), embed=1.
    pub fn for_profile(profile: HardwareProfile, mut options: SchedulerOptions) -> Self {
        if profile == HardwareProfile::HighVram && options.generate.workers == 1 {
            options.generate.workers = 2;
        }
        Self::new(options)
    }

    fn queue(&self, kind: QueueKind) -> &Queue {
        match kind {
            QueueKind::Speech => &self.speech,
            QueueKind::Generate => &self.generate,
            QueueKind::Embed => &self.embed,
        }
    }

    /// Waits for a worker on `kind`'s queue, honouring the admission
    /// contract. The returned [`Slot`] owns the worker until dropped.
    pub async fn admit(
        &self,
        kind: QueueKind,
        abort: &CancellationToken,
    ) -> Result<Slot, DentassistError> {
        if self.shutdown.is_cancelled() {
            return Err(DentassistError::InferenceCancelled);
        }
        self.queue(kind).admit(abort, &self.shutdown).await
    }

    /// Admission plus unary execution in one call.
    ///
    /// `work` receives a cancellation token the backend should observe; when
    /// the caller's abort or the deadline fires mid-run, the token is
    /// cancelled, the work future is still driven to completion, and the
    /// result is discarded in favour of `inference/cancelled`.
    pub async fn submit<T, F, Fut>(
        &self,
        kind: QueueKind,
        abort: &CancellationToken,
        deadline: Option<Duration>,
        work: F,
    ) -> Result<T, DentassistError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: std::future::Future<Output = Result<T, DentassistError>>,
    {
        let slot = self.admit(kind, abort).await?;
        slot.run(deadline, work).await
    }

    /// Per-queue `{running, waiting, capacity}` snapshot.
    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            speech: self.speech.status(),
            generate: self.generate.status(),
            embed: self.embed.status(),
        }
    }

    /// True when `kind`'s waiting list is at capacity. The gateway sheds new
    /// submissions at the edge instead of letting them queue up.
    pub fn is_overloaded(&self, kind: QueueKind) -> bool {
        self.queue(kind).is_overloaded()
    }

    /// Token cancelled when shutdown begins. Long-lived streams observe it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Graceful shutdown: stop admissions, cancel all waiting submissions,
    /// then allow running work up to `drain` to finish.
    pub async fn shutdown(&self, drain: Duration) {
        self.shutdown.cancel();
        self.speech.close();
        self.generate.close();
        self.embed.close();

        let deadline = tokio::time::Instant::now() + drain;
        loop {
            let running = self.speech.running_now()
                + self.generate.running_now()
                + self.embed.running_now();
            if running == 0 {
                tracing::info!("scheduler drained");
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(remaining = running, "scheduler drain period elapsed");
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn small_options(workers: usize, wait_cap: usize) -> SchedulerOptions {
        let q = QueueOptions {
            workers,
            wait_cap,
            wait_budget: Duration::from_millis(200),
            retry_after_secs: 1,
        };
        SchedulerOptions {
            speech: q.clone(),
            generate: q.clone(),
            embed: q,
        }
    }

    #[tokio::test]
    async fn runs_immediately_when_idle() {
        let scheduler = Scheduler::new(small_options(1, 4));
        let abort = CancellationToken::new();
        let out = scheduler
            .submit(QueueKind::Generate, &abort, None, |_c| async { Ok(41 + 1) })
            .await
            .unwrap();
        assert_eq!(out, 42);
    }

    #[tokio::test]
    async fn active_work_never_exceeds_worker_count() {
        let scheduler = Arc::new(Scheduler::new(small_options(2, 16)));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let scheduler = scheduler.clone();
            let active = active.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let abort = CancellationToken::new();
                scheduler
                    .submit(QueueKind::Embed, &abort, None, |_c| async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn zero_wait_cap_rejects_second_submission() {
        let scheduler = Arc::new(Scheduler::new(small_options(1, 0)));
        let gate = Arc::new(tokio::sync::Notify::new());

        let first = {
            let scheduler = scheduler.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                let abort = CancellationToken::new();
                scheduler
                    .submit(QueueKind::Generate, &abort, None, |_c| async move {
                        gate.notified().await;
                        Ok(())
                    })
                    .await
            })
        };
        // Let the first submission claim the worker.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let abort = CancellationToken::new();
        let second = scheduler
            .submit(QueueKind::Generate, &abort, None, |_c| async { Ok(()) })
            .await;
        match second {
            Err(DentassistError::InferenceBusy { retry_after_secs }) => {
                assert_eq!(retry_after_secs, 1)
            }
            other => panic!("expected busy, got {other:?}"),
        }

        gate.notify_one();
        first.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn waiting_list_is_bounded() {
        let scheduler = Arc::new(Scheduler::new(small_options(1, 1)));
        let gate = Arc::new(tokio::sync::Notify::new());

        // Occupy the worker.
        let holder = {
            let scheduler = scheduler.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                let abort = CancellationToken::new();
                scheduler
                    .submit(QueueKind::Speech, &abort, None, |_c| async move {
                        gate.notified().await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // One waiter fits.
        let waiter = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                let abort = CancellationToken::new();
                scheduler
                    .submit(QueueKind::Speech, &abort, None, |_c| async { Ok(1) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(scheduler.status().speech.waiting, 1);
        assert!(scheduler.is_overloaded(QueueKind::Speech));

        // The next one is shed.
        let abort = CancellationToken::new();
        let shed = scheduler
            .submit(QueueKind::Speech, &abort, None, |_c| async { Ok(2) })
            .await;
        assert!(matches!(shed, Err(DentassistError::InferenceBusy { .. })));

        gate.notify_one();
        holder.await.unwrap().unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn cancel_while_waiting_never_contacts_backend() {
        let scheduler = Arc::new(Scheduler::new(small_options(1, 4)));
        let gate = Arc::new(tokio::sync::Notify::new());
        let backend_calls = Arc::new(AtomicUsize::new(0));

        let holder = {
            let scheduler = scheduler.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                let abort = CancellationToken::new();
                scheduler
                    .submit(QueueKind::Generate, &abort, None, |_c| async move {
                        gate.notified().await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let abort = CancellationToken::new();
        let waiter = {
            let scheduler = scheduler.clone();
            let abort = abort.clone();
            let backend_calls = backend_calls.clone();
            tokio::spawn(async move {
                scheduler
                    .submit(QueueKind::Generate, &abort, None, |_c| async move {
                        backend_calls.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        abort.cancel();

        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(DentassistError::InferenceCancelled)));
        assert_eq!(backend_calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.status().generate.waiting, 0);

        gate.notify_one();
        holder.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unary_cancellation_drains_and_discards() {
        let scheduler = Scheduler::new(small_options(1, 4));
        let abort = CancellationToken::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let abort_trigger = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            abort_trigger.cancel();
        });

        let finished_inner = finished.clone();
        let result = scheduler
            .submit(QueueKind::Generate, &abort, None, |_c| async move {
                // Backend that ignores the abort signal entirely.
                tokio::time::sleep(Duration::from_millis(60)).await;
                finished_inner.fetch_add(1, Ordering::SeqCst);
                Ok("discarded")
            })
            .await;

        assert!(matches!(result, Err(DentassistError::InferenceCancelled)));
        // The backend call was driven to completion before the slot freed.
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deadline_acts_like_cancellation() {
        let scheduler = Scheduler::new(small_options(1, 4));
        let abort = CancellationToken::new();
        let result: Result<(), _> = scheduler
            .submit(
                QueueKind::Speech,
                &abort,
                Some(Duration::from_millis(20)),
                |cancel| async move {
                    cancel.cancelled().await;
                    Err(DentassistError::InferenceCancelled)
                },
            )
            .await;
        assert!(matches!(result, Err(DentassistError::InferenceCancelled)));
    }

    #[tokio::test]
    async fn not_ready_releases_worker_cleanly() {
        let scheduler = Scheduler::new(small_options(1, 4));
        let abort = CancellationToken::new();
        let result: Result<(), _> = scheduler
            .submit(QueueKind::Generate, &abort, None, |_c| async {
                Err(DentassistError::ModelNotReady("weights absent".into()))
            })
            .await;
        assert!(matches!(result, Err(DentassistError::ModelNotReady(_))));

        // The worker is reusable immediately.
        let ok = scheduler
            .submit(QueueKind::Generate, &abort, None, |_c| async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(ok, 7);
        let status = scheduler.status();
        assert_eq!(status.generate.running, 0);
    }

    #[tokio::test]
    async fn shutdown_cancels_waiters_and_refuses_admission() {
        let scheduler = Arc::new(Scheduler::new(small_options(1, 4)));
        let gate = Arc::new(tokio::sync::Notify::new());

        let holder = {
            let scheduler = scheduler.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                let abort = CancellationToken::new();
                scheduler
                    .submit(QueueKind::Generate, &abort, None, |cancel| async move {
                        tokio::select! {
                            _ = gate.notified() => {}
                            _ = cancel.cancelled() => {}
                        }
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let waiter = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                let abort = CancellationToken::new();
                scheduler
                    .submit(QueueKind::Generate, &abort, None, |_c| async { Ok(()) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        scheduler.shutdown(Duration::from_millis(500)).await;

        // The waiter never reached a worker; the holder was cancelled while
        // running and its (clean) completion is discarded.
        let waited = waiter.await.unwrap();
        assert!(matches!(waited, Err(DentassistError::InferenceCancelled)));
        let held = holder.await.unwrap();
        assert!(matches!(held, Err(DentassistError::InferenceCancelled)));

        let abort = CancellationToken::new();
        let refused = scheduler
            .submit(QueueKind::Generate, &abort, None, |_c| async { Ok(()) })
            .await;
        assert!(matches!(refused, Err(DentassistError::InferenceCancelled)));
    }

    #[tokio::test]
    async fn high_vram_raises_generate_pool() {
        let scheduler =
            Scheduler::for_profile(HardwareProfile::HighVram, small_options(1, 4));
        assert_eq!(scheduler.status().generate.capacity, 2);
        assert_eq!(scheduler.status().speech.capacity, 1);

        let cpu = Scheduler::for_profile(HardwareProfile::CpuOnly, small_options(1, 4));
        assert_eq!(cpu.status().generate.capacity, 1);
    }
}
