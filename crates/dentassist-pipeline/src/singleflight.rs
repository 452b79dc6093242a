// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Best-effort single-flight over string-keyed work.
//!
//! The first caller for a key becomes the leader and runs the work; callers
//! arriving while it is in flight subscribe to the leader's result instead
//! of re-running the backend. Best-effort only: a caller that arrives after
//! the leader finished starts a fresh flight.

use std::future::Future;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dentassist_core::DentassistError;
use tokio::sync::broadcast;

type FlightResult = Result<String, DentassistError>;

/// Collapses concurrent identical requests into one backend call.
#[derive(Default)]
pub struct SingleFlight {
    inflight: DashMap<String, broadcast::Sender<FlightResult>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` under `key`. Returns the result and whether this caller
    /// was the leader (i.e. actually executed the work).
    pub async fn run<F, Fut>(&self, key: String, work: F) -> (FlightResult, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FlightResult>,
    {
        let role = match self.inflight.entry(key.clone()) {
            Entry::Occupied(entry) => Role::Follower(entry.get().subscribe()),
            Entry::Vacant(entry) => {
                let (tx, _) = broadcast::channel(1);
                entry.insert(tx.clone());
                Role::Leader(tx)
            }
        };

        match role {
            Role::Leader(tx) => {
                // Remove-on-drop: if the leader is cancelled mid-flight the
                // entry disappears and followers observe a closed channel
                // instead of hanging.
                let _guard = RemoveOnDrop {
                    map: &self.inflight,
                    key: &key,
                };
                let result = work().await;
                // Remove before sending: subscribers joined while the entry
                // existed, so they all receive the broadcast; anyone later
                // starts a fresh flight.
                self.inflight.remove(&key);
                let _ = tx.send(result.clone());
                (result, true)
            }
            Role::Follower(mut rx) => match rx.recv().await {
                Ok(result) => (result, false),
                Err(_) => (
                    Err(DentassistError::SystemInternal(
                        "single-flight leader was cancelled".into(),
                    )),
                    false,
                ),
            },
        }
    }
}

enum Role {
    Leader(broadcast::Sender<FlightResult>),
    Follower(broadcast::Receiver<FlightResult>),
}

struct RemoveOnDrop<'a> {
    map: &'a DashMap<String, broadcast::Sender<FlightResult>>,
    key: &'a str,
}

impl Drop for RemoveOnDrop<'_> {
    fn drop(&mut self) {
        self.map.remove(self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flight = Arc::new(SingleFlight::new());
        let executions = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let flight = flight.clone();
            let executions = executions.clone();
            handles.push(tokio::spawn(async move {
                flight
                    .run("key".to_string(), || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok("résultat".to_string())
                    })
                    .await
            }));
        }

        let mut leaders = 0;
        for handle in handles {
            let (result, leader) = handle.await.unwrap();
            assert_eq!(result.unwrap(), "résultat");
            if leader {
                leaders += 1;
            }
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(leaders, 1);
    }

    #[tokio::test]
    async fn sequential_callers_each_execute() {
        let flight = SingleFlight::new();
        let executions = AtomicU64::new(0);

        for _ in 0..2 {
            let (result, leader) = flight
                .run("key".to_string(), || async {
                    executions.fetch_add(1, Ordering::SeqCst);
                    Ok("ok".to_string())
                })
                .await;
            assert!(result.is_ok());
            assert!(leader);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_share() {
        let flight = Arc::new(SingleFlight::new());
        let executions = Arc::new(AtomicU64::new(0));

        let a = {
            let flight = flight.clone();
            let executions = executions.clone();
            tokio::spawn(async move {
                flight
                    .run("a".to_string(), || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok("a".to_string())
                    })
                    .await
            })
        };
        let b = {
            let flight = flight.clone();
            let executions = executions.clone();
            tokio::spawn(async move {
                flight
                    .run("b".to_string(), || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        Ok("b".to_string())
                    })
                    .await
            })
        };
        a.await.unwrap().0.unwrap();
        b.await.unwrap().0.unwrap();
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_propagate_to_followers() {
        let flight = Arc::new(SingleFlight::new());

        let leader = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("key".to_string(), || async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err(DentassistError::InferenceRuntime("backend down".into()))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let follower = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("key".to_string(), || async {
                        panic!("follower must not execute");
                    })
                    .await
            })
        };

        let (leader_result, _) = leader.await.unwrap();
        let (follower_result, was_leader) = follower.await.unwrap();
        assert!(matches!(
            leader_result,
            Err(DentassistError::InferenceRuntime(_))
        ));
        assert!(matches!(
            follower_result,
            Err(DentassistError::InferenceRuntime(_))
        ));
        assert!(!was_leader);
    }
}
