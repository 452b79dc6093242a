// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tiered token-bucket rate limiting.
//!
//! One bucket per `(client_host, endpoint_group)`, the whole store behind a
//! mutex. On cardinality overflow the single bucket with the oldest
//! `last_seen` is evicted, repeatedly until the store fits -- the store is
//! never flushed wholesale, so a burst of new clients cannot reset
//! everyone's quota.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use dentassist_config::model::{GroupRate, RateLimitConfig};
use serde::Serialize;
use strum::Display;

/// Endpoint groups, by cost of what sits behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
pub enum EndpointGroup {
    /// LLM inference and transcription.
    Heavy,
    /// Consultation writes/searches, RAG, model downloads.
    Moderate,
    /// Health, status, metrics.
    Light,
}

/// Path prefix to group mapping; longest prefix wins.
const PATH_GROUPS: &[(&str, EndpointGroup)] = &[
    ("/summarize-stream-rag", EndpointGroup::Heavy),
    ("/summarize-stream", EndpointGroup::Heavy),
    ("/summarize-rag", EndpointGroup::Heavy),
    ("/summarize", EndpointGroup::Heavy),
    ("/transcribe", EndpointGroup::Heavy),
    ("/consultations/", EndpointGroup::Moderate),
    ("/rag/", EndpointGroup::Moderate),
    ("/setup/download", EndpointGroup::Moderate),
];

/// Classifies a request path into its rate-limit group.
pub fn classify(path: &str) -> EndpointGroup {
    let mut best_len = 0;
    let mut best = EndpointGroup::Light;
    for (prefix, group) in PATH_GROUPS {
        if path.starts_with(prefix) && prefix.len() > best_len {
            best_len = prefix.len();
            best = *group;
        }
    }
    best
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy)]
pub enum Decision {
    Allowed { limit: u32, remaining: u32 },
    Limited { limit: u32, retry_after_secs: u64 },
}

/// Mutex-guarded token-bucket store.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<(String, EndpointGroup), Bucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    fn rate(&self, group: EndpointGroup) -> GroupRate {
        match group {
            EndpointGroup::Heavy => self.config.heavy,
            EndpointGroup::Moderate => self.config.moderate,
            EndpointGroup::Light => self.config.light,
        }
    }

    /// Records one request and decides whether it may pass.
    pub fn check(&self, host: &str, group: EndpointGroup, now: Instant) -> Decision {
        let rate = self.rate(group);
        let refill_per_sec = f64::from(rate.per_minute) / 60.0;
        let capacity = f64::from(rate.burst);

        let mut buckets = self.buckets.lock().unwrap_or_else(|p| p.into_inner());
        let key = (host.to_string(), group);
        let bucket = buckets.entry(key.clone()).or_insert(Bucket {
            tokens: capacity,
            last_refill: now,
            last_seen: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * refill_per_sec).min(capacity);
        bucket.last_refill = now;
        bucket.last_seen = now;

        let decision = if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Decision::Allowed {
                limit: rate.burst,
                remaining: bucket.tokens.floor() as u32,
            }
        } else {
            let deficit = 1.0 - bucket.tokens;
            Decision::Limited {
                limit: rate.burst,
                retry_after_secs: (deficit / refill_per_sec).ceil().max(1.0) as u64,
            }
        };

        // Evict oldest-idle buckets one at a time, never the just-touched
        // one (its last_seen is `now`), never the whole store.
        while buckets.len() > self.config.max_buckets {
            let oldest = buckets
                .iter()
                .filter(|(k, _)| **k != key)
                .min_by_key(|(_, b)| b.last_seen)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    buckets.remove(&k);
                }
                None => break,
            }
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(burst: u32, per_minute: u32, max_buckets: usize) -> RateLimitConfig {
        let rate = GroupRate { per_minute, burst };
        RateLimitConfig {
            enabled: true,
            heavy: rate,
            moderate: rate,
            light: rate,
            max_buckets,
        }
    }

    #[test]
    fn classification_prefers_longest_prefix() {
        assert_eq!(classify("/summarize-stream-rag"), EndpointGroup::Heavy);
        assert_eq!(classify("/summarize"), EndpointGroup::Heavy);
        assert_eq!(classify("/transcribe"), EndpointGroup::Heavy);
        assert_eq!(classify("/consultations/search"), EndpointGroup::Moderate);
        assert_eq!(classify("/rag/status"), EndpointGroup::Moderate);
        assert_eq!(classify("/health"), EndpointGroup::Light);
        assert_eq!(classify("/workers/status"), EndpointGroup::Light);
    }

    #[test]
    fn burst_then_limited_with_retry_hint() {
        let limiter = RateLimiter::new(config(3, 60, 16));
        let now = Instant::now();
        for _ in 0..3 {
            assert!(matches!(
                limiter.check("127.0.0.1", EndpointGroup::Heavy, now),
                Decision::Allowed { .. }
            ));
        }
        match limiter.check("127.0.0.1", EndpointGroup::Heavy, now) {
            Decision::Limited { retry_after_secs, .. } => assert!(retry_after_secs >= 1),
            other => panic!("expected limited, got {other:?}"),
        }
    }

    #[test]
    fn refill_restores_tokens() {
        let limiter = RateLimiter::new(config(1, 60, 16));
        let start = Instant::now();
        assert!(matches!(
            limiter.check("h", EndpointGroup::Light, start),
            Decision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("h", EndpointGroup::Light, start),
            Decision::Limited { .. }
        ));
        // One token refills after a second at 60/min.
        let later = start + Duration::from_secs(2);
        assert!(matches!(
            limiter.check("h", EndpointGroup::Light, later),
            Decision::Allowed { .. }
        ));
    }

    #[test]
    fn other_clients_are_unaffected() {
        let limiter = RateLimiter::new(config(1, 60, 16));
        let now = Instant::now();
        assert!(matches!(
            limiter.check("client-a", EndpointGroup::Heavy, now),
            Decision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check("client-a", EndpointGroup::Heavy, now),
            Decision::Limited { .. }
        ));
        assert!(matches!(
            limiter.check("client-b", EndpointGroup::Heavy, now),
            Decision::Allowed { .. }
        ));
    }

    #[test]
    fn groups_have_independent_buckets() {
        let limiter = RateLimiter::new(config(1, 60, 16));
        let now = Instant::now();
        limiter.check("h", EndpointGroup::Heavy, now);
        assert!(matches!(
            limiter.check("h", EndpointGroup::Heavy, now),
            Decision::Limited { .. }
        ));
        assert!(matches!(
            limiter.check("h", EndpointGroup::Light, now),
            Decision::Allowed { .. }
        ));
    }

    #[test]
    fn overflow_evicts_only_the_oldest_idle_bucket() {
        let limiter = RateLimiter::new(config(5, 60, 2));
        let start = Instant::now();

        limiter.check("first", EndpointGroup::Light, start);
        limiter.check("second", EndpointGroup::Light, start + Duration::from_secs(1));
        // Third client overflows the store; "first" has the oldest
        // last_seen and is the one evicted.
        limiter.check("third", EndpointGroup::Light, start + Duration::from_secs(2));

        let buckets = limiter.buckets.lock().unwrap();
        assert_eq!(buckets.len(), 2);
        assert!(!buckets.contains_key(&("first".to_string(), EndpointGroup::Light)));
        assert!(buckets.contains_key(&("second".to_string(), EndpointGroup::Light)));
        assert!(buckets.contains_key(&("third".to_string(), EndpointGroup::Light)));
    }
}
