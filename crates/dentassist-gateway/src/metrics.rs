// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process request metrics.
//!
//! Per endpoint: request count, error counts broken down by error kind, and
//! a capped latency reservoir yielding p50/p95/p99. A ring buffer keeps the
//! last errors for the bug-report surface. No external services -- this is
//! the whole observability backend of a desktop app.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

/// Latency samples kept per endpoint.
const MAX_LATENCY_SAMPLES: usize = 500;

/// Errors retained in the ring buffer.
const ERROR_BUFFER_SIZE: usize = 100;

#[derive(Default)]
struct EndpointStats {
    request_count: u64,
    errors_4xx: u64,
    errors_5xx: u64,
    errors_by_kind: HashMap<&'static str, u64>,
    total_latency_ms: f64,
    latencies: Vec<f64>,
}

/// One retained error, for `/metrics.recent_errors`.
#[derive(Debug, Clone, Serialize)]
pub struct RecentError {
    pub timestamp: String,
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

#[derive(Serialize)]
struct EndpointSnapshot {
    requests: u64,
    errors_4xx: u64,
    errors_5xx: u64,
    errors_by_kind: HashMap<&'static str, u64>,
    avg_latency_ms: f64,
    p50_ms: f64,
    p95_ms: f64,
    p99_ms: f64,
}

/// JSON snapshot served by `GET /metrics`.
#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: f64,
    pub total_requests: u64,
    pub active_requests: i64,
    endpoints: HashMap<String, EndpointSnapshot>,
    recent_errors: Vec<RecentError>,
    /// Out-of-band health counters: audit write failures, journal lines
    /// skipped, deferred index upserts, post-generation save failures.
    pub counters: HashMap<&'static str, u64>,
}

/// Thread-safe in-process metrics collector.
pub struct MetricsCollector {
    start: Instant,
    active: AtomicI64,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    total_requests: u64,
    endpoints: HashMap<String, EndpointStats>,
    recent_errors: VecDeque<RecentError>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            active: AtomicI64::new(0),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn request_started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn request_finished(
        &self,
        method: &str,
        path: &str,
        status: u16,
        latency_ms: f64,
        request_id: &str,
        error_kind: Option<&'static str>,
    ) {
        self.active.fetch_sub(1, Ordering::Relaxed);

        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.total_requests += 1;

        let stats = inner
            .endpoints
            .entry(format!("{method} {path}"))
            .or_default();
        stats.request_count += 1;
        stats.total_latency_ms += latency_ms;

        // Capped reservoir; after the cap, overwrite in submission order so
        // the distribution keeps tracking recent traffic.
        if stats.latencies.len() < MAX_LATENCY_SAMPLES {
            stats.latencies.push(latency_ms);
        } else {
            let slot = (stats.request_count as usize) % MAX_LATENCY_SAMPLES;
            stats.latencies[slot] = latency_ms;
        }

        if let Some(kind) = error_kind {
            *stats.errors_by_kind.entry(kind).or_insert(0) += 1;
        }
        if (400..500).contains(&status) {
            stats.errors_4xx += 1;
        }
        if status >= 500 {
            stats.errors_5xx += 1;
        }
        if status >= 400 {
            if inner.recent_errors.len() == ERROR_BUFFER_SIZE {
                inner.recent_errors.pop_front();
            }
            inner.recent_errors.push_back(RecentError {
                timestamp: chrono_now(),
                request_id: request_id.to_string(),
                method: method.to_string(),
                path: path.to_string(),
                status,
                error_code: error_kind,
            });
        }
    }

    /// Builds the `/metrics` snapshot; `counters` carries out-of-band health
    /// counts assembled by the caller.
    pub fn snapshot(&self, counters: HashMap<&'static str, u64>) -> MetricsSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let endpoints = inner
            .endpoints
            .iter()
            .map(|(key, stats)| {
                let mut sorted = stats.latencies.clone();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let percentile = |p: usize| -> f64 {
                    if sorted.is_empty() {
                        return 0.0;
                    }
                    let idx = (sorted.len() * p / 100).min(sorted.len() - 1);
                    sorted[idx]
                };
                (
                    key.clone(),
                    EndpointSnapshot {
                        requests: stats.request_count,
                        errors_4xx: stats.errors_4xx,
                        errors_5xx: stats.errors_5xx,
                        errors_by_kind: stats.errors_by_kind.clone(),
                        avg_latency_ms: if stats.request_count == 0 {
                            0.0
                        } else {
                            stats.total_latency_ms / stats.request_count as f64
                        },
                        p50_ms: percentile(50),
                        p95_ms: percentile(95),
                        p99_ms: percentile(99),
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            uptime_seconds: self.start.elapsed().as_secs_f64(),
            total_requests: inner.total_requests,
            active_requests: self.active.load(Ordering::Relaxed),
            endpoints,
            recent_errors: inner.recent_errors.iter().cloned().collect(),
            counters,
        }
    }
}

fn chrono_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_percentiles() {
        let metrics = MetricsCollector::new();
        for i in 0..10 {
            metrics.request_started();
            metrics.request_finished("POST", "/summarize", 200, i as f64, "req", None);
        }
        metrics.request_started();
        metrics.request_finished(
            "POST",
            "/summarize",
            503,
            1.0,
            "req-err",
            Some("inference/busy"),
        );

        let snapshot = metrics.snapshot(HashMap::new());
        assert_eq!(snapshot.total_requests, 11);
        assert_eq!(snapshot.active_requests, 0);

        let endpoint = &snapshot.endpoints["POST /summarize"];
        assert_eq!(endpoint.requests, 11);
        assert_eq!(endpoint.errors_5xx, 1);
        assert_eq!(endpoint.errors_by_kind["inference/busy"], 1);
        assert!(endpoint.p50_ms <= endpoint.p95_ms);
        assert!(endpoint.p95_ms <= endpoint.p99_ms);
    }

    #[test]
    fn error_ring_buffer_is_bounded() {
        let metrics = MetricsCollector::new();
        for i in 0..(ERROR_BUFFER_SIZE + 20) {
            metrics.request_started();
            metrics.request_finished(
                "GET",
                "/metrics",
                500,
                1.0,
                &format!("req-{i}"),
                Some("system/internal"),
            );
        }
        let snapshot = metrics.snapshot(HashMap::new());
        assert_eq!(snapshot.recent_errors.len(), ERROR_BUFFER_SIZE);
        // Oldest entries were evicted.
        assert_eq!(snapshot.recent_errors[0].request_id, "req-20");
    }

    #[test]
    fn latency_reservoir_is_capped() {
        let metrics = MetricsCollector::new();
        for i in 0..(MAX_LATENCY_SAMPLES + 100) {
            metrics.request_started();
            metrics.request_finished("GET", "/health", 200, i as f64, "req", None);
        }
        let snapshot = metrics.snapshot(HashMap::new());
        let endpoint = &snapshot.endpoints["GET /health"];
        assert_eq!(endpoint.requests, (MAX_LATENCY_SAMPLES + 100) as u64);
    }
}
