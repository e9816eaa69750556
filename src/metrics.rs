//! Monitoring and metrics tracking for the multi-agent system
//!
//! One process-wide accumulator, mutated by every request. Counters are
//! atomics and the tally maps sit behind a mutex, so concurrent pipeline
//! runs can record without coordination.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

pub struct MetricsCollector {
    request_count: AtomicU64,
    success_count: AtomicU64,
    error_count: AtomicU64,
    total_response_time_ms: AtomicU64,
    requests_by_intent: Mutex<HashMap<String, u64>>,
    errors_by_type: Mutex<HashMap<String, u64>>,
    start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate_percent: f64,
    pub average_response_time_seconds: f64,
    pub requests_per_minute: f64,
    pub requests_by_intent: HashMap<String, u64>,
    pub errors_by_type: HashMap<String, u64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            total_response_time_ms: AtomicU64::new(0),
            requests_by_intent: Mutex::new(HashMap::new()),
            errors_by_type: Mutex::new(HashMap::new()),
            start_time: Utc::now(),
        }
    }

    pub fn record_request(
        &self,
        success: bool,
        response_time: Duration,
        intent: Option<&str>,
        error_type: Option<&str>,
    ) {
        self.request_count.fetch_add(1, Ordering::Relaxed);

        if success {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.error_count.fetch_add(1, Ordering::Relaxed);
            if let Some(error_type) = error_type {
                let mut errors = self.errors_by_type.lock().unwrap();
                *errors.entry(error_type.to_string()).or_insert(0) += 1;
            }
        }

        self.total_response_time_ms
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);

        if let Some(intent) = intent {
            let mut intents = self.requests_by_intent.lock().unwrap();
            *intents.entry(intent.to_string()).or_insert(0) += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = (Utc::now() - self.start_time)
            .to_std()
            .unwrap_or_default()
            .as_secs_f64();

        let total = self.request_count.load(Ordering::Relaxed);
        let successful = self.success_count.load(Ordering::Relaxed);
        let failed = self.error_count.load(Ordering::Relaxed);
        let total_ms = self.total_response_time_ms.load(Ordering::Relaxed);

        let success_rate = if total > 0 {
            successful as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let avg_response_time = if total > 0 {
            total_ms as f64 / total as f64 / 1000.0
        } else {
            0.0
        };
        let per_minute = if uptime > 0.0 {
            total as f64 / (uptime / 60.0)
        } else {
            0.0
        };

        MetricsSnapshot {
            uptime_seconds: uptime,
            total_requests: total,
            successful_requests: successful,
            failed_requests: failed,
            success_rate_percent: round2(success_rate),
            average_response_time_seconds: round3(avg_response_time),
            requests_per_minute: round2(per_minute),
            requests_by_intent: self.requests_by_intent.lock().unwrap().clone(),
            errors_by_type: self.errors_by_type.lock().unwrap().clone(),
        }
    }

    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            total = snapshot.total_requests,
            success_rate = snapshot.success_rate_percent,
            avg_response_time = snapshot.average_response_time_seconds,
            "System metrics"
        );
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

lazy_static! {
    static ref GLOBAL_METRICS: MetricsCollector = MetricsCollector::new();
}

/// The process-wide collector; lifetime equals process lifetime.
pub fn get_metrics_collector() -> &'static MetricsCollector {
    &GLOBAL_METRICS
}

/// Record a request metric in the global collector.
pub fn record_request_metric(
    success: bool,
    response_time: Duration,
    intent: Option<&str>,
    error_type: Option<&str>,
) {
    GLOBAL_METRICS.record_request(success, response_time, intent, error_type);
}
