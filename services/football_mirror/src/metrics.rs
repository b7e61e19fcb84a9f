use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayMetrics {
    pub requests_per_second: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_response_time_ms: f64,
    pub rate_limiter_wait_time_ms: f64,
    pub total_rate_limiter_wait_ms: f64,
    pub upstream_requests_remaining: Option<i64>,
    pub last_endpoint: Option<String>,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

/// Shared request counters for the upstream gateway.
#[derive(Clone)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<GatewayMetrics>>,
    started_at: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Counters stay readable after a panic on another thread
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(Mutex::new(GatewayMetrics::default())),
            started_at: Instant::now(),
        }
    }

    pub fn record_request_start(&self, endpoint: &str) -> RequestTracker {
        lock(&self.metrics).last_endpoint = Some(endpoint.to_string());
        RequestTracker {
            start_time: Instant::now(),
            collector: self.clone(),
        }
    }

    pub fn record_rate_limit_wait(&self, duration: Duration) {
        let mut metrics = lock(&self.metrics);
        let waited = duration.as_secs_f64() * 1000.0;
        metrics.rate_limiter_wait_time_ms = waited;
        metrics.total_rate_limiter_wait_ms += waited;
    }

    pub fn record_quota_remaining(&self, remaining: i64) {
        lock(&self.metrics).upstream_requests_remaining = Some(remaining);
    }

    /// Records an error that happened before a request could be tracked,
    /// such as an exhausted daily budget.
    pub fn record_error(&self, error: String) {
        let mut metrics = lock(&self.metrics);
        metrics.last_error = Some(error);
        metrics.last_error_time = Some(Utc::now());
        metrics.failed_requests += 1;
    }

    pub fn get_metrics(&self) -> GatewayMetrics {
        lock(&self.metrics).clone()
    }
}

pub struct RequestTracker {
    start_time: Instant,
    collector: MetricsCollector,
}

impl RequestTracker {
    pub fn finish(self, success: bool) {
        self.complete(success, None);
    }

    pub fn fail(self, error: String) {
        self.complete(false, Some(error));
    }

    fn complete(self, success: bool, error: Option<String>) {
        let duration = self.start_time.elapsed();
        let mut metrics = lock(&self.collector.metrics);

        metrics.total_requests += 1;
        if success {
            metrics.successful_requests += 1;
        } else {
            metrics.failed_requests += 1;
        }
        if let Some(error) = error {
            metrics.last_error = Some(error);
            metrics.last_error_time = Some(Utc::now());
        }

        // Exponential moving average
        let alpha = 0.1;
        metrics.avg_response_time_ms =
            metrics.avg_response_time_ms * (1.0 - alpha) + duration.as_secs_f64() * 1000.0 * alpha;

        // Average over the collector's lifetime
        let uptime = self.collector.started_at.elapsed().as_secs_f64();
        if uptime > 0.0 {
            metrics.requests_per_second = metrics.total_requests as f64 / uptime;
        }
    }
}
