//! Request events, metric sinks, and statistics.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};

/// Outcome of one workload attempt, as handed to a [`MetricsSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    #[serde(rename = "type")]
    pub request_type: String,
    pub name: String,
    pub duration_ms: f64,
    pub size_bytes: usize,
    pub error: Option<String>,
}

impl RequestEvent {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Receives request events for aggregation or reporting.
///
/// Called synchronously from the virtual user that produced the event.
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: RequestEvent);
}

impl<T: MetricsSink + ?Sized> MetricsSink for Arc<T> {
    fn record(&self, event: RequestEvent) {
        (**self).record(event)
    }
}

impl<T: MetricsSink> MetricsSink for Option<T> {
    fn record(&self, event: RequestEvent) {
        if let Some(sink) = self {
            sink.record(event);
        }
    }
}

impl<A: MetricsSink, B: MetricsSink> MetricsSink for (A, B) {
    fn record(&self, event: RequestEvent) {
        self.0.record(event.clone());
        self.1.record(event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RequestEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far, in arrival order.
    pub fn events(&self) -> Vec<RequestEvent> {
        lock(&self.events).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetricsSink for RecordingSink {
    fn record(&self, event: RequestEvent) {
        lock(&self.events).push(event);
    }
}

/// Appends each event as one JSON line to a file.
pub struct RequestLogSink {
    writer: Mutex<BufWriter<File>>,
    started: Instant,
}

#[derive(Serialize)]
struct LoggedEvent<'a> {
    timestamp_ms: u64,
    #[serde(flatten)]
    event: &'a RequestEvent,
}

impl RequestLogSink {
    /// Create (or truncate) the log file at `path`.
    pub fn create(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
            started: Instant::now(),
        })
    }

    pub fn flush(&self) -> std::io::Result<()> {
        lock(&self.writer).flush()
    }
}

impl MetricsSink for RequestLogSink {
    fn record(&self, event: RequestEvent) {
        let entry = LoggedEvent {
            timestamp_ms: self.started.elapsed().as_millis() as u64,
            event: &event,
        };
        if let Ok(json) = serde_json::to_string(&entry) {
            let mut writer = lock(&self.writer);
            let _ = writeln!(writer, "{}", json);
        }
    }
}

/// Distinct error texts tracked per endpoint; the rest fold into [`OTHER_FAILURES`].
pub const MAX_DISTINCT_FAILURES: usize = 50;

/// Error texts longer than this are truncated before grouping.
pub const MAX_FAILURE_KEY_CHARS: usize = 200;

/// Bucket for failures past [`MAX_DISTINCT_FAILURES`].
pub const OTHER_FAILURES: &str = "(other errors)";

/// Statistics for one `(type, name)` pair.
struct EndpointMetrics {
    histogram: Histogram<u64>,
    requests_total: u64,
    requests_success: u64,
    requests_failed: u64,
    bytes_total: u64,
    failures: BTreeMap<String, u64>,
}

impl EndpointMetrics {
    fn new() -> Self {
        Self {
            histogram: Histogram::new(3).expect("Failed to create histogram"),
            requests_total: 0,
            requests_success: 0,
            requests_failed: 0,
            bytes_total: 0,
            failures: BTreeMap::new(),
        }
    }

    fn record(&mut self, event: &RequestEvent) {
        self.requests_total += 1;
        self.bytes_total += event.size_bytes as u64;
        self.histogram
            .record((event.duration_ms * 1000.0).round().max(0.0) as u64)
            .ok();

        match &event.error {
            None => self.requests_success += 1,
            Some(error) => {
                self.requests_failed += 1;
                self.count_failure(error, 1);
            }
        }
    }

    fn count_failure(&mut self, error: &str, count: u64) {
        let key = if error.chars().count() > MAX_FAILURE_KEY_CHARS {
            let mut truncated: String = error.chars().take(MAX_FAILURE_KEY_CHARS).collect();
            truncated.push_str("...");
            truncated
        } else {
            error.to_string()
        };

        let tracked = self.failures.contains_key(&key);
        let key = if tracked || self.failures.len() < MAX_DISTINCT_FAILURES {
            key
        } else {
            OTHER_FAILURES.to_string()
        };
        *self.failures.entry(key).or_insert(0) += count;
    }

    fn merge(&mut self, other: &EndpointMetrics) {
        self.histogram.add(&other.histogram).ok();
        self.requests_total += other.requests_total;
        self.requests_success += other.requests_success;
        self.requests_failed += other.requests_failed;
        self.bytes_total += other.bytes_total;
        for (error, count) in &other.failures {
            self.count_failure(error, *count);
        }
    }

    fn results(&self, request_type: &str, name: &str, duration_secs: f64) -> EndpointResults {
        let per_sec = |value: u64| {
            if duration_secs > 0.0 {
                value as f64 / duration_secs
            } else {
                0.0
            }
        };
        let ms = |us: u64| us as f64 / 1000.0;

        let (latency_avg, latency_min, latency_max) = if self.histogram.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (
                self.histogram.mean() / 1000.0,
                ms(self.histogram.min()),
                ms(self.histogram.max()),
            )
        };

        let mut failures: Vec<FailureCount> = self
            .failures
            .iter()
            .map(|(error, count)| FailureCount {
                error: error.clone(),
                count: *count,
            })
            .collect();
        failures.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.error.cmp(&b.error)));

        EndpointResults {
            request_type: request_type.to_string(),
            name: name.to_string(),
            total_requests: self.requests_total,
            successful_requests: self.requests_success,
            failed_requests: self.requests_failed,
            requests_per_second: per_sec(self.requests_total),
            failures_per_second: per_sec(self.requests_failed),
            latency_p50: ms(self.histogram.value_at_percentile(50.0)),
            latency_p75: ms(self.histogram.value_at_percentile(75.0)),
            latency_p90: ms(self.histogram.value_at_percentile(90.0)),
            latency_p95: ms(self.histogram.value_at_percentile(95.0)),
            latency_p99: ms(self.histogram.value_at_percentile(99.0)),
            latency_min,
            latency_max,
            latency_avg,
            avg_size_bytes: if self.requests_total > 0 {
                self.bytes_total as f64 / self.requests_total as f64
            } else {
                0.0
            },
            failures,
        }
    }
}

#[derive(Default)]
struct CollectorState {
    endpoints: BTreeMap<(String, String), EndpointMetrics>,
    first_event: Option<Instant>,
    last_event: Option<Instant>,
}

/// Aggregates request events into per-endpoint latency and outcome statistics.
#[derive(Default)]
pub struct MetricsCollector {
    state: Mutex<CollectorState>,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard everything collected so far.
    pub fn reset(&self) {
        *lock(&self.state) = CollectorState::default();
    }

    /// Number of events recorded since creation or the last reset.
    pub fn total_requests(&self) -> u64 {
        lock(&self.state)
            .endpoints
            .values()
            .map(|m| m.requests_total)
            .sum()
    }

    /// Generate final test results.
    pub fn results(&self, scenario_name: String, users: u32, run_stats: RunStats) -> TestResults {
        let state = lock(&self.state);

        let duration_secs = state
            .last_event
            .and_then(|last| state.first_event.map(|first| last.duration_since(first)))
            .unwrap_or_default()
            .as_secs_f64();

        let mut combined = EndpointMetrics::new();
        let endpoints = state
            .endpoints
            .iter()
            .map(|((request_type, name), metrics)| {
                combined.merge(metrics);
                metrics.results(request_type, name, duration_secs)
            })
            .collect();

        TestResults {
            timestamp: chrono::Utc::now().to_rfc3339(),
            scenario_name,
            duration_secs,
            users,
            endpoints,
            total: combined.results("", "Total", duration_secs),
            run_stats,
        }
    }
}

impl MetricsSink for MetricsCollector {
    fn record(&self, event: RequestEvent) {
        let now = Instant::now();
        let mut state = lock(&self.state);

        state.first_event.get_or_insert(now);
        state.last_event = Some(now);

        state
            .endpoints
            .entry((event.request_type.clone(), event.name.clone()))
            .or_insert_with(EndpointMetrics::new)
            .record(&event);
    }
}

/// How many times one distinct error was reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureCount {
    pub error: String,
    pub count: u64,
}

/// Statistics for one endpoint (or the aggregate "Total").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointResults {
    pub request_type: String,
    pub name: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub requests_per_second: f64,
    pub failures_per_second: f64,

    // Latency percentiles (ms)
    pub latency_p50: f64,
    pub latency_p75: f64,
    pub latency_p90: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub latency_min: f64,
    pub latency_max: f64,
    pub latency_avg: f64,

    pub avg_size_bytes: f64,
    pub failures: Vec<FailureCount>,
}

impl EndpointResults {
    /// Percentage of requests that succeeded, 0 when nothing was sent.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.successful_requests as f64 / self.total_requests as f64) * 100.0
        }
    }
}

/// Virtual-user lifecycle counters kept by the runner.
///
/// Transport faults during transfers are counted here; they never reach a
/// metrics sink.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub users_spawned: u64,
    pub users_ready: u64,
    pub user_creation_failures: u64,
    pub account_creation_failures: u64,
    pub unseeded_accounts: u64,
    pub transfers_skipped: u64,
    pub transfer_transport_faults: u64,
}

/// Final test results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResults {
    pub timestamp: String,
    pub scenario_name: String,
    pub duration_secs: f64,
    pub users: u32,
    pub endpoints: Vec<EndpointResults>,
    pub total: EndpointResults,
    pub run_stats: RunStats,
}
