//! Fetch metrics collection and reporting
//!
//! Tracks retry counters and call latency percentiles for one fetcher.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples to keep for metrics calculation
const MAX_SAMPLES: usize = 100;

/// How a logical call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// A response other than "too many requests" was returned
    Completed,
    /// Retries ran out while still rate limited
    RateLimited,
    /// Retries ran out on transport errors
    TransportFailure,
    /// The caller cancelled the call
    Cancelled,
}

/// Everything recorded about one finished logical call
#[derive(Debug, Clone, Copy)]
pub struct CallRecord {
    pub outcome: CallOutcome,
    pub attempts: u32,
    pub rate_limited_responses: u32,
    pub transport_errors: u32,
    pub elapsed: Duration,
}

/// Point-in-time view of a fetcher's metrics
#[derive(Debug, Clone, PartialEq)]
pub struct FetchMetricsSnapshot {
    /// Logical calls finished
    pub total_calls: u64,
    /// Network attempts across all calls
    pub total_attempts: u64,
    /// 429 responses seen, including retried ones
    pub rate_limited_responses: u64,
    /// Failed attempts, including retried ones
    pub transport_errors: u64,
    /// Calls that ended rate limited or with a transport failure
    pub failed_calls: u64,
    /// Calls abandoned through cancellation
    pub cancelled_calls: u64,
    /// 50th percentile latency of completed calls in milliseconds
    pub latency_p50_ms: f64,
    /// 99th percentile latency of completed calls in milliseconds
    pub latency_p99_ms: f64,
}

impl FetchMetricsSnapshot {
    /// Creates a snapshot with no data
    pub fn empty() -> Self {
        Self {
            total_calls: 0,
            total_attempts: 0,
            rate_limited_responses: 0,
            transport_errors: 0,
            failed_calls: 0,
            cancelled_calls: 0,
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
        }
    }

    /// Share of finished calls that did not fail (cancelled calls excluded)
    pub fn success_rate(&self) -> f64 {
        let decided = self.total_calls - self.cancelled_calls;
        if decided == 0 {
            1.0
        } else {
            (decided - self.failed_calls) as f64 / decided as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    total_calls: u64,
    total_attempts: u64,
    rate_limited_responses: u64,
    transport_errors: u64,
    failed_calls: u64,
    cancelled_calls: u64,
}

/// Collects and computes metrics for a fetcher
#[derive(Debug)]
pub struct MetricsCollector {
    counters: RwLock<Counters>,
    /// Rolling window of completed-call latencies in milliseconds
    samples: RwLock<VecDeque<f64>>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(Counters::default()),
            samples: RwLock::new(VecDeque::with_capacity(MAX_SAMPLES)),
        }
    }

    /// Records a finished logical call
    pub async fn record_call(&self, record: CallRecord) {
        {
            let mut counters = self.counters.write().await;
            counters.total_calls += 1;
            counters.total_attempts += u64::from(record.attempts);
            counters.rate_limited_responses += u64::from(record.rate_limited_responses);
            counters.transport_errors += u64::from(record.transport_errors);
            match record.outcome {
                CallOutcome::Completed => {}
                CallOutcome::RateLimited | CallOutcome::TransportFailure => {
                    counters.failed_calls += 1
                }
                CallOutcome::Cancelled => counters.cancelled_calls += 1,
            }
        }

        if record.outcome == CallOutcome::Completed {
            let mut samples = self.samples.write().await;
            if samples.len() >= MAX_SAMPLES {
                samples.pop_front();
            }
            samples.push_back(record.elapsed.as_secs_f64() * 1000.0);
        }
    }

    /// Computes current metrics from collected samples
    pub async fn snapshot(&self) -> FetchMetricsSnapshot {
        let counters = self.counters.read().await;
        if counters.total_calls == 0 {
            return FetchMetricsSnapshot::empty();
        }

        let mut latencies: Vec<f64> = self.samples.read().await.iter().copied().collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        FetchMetricsSnapshot {
            total_calls: counters.total_calls,
            total_attempts: counters.total_attempts,
            rate_limited_responses: counters.rate_limited_responses,
            transport_errors: counters.transport_errors,
            failed_calls: counters.failed_calls,
            cancelled_calls: counters.cancelled_calls,
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
        }
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}
