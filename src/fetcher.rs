//! Rate-limit aware retrying fetcher
//!
//! One logical call maps to at most `max_retries + 1` network attempts:
//!
//! ```text
//! ATTEMPTING ──► SUCCESS              (any status other than 429)
//!     │
//!     ├──► RATE_LIMITED_RETRY ──► ATTEMPTING   (429, wait Retry-After or backoff)
//!     ├──► TRANSPORT_ERROR_RETRY ──► ATTEMPTING (I/O error, wait backoff)
//!     └──► EXHAUSTED              (last attempt was 429 or an I/O error)
//! ```
//!
//! Exhaustion on 429 hands the last rate-limited response back as `Ok`; the
//! caller decides what a non-2xx status means. Exhaustion on transport errors
//! returns `FetchError::Transport` wrapping the last error.

use crate::{
    error::FetchError,
    metrics::{CallOutcome, CallRecord, FetchMetricsSnapshot, MetricsCollector},
    policy::{RetryDecision, RetryPolicy},
    transport::{HttpTransport, ReqwestTransport},
    types::{FetchResponse, RequestDescriptor},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Per-call bookkeeping, never shared between calls
#[derive(Debug, Default)]
struct AttemptState {
    /// Attempts started so far
    attempts: u32,
    rate_limited: u32,
    transport_errors: u32,
}

/// Performs HTTP calls with bounded retry on rate limiting and transport errors
///
/// The fetcher holds only immutable configuration and is safe to share behind
/// an `Arc`; concurrent calls wait independently of each other.
///
/// # Example
/// ```no_run
/// use coin_market_sdk::{RequestDescriptor, RetryPolicy, RetryingFetcher};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = RetryingFetcher::new(RetryPolicy::default())?;
/// let request = RequestDescriptor::get("https://api.coingecko.com/api/v3/ping")?;
/// let response = fetcher.fetch(&request).await?;
/// println!("HTTP {}", response.status());
/// # Ok(())
/// # }
/// ```
pub struct RetryingFetcher {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    metrics: Arc<MetricsCollector>,
}

impl RetryingFetcher {
    /// Creates a fetcher backed by `ReqwestTransport`
    pub fn new(policy: RetryPolicy) -> Result<Self, FetchError> {
        let transport = ReqwestTransport::new().map_err(FetchError::ClientBuild)?;
        Ok(Self::with_transport(Arc::new(transport), policy))
    }

    /// Creates a fetcher using the retry policy from the environment
    pub fn from_env() -> Result<Self, FetchError> {
        Self::new(RetryPolicy::from_env())
    }

    /// Creates a fetcher with a custom transport
    pub fn with_transport(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Returns the name of the underlying transport
    pub fn transport_name(&self) -> &'static str {
        self.transport.transport_name()
    }

    /// Returns retry counters and latency percentiles for this fetcher
    pub async fn metrics(&self) -> FetchMetricsSnapshot {
        self.metrics.snapshot().await
    }

    /// Performs one logical call
    ///
    /// # Returns
    /// The first response whose status is not 429, the last 429 response once
    /// retries run out, or `FetchError::Transport` if the final attempt failed
    /// at the transport level
    pub async fn fetch(&self, request: &RequestDescriptor) -> Result<FetchResponse, FetchError> {
        self.fetch_with_cancel(request, &CancellationToken::new()).await
    }

    /// Performs one logical call that stops as soon as `cancel` fires
    ///
    /// Cancellation interrupts both backoff waits and in-flight attempts and
    /// yields `FetchError::Cancelled`.
    pub async fn fetch_with_cancel(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, FetchError> {
        let span = tracing::info_span!(
            "fetch",
            call_id = %Uuid::new_v4(),
            method = %request.method(),
            url = %request.url()
        );

        let started = Instant::now();
        let mut state = AttemptState::default();
        let result = self
            .run(request, cancel, &mut state)
            .instrument(span)
            .await;

        let outcome = match &result {
            Ok(response) if response.is_rate_limited() => CallOutcome::RateLimited,
            Ok(_) => CallOutcome::Completed,
            Err(FetchError::Cancelled { .. }) => CallOutcome::Cancelled,
            Err(_) => CallOutcome::TransportFailure,
        };

        self.metrics
            .record_call(CallRecord {
                outcome,
                attempts: state.attempts,
                rate_limited_responses: state.rate_limited,
                transport_errors: state.transport_errors,
                elapsed: started.elapsed(),
            })
            .await;

        result
    }

    async fn run(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
        state: &mut AttemptState,
    ) -> Result<FetchResponse, FetchError> {
        loop {
            if cancel.is_cancelled() {
                tracing::info!(attempts = state.attempts, "Request cancelled before attempt");
                return Err(FetchError::cancelled(state.attempts));
            }

            let attempt = state.attempts;
            state.attempts += 1;
            tracing::debug!(attempt, transport = self.transport.transport_name(), "Sending request");

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(attempt, "Request cancelled while in flight");
                    return Err(FetchError::cancelled(state.attempts));
                }
                outcome = self.transport.execute(request) => outcome,
            };

            match &outcome {
                Ok(response) if response.is_rate_limited() => state.rate_limited += 1,
                Ok(_) => {}
                Err(_) => state.transport_errors += 1,
            }

            let wait = match self.policy.decide(attempt, &outcome) {
                RetryDecision::Finish => {
                    return match outcome {
                        Ok(response) => {
                            if response.is_rate_limited() {
                                tracing::warn!(
                                    attempts = state.attempts,
                                    "Still rate limited after all retries"
                                );
                            } else {
                                tracing::debug!(
                                    attempt,
                                    status = response.status().as_u16(),
                                    "Request finished"
                                );
                            }
                            Ok(response)
                        }
                        Err(err) => {
                            tracing::warn!(
                                attempts = state.attempts,
                                error = %err,
                                "Transport failure after all retries"
                            );
                            Err(FetchError::transport(state.attempts, err))
                        }
                    };
                }
                RetryDecision::RetryAfter(wait) => wait,
            };

            match &outcome {
                Ok(response) => tracing::warn!(
                    attempt,
                    max_retries = self.policy.max_retries(),
                    wait_ms = millis(wait),
                    retry_after = response.retry_after().is_some(),
                    "Rate limited, retrying"
                ),
                Err(err) => tracing::warn!(
                    attempt,
                    max_retries = self.policy.max_retries(),
                    wait_ms = millis(wait),
                    error = %err,
                    "Transport error, retrying"
                ),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(attempt, "Request cancelled during backoff");
                    return Err(FetchError::cancelled(state.attempts));
                }
                _ = sleep(wait) => {}
            }
        }
    }
}

/// Whole milliseconds of a wait for logging, capped at `u64::MAX`
fn millis(wait: Duration) -> u64 {
    u64::try_from(wait.as_millis()).unwrap_or(u64::MAX)
}
