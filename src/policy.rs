//! Retry policy for rate-limited and failed requests
//!
//! The policy is pure: given the attempt index and the outcome of that
//! attempt it decides whether the call is finished or how long to wait
//! before the next attempt. Waiting itself is the fetcher's job.

use crate::{
    constants::{BASE_BACKOFF_MS_ENV, DEFAULT_BASE_BACKOFF_MS, DEFAULT_MAX_RETRIES, MAX_RETRIES_ENV},
    error::TransportError,
    types::FetchResponse,
};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::str::FromStr;
use std::time::Duration;

/// Immutable retry configuration shared by every call of a fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_backoff: Duration,
}

/// What to do after inspecting one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the outcome of this attempt to the caller
    Finish,
    /// Wait, then run the next attempt
    RetryAfter(Duration),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff: Duration::from_millis(DEFAULT_BASE_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy allowing `max_retries` retries after the first attempt
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
        }
    }

    /// Builds a policy from `COIN_MARKET_MAX_RETRIES` and
    /// `COIN_MARKET_BASE_BACKOFF_MS`, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let max_retries = read_setting(&lookup, MAX_RETRIES_ENV).unwrap_or(defaults.max_retries);
        let base_backoff = read_setting::<u64>(&lookup, BASE_BACKOFF_MS_ENV)
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_backoff);

        Self::new(max_retries, base_backoff)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_backoff(&self) -> Duration {
        self.base_backoff
    }

    /// Upper bound on network attempts for one logical call
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Exponential backoff for the given 0-based attempt: `base * 2^attempt`
    ///
    /// Saturates at `Duration::MAX` when the product does not fit.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if self.base_backoff.is_zero() {
            return Duration::ZERO;
        }

        2_u128
            .checked_pow(attempt)
            .and_then(|multiplier| self.base_backoff.as_nanos().checked_mul(multiplier))
            .and_then(duration_from_nanos)
            .unwrap_or(Duration::MAX)
    }

    /// Wait after a rate-limited response
    ///
    /// `Retry-After` wins over the computed backoff whenever it holds an
    /// integer number of seconds.
    pub fn rate_limit_wait(&self, attempt: u32, headers: &HeaderMap) -> Duration {
        parse_retry_after(headers).unwrap_or_else(|| self.backoff_for(attempt))
    }

    /// Decides what follows the given attempt
    pub fn decide(
        &self,
        attempt: u32,
        outcome: &Result<FetchResponse, TransportError>,
    ) -> RetryDecision {
        let wait = match outcome {
            Ok(response) if !response.is_rate_limited() => return RetryDecision::Finish,
            Ok(response) => self.rate_limit_wait(attempt, response.headers()),
            Err(_) => self.backoff_for(attempt),
        };

        if attempt >= self.max_retries {
            RetryDecision::Finish
        } else {
            RetryDecision::RetryAfter(wait)
        }
    }
}

/// Parses `Retry-After` as an integer number of seconds
///
/// HTTP-date values and anything else unparsable yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn duration_from_nanos(nanos: u128) -> Option<Duration> {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let secs = u64::try_from(nanos / NANOS_PER_SEC).ok()?;
    Some(Duration::new(secs, (nanos % NANOS_PER_SEC) as u32))
}

fn read_setting<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable retry setting");
            None
        }
    }
}
