//! Transport abstraction performing a single network attempt

use crate::{
    constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, USER_AGENT, WRITE_TIMEOUT_SECS},
    error::TransportError,
    types::{FetchResponse, RequestDescriptor},
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Trait for HTTP transports
///
/// An implementation performs exactly one network attempt and never retries
/// on its own; retrying is left to `RetryingFetcher`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends the request and reads the whole response body
    ///
    /// # Returns
    /// The response for any status code, or an error if no response was
    /// received (connection failure, timeout, truncated body)
    async fn execute(&self, request: &RequestDescriptor) -> Result<FetchResponse, TransportError>;

    /// Returns the name of this transport
    fn transport_name(&self) -> &'static str;
}

/// reqwest-backed transport with per-attempt timeouts
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Creates a transport with the default timeouts
    ///
    /// Connect is bounded by `CONNECT_TIMEOUT_SECS`, each read by
    /// `READ_TIMEOUT_SECS`, and the whole attempt by the sum of the connect,
    /// read and write budgets.
    pub fn new() -> Result<Self, TransportError> {
        let attempt_budget = CONNECT_TIMEOUT_SECS + READ_TIMEOUT_SECS + WRITE_TIMEOUT_SECS;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .read_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            .timeout(Duration::from_secs(attempt_budget))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }

    /// Wraps an already configured client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &RequestDescriptor) -> Result<FetchResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());

        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();

        // Draining the body lets the connection go back to the pool even when
        // the response is thrown away for a retry.
        let body = response.bytes().await?;

        Ok(FetchResponse::new(status, headers, body))
    }

    fn transport_name(&self) -> &'static str {
        "reqwest"
    }
}
