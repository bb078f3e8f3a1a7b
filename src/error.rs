//! Error types for the market data client

use reqwest::StatusCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Classification of a failed network attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection could not be established (DNS, refused, reset)
    Connect,
    /// Connect or read timeout elapsed
    Timeout,
    /// Request could not be built or sent
    Request,
    /// Response body could not be read
    Body,
    /// Anything else reported by the HTTP stack
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// A single network attempt that failed before a response was received
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    /// What went wrong
    pub kind: TransportErrorKind,
    /// Human readable detail from the HTTP stack
    pub message: String,
}

impl TransportError {
    /// Creates a transport error of the given kind
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a connection error
    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    /// Creates a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else if err.is_request() || err.is_builder() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }
}

/// Terminal outcome of a logical call that did not produce a response
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every attempt failed at the transport level
    #[error("transport failure after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// The caller cancelled the call during a wait or an attempt
    #[error("request cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// The request descriptor could not be built
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The underlying HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] TransportError),
}

impl FetchError {
    /// Creates a Transport error
    pub fn transport(attempts: u32, source: TransportError) -> Self {
        Self::Transport { attempts, source }
    }

    /// Creates a Cancelled error
    pub fn cancelled(attempts: u32) -> Self {
        Self::Cancelled { attempts }
    }

    /// Creates an InvalidRequest error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Returns true if the call ended because of cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Errors returned by the typed CoinGecko client
#[derive(Debug, Error)]
pub enum MarketDataError {
    /// The underlying fetch failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Still rate limited after all retries
    #[error("Rate limit exceeded (retry after: {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Upstream answered with a non-success status
    #[error("API error: HTTP {status}: {body}")]
    Api { status: StatusCode, body: String },

    /// Payload did not match the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Caller supplied arguments that cannot form a request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl MarketDataError {
    /// Creates an InvalidResponse error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Creates an InvalidRequest error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }
}
