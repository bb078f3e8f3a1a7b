//! # CoinGecko Market Data SDK
//!
//! Fetches cryptocurrency market listings and price charts from the
//! CoinGecko public API, retrying politely when the API rate limits us.
//!
//! ## Usage
//!
//! ```no_run
//! use coin_market_sdk::{ChartRange, CoinGeckoClient, MarketsQuery};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CoinGeckoClient::new()?;
//!
//! for coin in client.get_markets(&MarketsQuery::default()).await? {
//!     println!("{}: {:?}", coin.name, coin.current_price);
//! }
//!
//! let chart = client.get_price_history("bitcoin", ChartRange::D7).await?;
//! println!("{} samples", chart.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Retry Behaviour
//!
//! Every request runs through [`RetryingFetcher`]:
//!
//! - HTTP 429 is retried after `Retry-After` seconds, or `base * 2^attempt`
//!   when the header is missing or not an integer
//! - connection errors and timeouts are retried after `base * 2^attempt`
//! - any other status is returned immediately
//! - at most `max_retries + 1` attempts are made; defaults are 3 retries and a
//!   500 ms base, overridable with `COIN_MARKET_MAX_RETRIES` and
//!   `COIN_MARKET_BASE_BACKOFF_MS`
//!
//! Waits are `tokio` timers and can be interrupted with a
//! [`CancellationToken`](tokio_util::sync::CancellationToken).
//!
//! ## Architecture
//!
//! ```text
//! CoinGeckoClient (typed endpoints, JSON decoding)
//!     ↓
//! RetryingFetcher (RetryPolicy, cancellation, metrics)
//!     ↓
//! HttpTransport (ReqwestTransport: one attempt, per-attempt timeouts)
//! ```

pub mod constants;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod policy;
pub mod providers;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use error::{FetchError, MarketDataError, TransportError, TransportErrorKind};
pub use fetcher::RetryingFetcher;
pub use metrics::FetchMetricsSnapshot;
pub use policy::{RetryDecision, RetryPolicy};
pub use providers::CoinGeckoClient;
pub use transport::{HttpTransport, ReqwestTransport};
pub use types::{
    ChartRange, CoinMarket, FetchResponse, MarketsQuery, PriceHistory, PricePoint,
    RequestDescriptor,
};
