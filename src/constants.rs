//! Constants for the CoinGecko market data client
//!
//! Defaults for the retry policy and the HTTP transport are centralized here.
//! The retry policy can be overridden at runtime through the environment
//! variables listed below; everything else is compile-time.

/// HTTP status signalling "too many requests"
pub const RATE_LIMIT_STATUS: u16 = 429;

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base backoff between retries (in milliseconds)
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 500;

/// Environment variable overriding the maximum retry count
pub const MAX_RETRIES_ENV: &str = "COIN_MARKET_MAX_RETRIES";

/// Environment variable overriding the base backoff (in milliseconds)
pub const BASE_BACKOFF_MS_ENV: &str = "COIN_MARKET_BASE_BACKOFF_MS";

/// Connect timeout for a single network attempt (in seconds)
pub const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Read timeout for a single network attempt (in seconds)
pub const READ_TIMEOUT_SECS: u64 = 20;

/// Write budget for a single network attempt (in seconds)
///
/// reqwest has no dedicated write timeout, so this budget is folded into the
/// overall per-attempt timeout.
pub const WRITE_TIMEOUT_SECS: u64 = 20;

/// CoinGecko API base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3/";

/// CoinGecko endpoint listing coins with market data
pub const COINGECKO_MARKETS_ENDPOINT: &str = "coins/markets";

/// CoinGecko endpoint for historical chart data, `{id}` is the coin id
pub const COINGECKO_MARKET_CHART_ENDPOINT: &str = "coins/{id}/market_chart";

/// User agent for HTTP requests
pub const USER_AGENT: &str = "coin-market-sdk/0.1.0";
