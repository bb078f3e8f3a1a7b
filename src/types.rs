//! Types for the market data client

use crate::{constants::RATE_LIMIT_STATUS, error::FetchError, policy::parse_retry_after};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable description of one logical HTTP call
///
/// The same descriptor is replayed unchanged for every retry attempt.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl RequestDescriptor {
    /// Creates a request for an absolute `http`/`https` URL
    pub fn new(method: Method, url: &str) -> Result<Self, FetchError> {
        let url = Url::parse(url)
            .map_err(|e| FetchError::invalid_request(format!("malformed URL {}: {}", url, e)))?;
        Self::from_url(method, url)
    }

    /// Creates a GET request
    pub fn get(url: &str) -> Result<Self, FetchError> {
        Self::new(Method::GET, url)
    }

    /// Creates a request from an already parsed URL
    pub fn from_url(method: Method, url: Url) -> Result<Self, FetchError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::invalid_request(format!(
                "unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        Ok(Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        })
    }

    /// Adds a header, replacing any previous value for the same name
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the request body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Appends query parameters to the URL
    pub fn with_query<K, V>(mut self, params: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if !params.is_empty() {
            let mut pairs = self.url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key.as_ref(), value.as_ref());
            }
        }
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// A fully received HTTP response
///
/// The body is always drained before the response is handed back, so a
/// discarded response never holds a connection.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl FetchResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// True for a 2xx status
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// True when the upstream asked us to slow down
    pub fn is_rate_limited(&self) -> bool {
        self.status.as_u16() == RATE_LIMIT_STATUS
    }

    /// Wait requested through the `Retry-After` header, if any
    pub fn retry_after(&self) -> Option<Duration> {
        parse_retry_after(&self.headers)
    }

    /// Body decoded as UTF-8, lossy
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body deserialized from JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Coin listing entry from `coins/markets`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinMarket {
    /// CoinGecko coin id (e.g. "bitcoin")
    pub id: String,
    /// Ticker symbol, lowercase as returned upstream
    pub symbol: String,
    /// Display name
    pub name: String,
    /// Logo URL
    #[serde(default)]
    pub image: Option<String>,
    /// Price in the requested fiat currency
    #[serde(default)]
    pub current_price: Option<f64>,
    /// Market capitalization
    #[serde(default)]
    pub market_cap: Option<f64>,
    /// 24h price change percentage
    #[serde(default)]
    pub price_change_percentage_24h: Option<f64>,
}

/// Raw payload of `coins/{id}/market_chart`
///
/// Every series is a list of `[timestamp_ms, value]` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    pub prices: Vec<[f64; 2]>,
    #[serde(default)]
    pub market_caps: Vec<[f64; 2]>,
    #[serde(default)]
    pub total_volumes: Vec<[f64; 2]>,
}

impl PriceHistory {
    /// Converts the price series into chart points with second precision
    ///
    /// Samples whose timestamp cannot be represented are skipped.
    pub fn price_points(&self) -> Vec<PricePoint> {
        self.prices
            .iter()
            .filter_map(|[timestamp_ms, price]| {
                let secs = (timestamp_ms / 1000.0).trunc();
                if !secs.is_finite() {
                    return None;
                }
                DateTime::from_timestamp(secs as i64, 0).map(|timestamp| PricePoint {
                    timestamp,
                    price: *price,
                })
            })
            .collect()
    }
}

/// A single sample of a price chart
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Time window of a price chart
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChartRange {
    /// Last 24 hours, hourly samples
    D1,
    /// Last 7 days
    D7,
    /// Last 30 days
    #[default]
    D30,
    /// Full history
    All,
}

impl ChartRange {
    /// Value of the `days` query parameter
    pub fn days_param(&self) -> &'static str {
        match self {
            ChartRange::D1 => "1",
            ChartRange::D7 => "7",
            ChartRange::D30 => "30",
            ChartRange::All => "max",
        }
    }

    /// Value of the `interval` query parameter, if one is sent
    ///
    /// Only the one-day chart asks for a fixed granularity; longer ranges let
    /// the API pick its own.
    pub fn interval_param(&self) -> Option<&'static str> {
        match self {
            ChartRange::D1 => Some("hourly"),
            _ => None,
        }
    }

    /// Short label ("1D", "7D", ...)
    pub fn label(&self) -> &'static str {
        match self {
            ChartRange::D1 => "1D",
            ChartRange::D7 => "7D",
            ChartRange::D30 => "30D",
            ChartRange::All => "ALL",
        }
    }

    /// Get all ranges
    pub fn all() -> &'static [ChartRange] {
        &[ChartRange::D1, ChartRange::D7, ChartRange::D30, ChartRange::All]
    }
}

/// Query parameters for `coins/markets`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketsQuery {
    pub vs_currency: String,
    pub order: String,
    pub per_page: u32,
    pub page: u32,
    pub price_change_percentage: String,
}

impl Default for MarketsQuery {
    fn default() -> Self {
        Self {
            vs_currency: "usd".to_string(),
            order: "market_cap_desc".to_string(),
            per_page: 50,
            page: 1,
            price_change_percentage: "24h".to_string(),
        }
    }
}

impl MarketsQuery {
    /// Query pairs in the order they are sent
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("vs_currency", self.vs_currency.clone()),
            ("order", self.order.clone()),
            ("per_page", self.per_page.to_string()),
            ("page", self.page.to_string()),
            ("price_change_percentage", self.price_change_percentage.clone()),
        ]
    }
}
