//! CoinGecko market data client

use crate::{
    constants::{COINGECKO_API_URL, COINGECKO_MARKETS_ENDPOINT, COINGECKO_MARKET_CHART_ENDPOINT},
    error::MarketDataError,
    fetcher::RetryingFetcher,
    types::{
        ChartRange, CoinMarket, FetchResponse, MarketsQuery, PriceHistory, PricePoint,
        RequestDescriptor,
    },
};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Typed client for the CoinGecko v3 API
///
/// Every request goes through a `RetryingFetcher`, so rate limiting and
/// transient network failures are retried before an error surfaces here.
pub struct CoinGeckoClient {
    fetcher: Arc<RetryingFetcher>,
    base_url: Url,
}

impl CoinGeckoClient {
    /// Creates a client for the public API using the retry policy from the
    /// environment
    pub fn new() -> Result<Self, MarketDataError> {
        let fetcher = RetryingFetcher::from_env()?;
        Self::with_base_url(Arc::new(fetcher), COINGECKO_API_URL)
    }

    /// Creates a client sharing an existing fetcher
    pub fn with_fetcher(fetcher: Arc<RetryingFetcher>) -> Result<Self, MarketDataError> {
        Self::with_base_url(fetcher, COINGECKO_API_URL)
    }

    /// Creates a client against a different API root (mirrors, test servers)
    pub fn with_base_url(
        fetcher: Arc<RetryingFetcher>,
        base_url: &str,
    ) -> Result<Self, MarketDataError> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| {
            MarketDataError::invalid_request(format!("invalid base URL {}: {}", base_url, e))
        })?;

        Ok(Self { fetcher, base_url })
    }

    /// The fetcher used for every request
    pub fn fetcher(&self) -> &Arc<RetryingFetcher> {
        &self.fetcher
    }

    /// Builds the request listing coins with market data
    pub fn markets_request(
        &self,
        query: &MarketsQuery,
    ) -> Result<RequestDescriptor, MarketDataError> {
        let request = self.endpoint(COINGECKO_MARKETS_ENDPOINT)?;
        Ok(request.with_query(&query.to_pairs()))
    }

    /// Builds the request for a coin's price chart
    pub fn price_history_request(
        &self,
        coin_id: &str,
        range: ChartRange,
    ) -> Result<RequestDescriptor, MarketDataError> {
        validate_coin_id(coin_id)?;

        let path = COINGECKO_MARKET_CHART_ENDPOINT.replace("{id}", coin_id);
        let mut params = vec![("vs_currency", "usd"), ("days", range.days_param())];
        if let Some(interval) = range.interval_param() {
            params.push(("interval", interval));
        }

        Ok(self.endpoint(&path)?.with_query(&params))
    }

    /// Fetches a page of coins ordered as requested
    pub async fn get_markets(
        &self,
        query: &MarketsQuery,
    ) -> Result<Vec<CoinMarket>, MarketDataError> {
        self.get_markets_with_cancel(query, &CancellationToken::new())
            .await
    }

    /// Same as `get_markets`, abandoning the call when `cancel` fires
    pub async fn get_markets_with_cancel(
        &self,
        query: &MarketsQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<CoinMarket>, MarketDataError> {
        let request = self.markets_request(query)?;
        tracing::debug!(url = %request.url(), "Fetching markets from CoinGecko");

        let coins: Vec<CoinMarket> = self.get_json(&request, cancel).await?;

        tracing::debug!(count = coins.len(), "Fetched markets from CoinGecko");
        Ok(coins)
    }

    /// Fetches the USD price chart of a coin
    ///
    /// # Arguments
    /// * `coin_id` - CoinGecko coin id such as "bitcoin"
    /// * `range` - Time window of the chart
    ///
    /// # Returns
    /// Price samples in upstream order, timestamps truncated to seconds
    pub async fn get_price_history(
        &self,
        coin_id: &str,
        range: ChartRange,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        self.get_price_history_with_cancel(coin_id, range, &CancellationToken::new())
            .await
    }

    /// Same as `get_price_history`, abandoning the call when `cancel` fires
    pub async fn get_price_history_with_cancel(
        &self,
        coin_id: &str,
        range: ChartRange,
        cancel: &CancellationToken,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        let request = self.price_history_request(coin_id, range)?;
        tracing::debug!(coin_id, range = range.label(), "Fetching price history from CoinGecko");

        let history: PriceHistory = self.get_json(&request, cancel).await?;
        Ok(history.price_points())
    }

    fn endpoint(&self, path: &str) -> Result<RequestDescriptor, MarketDataError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| MarketDataError::invalid_request(format!("invalid path {}: {}", path, e)))?;

        let request = RequestDescriptor::from_url(Method::GET, url)?
            .with_header(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(request)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> Result<T, MarketDataError> {
        let response = self.fetcher.fetch_with_cancel(request, cancel).await?;
        decode_response(response)
    }
}

/// Interprets a fetched response as a JSON payload
fn decode_response<T: DeserializeOwned>(response: FetchResponse) -> Result<T, MarketDataError> {
    if response.is_rate_limited() {
        return Err(MarketDataError::RateLimited {
            retry_after: response.retry_after(),
        });
    }

    if !response.is_success() {
        return Err(MarketDataError::Api {
            status: response.status(),
            body: response.text(),
        });
    }

    response.json().map_err(|e| {
        MarketDataError::invalid_response(format!(
            "Failed to parse CoinGecko response: {}. Response: {}",
            e,
            response.text()
        ))
    })
}

fn validate_coin_id(coin_id: &str) -> Result<(), MarketDataError> {
    let valid = !matches!(coin_id, "" | "." | "..")
        && coin_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(MarketDataError::invalid_request(format!(
            "invalid coin id: {:?}",
            coin_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FetchError, TransportErrorKind};
    use crate::policy::RetryPolicy;
    use crate::transport::ReqwestTransport;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, max_retries: u32) -> CoinGeckoClient {
        let transport = ReqwestTransport::new().unwrap();
        let fetcher = RetryingFetcher::with_transport(
            Arc::new(transport),
            RetryPolicy::new(max_retries, Duration::from_millis(10)),
        );
        CoinGeckoClient::with_base_url(Arc::new(fetcher), &server.uri()).unwrap()
    }

    fn markets_body() -> serde_json::Value {
        serde_json::json!([
            {
                "id": "bitcoin",
                "symbol": "btc",
                "name": "Bitcoin",
                "image": "https://assets.coingecko.com/coins/images/1/large/bitcoin.png",
                "current_price": 64000.0,
                "market_cap": 1260000000000u64,
                "price_change_percentage_24h": -1.25
            },
            {
                "id": "ethereum",
                "symbol": "eth",
                "name": "Ethereum",
                "image": null,
                "current_price": 3100.5,
                "market_cap": null,
                "price_change_percentage_24h": 0.5
            }
        ])
    }

    #[test]
    fn test_price_history_request_params() {
        let fetcher = Arc::new(RetryingFetcher::new(RetryPolicy::default()).unwrap());
        let client = CoinGeckoClient::with_fetcher(fetcher).unwrap();

        let request = client.price_history_request("bitcoin", ChartRange::D1).unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://api.coingecko.com/api/v3/coins/bitcoin/market_chart?vs_currency=usd&days=1&interval=hourly"
        );

        let request = client.price_history_request("bitcoin", ChartRange::All).unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://api.coingecko.com/api/v3/coins/bitcoin/market_chart?vs_currency=usd&days=max"
        );
    }

    #[test]
    fn test_rejects_bad_coin_ids() {
        let fetcher = Arc::new(RetryingFetcher::new(RetryPolicy::default()).unwrap());
        let client = CoinGeckoClient::with_fetcher(fetcher).unwrap();

        for id in ["", ".", "..", "../ping", "bit coin", "btc?x=1"] {
            assert!(
                matches!(
                    client.price_history_request(id, ChartRange::D7),
                    Err(MarketDataError::InvalidRequest(_))
                ),
                "{:?} should be rejected",
                id
            );
        }
    }

    #[test]
    fn test_decode_rate_limited_response() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, HeaderValue::from_static("30"));
        let response = FetchResponse::new(reqwest::StatusCode::TOO_MANY_REQUESTS, headers, "");

        let err = decode_response::<Vec<CoinMarket>>(response).unwrap_err();
        assert!(matches!(
            err,
            MarketDataError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(30)
        ));
    }

    #[tokio::test]
    async fn test_get_markets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .and(query_param("vs_currency", "usd"))
            .and(query_param("order", "market_cap_desc"))
            .and(query_param("per_page", "50"))
            .and(query_param("page", "1"))
            .and(query_param("price_change_percentage", "24h"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(markets_body()))
            .expect(1)
            .mount(&server)
            .await;

        let coins = client(&server, 3)
            .get_markets(&MarketsQuery::default())
            .await
            .unwrap();

        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].id, "bitcoin");
        assert_eq!(coins[0].price_change_percentage_24h, Some(-1.25));
        assert_eq!(coins[1].image, None);
        assert_eq!(coins[1].market_cap, None);
    }

    #[tokio::test]
    async fn test_get_markets_retries_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(markets_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, 3);
        let coins = client.get_markets(&MarketsQuery::default()).await.unwrap();
        assert_eq!(coins.len(), 2);

        let metrics = client.fetcher().metrics().await;
        assert_eq!(metrics.total_attempts, 3);
        assert_eq!(metrics.rate_limited_responses, 2);
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server, 2)
            .get_markets(&MarketsQuery::default())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MarketDataError::RateLimited { retry_after: Some(d) } if d == Duration::ZERO
        ));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/not-a-coin/market_chart"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string(r#"{"error":"coin not found"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server, 3)
            .get_price_history("not-a-coin", ChartRange::D30)
            .await
            .unwrap_err();

        match err {
            MarketDataError::Api { status, body } => {
                assert_eq!(status.as_u16(), 404);
                assert!(body.contains("coin not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_price_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/bitcoin/market_chart"))
            .and(query_param("vs_currency", "usd"))
            .and(query_param("days", "7"))
            .and(query_param_is_missing("interval"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "prices": [[1700000000000.0, 37000.5], [1700003600000.0, 37100.0]],
                "market_caps": [[1700000000000.0, 7.2e11]],
                "total_volumes": [[1700000000000.0, 1.5e10]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let points = client(&server, 3)
            .get_price_history("bitcoin", ChartRange::D7)
            .await
            .unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(points[0].price, 37000.5);
        assert_eq!(points[1].timestamp.timestamp(), 1_700_003_600);
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = client(&server, 0)
            .get_markets(&MarketsQuery::default())
            .await
            .unwrap_err();

        assert!(matches!(err, MarketDataError::InvalidResponse(msg) if msg.contains("maintenance")));
    }

    #[tokio::test]
    async fn test_connection_refused_exhausts_retries() {
        // bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = ReqwestTransport::new().unwrap();
        let fetcher = RetryingFetcher::with_transport(
            Arc::new(transport),
            RetryPolicy::new(1, Duration::from_millis(10)),
        );
        let client =
            CoinGeckoClient::with_base_url(Arc::new(fetcher), &format!("http://{}", addr)).unwrap();

        let err = client
            .get_markets(&MarketsQuery::default())
            .await
            .unwrap_err();

        match err {
            MarketDataError::Fetch(FetchError::Transport { attempts, source }) => {
                assert_eq!(attempts, 2);
                assert_eq!(source.kind, TransportErrorKind::Connect);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let client = client(&server, 3);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = client
            .get_markets_with_cancel(&MarketsQuery::default(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, MarketDataError::Fetch(ref e) if e.is_cancelled()));
    }
}
