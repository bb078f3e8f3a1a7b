use coin_market_sdk::{ChartRange, CoinGeckoClient, MarketDataError, MarketsQuery};
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = CoinGeckoClient::new()?;
    let policy = client.fetcher().policy();

    println!(
        "CoinGecko snapshot (max retries: {}, base backoff: {:?})",
        policy.max_retries(),
        policy.base_backoff()
    );
    println!("-------------------------------------------");

    let query = MarketsQuery {
        per_page: 10,
        ..MarketsQuery::default()
    };

    let start = Instant::now();
    match client.get_markets(&query).await {
        Ok(coins) => {
            for coin in coins {
                println!(
                    "{:<12} {:>12} {:>8}",
                    coin.symbol.to_uppercase(),
                    coin.current_price
                        .map(|p| format!("${:.2}", p))
                        .unwrap_or_else(|| "-".to_string()),
                    coin.price_change_percentage_24h
                        .map(|c| format!("{:+.2}%", c))
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
        }
        Err(MarketDataError::RateLimited { retry_after }) => {
            eprintln!("Still rate limited, try again in {:?}", retry_after);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Failed to load markets: {}", e);
            return Ok(());
        }
    }
    println!("Markets loaded in {:?}", start.elapsed());
    println!();

    let range = ChartRange::D7;
    let points = client.get_price_history("bitcoin", range).await?;
    if let (Some(first), Some(last)) = (points.first(), points.last()) {
        let change = (last.price - first.price) / first.price * 100.0;
        println!(
            "BTC {}: {} samples, ${:.2} -> ${:.2} ({:+.2}%)",
            range.label(),
            points.len(),
            first.price,
            last.price,
            change
        );
    }

    let metrics = client.fetcher().metrics().await;
    println!();
    println!(
        "Calls: {}, attempts: {}, rate limited: {}, p50: {:.0}ms",
        metrics.total_calls,
        metrics.total_attempts,
        metrics.rate_limited_responses,
        metrics.latency_p50_ms
    );

    Ok(())
}
