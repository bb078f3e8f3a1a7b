//! Market data API clients

pub mod coingecko;

pub use coingecko::CoinGeckoClient;
