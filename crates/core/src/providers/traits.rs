use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::price::PricedCoin;

/// Source of current market prices for a set of coins.
///
/// Implementations may return fewer coins than requested (unknown symbol,
/// partial provider outage). Callers treat both a short result and an `Err`
/// as non-fatal.
#[async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Fetch current prices for `symbols` (uppercase tickers) in `currency`.
    async fn fetch_prices(
        &self,
        symbols: &[String],
        currency: &str,
    ) -> Result<Vec<PricedCoin>, CoreError>;
}
