use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current market data for one coin, as returned by a market data client.
///
/// Transient: it only lives for the duration of one snapshot build.
/// Prices stay `Decimal` here; the snapshot stores them as `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedCoin {
    /// Provider-specific coin id (e.g., "bitcoin")
    pub id: String,

    /// Ticker symbol, uppercased (e.g., "BTC")
    pub symbol: String,

    /// Human-readable name (e.g., "Bitcoin")
    pub name: String,

    /// `None` when the provider knows the coin but has no current price.
    pub current_price: Option<Decimal>,

    pub market_cap: Option<Decimal>,
    pub total_volume: Option<Decimal>,
    pub price_change_percentage_1h: Option<Decimal>,
    pub price_change_percentage_24h: Option<Decimal>,
}

impl PricedCoin {
    /// Minimal priced coin: symbol and price only.
    pub fn new(symbol: impl Into<String>, current_price: Decimal) -> Self {
        let symbol = symbol.into().to_uppercase();
        Self {
            id: symbol.to_lowercase(),
            name: symbol.clone(),
            symbol,
            current_price: Some(current_price),
            market_cap: None,
            total_volume: None,
            price_change_percentage_1h: None,
            price_change_percentage_24h: None,
        }
    }
}
