use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::future::Future;

use crate::errors::CoreError;
use crate::models::portfolio::Holdings;
use crate::models::price::PricedCoin;
use crate::models::snapshot::{CoinSnapshot, PortfolioSnapshot};

/// Turns a holdings map plus freshly fetched prices into one immutable
/// `PortfolioSnapshot`.
///
/// Symbols the provider did not price are valued with the unit price from
/// the user's previous snapshot (current amount, old price). Symbols with no
/// price anywhere are left out of the snapshot.
///
/// Pure construction: no persistence, no provider calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotBuilder;

/// Result of pricing holdings against fetched prices only.
struct PricedHoldings {
    entries: HashMap<String, CoinSnapshot>,
    /// Held symbols (with their amounts) that got no fetched price.
    unpriced: Vec<(String, f64)>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a snapshot timestamped now.
    ///
    /// `lookup_last_snapshot` is called at most once, and only when some held
    /// symbol has no fetched price.
    pub async fn build<F, Fut>(
        &self,
        user_id: &str,
        holdings: &Holdings,
        fetched_prices: &[PricedCoin],
        lookup_last_snapshot: F,
    ) -> Result<PortfolioSnapshot, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<PortfolioSnapshot>, CoreError>>,
    {
        let timestamp = Utc::now();
        let priced = Self::price_holdings(holdings, fetched_prices)?;

        let previous = if priced.unpriced.is_empty() {
            None
        } else {
            lookup_last_snapshot().await?
        };

        Ok(Self::assemble(user_id, timestamp, priced, previous.as_ref()))
    }

    /// Build a snapshot with an explicit timestamp and an already-loaded
    /// previous snapshot.
    pub fn build_at(
        &self,
        user_id: &str,
        holdings: &Holdings,
        fetched_prices: &[PricedCoin],
        previous: Option<&PortfolioSnapshot>,
        timestamp: DateTime<Utc>,
    ) -> Result<PortfolioSnapshot, CoreError> {
        let priced = Self::price_holdings(holdings, fetched_prices)?;
        Ok(Self::assemble(user_id, timestamp, priced, previous))
    }

    fn price_holdings(
        holdings: &Holdings,
        fetched_prices: &[PricedCoin],
    ) -> Result<PricedHoldings, CoreError> {
        // First price per uppercased symbol wins; coins nobody holds are ignored.
        let mut by_symbol: HashMap<String, &PricedCoin> = HashMap::new();
        for coin in fetched_prices {
            by_symbol.entry(coin.symbol.to_uppercase()).or_insert(coin);
        }

        let mut entries = HashMap::with_capacity(holdings.len());
        let mut unpriced = Vec::new();

        for (symbol, &amount) in holdings {
            let price = by_symbol
                .get(&symbol.to_uppercase())
                .and_then(|coin| coin.current_price);

            match price {
                Some(price) => {
                    let price_usd = price
                        .to_f64()
                        .filter(|p| p.is_finite())
                        .ok_or_else(|| {
                            CoreError::Build(format!(
                                "price {price} for {symbol} is not representable as f64"
                            ))
                        })?;
                    entries.insert(symbol.clone(), CoinSnapshot::new(amount, price_usd));
                }
                None => unpriced.push((symbol.clone(), amount)),
            }
        }

        Ok(PricedHoldings { entries, unpriced })
    }

    fn assemble(
        user_id: &str,
        timestamp: DateTime<Utc>,
        priced: PricedHoldings,
        previous: Option<&PortfolioSnapshot>,
    ) -> PortfolioSnapshot {
        let PricedHoldings {
            mut entries,
            unpriced,
        } = priced;

        for (symbol, amount) in unpriced {
            match previous.and_then(|prev| prev.holding(&symbol)) {
                Some(last) => {
                    log::debug!(
                        "Carrying forward {symbol} price {} for user {user_id}",
                        last.price_usd()
                    );
                    entries.insert(symbol, CoinSnapshot::new(amount, last.price_usd()));
                }
                None => {
                    log::debug!("No price for {symbol} (user {user_id}), leaving it out");
                }
            }
        }

        PortfolioSnapshot::new(user_id, timestamp, entries)
    }
}
