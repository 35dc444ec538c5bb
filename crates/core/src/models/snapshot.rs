use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Quote currency of a snapshot built without an explicit one.
pub const DEFAULT_SNAPSHOT_CURRENCY: &str = "USD";

/// Valuation of one coin inside a snapshot.
///
/// `value` is always `amount * price_usd`; there is no way to set it
/// independently, and a stored `value` is recomputed on load.
///
/// `price_usd` is the unit price in the owning snapshot's
/// [`currency`](PortfolioSnapshot::currency). The field keeps its
/// historical name so stored data stays readable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "CoinSnapshotRecord")]
pub struct CoinSnapshot {
    amount: f64,
    price_usd: f64,
    value: f64,
}

/// Wire shape of [`CoinSnapshot`]. The stored value is ignored.
#[derive(Deserialize)]
struct CoinSnapshotRecord {
    amount: f64,
    price_usd: f64,
    #[serde(rename = "value", default)]
    _value: f64,
}

impl From<CoinSnapshotRecord> for CoinSnapshot {
    fn from(record: CoinSnapshotRecord) -> Self {
        Self::new(record.amount, record.price_usd)
    }
}

impl CoinSnapshot {
    pub fn new(amount: f64, price_usd: f64) -> Self {
        Self {
            amount,
            price_usd,
            value: amount * price_usd,
        }
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Unit price in the snapshot's quote currency.
    pub fn price_usd(&self) -> f64 {
        self.price_usd
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Immutable, point-in-time valuation of a user's portfolio.
///
/// Snapshots are append-only: once built they are never modified, and
/// `total_value` is derived from the entries at construction. Loading a
/// stored snapshot recomputes the total the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PortfolioSnapshotRecord")]
pub struct PortfolioSnapshot {
    id: Uuid,
    user_id: String,
    timestamp: DateTime<Utc>,
    currency: String,
    total_value: f64,
    holdings: HashMap<String, CoinSnapshot>,
}

/// Sum of entry values in symbol order, so a reloaded snapshot reproduces
/// the exact same total.
fn sum_values(holdings: &HashMap<String, CoinSnapshot>) -> f64 {
    let mut symbols: Vec<&String> = holdings.keys().collect();
    symbols.sort_unstable();
    symbols.iter().map(|s| holdings[*s].value).sum()
}

fn default_currency() -> String {
    DEFAULT_SNAPSHOT_CURRENCY.to_string()
}

/// Wire shape of [`PortfolioSnapshot`]. The stored total is ignored.
#[derive(Deserialize)]
struct PortfolioSnapshotRecord {
    id: Uuid,
    user_id: String,
    timestamp: DateTime<Utc>,
    #[serde(default = "default_currency")]
    currency: String,
    #[serde(rename = "total_value", default)]
    _total_value: f64,
    holdings: HashMap<String, CoinSnapshot>,
}

impl From<PortfolioSnapshotRecord> for PortfolioSnapshot {
    fn from(record: PortfolioSnapshotRecord) -> Self {
        Self {
            id: record.id,
            ..Self::new(record.user_id, record.timestamp, record.holdings)
                .with_currency(record.currency)
        }
    }
}

impl PortfolioSnapshot {
    pub fn new(
        user_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        holdings: HashMap<String, CoinSnapshot>,
    ) -> Self {
        let total_value = sum_values(&holdings);
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            timestamp,
            currency: default_currency(),
            total_value,
            holdings,
        }
    }

    /// Tag the snapshot with the quote currency its prices are in.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into().to_uppercase();
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Quote currency of every price and value in this snapshot.
    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn total_value(&self) -> f64 {
        self.total_value
    }

    pub fn holdings(&self) -> &HashMap<String, CoinSnapshot> {
        &self.holdings
    }

    /// Entry for a symbol (case-insensitive).
    pub fn holding(&self, symbol: &str) -> Option<&CoinSnapshot> {
        self.holdings
            .get(symbol)
            .or_else(|| self.holdings.get(&symbol.to_uppercase()))
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }
}
