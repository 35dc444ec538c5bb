use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Coin symbol (uppercase) → held quantity.
pub type Holdings = HashMap<String, f64>;

/// `true` for a well-formed coin ticker: non-empty, ASCII letters, digits
/// and `-` only. Anything else could alter a provider request.
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty() && symbol.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// A user's current holdings.
///
/// This is the mutable side of the system: quantities change whenever the
/// user adds or removes coins. The snapshot scheduler reads it on every tick
/// and turns it into an immutable `PortfolioSnapshot`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: Uuid,

    /// Owning user
    pub user_id: String,

    /// Symbol → quantity. Keys are always uppercase.
    #[serde(default)]
    pub holdings: Holdings,
}

impl Portfolio {
    /// Create an empty portfolio for a user.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            holdings: HashMap::new(),
        }
    }

    /// Create a portfolio with initial holdings. Symbols are uppercased.
    pub fn with_holdings<S: Into<String>>(
        user_id: impl Into<String>,
        holdings: impl IntoIterator<Item = (S, f64)>,
    ) -> Self {
        let mut portfolio = Self::new(user_id);
        portfolio.holdings = holdings
            .into_iter()
            .map(|(symbol, amount)| (symbol.into().to_uppercase(), amount))
            .collect();
        portfolio
    }

    /// `true` when there is nothing to value.
    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    /// Held symbols in a stable (sorted) order.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.holdings.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}
