use crate::errors::CoreError;
use crate::models::portfolio::{is_valid_symbol, Holdings, Portfolio};

/// Mutates a portfolio's holdings with validation.
///
/// Does no I/O. Loading and saving the portfolio is the caller's job.
pub struct PortfolioService;

impl PortfolioService {
    pub fn new() -> Self {
        Self
    }

    /// Add `amount` of `symbol` (case-insensitive) to the portfolio.
    /// Returns the new held quantity.
    pub fn add_holding(
        &self,
        portfolio: &mut Portfolio,
        symbol: &str,
        amount: f64,
    ) -> Result<f64, CoreError> {
        let symbol = Self::normalize_symbol(symbol)?;
        Self::validate_amount(amount)?;

        let held = portfolio.holdings.entry(symbol).or_insert(0.0);
        *held += amount;
        Ok(*held)
    }

    /// Remove `amount` of `symbol`. Fails if the portfolio holds less than
    /// `amount`; drops the symbol entirely once nothing is left.
    /// Returns the remaining quantity.
    pub fn remove_holding(
        &self,
        portfolio: &mut Portfolio,
        symbol: &str,
        amount: f64,
    ) -> Result<f64, CoreError> {
        let symbol = Self::normalize_symbol(symbol)?;
        Self::validate_amount(amount)?;

        let current = portfolio.holdings.get(&symbol).copied().unwrap_or(0.0);
        let remaining = current - amount;

        if remaining < -f64::EPSILON {
            return Err(CoreError::ValidationError(format!(
                "Insufficient holdings: cannot remove {amount} {symbol}, only {current} held"
            )));
        }

        if remaining <= f64::EPSILON {
            portfolio.holdings.remove(&symbol);
            Ok(0.0)
        } else {
            portfolio.holdings.insert(symbol, remaining);
            Ok(remaining)
        }
    }

    /// Replace all holdings at once. Symbols are uppercased; quantities must
    /// be finite and non-negative.
    pub fn replace_holdings(
        &self,
        portfolio: &mut Portfolio,
        holdings: Holdings,
    ) -> Result<(), CoreError> {
        let mut normalized = Holdings::with_capacity(holdings.len());
        for (symbol, amount) in holdings {
            let symbol = Self::normalize_symbol(&symbol)?;
            if !amount.is_finite() || amount < 0.0 {
                return Err(CoreError::ValidationError(format!(
                    "Holding amount for {symbol} must be finite and non-negative, got {amount}"
                )));
            }
            if normalized.insert(symbol.clone(), amount).is_some() {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate holding for {symbol}"
                )));
            }
        }
        portfolio.holdings = normalized;
        Ok(())
    }

    fn normalize_symbol(symbol: &str) -> Result<String, CoreError> {
        let trimmed = symbol.trim();
        if trimmed.is_empty() {
            return Err(CoreError::ValidationError(
                "Coin symbol must not be empty".into(),
            ));
        }
        if !is_valid_symbol(trimmed) {
            return Err(CoreError::ValidationError(format!(
                "Invalid coin symbol '{trimmed}': only ASCII letters, digits and '-' are allowed"
            )));
        }
        Ok(trimmed.to_uppercase())
    }

    fn validate_amount(amount: f64) -> Result<(), CoreError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(CoreError::ValidationError(
                "Amount must be a positive number".into(),
            ));
        }
        Ok(())
    }
}

impl Default for PortfolioService {
    fn default() -> Self {
        Self::new()
    }
}
