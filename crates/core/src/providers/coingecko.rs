use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::DEFAULT_COINGECKO_BASE_URL;
use crate::errors::CoreError;
use crate::models::portfolio::is_valid_symbol;
use crate::models::price::PricedCoin;
use super::traits::MarketDataClient;

const PROVIDER: &str = "CoinGecko";
const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// CoinGecko market data client.
///
/// - **Free tier**: works without a key; a demo key raises rate limits.
/// - **Endpoints**: `/coins/markets`, `/simple/supported_vs_currencies`
///
/// CoinGecko addresses coins by id ("bitcoin"), not by ticker. Held symbols
/// are resolved through a seeded map; unknown symbols are tried as their
/// lowercased ticker. Results are mapped back to the requested symbols.
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    /// Uppercase symbol (BTC) → CoinGecko id (bitcoin).
    symbol_map: Mutex<HashMap<String, String>>,
}

impl CoinGeckoClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_COINGECKO_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut symbol_map = HashMap::new();
        let common = [
            ("BTC", "bitcoin"),
            ("ETH", "ethereum"),
            ("USDT", "tether"),
            ("USDC", "usd-coin"),
            ("BNB", "binancecoin"),
            ("XRP", "ripple"),
            ("ADA", "cardano"),
            ("SOL", "solana"),
            ("DOGE", "dogecoin"),
            ("DOT", "polkadot"),
            ("MATIC", "matic-network"),
            ("LTC", "litecoin"),
            ("AVAX", "avalanche-2"),
            ("LINK", "chainlink"),
            ("UNI", "uniswap"),
            ("ATOM", "cosmos"),
            ("XLM", "stellar"),
            ("ALGO", "algorand"),
            ("NEAR", "near"),
            ("SHIB", "shiba-inu"),
            ("TRX", "tron"),
            ("DAI", "dai"),
            ("AAVE", "aave"),
            ("CRO", "crypto-com-chain"),
            ("FIL", "filecoin"),
            ("ICP", "internet-computer"),
            ("ETC", "ethereum-classic"),
            ("HBAR", "hedera-hashgraph"),
            ("VET", "vechain"),
            ("XMR", "monero"),
        ];
        for (sym, id) in common {
            symbol_map.insert(sym.to_string(), id.to_string());
        }

        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            symbol_map: Mutex::new(symbol_map),
        }
    }

    /// Attach a demo API key (sent as a header, never in the URL).
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a symbol like "BTC" to a CoinGecko id like "bitcoin".
    pub fn resolve_id(&self, symbol: &str) -> String {
        let upper = symbol.to_uppercase();
        let map = self.symbol_map.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&upper)
            .cloned()
            .unwrap_or_else(|| symbol.to_lowercase())
    }

    /// Teach the client a symbol → id mapping (e.g., for coins outside the seed list).
    pub fn register_symbol(&self, symbol: &str, id: &str) {
        let mut map = self.symbol_map.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(symbol.to_uppercase(), id.to_string());
    }

    /// Query parameters for `/coins/markets` over a set of symbols.
    /// Returns the parameters and the id → requested symbol mapping.
    ///
    /// Symbols that are not well-formed tickers are dropped; they could
    /// otherwise split the comma-separated id list.
    pub fn markets_query(
        &self,
        symbols: &[String],
        currency: &str,
    ) -> (Vec<(&'static str, String)>, HashMap<String, String>) {
        let mut requested = HashMap::new();
        for symbol in symbols {
            if !is_valid_symbol(symbol) {
                log::warn!("Skipping malformed symbol {symbol:?} in {PROVIDER} request");
                continue;
            }
            requested
                .entry(self.resolve_id(symbol))
                .or_insert_with(|| symbol.to_uppercase());
        }
        let mut ids: Vec<&str> = requested.keys().map(String::as_str).collect();
        ids.sort_unstable();

        let query = vec![
            ("vs_currency", currency.to_lowercase()),
            ("ids", ids.join(",")),
            ("order", "market_cap_desc".to_string()),
            ("sparkline", "false".to_string()),
            ("price_change_percentage", "1h".to_string()),
        ];
        (query, requested)
    }

    /// Build the `/coins/markets` request without sending it.
    pub fn markets_request(
        &self,
        symbols: &[String],
        currency: &str,
    ) -> Result<(reqwest::Request, HashMap<String, String>), CoreError> {
        let (query, requested) = self.markets_query(symbols, currency);
        let request = self
            .authorized(self.client.get(format!("{}/coins/markets", self.base_url)))
            .query(&query)
            .build()?;
        Ok((request, requested))
    }

    /// List the quote currencies CoinGecko can price against.
    pub async fn supported_currencies(&self) -> Result<Vec<String>, CoreError> {
        let request = self
            .authorized(
                self.client
                    .get(format!("{}/simple/supported_vs_currencies", self.base_url)),
            )
            .build()?;
        let body = self.send_for_text(request).await?;
        serde_json::from_str(&body).map_err(|e| CoreError::Api {
            provider: PROVIDER.into(),
            message: format!("Failed to parse supported currencies: {e}"),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn send_for_text(&self, request: reqwest::Request) -> Result<String, CoreError> {
        let resp = self.client.execute(request).await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::Api {
                provider: PROVIDER.into(),
                message: format!("HTTP {status}"),
            });
        }
        Ok(resp.text().await?)
    }
}

impl Default for CoinGeckoClient {
    fn default() -> Self {
        Self::new()
    }
}

// ── CoinGecko API response types ────────────────────────────────────

#[derive(Deserialize)]
struct MarketEntry {
    id: String,
    symbol: String,
    #[serde(default)]
    name: String,
    current_price: Option<Decimal>,
    market_cap: Option<Decimal>,
    total_volume: Option<Decimal>,
    price_change_percentage_1h_in_currency: Option<Decimal>,
    price_change_percentage_24h: Option<Decimal>,
}

/// Parse a `/coins/markets` body into priced coins.
///
/// `requested` maps CoinGecko id → the symbol the caller asked for. Entries
/// for ids nobody asked for are dropped; matched entries carry the requested
/// symbol so the caller's holdings keys line up.
pub fn parse_markets(
    body: &str,
    requested: &HashMap<String, String>,
) -> Result<Vec<PricedCoin>, CoreError> {
    let entries: Vec<MarketEntry> = serde_json::from_str(body).map_err(|e| CoreError::Api {
        provider: PROVIDER.into(),
        message: format!("Failed to parse market data: {e}"),
    })?;

    let coins = entries
        .into_iter()
        .filter_map(|entry| {
            let symbol = requested.get(&entry.id)?.clone();
            if !entry.symbol.eq_ignore_ascii_case(&symbol) {
                log::debug!(
                    "{PROVIDER} id {} reports symbol {}, keeping requested {symbol}",
                    entry.id,
                    entry.symbol
                );
            }
            Some(PricedCoin {
                id: entry.id,
                symbol,
                name: entry.name,
                current_price: entry.current_price,
                market_cap: entry.market_cap,
                total_volume: entry.total_volume,
                price_change_percentage_1h: entry.price_change_percentage_1h_in_currency,
                price_change_percentage_24h: entry.price_change_percentage_24h,
            })
        })
        .collect();

    Ok(coins)
}

#[async_trait]
impl MarketDataClient for CoinGeckoClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn fetch_prices(
        &self,
        symbols: &[String],
        currency: &str,
    ) -> Result<Vec<PricedCoin>, CoreError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let (request, requested) = self.markets_request(symbols, currency)?;
        if requested.is_empty() {
            return Ok(Vec::new());
        }
        log::debug!("Calling {PROVIDER} markets for {} coin(s)", requested.len());

        let body = self.send_for_text(request).await?;
        let coins = parse_markets(&body, &requested)?;

        if coins.len() < symbols.len() {
            log::debug!(
                "{PROVIDER} returned {} of {} requested coin(s)",
                coins.len(),
                symbols.len()
            );
        }
        Ok(coins)
    }
}
