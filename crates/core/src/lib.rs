pub mod config;
pub mod errors;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use std::sync::Arc;

use config::TrackerConfig;
use errors::CoreError;
use models::{
    portfolio::{Holdings, Portfolio},
    snapshot::PortfolioSnapshot,
};
use providers::{coingecko::CoinGeckoClient, traits::MarketDataClient};
use services::{
    history_service::HistoryService,
    portfolio_service::PortfolioService,
    snapshot_scheduler::{SchedulerHandle, SchedulerSettings, SnapshotScheduler, TickReport},
};
use storage::{
    file::FileStore,
    memory::InMemoryStore,
    traits::{PortfolioStore, SnapshotStore},
};

/// Main entry point for the crypto portfolio core library.
///
/// Wires the stores, the market data client and the services together.
/// The query methods are thin pass-throughs meant to sit behind an API layer.
#[must_use]
pub struct PortfolioTracker {
    config: TrackerConfig,
    portfolios: Arc<dyn PortfolioStore>,
    portfolio_service: PortfolioService,
    history_service: HistoryService,
    scheduler: SnapshotScheduler,
}

impl std::fmt::Debug for PortfolioTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioTracker")
            .field("config", &self.config)
            .field("scheduler_state", &self.scheduler.state())
            .finish()
    }
}

impl PortfolioTracker {
    /// Build a tracker from explicit collaborators.
    pub fn new(
        config: TrackerConfig,
        portfolios: Arc<dyn PortfolioStore>,
        snapshots: Arc<dyn SnapshotStore>,
        market_data: Arc<dyn MarketDataClient>,
    ) -> Self {
        let scheduler = SnapshotScheduler::new(
            Arc::clone(&portfolios),
            Arc::clone(&snapshots),
            market_data,
            SchedulerSettings::from(&config),
        );
        Self {
            config,
            portfolios,
            portfolio_service: PortfolioService::new(),
            history_service: HistoryService::new(snapshots),
            scheduler,
        }
    }

    /// Build a tracker with the CoinGecko client and the store selected by
    /// `config.store_path` (file store if set, in-memory otherwise).
    pub async fn from_config(config: TrackerConfig) -> Result<Self, CoreError> {
        let config = config.validated()?;
        let market_data: Arc<dyn MarketDataClient> = Arc::new(
            CoinGeckoClient::with_base_url(config.coingecko_base_url.clone())
                .with_api_key(config.coingecko_api_key.clone()),
        );

        let tracker = match &config.store_path {
            Some(path) => {
                let store = Arc::new(FileStore::open(path.clone()).await?);
                Self::new(config, store.clone(), store, market_data)
            }
            None => {
                let store = Arc::new(InMemoryStore::new());
                Self::new(config, store.clone(), store, market_data)
            }
        };
        Ok(tracker)
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[must_use]
    pub fn scheduler(&self) -> &SnapshotScheduler {
        &self.scheduler
    }

    // ── History ─────────────────────────────────────────────────────

    /// Snapshots for a user within `time_range` ("1h", "24h", "7d", "30d",
    /// "90d"; unknown tokens mean "24h"), oldest first.
    pub async fn history(
        &self,
        user_id: &str,
        time_range: &str,
    ) -> Result<Vec<PortfolioSnapshot>, CoreError> {
        self.history_service.get_snapshots(user_id, time_range).await
    }

    /// The user's most recent snapshot, if any.
    pub async fn latest_snapshot(
        &self,
        user_id: &str,
    ) -> Result<Option<PortfolioSnapshot>, CoreError> {
        self.history_service.get_latest_snapshot(user_id).await
    }

    // ── Holdings ────────────────────────────────────────────────────

    /// The user's portfolio, or an empty one if none has been saved yet.
    pub async fn get_portfolio(&self, user_id: &str) -> Result<Portfolio, CoreError> {
        Ok(self
            .portfolios
            .find_by_user_id(user_id)
            .await?
            .unwrap_or_else(|| Portfolio::new(user_id)))
    }

    /// Add coins to a user's holdings and persist the portfolio.
    pub async fn add_holding(
        &self,
        user_id: &str,
        symbol: &str,
        amount: f64,
    ) -> Result<Portfolio, CoreError> {
        let mut portfolio = self.get_portfolio(user_id).await?;
        self.portfolio_service
            .add_holding(&mut portfolio, symbol, amount)?;
        self.portfolios.save(&portfolio).await?;
        Ok(portfolio)
    }

    /// Remove coins from a user's holdings and persist the portfolio.
    pub async fn remove_holding(
        &self,
        user_id: &str,
        symbol: &str,
        amount: f64,
    ) -> Result<Portfolio, CoreError> {
        let mut portfolio = self.get_portfolio(user_id).await?;
        self.portfolio_service
            .remove_holding(&mut portfolio, symbol, amount)?;
        self.portfolios.save(&portfolio).await?;
        Ok(portfolio)
    }

    /// Replace a user's holdings wholesale and persist the portfolio.
    pub async fn set_holdings(
        &self,
        user_id: &str,
        holdings: Holdings,
    ) -> Result<Portfolio, CoreError> {
        let mut portfolio = self.get_portfolio(user_id).await?;
        self.portfolio_service
            .replace_holdings(&mut portfolio, holdings)?;
        self.portfolios.save(&portfolio).await?;
        Ok(portfolio)
    }

    // ── Snapshots ───────────────────────────────────────────────────

    /// Run one snapshot tick immediately.
    pub async fn take_snapshots(&self) -> TickReport {
        self.scheduler.run_tick().await
    }

    /// Start the periodic snapshot loop. Keep the handle alive for as long
    /// as snapshots should be taken.
    pub fn start_scheduler(&self) -> SchedulerHandle {
        self.scheduler.spawn()
    }
}
