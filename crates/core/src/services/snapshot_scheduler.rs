use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::errors::{CoreError, ErrorKind};
use crate::models::portfolio::Portfolio;
use crate::models::price::PricedCoin;
use crate::providers::traits::MarketDataClient;
use crate::services::snapshot_builder::SnapshotBuilder;
use crate::storage::traits::{PortfolioStore, SnapshotStore};

/// Scheduler knobs, derived from `TrackerConfig`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub currency: String,
    pub fetch_timeout: Duration,
    pub max_concurrent_portfolios: usize,
}

impl From<&TrackerConfig> for SchedulerSettings {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            interval: config.snapshot_interval(),
            currency: config.currency.clone(),
            fetch_timeout: config.fetch_timeout(),
            max_concurrent_portfolios: config.max_concurrent_portfolios,
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&TrackerConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick
    Idle,
    /// Processing a tick's portfolio batch
    Running,
}

/// What happened to one portfolio during a tick.
#[derive(Debug, Clone, PartialEq)]
pub enum PortfolioOutcome {
    Saved {
        user_id: String,
        snapshot_id: Uuid,
        total_value: f64,
        entries: usize,
    },
    /// Nothing could be valued (no fetched price, no earlier price).
    Skipped { user_id: String },
    Failed {
        user_id: String,
        kind: ErrorKind,
        message: String,
    },
}

impl PortfolioOutcome {
    pub fn user_id(&self) -> &str {
        match self {
            PortfolioOutcome::Saved { user_id, .. }
            | PortfolioOutcome::Skipped { user_id }
            | PortfolioOutcome::Failed { user_id, .. } => user_id,
        }
    }

    fn failed(user_id: String, error: &CoreError) -> Self {
        PortfolioOutcome::Failed {
            user_id,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickStatus {
    Completed,
    /// Another tick was still running; this one did nothing.
    Overlapped,
    /// The portfolio listing itself failed.
    ListingFailed(String),
}

/// Summary of one scheduler tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: TickStatus,
    pub outcomes: Vec<PortfolioOutcome>,
}

impl TickReport {
    fn new(started_at: DateTime<Utc>, status: TickStatus, outcomes: Vec<PortfolioOutcome>) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            status,
            outcomes,
        }
    }

    pub fn saved(&self) -> usize {
        self.count(|o| matches!(o, PortfolioOutcome::Saved { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, PortfolioOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, PortfolioOutcome::Failed { .. }))
    }

    pub fn outcome_for(&self, user_id: &str) -> Option<&PortfolioOutcome> {
        self.outcomes.iter().find(|o| o.user_id() == user_id)
    }

    fn count(&self, pred: impl Fn(&PortfolioOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// Clears the running flag when a tick ends, including on early return.
struct TickGuard(Arc<AtomicBool>);

impl TickGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodically values every non-empty portfolio and appends a snapshot.
///
/// Per tick: list portfolios → for each (concurrently, bounded) fetch prices
/// → build → save. One portfolio's failure never affects another's, and
/// never stops the tick. Ticks never overlap.
#[derive(Clone)]
pub struct SnapshotScheduler {
    portfolios: Arc<dyn PortfolioStore>,
    snapshots: Arc<dyn SnapshotStore>,
    market_data: Arc<dyn MarketDataClient>,
    builder: SnapshotBuilder,
    settings: SchedulerSettings,
    running: Arc<AtomicBool>,
}

impl SnapshotScheduler {
    pub fn new(
        portfolios: Arc<dyn PortfolioStore>,
        snapshots: Arc<dyn SnapshotStore>,
        market_data: Arc<dyn MarketDataClient>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            portfolios,
            snapshots,
            market_data,
            builder: SnapshotBuilder::new(),
            settings,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Run a single tick now. Returns `TickStatus::Overlapped` without doing
    /// any work if another tick is in progress.
    pub async fn run_tick(&self) -> TickReport {
        let started_at = Utc::now();
        let Some(_guard) = TickGuard::acquire(&self.running) else {
            log::warn!("Snapshot tick skipped: previous tick still running");
            return TickReport::new(started_at, TickStatus::Overlapped, Vec::new());
        };

        let portfolios = match self.portfolios.list_all().await {
            Ok(portfolios) => portfolios,
            Err(e) => {
                log::error!("Snapshot tick aborted: failed to list portfolios: {e}");
                return TickReport::new(
                    started_at,
                    TickStatus::ListingFailed(e.to_string()),
                    Vec::new(),
                );
            }
        };

        let eligible: Vec<Portfolio> = portfolios.into_iter().filter(|p| !p.is_empty()).collect();
        log::debug!("Snapshot tick: {} portfolio(s) with holdings", eligible.len());

        let outcomes: Vec<PortfolioOutcome> = stream::iter(eligible)
            .map(|portfolio| Self::run_isolated(self.clone(), portfolio))
            .buffer_unordered(self.settings.max_concurrent_portfolios.max(1))
            .collect()
            .await;

        let report = TickReport::new(started_at, TickStatus::Completed, outcomes);
        log::info!(
            "Snapshot tick finished in {}ms: {} saved, {} skipped, {} failed",
            (report.finished_at - report.started_at).num_milliseconds(),
            report.saved(),
            report.skipped(),
            report.failed()
        );
        report
    }

    /// Start the periodic loop on the current tokio runtime.
    ///
    /// The first tick fires immediately. Ticks that would start while the
    /// previous one is still running are skipped, not queued.
    pub fn spawn(&self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = self.clone();
        let interval = self.settings.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            log::info!("Snapshot scheduler started (every {}s)", interval.as_secs());

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        scheduler.run_tick().await;
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            log::info!("Snapshot scheduler stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
            running: Arc::clone(&self.running),
        }
    }

    /// Run one portfolio's pipeline on its own task so that a panic is
    /// reported as a failure instead of tearing down the tick.
    async fn run_isolated(this: SnapshotScheduler, portfolio: Portfolio) -> PortfolioOutcome {
        let user_id = portfolio.user_id.clone();
        match tokio::spawn(async move { this.snapshot_portfolio(portfolio).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Snapshot task for user {user_id} aborted: {e}");
                PortfolioOutcome::failed(
                    user_id,
                    &CoreError::Build(format!("snapshot task aborted: {e}")),
                )
            }
        }
    }

    async fn snapshot_portfolio(&self, portfolio: Portfolio) -> PortfolioOutcome {
        let user_id = portfolio.user_id.clone();
        let prices = self.fetch_prices(&portfolio).await;

        let snapshots = Arc::clone(&self.snapshots);
        let lookup_user = user_id.clone();
        let currency = self.settings.currency.clone();
        let lookup_currency = currency.clone();
        let built = self
            .builder
            .build(&user_id, &portfolio.holdings, &prices, move || async move {
                // Prices quoted in another currency cannot be carried forward.
                let previous = snapshots.find_most_recent(&lookup_user).await?;
                Ok(previous.filter(|s| s.currency().eq_ignore_ascii_case(&lookup_currency)))
            })
            .await;

        let snapshot = match built {
            Ok(snapshot) => snapshot.with_currency(currency),
            Err(e) => {
                log::error!("Error creating snapshot for user {user_id}: {e}");
                return PortfolioOutcome::failed(user_id, &e);
            }
        };

        if snapshot.is_empty() {
            log::info!("No prices available for user {user_id}; no snapshot this tick");
            return PortfolioOutcome::Skipped { user_id };
        }

        if let Err(e) = self.snapshots.save(&snapshot).await {
            log::error!("Error saving snapshot for user {user_id}: {e}");
            return PortfolioOutcome::failed(user_id, &e);
        }

        log::info!(
            "Saved snapshot for user {user_id} at {} with total value: {:.2}",
            snapshot.timestamp(),
            snapshot.total_value()
        );
        PortfolioOutcome::Saved {
            user_id,
            snapshot_id: snapshot.id(),
            total_value: snapshot.total_value(),
            entries: snapshot.holdings().len(),
        }
    }

    /// Fetch prices for exactly the portfolio's symbols. A provider error or
    /// timeout yields an empty list so the builder falls back to earlier prices.
    async fn fetch_prices(&self, portfolio: &Portfolio) -> Vec<PricedCoin> {
        let symbols = portfolio.symbols();
        let fetch = self
            .market_data
            .fetch_prices(&symbols, &self.settings.currency);

        match tokio::time::timeout(self.settings.fetch_timeout, fetch).await {
            Ok(Ok(prices)) => prices,
            Ok(Err(e)) => {
                log::warn!(
                    "Error getting market data for user {}: {e}",
                    portfolio.user_id
                );
                Vec::new()
            }
            Err(_) => {
                let e = CoreError::Timeout {
                    provider: self.market_data.name().to_string(),
                    seconds: self.settings.fetch_timeout.as_secs(),
                };
                log::warn!(
                    "Error getting market data for user {}: {e}",
                    portfolio.user_id
                );
                Vec::new()
            }
        }
    }
}

/// Control handle for a spawned scheduler loop. Dropping it stops the loop
/// after the current tick.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the loop to stop and wait for it. An in-flight tick completes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            log::error!("Snapshot scheduler task ended abnormally: {e}");
        }
    }
}
