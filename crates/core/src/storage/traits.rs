use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::CoreError;
use crate::models::portfolio::Portfolio;
use crate::models::snapshot::PortfolioSnapshot;

/// Current holdings per user. One portfolio per `user_id`.
#[async_trait]
pub trait PortfolioStore: Send + Sync {
    /// Every stored portfolio, in no particular order.
    async fn list_all(&self) -> Result<Vec<Portfolio>, CoreError>;

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Portfolio>, CoreError>;

    /// Insert or replace the portfolio for `portfolio.user_id`.
    async fn save(&self, portfolio: &Portfolio) -> Result<(), CoreError>;
}

/// Append-only history of portfolio snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Append a snapshot. Saving an id that already exists is an error.
    async fn save(&self, snapshot: &PortfolioSnapshot) -> Result<(), CoreError>;

    /// Snapshots for `user_id` with `timestamp >= since`, oldest first.
    async fn find_by_user_id_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PortfolioSnapshot>, CoreError>;

    /// The snapshot with the latest timestamp, if any.
    async fn find_most_recent(&self, user_id: &str)
        -> Result<Option<PortfolioSnapshot>, CoreError>;
}
