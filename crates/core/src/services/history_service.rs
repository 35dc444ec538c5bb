use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::errors::CoreError;
use crate::models::snapshot::PortfolioSnapshot;
use crate::models::time_range::TimeRange;
use crate::storage::traits::SnapshotStore;

/// Read side of the snapshot history.
///
/// Store failures are returned to the caller; an empty history is an empty
/// `Vec` or `None`, never an error.
pub struct HistoryService {
    snapshots: Arc<dyn SnapshotStore>,
}

impl HistoryService {
    pub fn new(snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self { snapshots }
    }

    /// Snapshots for `user_id` inside the window named by `time_range`
    /// ("1h", "24h", "7d", "30d", "90d"; anything else means "24h"),
    /// oldest first.
    pub async fn get_snapshots(
        &self,
        user_id: &str,
        time_range: &str,
    ) -> Result<Vec<PortfolioSnapshot>, CoreError> {
        self.get_snapshots_at(user_id, TimeRange::parse(time_range), Utc::now())
            .await
    }

    /// Same as `get_snapshots`, with the range already parsed and `now` pinned.
    pub async fn get_snapshots_at(
        &self,
        user_id: &str,
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<Vec<PortfolioSnapshot>, CoreError> {
        let since = range.cutoff(now);
        let mut snapshots = self.snapshots.find_by_user_id_since(user_id, since).await?;
        snapshots.sort_by_key(|s| s.timestamp());
        Ok(snapshots)
    }

    /// Most recent snapshot for `user_id`, or `None` if there is none yet.
    pub async fn get_latest_snapshot(
        &self,
        user_id: &str,
    ) -> Result<Option<PortfolioSnapshot>, CoreError> {
        self.snapshots.find_most_recent(user_id).await
    }
}
