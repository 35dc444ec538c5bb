use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::CoreError;
use crate::models::portfolio::Portfolio;
use crate::models::snapshot::PortfolioSnapshot;
use super::traits::{PortfolioStore, SnapshotStore};

/// Indexed store contents. Backs [`InMemoryStore`] and the snapshot cache
/// of the file store.
#[derive(Debug, Clone, Default)]
pub struct StoreData {
    /// user_id → portfolio
    portfolios: HashMap<String, Portfolio>,

    /// user_id → snapshots, kept sorted by timestamp (oldest first)
    snapshots: HashMap<String, Vec<PortfolioSnapshot>>,

    /// Every stored snapshot id.
    ids: HashSet<Uuid>,
}

impl StoreData {
    pub fn upsert_portfolio(&mut self, portfolio: &Portfolio) {
        self.portfolios
            .insert(portfolio.user_id.clone(), portfolio.clone());
    }

    pub fn portfolio(&self, user_id: &str) -> Option<Portfolio> {
        self.portfolios.get(user_id).cloned()
    }

    pub fn portfolios(&self) -> Vec<Portfolio> {
        self.portfolios.values().cloned().collect()
    }

    pub fn contains_snapshot(&self, id: Uuid) -> bool {
        self.ids.contains(&id)
    }

    /// Append a snapshot, keeping the per-user list sorted by timestamp.
    /// Snapshots sharing a timestamp keep insertion order.
    pub fn append_snapshot(&mut self, snapshot: &PortfolioSnapshot) -> Result<(), CoreError> {
        if !self.ids.insert(snapshot.id()) {
            return Err(CoreError::Store(format!(
                "snapshot {} already exists; snapshots are append-only",
                snapshot.id()
            )));
        }

        let entries = self
            .snapshots
            .entry(snapshot.user_id().to_string())
            .or_default();
        let pos = entries.partition_point(|s| s.timestamp() <= snapshot.timestamp());
        entries.insert(pos, snapshot.clone());
        Ok(())
    }

    pub fn snapshots_since(&self, user_id: &str, since: DateTime<Utc>) -> Vec<PortfolioSnapshot> {
        self.snapshots
            .get(user_id)
            .map(|entries| {
                let start = entries.partition_point(|s| s.timestamp() < since);
                entries[start..].to_vec()
            })
            .unwrap_or_default()
    }

    pub fn most_recent(&self, user_id: &str) -> Option<PortfolioSnapshot> {
        self.snapshots
            .get(user_id)
            .and_then(|entries| entries.last())
            .cloned()
    }

    /// Total number of snapshots across all users.
    pub fn snapshot_count(&self) -> usize {
        self.ids.len()
    }
}

/// Thread-safe store kept entirely in memory. Implements both store traits.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<StoreData>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot_count(&self) -> usize {
        self.data.read().await.snapshot_count()
    }
}

#[async_trait]
impl PortfolioStore for InMemoryStore {
    async fn list_all(&self) -> Result<Vec<Portfolio>, CoreError> {
        Ok(self.data.read().await.portfolios())
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Portfolio>, CoreError> {
        Ok(self.data.read().await.portfolio(user_id))
    }

    async fn save(&self, portfolio: &Portfolio) -> Result<(), CoreError> {
        self.data.write().await.upsert_portfolio(portfolio);
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn save(&self, snapshot: &PortfolioSnapshot) -> Result<(), CoreError> {
        self.data.write().await.append_snapshot(snapshot)
    }

    async fn find_by_user_id_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PortfolioSnapshot>, CoreError> {
        Ok(self.data.read().await.snapshots_since(user_id, since))
    }

    async fn find_most_recent(
        &self,
        user_id: &str,
    ) -> Result<Option<PortfolioSnapshot>, CoreError> {
        Ok(self.data.read().await.most_recent(user_id))
    }
}
