use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::errors::CoreError;
use crate::models::portfolio::Portfolio;
use crate::models::snapshot::PortfolioSnapshot;
use super::format;
use super::memory::StoreData;
use super::traits::{PortfolioStore, SnapshotStore};

/// Store backed by two files that several processes can share (for example
/// the daemon and a CLI invocation).
///
/// - `<path>`: CPSN header + bincode portfolios. Re-read on every access;
///   a save rewrites a temp file and renames it over the original.
/// - `<path>.snapshots`: CPSL append-only log, one length-prefixed bincode
///   record per snapshot. Each instance caches what it has read and only
///   reads bytes past its last offset.
///
/// Writers hold an exclusive advisory lock on `<path>.lock`, so a save
/// never overwrites another process's changes.
pub struct FileStore {
    inner: Arc<Inner>,
}

struct Inner {
    path: PathBuf,
    log_path: PathBuf,
    lock_path: PathBuf,
    cache: Mutex<SnapshotCache>,
}

/// Snapshots read so far and the log offset just past the last record.
#[derive(Default)]
struct SnapshotCache {
    data: StoreData,
    offset: u64,
}

impl FileStore {
    /// Open the store at `path`. Existing files are validated; missing files
    /// are created on first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let store = Self {
            inner: Arc::new(Inner {
                log_path: path.with_extension("snapshots"),
                lock_path: path.with_extension("lock"),
                path,
                cache: Mutex::new(SnapshotCache::default()),
            }),
        };

        let (portfolios, snapshots) = store
            .blocking(|inner| {
                let portfolios = inner.read_portfolios()?.len();
                let mut cache = inner.cache();
                inner.catch_up(&mut cache)?;
                Ok((portfolios, cache.data.snapshot_count()))
            })
            .await?;
        log::info!(
            "Opened store {}: {portfolios} portfolio(s), {snapshots} snapshot(s)",
            store.path().display()
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn snapshot_log_path(&self) -> &Path {
        &self.inner.log_path
    }

    /// Number of snapshots in the log, including ones appended by other
    /// processes.
    pub async fn snapshot_count(&self) -> Result<usize, CoreError> {
        self.blocking(|inner| {
            let mut cache = inner.cache();
            inner.catch_up(&mut cache)?;
            Ok(cache.data.snapshot_count())
        })
        .await
    }

    /// Run file I/O off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&Inner) -> Result<T, CoreError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| CoreError::Store(format!("store task failed: {e}")))?
    }
}

impl Inner {
    fn cache(&self) -> std::sync::MutexGuard<'_, SnapshotCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Exclusive lock shared by all writers. Released when the file drops.
    fn lock_exclusive(&self) -> Result<File, CoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        file.lock()?;
        Ok(file)
    }

    // ── Portfolios ──────────────────────────────────────────────────

    fn read_portfolios(&self) -> Result<HashMap<String, Portfolio>, CoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        let (_header, payload) = format::read_file(&bytes)?;
        bincode::deserialize(payload).map_err(|e| {
            CoreError::Deserialization(format!("Failed to deserialize portfolios: {e}"))
        })
    }

    fn save_portfolio(&self, portfolio: &Portfolio) -> Result<(), CoreError> {
        let _lock = self.lock_exclusive()?;
        let mut portfolios = self.read_portfolios()?;
        portfolios.insert(portfolio.user_id.clone(), portfolio.clone());

        let payload = bincode::serialize(&portfolios).map_err(|e| {
            CoreError::Serialization(format!("Failed to serialize portfolios: {e}"))
        })?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, format::write_file(format::CURRENT_VERSION, &payload))?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    // ── Snapshot log ────────────────────────────────────────────────

    /// Read every complete record past the cached offset into the cache.
    /// An incomplete trailing record is left for a later call.
    fn catch_up(&self, cache: &mut SnapshotCache) -> Result<(), CoreError> {
        let mut file = match File::open(&self.log_path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if cache.offset > 0 {
                    log::warn!("Snapshot log {} disappeared", self.log_path.display());
                    *cache = SnapshotCache::default();
                }
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len();
        if len < cache.offset {
            log::warn!(
                "Snapshot log {} shrank to {len} bytes, reloading",
                self.log_path.display()
            );
            *cache = SnapshotCache::default();
        }
        if len == cache.offset {
            return Ok(());
        }

        let mut bytes = Vec::new();
        if cache.offset == 0 {
            file.read_to_end(&mut bytes)?;
            if bytes.len() < format::LOG_HEADER_SIZE {
                // Header still being written.
                return Ok(());
            }
            format::read_log_header(&bytes)?;
            bytes.drain(..format::LOG_HEADER_SIZE);
            cache.offset = format::LOG_HEADER_SIZE as u64;
        } else {
            file.seek(SeekFrom::Start(cache.offset))?;
            file.read_to_end(&mut bytes)?;
        }

        let (records, consumed) = format::split_records(&bytes);
        for record in records {
            let snapshot: PortfolioSnapshot = bincode::deserialize(record).map_err(|e| {
                CoreError::Deserialization(format!("Failed to deserialize snapshot: {e}"))
            })?;
            if cache.data.contains_snapshot(snapshot.id()) {
                log::warn!("Skipping duplicate snapshot {} in log", snapshot.id());
                continue;
            }
            cache.data.append_snapshot(&snapshot)?;
        }
        cache.offset += consumed as u64;
        Ok(())
    }

    /// Append one record. The cache only moves forward once the bytes are
    /// on disk.
    fn append_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<(), CoreError> {
        let _lock = self.lock_exclusive()?;
        let mut cache = self.cache();
        self.catch_up(&mut cache)?;

        if cache.data.contains_snapshot(snapshot.id()) {
            return Err(CoreError::Store(format!(
                "snapshot {} already exists; snapshots are append-only",
                snapshot.id()
            )));
        }

        let payload = bincode::serialize(snapshot)
            .map_err(|e| CoreError::Serialization(format!("Failed to serialize snapshot: {e}")))?;
        let record = format::encode_record(&payload)?;

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.log_path)?;
        let len = file.metadata()?.len();

        // Under the lock, bytes past the cached offset are a torn write
        // from a writer that died mid-append.
        if len > cache.offset {
            log::warn!(
                "Discarding {} byte(s) of incomplete record in {}",
                len - cache.offset,
                self.log_path.display()
            );
            file.set_len(cache.offset)?;
        }

        let mut bytes = Vec::with_capacity(format::LOG_HEADER_SIZE + record.len());
        if cache.offset == 0 {
            bytes.extend(format::log_header());
        }
        bytes.extend(record);

        file.seek(SeekFrom::Start(cache.offset))?;
        file.write_all(&bytes)?;
        file.sync_data()?;

        cache.offset += bytes.len() as u64;
        cache.data.append_snapshot(snapshot)
    }
}

#[async_trait]
impl PortfolioStore for FileStore {
    async fn list_all(&self) -> Result<Vec<Portfolio>, CoreError> {
        self.blocking(|inner| Ok(inner.read_portfolios()?.into_values().collect()))
            .await
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Portfolio>, CoreError> {
        let user_id = user_id.to_string();
        self.blocking(move |inner| Ok(inner.read_portfolios()?.remove(&user_id)))
            .await
    }

    async fn save(&self, portfolio: &Portfolio) -> Result<(), CoreError> {
        let portfolio = portfolio.clone();
        self.blocking(move |inner| inner.save_portfolio(&portfolio))
            .await
    }
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn save(&self, snapshot: &PortfolioSnapshot) -> Result<(), CoreError> {
        let snapshot = snapshot.clone();
        self.blocking(move |inner| inner.append_snapshot(&snapshot))
            .await
    }

    async fn find_by_user_id_since(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<PortfolioSnapshot>, CoreError> {
        let user_id = user_id.to_string();
        self.blocking(move |inner| {
            let mut cache = inner.cache();
            inner.catch_up(&mut cache)?;
            Ok(cache.data.snapshots_since(&user_id, since))
        })
        .await
    }

    async fn find_most_recent(
        &self,
        user_id: &str,
    ) -> Result<Option<PortfolioSnapshot>, CoreError> {
        let user_id = user_id.to_string();
        self.blocking(move |inner| {
            let mut cache = inner.cache();
            inner.catch_up(&mut cache)?;
            Ok(cache.data.most_recent(&user_id))
        })
        .await
    }
}
