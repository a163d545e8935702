//! JSON-file backed schedule store.
//!
//! Mutations land in memory and mark the store dirty. [`FileRepository::flush`]
//! writes a snapshot on the blocking pool; the flusher task calls it on an
//! interval and once more on shutdown.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use uuid::Uuid;

use crate::schedule::repository::{
    RepositoryError, RepositoryResult, ScheduleFilter, ScheduleRepository,
};
use crate::schedule::types::{RecordUpdate, ScheduledTransaction, TransactionStatus};

/// A thread-safe record map, persisted to a JSON file when a path is set.
#[derive(Clone, Default)]
pub struct FileRepository {
    inner: Arc<DashMap<String, ScheduledTransaction>>,
    persistence_path: Option<String>,
    dirty: Arc<AtomicBool>,
    /// One snapshot write at a time.
    flush_lock: Arc<Mutex<()>>,
}

impl FileRepository {
    /// Create an empty store. `None` keeps records in memory only.
    pub fn new(persistence_path: Option<String>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
            dirty: Arc::new(AtomicBool::new(false)),
            flush_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load from file if it exists.
    pub fn load_from_file(path: &str) -> RepositoryResult<Self> {
        let store = Self::new(Some(path.to_string()));
        if Path::new(path).exists() {
            let file = File::open(path)?;
            let reader = BufReader::new(file);
            let map: HashMap<String, ScheduledTransaction> = serde_json::from_reader(reader)?;

            for (k, v) in map {
                store.inner.insert(k, v);
            }
            tracing::info!("Loaded {} scheduled transactions from {}", store.inner.len(), path);
        }
        Ok(store)
    }

    /// Whether memory holds changes not yet on disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Write every record to the persistence file if anything changed.
    ///
    /// A failed write leaves the store dirty so the next flush retries it.
    pub async fn flush(&self) -> RepositoryResult<()> {
        let Some(path) = self.persistence_path.clone() else {
            self.dirty.store(false, Ordering::SeqCst);
            return Ok(());
        };

        let _flush = self.flush_lock.lock().await;
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let map: HashMap<_, _> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        let count = map.len();

        let written = tokio::task::spawn_blocking(move || write_snapshot(&path, &map))
            .await
            .map_err(|e| RepositoryError::Unavailable(format!("flush task failed: {e}")))
            .and_then(|r| r);

        match written {
            Ok(()) => {
                tracing::debug!(records = count, "Flushed schedule store");
                Ok(())
            }
            Err(e) => {
                self.mark_dirty();
                Err(e)
            }
        }
    }

    /// Flush every `interval` until `shutdown` fires, then flush once more.
    pub fn spawn_flusher(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = store.flush().await {
                            tracing::error!(error = %e, "Failed to flush schedule store");
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }

            if let Err(e) = store.flush().await {
                tracing::error!(error = %e, "Final flush of schedule store failed");
            }
        })
    }

    pub fn get(&self, id: &str) -> Option<ScheduledTransaction> {
        self.inner.get(id).map(|r| r.value().clone())
    }

    /// Every record, oldest first.
    pub fn all(&self) -> Vec<ScheduledTransaction> {
        let mut records: Vec<_> = self.inner.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }

    /// Mark a non-terminal record Cancelled.
    pub fn cancel(&self, id: &str) -> RepositoryResult<ScheduledTransaction> {
        let record = {
            let mut entry = self
                .inner
                .get_mut(id)
                .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
            if !entry.status.is_terminal() {
                entry.status = TransactionStatus::Cancelled;
            }
            entry.clone()
        };
        self.mark_dirty();
        Ok(record)
    }
}

// Write a sibling file first so a crash never leaves a truncated store.
fn write_snapshot(path: &str, map: &HashMap<String, ScheduledTransaction>) -> RepositoryResult<()> {
    let tmp = format!("{path}.tmp");
    let mut writer = BufWriter::new(File::create(&tmp)?);
    serde_json::to_writer_pretty(&mut writer, map)?;
    writer.flush()?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl ScheduleRepository for FileRepository {
    async fn get_pending(&self, filter: &ScheduleFilter) -> RepositoryResult<Vec<ScheduledTransaction>> {
        Ok(self
            .inner
            .iter()
            .filter(|r| !r.status.is_terminal() && filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn get_by_ids(
        &self,
        filter: &ScheduleFilter,
        ids: &[String],
    ) -> RepositoryResult<Vec<ScheduledTransaction>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|r| filter.matches(r))
            .collect())
    }

    async fn update(&self, id: &str, update: &RecordUpdate) -> RepositoryResult<()> {
        {
            let mut entry = self
                .inner
                .get_mut(id)
                .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
            entry.apply(update);
        }
        self.mark_dirty();
        Ok(())
    }

    async fn save(&self, mut record: ScheduledTransaction) -> RepositoryResult<ScheduledTransaction> {
        let existing = self
            .inner
            .iter()
            .find(|r| !r.status.is_terminal() && r.same_intent(&record))
            .map(|r| r.key().clone());

        let stored = match existing {
            Some(id) => {
                let mut entry = self
                    .inner
                    .get_mut(&id)
                    .ok_or_else(|| RepositoryError::NotFound(id.clone()))?;
                entry.overwrite_conditions(&record);
                tracing::info!(tx_id = %id, "Updated conditions of existing scheduled transaction");
                entry.clone()
            }
            None => {
                if record.id.is_empty() {
                    record.id = Uuid::new_v4().to_string();
                }
                self.inner.insert(record.id.clone(), record.clone());
                tracing::info!(tx_id = %record.id, nonce = record.nonce, "Scheduled new transaction");
                record
            }
        };

        self.mark_dirty();
        Ok(stored)
    }
}
