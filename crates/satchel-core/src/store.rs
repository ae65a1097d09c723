//! Concurrent TTL-expiring token registry
//!
//! Records are reachable by file id or by access code while they are
//! unexpired. Expiry is enforced twice: lazily on every lookup, and by
//! a background sweep for records nobody asks about. Both paths share
//! the same idempotent evict-and-remove-artifact routine, so a race
//! between a fetch and the sweep deletes everything exactly once.

use crate::record::{AccessCode, FileId, FileRecord};
use crate::{Result, TransferError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Remove an artifact file, tolerating it being gone already
///
/// Failures are logged and swallowed: cleanup must never resurrect a
/// record or mask an otherwise successful delivery.
pub fn remove_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove artifact"),
    }
}

struct SweepHandle {
    handle: JoinHandle<()>,
    stop: Arc<Notify>,
}

/// Registry of live file records, keyed by id and by access code
pub struct TokenStore {
    records: DashMap<FileId, FileRecord>,
    codes: DashMap<AccessCode, FileId>,
    sweeper: Mutex<Option<SweepHandle>>,
}

impl TokenStore {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            codes: DashMap::new(),
            sweeper: Mutex::new(None),
        }
    }

    /// Number of records currently registered
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert a new record, failing on a live id or code collision
    ///
    /// The access code index is claimed first and rolled back if the
    /// primary insert conflicts. A code held by an expired record is
    /// reclaimed after evicting the stale holder.
    pub fn insert(&self, record: FileRecord) -> Result<()> {
        match self.codes.entry(record.access_code.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(record.file_id.clone());
            }
            Entry::Occupied(mut occupied) => {
                let holder = occupied.get().clone();
                let holder_live = self
                    .records
                    .get(&holder)
                    .map(|r| !r.is_expired())
                    .unwrap_or(false);
                if holder_live {
                    return Err(TransferError::Conflict);
                }
                // Stale claim: replace it, then finish evicting the
                // lapsed holder outside the entry guard.
                occupied.insert(record.file_id.clone());
                drop(occupied);
                self.remove_if_expired(&holder);
            }
        }

        match self.records.entry(record.file_id.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(())
            }
            Entry::Occupied(_) => {
                self.release_code(&record);
                Err(TransferError::Conflict)
            }
        }
    }

    /// Look up a record by file id
    ///
    /// Re-checks expiry on every call; a lapsed record is evicted here
    /// and never returned, even if the sweep has not run yet.
    pub fn lookup(&self, file_id: &FileId) -> Option<FileRecord> {
        let record = self.records.get(file_id)?.clone();
        if record.is_expired() {
            self.remove_if_expired(file_id);
            return None;
        }
        Some(record)
    }

    /// Look up a record by access code via the secondary index
    pub fn lookup_by_code(&self, code: &str) -> Option<FileRecord> {
        let file_id = self.codes.get(&AccessCode::new(code))?.clone();
        self.lookup(&file_id)
    }

    /// Atomically flip `delivered` from false to true
    ///
    /// Returns true only for the single caller that performs the
    /// transition. Absent, expired, and already-delivered records all
    /// report false.
    pub fn mark_delivered(&self, file_id: &FileId) -> bool {
        match self.records.get_mut(file_id) {
            Some(mut record) => {
                if record.delivered || record.is_expired() {
                    false
                } else {
                    record.delivered = true;
                    true
                }
            }
            None => false,
        }
    }

    /// Remove a record from both indexes
    ///
    /// Idempotent: only the first caller gets the record back. Does
    /// not touch artifacts; callers decide what to delete.
    pub fn evict(&self, file_id: &FileId) -> Option<FileRecord> {
        let (_, record) = self.records.remove(file_id)?;
        self.release_code(&record);
        Some(record)
    }

    /// Evict every lapsed record and delete its ciphertext
    ///
    /// Returns how many records were removed.
    pub fn sweep_once(&self) -> usize {
        let lapsed: Vec<FileId> = self
            .records
            .iter()
            .filter(|r| r.is_expired())
            .map(|r| r.file_id.clone())
            .collect();

        let mut removed = 0;
        for file_id in lapsed {
            if self.remove_if_expired(&file_id) {
                removed += 1;
            }
        }
        removed
    }

    /// Start the background expiry sweep
    ///
    /// No-op if a sweep is already running. The task holds only a weak
    /// reference, so dropping the last `Arc<TokenStore>` also ends it.
    pub fn start_sweep(self: &Arc<Self>, interval: Duration) {
        let mut guard = self.sweeper.lock();
        if guard.is_some() {
            return;
        }

        let stop = Arc::new(Notify::new());
        let stop_task = Arc::clone(&stop);
        let store: Weak<TokenStore> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else { break };
                        let removed = store.sweep_once();
                        if removed > 0 {
                            debug!(removed, "ttl sweep evicted expired records");
                        }
                    }
                    _ = stop_task.notified() => break,
                }
            }
        });
        *guard = Some(SweepHandle { handle, stop });
    }

    /// Stop the background sweep and wait for it to finish
    pub async fn shutdown(&self) {
        let taken = self.sweeper.lock().take();
        if let Some(SweepHandle { handle, stop }) = taken {
            stop.notify_one();
            let _ = handle.await;
        }
    }

    /// Evict a record only if its TTL has lapsed, deleting its
    /// ciphertext. The `remove_if` winner is the only caller that
    /// performs the deletion.
    fn remove_if_expired(&self, file_id: &FileId) -> bool {
        match self.records.remove_if(file_id, |_, r| r.is_expired()) {
            Some((_, record)) => {
                self.release_code(&record);
                remove_artifact(&record.sealed.path);
                debug!(file_id = %record.file_id, "expired record evicted");
                true
            }
            None => false,
        }
    }

    /// Drop the code index entry, but only if this record still owns
    /// it: a lapsed record's code may already have been reclaimed by a
    /// newer insert.
    fn release_code(&self, record: &FileRecord) {
        self.codes
            .remove_if(&record.access_code, |_, holder| holder == &record.file_id);
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as TtlDuration;
    use satchel_crypto::{FileSecret, Iv, Salt, SealedArtifact};
    use std::path::PathBuf;

    fn sealed(path: impl Into<PathBuf>) -> SealedArtifact {
        SealedArtifact {
            path: path.into(),
            iv: Iv::generate(),
            salt: Salt::generate(),
            secret: FileSecret::generate(),
        }
    }

    fn record(id: &str, code: &str, ttl_secs: i64) -> FileRecord {
        FileRecord::new(
            FileId::new(id),
            AccessCode::new(code),
            sealed(format!("/nonexistent/{id}.enc")),
            "file.txt",
            TtlDuration::seconds(ttl_secs),
        )
    }

    #[test]
    fn test_insert_and_lookup_both_keys() {
        let store = TokenStore::new();
        store.insert(record("aaaa0001", "111111", 60)).unwrap();

        assert!(store.lookup(&FileId::new("aaaa0001")).is_some());
        assert!(store.lookup_by_code("111111").is_some());
        assert!(store.lookup(&FileId::new("aaaa0002")).is_none());
        assert!(store.lookup_by_code("222222").is_none());
    }

    #[test]
    fn test_insert_conflicts_on_live_id_and_code() {
        let store = TokenStore::new();
        store.insert(record("aaaa0001", "111111", 60)).unwrap();

        assert!(matches!(
            store.insert(record("aaaa0001", "999999", 60)),
            Err(TransferError::Conflict)
        ));
        assert!(matches!(
            store.insert(record("bbbb0002", "111111", 60)),
            Err(TransferError::Conflict)
        ));
        // Failed inserts must not leave a dangling code claim
        assert!(store.lookup_by_code("999999").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_code_of_expired_record_is_reclaimable() {
        let store = TokenStore::new();
        store.insert(record("aaaa0001", "111111", 0)).unwrap();

        store.insert(record("bbbb0002", "111111", 60)).unwrap();
        let found = store.lookup_by_code("111111").unwrap();
        assert_eq!(found.file_id, FileId::new("bbbb0002"));
        assert!(store.lookup(&FileId::new("aaaa0001")).is_none());
    }

    #[test]
    fn test_lookup_rechecks_expiry() {
        let store = TokenStore::new();
        store.insert(record("aaaa0001", "111111", 0)).unwrap();

        // No sweep has run, but the lapsed record must not leak
        assert!(store.lookup(&FileId::new("aaaa0001")).is_none());
        assert!(store.lookup_by_code("111111").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_mark_delivered_first_caller_wins() {
        let store = TokenStore::new();
        store.insert(record("aaaa0001", "111111", 60)).unwrap();
        let id = FileId::new("aaaa0001");

        assert!(store.mark_delivered(&id));
        assert!(!store.mark_delivered(&id));
        assert!(!store.mark_delivered(&FileId::new("missing0")));
    }

    #[test]
    fn test_mark_delivered_refuses_expired() {
        let store = TokenStore::new();
        store.insert(record("aaaa0001", "111111", 0)).unwrap();
        assert!(!store.mark_delivered(&FileId::new("aaaa0001")));
    }

    #[test]
    fn test_evict_is_idempotent() {
        let store = TokenStore::new();
        store.insert(record("aaaa0001", "111111", 60)).unwrap();
        let id = FileId::new("aaaa0001");

        assert!(store.evict(&id).is_some());
        assert!(store.evict(&id).is_none());
        assert!(store.lookup_by_code("111111").is_none());
    }

    #[test]
    fn test_sweep_removes_only_lapsed_records_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let lapsed_artifact = dir.path().join("lapsed.enc");
        let live_artifact = dir.path().join("live.enc");
        std::fs::write(&lapsed_artifact, b"ciphertext").unwrap();
        std::fs::write(&live_artifact, b"ciphertext").unwrap();

        let store = TokenStore::new();
        let mut lapsed = record("aaaa0001", "111111", 0);
        lapsed.sealed = sealed(&lapsed_artifact);
        let mut live = record("bbbb0002", "222222", 60);
        live.sealed = sealed(&live_artifact);
        store.insert(lapsed).unwrap();
        store.insert(live).unwrap();

        assert_eq!(store.sweep_once(), 1);
        assert_eq!(store.len(), 1);
        assert!(!lapsed_artifact.exists());
        assert!(live_artifact.exists());

        // Sweeping again with nothing lapsed is a no-op
        assert_eq!(store.sweep_once(), 0);
    }

    #[test]
    fn test_remove_artifact_tolerates_missing_file() {
        remove_artifact(Path::new("/nonexistent/never-there.enc"));
    }

    #[tokio::test]
    async fn test_sweep_task_lifecycle() {
        let store = Arc::new(TokenStore::new());
        store.insert(record("aaaa0001", "111111", 0)).unwrap();

        store.start_sweep(Duration::from_millis(10));
        // Starting twice is a no-op
        store.start_sweep(Duration::from_millis(10));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_empty());

        store.shutdown().await;
        // Shutting down twice is fine
        store.shutdown().await;
    }
}
