//! Upload/fetch orchestration and the deliver-at-most-once guarantee
//!
//! The controller is the only place that composes the codec and the
//! token store. The registry lock is held only around the delivered
//! check-and-flip; encryption and decryption run on the blocking pool
//! with no lock held.

use crate::config::CoreConfig;
use crate::record::{AccessCode, FileId, FileRecord, Token};
use crate::store::{remove_artifact, TokenStore};
use crate::{Result, TransferError};
use bytes::Bytes;
use chrono::Duration as Ttl;
use satchel_crypto::CipherCodec;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How many fresh `(file_id, access_code)` pairs upload tries before
/// reporting a conflict. The id space is large enough that more than
/// one retry is already rare.
const MAX_TOKEN_ATTEMPTS: usize = 16;

/// A delivered file
#[derive(Clone, Debug)]
pub struct Delivery {
    /// The original plaintext bytes
    pub data: Bytes,
    /// The display name given at upload, untrusted
    pub filename: String,
}

/// Orchestrates upload and single-delivery fetch
pub struct TransferController {
    codec: Arc<CipherCodec>,
    store: Arc<TokenStore>,
    config: CoreConfig,
}

impl TransferController {
    /// Create a controller with an empty registry
    ///
    /// Call [`start_sweep`](Self::start_sweep) once a runtime is
    /// available, and [`shutdown`](Self::shutdown) on teardown.
    pub fn new(config: CoreConfig) -> Result<Self> {
        let codec = CipherCodec::new(&config.scratch_dir, config.kdf)?;
        Ok(Self {
            codec: Arc::new(codec),
            store: Arc::new(TokenStore::new()),
            config,
        })
    }

    /// Start the background expiry sweep
    pub fn start_sweep(&self) {
        self.store
            .start_sweep(Duration::from_secs(self.config.sweep_interval_secs));
    }

    /// Stop the background sweep
    pub async fn shutdown(&self) {
        self.store.shutdown().await;
    }

    /// Number of live records
    pub fn live_records(&self) -> usize {
        self.store.len()
    }

    /// Encrypt a vetted blob and register it for one-time fetch
    ///
    /// The caller is responsible for size and content-type admission
    /// checks before invoking this.
    pub async fn upload(&self, data: Bytes, filename: &str) -> Result<Token> {
        let codec = Arc::clone(&self.codec);
        let plaintext = data.clone();
        let sealed = tokio::task::spawn_blocking(move || codec.encrypt(Cursor::new(plaintext)))
            .await
            .map_err(|e| TransferError::Storage(std::io::Error::other(e)))??;

        let ttl = Ttl::seconds(self.config.ttl_secs as i64);
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let record = FileRecord::new(
                FileId::generate(),
                AccessCode::generate(),
                sealed.clone(),
                filename,
                ttl,
            );
            let token = Token {
                file_id: record.file_id.clone(),
                access_code: record.access_code.clone(),
            };
            match self.store.insert(record) {
                Ok(()) => {
                    debug!(file_id = %token.file_id, name = filename, "upload registered");
                    return Ok(token);
                }
                Err(TransferError::Conflict) => continue,
                Err(e) => {
                    remove_artifact(&sealed.path);
                    return Err(e);
                }
            }
        }

        remove_artifact(&sealed.path);
        Err(TransferError::Conflict)
    }

    /// Fetch by file id; succeeds for exactly one caller per record
    pub async fn fetch(&self, file_id: &FileId) -> Result<Delivery> {
        let record = self.store.lookup(file_id).ok_or(TransferError::NotFound)?;
        self.deliver(record).await
    }

    /// Fetch by access code; same single-delivery contract
    pub async fn fetch_by_code(&self, code: &str) -> Result<Delivery> {
        let record = self
            .store
            .lookup_by_code(code)
            .ok_or(TransferError::NotFound)?;
        self.deliver(record).await
    }

    async fn deliver(&self, record: FileRecord) -> Result<Delivery> {
        if record.delivered {
            return Err(TransferError::AlreadyDelivered);
        }
        // The CAS decides the race: losers never touch the ciphertext.
        if !self.store.mark_delivered(&record.file_id) {
            return Err(TransferError::AlreadyDelivered);
        }

        let codec = Arc::clone(&self.codec);
        let sealed = record.sealed.clone();
        let decrypted = tokio::task::spawn_blocking(move || codec.decrypt(&sealed))
            .await
            .map_err(|e| TransferError::Storage(std::io::Error::other(e)))?;

        let plaintext_path = match decrypted {
            Ok(path) => path,
            Err(e) => {
                // A failed delivery is not retried; the record stays
                // delivered and the disk is still reclaimed.
                self.cleanup(&record, None);
                return Err(e.into());
            }
        };

        let data = match tokio::fs::read(&plaintext_path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                self.cleanup(&record, Some(&plaintext_path));
                return Err(e.into());
            }
        };

        self.cleanup(&record, Some(&plaintext_path));
        info!(
            file_id = %record.file_id,
            name = %record.original_name,
            size = data.len(),
            "file delivered"
        );
        Ok(Delivery {
            data,
            filename: record.original_name,
        })
    }

    /// Delete the record's artifacts and evict it from the registry.
    /// Shared by every terminal path; double-deletes are no-ops.
    fn cleanup(&self, record: &FileRecord, plaintext: Option<&Path>) {
        remove_artifact(&record.sealed.path);
        if let Some(path) = plaintext {
            remove_artifact(path);
        }
        self.store.evict(&record.file_id);
    }
}
