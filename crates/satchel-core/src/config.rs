//! Transfer core configuration

use satchel_crypto::KdfParams;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration consumed by the transfer core
///
/// Everything else (ports, CORS, rate limits, admission checks)
/// belongs to the embedding layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Scratch directory for ciphertext and temporary plaintext
    pub scratch_dir: PathBuf,
    /// Record time-to-live in seconds
    pub ttl_secs: u64,
    /// Background expiry sweep interval in seconds
    pub sweep_interval_secs: u64,
    /// scrypt cost parameters for per-file key derivation
    pub kdf: KdfParams,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("uploads"),
            ttl_secs: 600, // 10 minutes
            sweep_interval_secs: 60,
            kdf: KdfParams::default(),
        }
    }
}
