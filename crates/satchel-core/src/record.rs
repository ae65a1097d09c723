//! File records and the tokens that reference them

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use satchel_crypto::SealedArtifact;
use serde::{Deserialize, Serialize};

/// Opaque identifier for an uploaded file
///
/// Eight lowercase hex characters from four random bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(String);

impl FileId {
    /// Generate a new random identifier
    pub fn generate() -> Self {
        let mut bytes = [0u8; 4];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap an identifier received from a caller
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short human-presentable download code
///
/// Six decimal digits, `100000..=999999`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessCode(String);

impl AccessCode {
    /// Generate a new random code
    pub fn generate() -> Self {
        Self(OsRng.gen_range(100_000..=999_999u32).to_string())
    }

    /// Wrap a code received from a caller
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Get the code string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccessCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The pair returned to an uploader
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Opaque file identifier, usable in a download URL
    pub file_id: FileId,
    /// Short code for manual entry
    pub access_code: AccessCode,
}

/// Registry entry for one uploaded file
///
/// Created by upload, consumed by the single successful fetch or the
/// expiry sweep, whichever comes first.
#[derive(Clone, Debug)]
pub struct FileRecord {
    /// Opaque unique identifier
    pub file_id: FileId,
    /// Unique-among-live-records download code
    pub access_code: AccessCode,
    /// Ciphertext location plus the material that unlocks it
    pub sealed: SealedArtifact,
    /// Untrusted display name, only echoed back on delivery
    pub original_name: String,
    /// Monotonic: false until the first successful delivery
    pub delivered: bool,
    /// Creation instant
    pub created_at: DateTime<Utc>,
    /// Time-to-live from creation
    pub ttl: Duration,
}

impl FileRecord {
    /// Create a fresh undelivered record
    pub fn new(
        file_id: FileId,
        access_code: AccessCode,
        sealed: SealedArtifact,
        original_name: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            file_id,
            access_code,
            sealed,
            original_name: original_name.into(),
            delivered: false,
            created_at: Utc::now(),
            ttl,
        }
    }

    /// The instant this record becomes unreachable
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + self.ttl
    }

    /// Whether the TTL has lapsed
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id_is_eight_hex_chars() {
        let id = FileId::generate();
        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_access_code_is_six_digits() {
        for _ in 0..100 {
            let code = AccessCode::generate();
            assert_eq!(code.as_str().len(), 6);
            assert!(code.as_str().chars().all(|c| c.is_ascii_digit()));
            assert_ne!(&code.as_str()[..1], "0");
        }
    }

    #[test]
    fn test_generated_ids_differ() {
        let a = FileId::generate();
        let b = FileId::generate();
        assert_ne!(a, b);
    }
}
