//! Key material for encrypted file artifacts
//!
//! Every upload gets a fresh random secret, salt, and IV. The cipher
//! key is never stored; it is re-derived from `(secret, salt)` with
//! scrypt whenever the artifact is opened.

use crate::{CryptoError, Result};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a derived cipher key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of a CBC initialization vector in bytes (128 bits)
pub const IV_SIZE: usize = 16;

/// Size of a key-derivation salt in bytes
pub const SALT_SIZE: usize = 16;

/// Size of a per-file secret in bytes
pub const SECRET_SIZE: usize = 32;

/// The random secret owned by a single file record
///
/// This is the password fed to the KDF. It never leaves the record
/// that owns it and is wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FileSecret {
    bytes: [u8; SECRET_SIZE],
}

impl FileSecret {
    /// Generate a new random secret
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SECRET_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "file secret must be {} bytes, got {}",
                SECRET_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; SECRET_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the secret bytes
    pub fn as_bytes(&self) -> &[u8; SECRET_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for FileSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FileSecret([REDACTED])")
    }
}

/// A key-derivation salt, generated fresh per file record
#[derive(Clone, PartialEq, Eq)]
pub struct Salt {
    bytes: [u8; SALT_SIZE],
}

impl Salt {
    /// Generate a new random salt
    pub fn generate() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SALT_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "salt must be {} bytes, got {}",
                SALT_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; SALT_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the salt bytes
    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Salt({})", hex::encode(self.bytes))
    }
}

/// A CBC initialization vector, generated fresh per upload
#[derive(Clone, PartialEq, Eq)]
pub struct Iv {
    bytes: [u8; IV_SIZE],
}

impl Iv {
    /// Generate a new random IV
    pub fn generate() -> Self {
        let mut bytes = [0u8; IV_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != IV_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "iv must be {} bytes, got {}",
                IV_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; IV_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the IV bytes
    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for Iv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Iv({})", hex::encode(self.bytes))
    }
}

/// A derived symmetric cipher key, wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    bytes: [u8; KEY_SIZE],
}

impl CipherKey {
    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CipherKey([REDACTED])")
    }
}

/// scrypt cost parameters for key derivation
///
/// Defaults match scrypt's interactive baseline: N = 2^14, r = 8,
/// p = 1. Tests use cheaper parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// log2 of the scrypt work factor N
    pub log_n: u8,
    /// Block size parameter r
    pub r: u32,
    /// Parallelization parameter p
    pub p: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            log_n: 14,
            r: 8,
            p: 1,
        }
    }
}

/// Derive the cipher key for a file from its secret and salt
///
/// Deterministic: the same `(secret, salt, params)` always yields the
/// same key, which is how decryption recovers the key without it ever
/// being stored.
pub fn derive_key(secret: &FileSecret, salt: &Salt, params: &KdfParams) -> Result<CipherKey> {
    let scrypt_params = scrypt::Params::new(params.log_n, params.r, params.p, KEY_SIZE)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let mut bytes = [0u8; KEY_SIZE];
    scrypt::scrypt(
        secret.as_bytes(),
        salt.as_bytes(),
        &scrypt_params,
        &mut bytes,
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(CipherKey { bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap_kdf() -> KdfParams {
        KdfParams { log_n: 4, r: 8, p: 1 }
    }

    #[test]
    fn test_secret_generation_is_random() {
        let a = FileSecret::generate();
        let b = FileSecret::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        assert!(FileSecret::from_bytes(&[0u8; 16]).is_err());
        assert!(Salt::from_bytes(&[0u8; 32]).is_err());
        assert!(Iv::from_bytes(&[0u8; 12]).is_err());
    }

    #[test]
    fn test_derive_key_is_deterministic() {
        let secret = FileSecret::generate();
        let salt = Salt::generate();
        let k1 = derive_key(&secret, &salt, &cheap_kdf()).unwrap();
        let k2 = derive_key(&secret, &salt, &cheap_kdf()).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_derive_key_depends_on_salt() {
        let secret = FileSecret::generate();
        let k1 = derive_key(&secret, &Salt::generate(), &cheap_kdf()).unwrap();
        let k2 = derive_key(&secret, &Salt::generate(), &cheap_kdf()).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_derive_key_rejects_invalid_params() {
        let secret = FileSecret::generate();
        let salt = Salt::generate();
        let bad = KdfParams { log_n: 4, r: 0, p: 1 };
        assert!(matches!(
            derive_key(&secret, &salt, &bad),
            Err(CryptoError::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = FileSecret::generate();
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains(&hex::encode(secret.as_bytes())));
    }
}
