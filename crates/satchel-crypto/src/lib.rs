//! # Satchel Crypto
//!
//! Cryptographic core for Satchel one-time file handoff.
//!
//! This crate provides:
//! - **Key material**: per-file random secrets, salts, and IVs, with
//!   secrets zeroized on drop
//! - **Key derivation**: scrypt over `(secret, salt)`, so brute-forcing
//!   a leaked ciphertext stays expensive
//! - **CipherCodec**: streaming AES-256-CBC encryption of plaintext
//!   into scratch artifacts and back
//!
//! ## Security Model
//!
//! Every upload gets fresh random material; nothing is shared between
//! records. The derived cipher key is never stored - decryption
//! re-derives it from the record's own secret and salt. A record that
//! leaks its ciphertext and IV without its secret reveals nothing.

pub mod codec;
pub mod error;
pub mod keys;

pub use codec::{CipherCodec, SealedArtifact, BLOCK_SIZE};
pub use error::{CryptoError, Result};
pub use keys::{
    derive_key, CipherKey, FileSecret, Iv, KdfParams, Salt, IV_SIZE, KEY_SIZE, SALT_SIZE,
    SECRET_SIZE,
};
