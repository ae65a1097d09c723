//! # Satchel Core
//!
//! Ephemeral encrypted transfer core: upload a file, get a one-time
//! token (opaque file id plus a 6-digit access code), and exactly one
//! fetch gets the plaintext back before the token expires or is
//! consumed.
//!
//! This crate provides:
//! - **TokenStore**: concurrent TTL-expiring registry keyed by file id
//!   and by access code
//! - **TransferController**: upload/fetch orchestration owning the
//!   deliver-at-most-once guarantee
//! - **FileRecord / Token**: the data model tying tokens to encrypted
//!   artifacts
//!
//! Nothing persists across restarts: ciphertext lives on scratch
//! storage for a record's lifetime only, and a restart discards all
//! live tokens. HTTP transport, admission checks, and rate limiting
//! belong to the embedding layer.

pub mod config;
pub mod controller;
pub mod error;
pub mod record;
pub mod store;

pub use config::CoreConfig;
pub use controller::{Delivery, TransferController};
pub use error::{Result, TransferError};
pub use record::{AccessCode, FileId, FileRecord, Token};
pub use store::TokenStore;
