//! Storage layer for the Sparkmap engine.
//!
//! Provides RocksDB-backed storage with:
//! - One column family per record kind
//! - Time-prefixed keys for usage history and sparks
//! - JSON-encoded values
//! - Atomic multi-key writes via WriteBatch
//! - A write lock for read-modify-write updates (weight and strength increments)

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{Batch, Storage};
pub use error::StorageError;
pub use keys::TimeKey;
