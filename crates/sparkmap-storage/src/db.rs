//! RocksDB wrapper for Sparkmap storage.
//!
//! Provides:
//! - Database open/close with column family setup
//! - Single-key, prefix and time-range reads
//! - JSON record helpers
//! - Atomic multi-key writes
//! - A write lock serializing read-modify-write sequences

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::column_families::build_cf_descriptors;
use crate::error::StorageError;

/// Main storage interface for Sparkmap
pub struct Storage {
    db: DB,
    /// Serializes read-modify-write sequences issued through `locked`
    write_lock: Mutex<()>,
}

/// A set of writes applied atomically by [`Storage::commit`].
#[derive(Debug, Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

#[derive(Debug)]
enum BatchOp {
    Put {
        cf: &'static str,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        cf: &'static str,
        key: Vec<u8>,
    },
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw put.
    pub fn put(&mut self, cf: &'static str, key: impl AsRef<[u8]>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            cf,
            key: key.as_ref().to_vec(),
            value: value.into(),
        });
    }

    /// Queue a JSON-encoded put.
    pub fn put_json<T: Serialize>(
        &mut self,
        cf: &'static str,
        key: impl AsRef<[u8]>,
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value)?;
        self.put(cf, key, bytes);
        Ok(())
    }

    /// Queue a delete.
    pub fn delete(&mut self, cf: &'static str, key: impl AsRef<[u8]>) {
        self.ops.push(BatchOp::Delete {
            cf,
            key: key.as_ref().to_vec(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, cf_name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(cf_name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(cf_name.to_string()))
    }

    /// Run `f` while holding the storage write lock.
    ///
    /// Every read-modify-write sequence (weight or strength increments,
    /// usage counters, upserts keyed by name) must go through here so two
    /// concurrent callers cannot both read the old value.
    pub fn locked<R, E>(&self, f: impl FnOnce(&Storage) -> Result<R, E>) -> Result<R, E> {
        let _guard: MutexGuard<'_, ()> = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(self)
    }

    /// Put a value in a column family.
    pub fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key, value)?;
        Ok(())
    }

    /// Get a value from a column family.
    pub fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(cf_name)?;
        let result = self.db.get_cf(cf, key)?;
        Ok(result)
    }

    /// Delete a value from a column family.
    pub fn delete(&self, cf_name: &str, key: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(cf_name)?;
        self.db.delete_cf(cf, key)?;
        Ok(())
    }

    /// Serialize and store a record.
    pub fn put_json<T: Serialize>(
        &self,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(value)?;
        self.put(cf_name, key, &bytes)
    }

    /// Load and deserialize a record.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>, StorageError> {
        match self.get(cf_name, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Read a UTF-8 value, as stored by the name indexes.
    pub fn get_string(&self, cf_name: &str, key: &[u8]) -> Result<Option<String>, StorageError> {
        match self.get(cf_name, key)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Apply a batch of writes atomically.
    pub fn commit(&self, batch: Batch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }

        let count = batch.len();
        let mut write_batch = WriteBatch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put { cf, key, value } => {
                    write_batch.put_cf(self.cf(cf)?, key, value);
                }
                BatchOp::Delete { cf, key } => {
                    write_batch.delete_cf(self.cf(cf)?, key);
                }
            }
        }
        self.db.write(write_batch)?;
        debug!(ops = count, "Committed batch");
        Ok(())
    }

    /// Iterate over entries with a key prefix.
    pub fn prefix_iterator(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let cf = self.cf(cf_name)?;

        let mut results = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            // Stop if we've passed the prefix
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }

        Ok(results)
    }

    /// Deserialize every record under a key prefix.
    pub fn prefix_json<T: DeserializeOwned>(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<T>, StorageError> {
        self.prefix_iterator(cf_name, prefix)?
            .into_iter()
            .map(|(_, value)| serde_json::from_slice(&value).map_err(StorageError::from))
            .collect()
    }

    /// Entries with `start <= key < end`, in key order.
    pub fn range(
        &self,
        cf_name: &str,
        start: &[u8],
        end: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let cf = self.cf(cf_name)?;

        let mut results = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(start, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if key.as_ref() >= end {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }

        Ok(results)
    }

    /// Delete every entry under a key prefix. Returns the number deleted.
    pub fn delete_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<usize, StorageError> {
        let cf = self.cf(cf_name)?;
        let mut batch = WriteBatch::default();
        let mut count = 0;

        for (key, _) in self.prefix_iterator(cf_name, prefix)? {
            batch.delete_cf(cf, &key);
            count += 1;
        }

        if count > 0 {
            self.db.write(batch)?;
            debug!(cf = %cf_name, count, "Deleted prefix");
        }
        Ok(count)
    }

    /// Delete every entry in a column family. Returns the number deleted.
    pub fn clear_cf(&self, cf_name: &str) -> Result<usize, StorageError> {
        self.delete_prefix(cf_name, b"")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_families::{ALL_CF_NAMES, CF_CONCEPT_NODES, CF_TAG_HISTORY};
    use crate::keys::TimeKey;
    use serde::Deserialize;
    use tempfile::TempDir;

    fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u32,
    }

    #[test]
    fn test_open_creates_column_families() {
        let (storage, _temp) = create_test_storage();
        for cf_name in ALL_CF_NAMES {
            assert!(
                storage.db.cf_handle(cf_name).is_some(),
                "CF {} should exist",
                cf_name
            );
        }
    }

    #[test]
    fn test_unknown_column_family() {
        let (storage, _temp) = create_test_storage();
        let result = storage.get("nope", b"k");
        assert!(matches!(result, Err(StorageError::ColumnFamilyNotFound(_))));
    }

    #[test]
    fn test_json_roundtrip() {
        let (storage, _temp) = create_test_storage();
        storage
            .put_json(CF_CONCEPT_NODES, b"node:1", &Counter { value: 7 })
            .unwrap();
        let loaded: Option<Counter> = storage.get_json(CF_CONCEPT_NODES, b"node:1").unwrap();
        assert_eq!(loaded, Some(Counter { value: 7 }));
        let missing: Option<Counter> = storage.get_json(CF_CONCEPT_NODES, b"node:2").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_batch_commit_is_applied() {
        let (storage, _temp) = create_test_storage();
        storage.put(CF_CONCEPT_NODES, b"name:old", b"x").unwrap();

        let mut batch = Batch::new();
        batch.put(CF_CONCEPT_NODES, b"name:new", b"1".to_vec());
        batch.delete(CF_CONCEPT_NODES, b"name:old");
        assert_eq!(batch.len(), 2);
        storage.commit(batch).unwrap();

        assert_eq!(
            storage.get_string(CF_CONCEPT_NODES, b"name:new").unwrap(),
            Some("1".to_string())
        );
        assert!(storage.get(CF_CONCEPT_NODES, b"name:old").unwrap().is_none());
    }

    #[test]
    fn test_prefix_iterator_stops_at_prefix() {
        let (storage, _temp) = create_test_storage();
        storage.put(CF_CONCEPT_NODES, b"node:a", b"1").unwrap();
        storage.put(CF_CONCEPT_NODES, b"node:b", b"2").unwrap();
        storage.put(CF_CONCEPT_NODES, b"name:a", b"a").unwrap();

        let nodes = storage.prefix_iterator(CF_CONCEPT_NODES, b"node:").unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_range_is_half_open() {
        let (storage, _temp) = create_test_storage();
        for ts in [100, 200, 300] {
            let key = TimeKey::new(TimeKey::HISTORY, ts, format!("id{}", ts));
            storage.put(CF_TAG_HISTORY, &key.to_bytes(), b"{}").unwrap();
        }

        let hits = storage
            .range(
                CF_TAG_HISTORY,
                &TimeKey::range_start(TimeKey::HISTORY, 100),
                &TimeKey::range_end(TimeKey::HISTORY, 300),
            )
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_locked_read_modify_write() {
        let (storage, _temp) = create_test_storage();
        storage
            .put_json(CF_CONCEPT_NODES, b"c", &Counter { value: 0 })
            .unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        storage
                            .locked(|s| {
                                let mut counter: Counter =
                                    s.get_json(CF_CONCEPT_NODES, b"c")?.unwrap();
                                counter.value += 1;
                                s.put_json(CF_CONCEPT_NODES, b"c", &counter)
                            })
                            .unwrap();
                    }
                });
            }
        });

        let counter: Counter = storage.get_json(CF_CONCEPT_NODES, b"c").unwrap().unwrap();
        assert_eq!(counter.value, 100);
    }

    #[test]
    fn test_clear_cf() {
        let (storage, _temp) = create_test_storage();
        storage.put(CF_CONCEPT_NODES, b"node:a", b"1").unwrap();
        storage.put(CF_CONCEPT_NODES, b"name:a", b"a").unwrap();

        assert_eq!(storage.clear_cf(CF_CONCEPT_NODES).unwrap(), 2);
        assert!(storage.get(CF_CONCEPT_NODES, b"node:a").unwrap().is_none());
        assert!(storage.get(CF_CONCEPT_NODES, b"name:a").unwrap().is_none());
    }
}
