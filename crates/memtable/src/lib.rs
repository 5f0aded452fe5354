//! # Memtable - bounded in-memory write buffer
//!
//! Holds the latest [`Record`] for every key written since the last flush.
//! The table is bounded by a number of accepted mutations: once `capacity`
//! puts/deletes have been accepted it reports [`MemtableError::Full`] instead
//! of growing, and the caller is expected to flush it to a sorted run and
//! start a fresh one.
//!
//! Every accepted mutation occupies one unit, including a put that
//! overwrites an existing key and a delete. Deletes are gated on capacity the
//! same way puts are.
//!
//! The table is safe to share between threads: reads take a shared lock,
//! mutations take the exclusive lock. The occupancy counter lives under the
//! same lock as the map so `size()` never observes a half-applied mutation.

use parking_lot::RwLock;
use record::Record;
use std::collections::BTreeMap;

use thiserror::Error;

/// Errors returned by mutating operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemtableError {
    /// The table has already accepted `capacity` mutations.
    #[error("memtable is full ({capacity} mutations)")]
    Full { capacity: usize },
}

#[derive(Debug, Default)]
struct Inner {
    map: BTreeMap<Vec<u8>, Record>,
    /// Accepted mutations, not distinct keys.
    occupancy: usize,
}

#[derive(Debug)]
pub struct Memtable {
    inner: RwLock<Inner>,
    capacity: usize,
}

impl Memtable {
    /// Creates an empty table that accepts up to `capacity` mutations.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity,
        }
    }

    /// Stores `value` under `key`, stamped with the current time.
    ///
    /// Fails without mutating anything if the table is already full.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), MemtableError> {
        self.apply(Record::put(key, value))
    }

    /// Writes a tombstone for `key`.
    ///
    /// The tombstone occupies one unit of capacity and is refused when the
    /// table is full, exactly like a put.
    pub fn delete(&self, key: Vec<u8>) -> Result<(), MemtableError> {
        self.apply(Record::tombstone(key))
    }

    /// Inserts an already built record, replacing any previous record for
    /// the same key.
    ///
    /// Used by the engine after the record has been logged, and by WAL
    /// replay.
    pub fn apply(&self, record: Record) -> Result<(), MemtableError> {
        let mut inner = self.inner.write();
        if inner.occupancy >= self.capacity {
            return Err(MemtableError::Full {
                capacity: self.capacity,
            });
        }

        inner.map.insert(record.key().to_vec(), record);
        inner.occupancy += 1;
        Ok(())
    }

    /// Returns the latest value for `key`, or `None` if the key was never
    /// written or its latest record is a tombstone.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.inner
            .read()
            .map
            .get(key)
            .filter(|r| !r.is_tombstone())
            .map(|r| r.value().to_vec())
    }

    /// Returns the latest record for `key`, tombstones included.
    pub fn get_record(&self, key: &[u8]) -> Option<Record> {
        self.inner.read().map.get(key).cloned()
    }

    /// Copies out the full contents, tombstones included, in key order.
    ///
    /// The table itself is left untouched.
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, Record> {
        self.inner.read().map.clone()
    }

    /// Number of mutations accepted so far.
    pub fn size(&self) -> usize {
        self.inner.read().occupancy
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `true` once `size() >= capacity()`; the next mutation will be refused.
    pub fn is_full(&self) -> bool {
        self.size() >= self.capacity
    }

    /// Number of distinct keys held (tombstones included).
    pub fn len(&self) -> usize {
        self.inner.read().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().map.is_empty()
    }
}
