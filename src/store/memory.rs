//! In-memory store
//!
//! `BTreeMap` behind a `RwLock`. Useful for embedding the resolver without
//! table files and for tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::StoreResult;

use super::{Deadline, IndicatorRecord, Store};

/// Indicator store held entirely in memory
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, IndicatorRecord>>,
    /// Set by writes, cleared by `refresh()`
    dirty: AtomicBool,
    lookups: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store holding `records` (last one wins per value)
    pub fn with_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = IndicatorRecord>,
    {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Insert or replace the record for `record.value`
    pub fn insert(&self, record: IndicatorRecord) -> Option<IndicatorRecord> {
        let previous = self.records.write().insert(record.value.clone(), record);
        self.dirty.store(true, Ordering::SeqCst);
        previous
    }

    pub fn remove(&self, value: &str) -> Option<IndicatorRecord> {
        let removed = self.records.write().remove(value);
        if removed.is_some() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Point lookups served so far
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl Store for MemoryStore {
    type Keys = std::vec::IntoIter<StoreResult<String>>;

    fn point_lookup(&self, key: &str, deadline: Deadline) -> StoreResult<Option<IndicatorRecord>> {
        deadline.check()?;
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.records.read().get(key).cloned())
    }

    /// Snapshot of the keys at call time
    fn enumerate_keys(&self, deadline: Deadline) -> StoreResult<Self::Keys> {
        deadline.check()?;
        let keys: Vec<_> = self.records.read().keys().cloned().map(Ok).collect();
        Ok(keys.into_iter())
    }

    fn refresh(&self) -> StoreResult<bool> {
        Ok(self.dirty.swap(false, Ordering::SeqCst))
    }
}
