//! In-memory value store for development and testing
//!
//! [`InMemoryStore`] is the reference implementation of [`ValueStore`]: a single
//! thread-safe slot holding a value and its modified time. Nothing survives the
//! process, which makes it ideal for unit tests and prototyping.
//!
//! The store counts its `read` and `write` invocations and allows the modified
//! time to be pinned explicitly, so tests can assert scheduling decisions
//! ("the second run performed zero writes") and construct precise staleness
//! orderings without sleeping.

use crate::error::{Result, StoreError};
use crate::traits::ValueStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A thread-safe single-slot store with no persistence.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    slot: Arc<Mutex<Option<(Value, DateTime<Utc>)>>>,
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `value` with the given modified time.
    pub fn with_value(value: Value, modified: DateTime<Utc>) -> Self {
        let store = Self::new();
        *store.slot.lock() = Some((value, modified));
        store
    }

    /// Number of `read` calls observed so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `write` calls observed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Pin the modified time of the currently stored value.
    ///
    /// Has no effect when the store is empty.
    pub fn set_modified_time(&self, modified: DateTime<Utc>) {
        if let Some((_, stamp)) = self.slot.lock().as_mut() {
            *stamp = modified;
        }
    }

    /// Drop the stored value, returning the store to its empty state.
    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}

#[async_trait]
impl ValueStore for InMemoryStore {
    async fn read(&self) -> Result<Value> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        match self.slot.lock().as_ref() {
            Some((value, _)) => Ok(value.clone()),
            None => Err(StoreError::Missing("in-memory store".to_string())),
        }
    }

    async fn write(&self, value: &Value) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.slot.lock() = Some((value.clone(), Utc::now()));
        Ok(())
    }

    async fn get_modified_time(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.slot.lock().as_ref().map(|(_, stamp)| *stamp))
    }
}
