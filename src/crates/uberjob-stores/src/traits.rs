//! Extensible value store trait for custom backend implementations
//!
//! This module defines the **[`ValueStore`]** trait - the abstraction the execution
//! engine uses for every persistent, externally timestamped location a plan node can
//! be bound to. The trait enables downstream projects to back plan nodes with any
//! storage system (local files, object stores, databases) while keeping the engine
//! itself storage-agnostic.
//!
//! # Overview
//!
//! A value store is a single slot with three capabilities:
//!
//! - **`read()`** - Materialize the stored value
//! - **`write(value)`** - Persist a value into the slot
//! - **`get_modified_time()`** - Report when the slot last changed, or `None` when
//!   no stored value exists
//!
//! The modified time is what drives staleness analysis: a stored value is reused on a
//! later run exactly when it exists and no dependency ancestor's stored value is newer.
//!
//! # Round-trip contract
//!
//! A `write` followed by a `read` on the same store must round-trip the value through
//! whatever serialization the store uses. The engine deliberately routes every
//! consumer of a stored node through `read`, so lossy serialization effects are
//! observed consistently whether the value was freshly computed or reused from a
//! previous run. Implementations must not cache the in-memory value to "improve" on
//! this.
//!
//! # Concurrency
//!
//! Stores may be invoked from any worker. Different stores may be invoked
//! concurrently; a single store only sees `write` strictly before the `read` that
//! observes it, because the engine sequences the two with a dependency edge.
//!
//! # Implementing a custom backend
//!
//! ```rust,ignore
//! use async_trait::async_trait;
//! use chrono::{DateTime, Utc};
//! use serde_json::Value;
//! use uberjob_stores::{Result, ValueStore};
//!
//! #[derive(Debug)]
//! struct BlobStore {
//!     bucket: String,
//!     key: String,
//! }
//!
//! #[async_trait]
//! impl ValueStore for BlobStore {
//!     async fn read(&self) -> Result<Value> {
//!         let bytes = fetch_blob(&self.bucket, &self.key).await?;
//!         Ok(serde_json::from_slice(&bytes)?)
//!     }
//!
//!     async fn write(&self, value: &Value) -> Result<()> {
//!         put_blob(&self.bucket, &self.key, serde_json::to_vec(value)?).await
//!     }
//!
//!     async fn get_modified_time(&self) -> Result<Option<DateTime<Utc>>> {
//!         blob_mtime(&self.bucket, &self.key).await
//!     }
//! }
//! ```

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;

/// A persistent, externally timestamped location for a single value.
///
/// See the module documentation for the full contract.
#[async_trait]
pub trait ValueStore: fmt::Debug + Send + Sync {
    /// Materialize the stored value.
    ///
    /// Fails with [`StoreError::Missing`](crate::StoreError::Missing) when no value
    /// has been stored.
    async fn read(&self) -> Result<Value>;

    /// Persist a value into the store.
    async fn write(&self, value: &Value) -> Result<()>;

    /// Report when the stored value last changed.
    ///
    /// `Ok(None)` means "no stored value exists" and is not an error.
    async fn get_modified_time(&self) -> Result<Option<DateTime<Utc>>>;
}
