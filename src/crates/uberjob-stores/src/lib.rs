//! # uberjob-stores - Value Persistence for Plan Execution
//!
//! **Trait-based value store abstractions and reference implementations** for
//! binding plan nodes to persistent, externally timestamped locations. A store is
//! the unit of reuse in uberjob: a later run reads a fresh stored value back
//! instead of recomputing the node that produced it.
//!
//! ## Core Concepts
//!
//! ### 1. ValueStore Trait
//!
//! The [`ValueStore`] trait defines the interface the execution engine consumes.
//! Implementors provide:
//!
//! - **`read()`** - Materialize the stored value
//! - **`write()`** - Persist a value
//! - **`get_modified_time()`** - Timestamp driving staleness analysis
//!   (`None` means "absent")
//!
//! ### 2. Reference Implementations
//!
//! - [`InMemoryStore`] - Thread-safe slot for tests and prototyping, with
//!   read/write counters and a pinnable modified time
//! - [`JsonFileStore`] - JSON document at a filesystem path
//! - [`PathSource`] - Read-only source whose value is the path itself
//! - [`TouchFileStore`] - Empty marker file, only its mtime carries meaning
//!
//! For production backends (object storage, databases), implement [`ValueStore`]
//! against your own system; the engine only ever sees the three trait methods.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use uberjob_stores::{JsonFileStore, ValueStore};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = JsonFileStore::new("out/result.json");
//!     store.write(&json!({"total": 12})).await?;
//!     let value = store.read().await?;
//!     println!("modified: {:?}", store.get_modified_time().await?);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{Result, StoreError};
pub use fs::{JsonFileStore, PathSource, TouchFileStore};
pub use memory::InMemoryStore;
pub use traits::ValueStore;
