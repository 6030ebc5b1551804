//! File-backed value stores
//!
//! Three stores that persist through the local filesystem, all deriving their
//! modified time from file metadata:
//!
//! - [`JsonFileStore`] - a JSON document at a path; the workhorse store
//! - [`PathSource`] - a read-only store whose value *is* the path, used to pull
//!   an existing file into a plan as a dependent source
//! - [`TouchFileStore`] - an empty marker file whose only payload is its mtime,
//!   used for barrier-style dependencies and the fresh-file convention

use crate::error::{Result, StoreError};
use crate::traits::ValueStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

async fn file_modified_time(path: &Path) -> Result<Option<DateTime<Utc>>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(DateTime::<Utc>::from(meta.modified()?))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// A JSON document at a filesystem path.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ValueStore for JsonFileStore {
    async fn read(&self) -> Result<Value> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::Missing(self.path.display().to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn write(&self, value: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(value)?;
        tokio::fs::write(&self.path, bytes).await?;
        tracing::debug!(path = %self.path.display(), "wrote json value");
        Ok(())
    }

    async fn get_modified_time(&self) -> Result<Option<DateTime<Utc>>> {
        file_modified_time(&self.path).await
    }
}

/// A read-only store over an existing file whose value is the path itself.
///
/// Reading yields the path as a string; consumers open the file themselves.
/// Writing is rejected, so a `PathSource` can only back sourced nodes.
#[derive(Debug, Clone)]
pub struct PathSource {
    path: PathBuf,
}

impl PathSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ValueStore for PathSource {
    async fn read(&self) -> Result<Value> {
        Ok(Value::String(self.path.display().to_string()))
    }

    async fn write(&self, _value: &Value) -> Result<()> {
        Err(StoreError::Unsupported(format!(
            "path source {} is read-only",
            self.path.display()
        )))
    }

    async fn get_modified_time(&self) -> Result<Option<DateTime<Utc>>> {
        file_modified_time(&self.path).await
    }
}

/// An empty marker file; the stored "value" is null and only the mtime matters.
#[derive(Debug, Clone)]
pub struct TouchFileStore {
    path: PathBuf,
}

impl TouchFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ValueStore for TouchFileStore {
    async fn read(&self) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn write(&self, _value: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, b"").await?;
        Ok(())
    }

    async fn get_modified_time(&self) -> Result<Option<DateTime<Utc>>> {
        file_modified_time(&self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn json_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("x.json"));

        assert_eq!(store.get_modified_time().await.unwrap(), None);
        assert!(matches!(store.read().await, Err(StoreError::Missing(_))));

        store.write(&json!([1, 2, 3])).await.unwrap();
        assert_eq!(store.read().await.unwrap(), json!([1, 2, 3]));
        assert!(store.get_modified_time().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn json_store_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("a/b/x.json"));
        store.write(&json!(1)).await.unwrap();
        assert_eq!(store.read().await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn path_source_yields_the_path_and_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("input.csv");
        tokio::fs::write(&file, b"a,b\n").await.unwrap();

        let source = PathSource::new(&file);
        assert_eq!(
            source.read().await.unwrap(),
            Value::String(file.display().to_string())
        );
        assert!(source.get_modified_time().await.unwrap().is_some());
        assert!(matches!(
            source.write(&json!(1)).await,
            Err(StoreError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn touch_store_tracks_only_the_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let store = TouchFileStore::new(dir.path().join("done"));

        assert_eq!(store.get_modified_time().await.unwrap(), None);
        store.write(&Value::Null).await.unwrap();
        assert!(store.get_modified_time().await.unwrap().is_some());
        assert_eq!(store.read().await.unwrap(), Value::Null);
    }
}
