//! JSON file queue store

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use super::{parse_records, QueueStore, QUEUE_STORAGE_KEY};
use crate::error::Result;
use crate::models::QueueItem;

/// Persists the queue as `<dir>/offline_queue.json`.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileQueueStore {
    path: PathBuf,
}

impl JsonFileQueueStore {
    /// Store the queue inside `dir` under the fixed file name
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{QUEUE_STORAGE_KEY}.json")),
        }
    }

    /// Store the queue at an explicit file path
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl QueueStore for JsonFileQueueStore {
    async fn load(&self) -> Result<Vec<Value>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => parse_records(&raw),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(error.into()),
        }
    }

    async fn save(&self, items: &[QueueItem]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let payload = serde_json::to_vec(items)?;
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, payload).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
