//! Local filesystem storage implementation.
//!
//! Writes are atomic: content goes to a temporary sibling file which is then
//! renamed over the target.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{ApiJournal, NotifiedSet, PathsConfig, RunSummary};
use crate::storage::NotifiedStore;

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    store_path: PathBuf,
    summary_path: PathBuf,
    journal_path: PathBuf,
}

impl LocalStorage {
    /// The call journal defaults to `api_debug.json` next to the summary.
    pub fn new(store_path: impl Into<PathBuf>, summary_path: impl Into<PathBuf>) -> Self {
        let summary_path = summary_path.into();
        Self {
            store_path: store_path.into(),
            journal_path: summary_path.with_file_name("api_debug.json"),
            summary_path,
        }
    }

    pub fn with_journal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = path.into();
        self
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(&paths.store_file, &paths.summary_file).with_journal_path(&paths.journal_file)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
        Self::ensure_dir(path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        Self::write_bytes(path, &bytes)
            .await
            .map_err(|e| AppError::store(format!("write {}: {}", path.display(), e)))
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(path: &Path) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::store(format!("read {}: {}", path.display(), e))),
        }
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        match Self::read_bytes(path).await? {
            Some(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| AppError::store(format!("parse {}: {}", path.display(), e))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl NotifiedStore for LocalStorage {
    async fn load(&self) -> Result<NotifiedSet> {
        match Self::read_json(&self.store_path).await? {
            Some(set) => Ok(set),
            None => {
                log::info!("No notified set at {}, starting empty", self.store_path.display());
                Ok(NotifiedSet::new())
            }
        }
    }

    async fn save(&self, set: &NotifiedSet) -> Result<()> {
        Self::write_json(&self.store_path, set).await?;
        log::info!("Saved {} records to {}", set.len(), self.store_path.display());
        Ok(())
    }

    async fn save_summary(&self, summary: &RunSummary) -> Result<()> {
        Self::write_json(&self.summary_path, summary).await
    }

    async fn load_summary(&self) -> Result<Option<RunSummary>> {
        Self::read_json(&self.summary_path).await
    }

    async fn load_journal(&self) -> Result<ApiJournal> {
        Ok(Self::read_json(&self.journal_path).await?.unwrap_or_default())
    }

    async fn save_journal(&self, journal: &ApiJournal) -> Result<()> {
        Self::write_json(&self.journal_path, journal).await
    }

    fn location(&self) -> String {
        self.store_path.display().to_string()
    }
}
