//! AWS S3 storage implementation.
//!
//! Keys live under a prefix:
//! - `{prefix}/sent_ids.json`: the notified set
//! - `{prefix}/last_run.json`: the last run summary
//! - `{prefix}/api_debug.json`: the provider call journal
//! - `{prefix}/config.toml`: optional configuration, read by the Lambda loader

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::{AppError, Result};
use crate::models::{ApiJournal, NotifiedSet, RunSummary};
use crate::storage::NotifiedStore;

const STORE_KEY: &str = "sent_ids.json";
const SUMMARY_KEY: &str = "last_run.json";
const JOURNAL_KEY: &str = "api_debug.json";

/// S3-based notified-set storage.
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    /// Create a new S3 storage instance.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Create S3 storage from environment configuration.
    pub async fn from_env() -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&config);

        let bucket =
            std::env::var("S3_BUCKET").unwrap_or_else(|_| "catalog-notifier".to_string());
        let prefix = std::env::var("S3_PREFIX").unwrap_or_else(|_| "notifier".to_string());

        Ok(Self::new(client, bucket, prefix))
    }

    /// Full object key for a file name under the prefix.
    pub fn key(&self, name: &str) -> String {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        }
    }

    /// Read an object, returning None if it doesn't exist.
    pub async fn read_bytes_optional(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| AppError::store(format!("read s3://{}/{}: {}", self.bucket, key, e)))?;
                Ok(Some(bytes.into_bytes().to_vec()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    log::info!("No existing data at s3://{}/{}", self.bucket, key);
                    Ok(None)
                } else {
                    Err(AppError::store(format!(
                        "read s3://{}/{}: {}",
                        self.bucket, key, service_err
                    )))
                }
            }
        }
    }

    async fn write_json<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(json))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| AppError::store(format!("write s3://{}/{}: {}", self.bucket, key, e)))?;
        Ok(())
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes_optional(key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| AppError::store(format!("parse s3://{}/{}: {}", self.bucket, key, e))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl NotifiedStore for S3Storage {
    async fn load(&self) -> Result<NotifiedSet> {
        Ok(self.read_json(&self.key(STORE_KEY)).await?.unwrap_or_default())
    }

    async fn save(&self, set: &NotifiedSet) -> Result<()> {
        let key = self.key(STORE_KEY);
        self.write_json(&key, set).await?;
        log::info!("Wrote {} records to s3://{}/{}", set.len(), self.bucket, key);
        Ok(())
    }

    async fn save_summary(&self, summary: &RunSummary) -> Result<()> {
        self.write_json(&self.key(SUMMARY_KEY), summary).await
    }

    async fn load_summary(&self) -> Result<Option<RunSummary>> {
        self.read_json(&self.key(SUMMARY_KEY)).await
    }

    async fn load_journal(&self) -> Result<ApiJournal> {
        Ok(self.read_json(&self.key(JOURNAL_KEY)).await?.unwrap_or_default())
    }

    async fn save_journal(&self, journal: &ApiJournal) -> Result<()> {
        self.write_json(&self.key(JOURNAL_KEY), journal).await
    }

    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key(STORE_KEY))
    }
}
