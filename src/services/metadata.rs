// src/services/metadata.rs

//! Metadata enrichment service.
//!
//! Looks up a localized synopsis and poster for each title. Lookups never
//! fail an item: any miss, error or timeout leaves the catalog's own fields
//! in place.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::{ApiCall, CatalogItem, Config, EnrichedItem, MediaKind, MetadataConfig};
use crate::services::journal::{CallRecorder, masked_params};
use crate::utils::http::{body_excerpt, create_async_client};

/// Localized data found for a title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub external_id: Option<u64>,
    pub synopsis: Option<String>,
    pub poster_url: Option<String>,
}

/// Secondary metadata source.
#[async_trait]
pub trait MetadataLookup: Send + Sync {
    /// Look up a title. `Ok(None)` means no match.
    async fn lookup(&self, item: &CatalogItem) -> Result<Option<Metadata>>;
}

/// Lookup used when no metadata key is configured.
pub struct NoLookup;

#[async_trait]
impl MetadataLookup for NoLookup {
    async fn lookup(&self, _item: &CatalogItem) -> Result<Option<Metadata>> {
        Ok(None)
    }
}

/// TMDB API client.
pub struct TmdbClient {
    client: Client,
    base_url: String,
    image_base_url: String,
    language: String,
    api_key: String,
    recorder: CallRecorder,
}

#[derive(Debug, Deserialize)]
struct TmdbTitle {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    overview: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<TmdbTitle>,
}

impl TmdbClient {
    pub fn new(config: &MetadataConfig, client: Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            image_base_url: config.image_base_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            api_key: api_key.into(),
            recorder: CallRecorder::new(),
        }
    }

    /// Journal every call into `recorder`.
    pub fn with_recorder(mut self, recorder: CallRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    /// Build a lookup from configuration, or [`NoLookup`] when no key is set.
    pub fn lookup_from_config(
        config: &Config,
        recorder: CallRecorder,
    ) -> Result<Arc<dyn MetadataLookup>> {
        match config.credentials.metadata_api_key.as_deref() {
            Some(key) => {
                let client = create_async_client(&config.http, config.metadata.timeout_secs)?;
                let tmdb = Self::new(&config.metadata, client, key).with_recorder(recorder);
                Ok(Arc::new(tmdb))
            }
            None => {
                log::info!("No metadata API key configured, enrichment disabled");
                Ok(Arc::new(NoLookup))
            }
        }
    }

    async fn get<T>(&self, url: &str, params: &[(&str, String)]) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut query = vec![
            ("api_key", self.api_key.clone()),
            ("language", self.language.clone()),
        ];
        query.extend(params.iter().cloned());

        let mut call = ApiCall::new("metadata", url);
        call.params = masked_params(&query);
        let result = self.request(url, &query, &mut call).await;
        if let Err(e) = &result {
            call.error = Some(e.to_string());
        }
        self.recorder.record(call);
        result
    }

    async fn request<T>(
        &self,
        url: &str,
        query: &[(&str, String)],
        call: &mut ApiCall,
    ) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::fetch(url, e))?;

        let status = response.status();
        call.status_code = Some(status.as_u16());
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await.map_err(|e| AppError::fetch(url, e))?;
        call.response = Some(body_excerpt(&body));
        if !status.is_success() {
            return Err(AppError::fetch(
                url,
                format!("HTTP {}: {}", status, body_excerpt(&body)),
            ));
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| AppError::fetch(url, e))
    }

    async fn by_id(&self, kind: MediaKind, id: u64) -> Result<Option<Metadata>> {
        let url = format!("{}/{}/{}", self.base_url, kind.metadata_segment(), id);
        let title: Option<TmdbTitle> = self.get(&url, &[]).await?;
        Ok(title.map(|t| self.to_metadata(t)))
    }

    async fn search(&self, item: &CatalogItem) -> Result<Option<Metadata>> {
        let url = format!("{}/search/{}", self.base_url, item.media_kind.metadata_segment());
        let mut params = vec![("query", item.title.clone())];
        if let Some(year) = item.release_year {
            let key = match item.media_kind {
                MediaKind::Movie => "year",
                MediaKind::Series => "first_air_date_year",
            };
            params.push((key, year.to_string()));
        }

        let page: Option<SearchPage> = self.get(&url, &params).await?;
        Ok(page
            .and_then(|p| p.results.into_iter().next())
            .map(|t| self.to_metadata(t)))
    }

    fn to_metadata(&self, title: TmdbTitle) -> Metadata {
        Metadata {
            external_id: title.id,
            synopsis: title.overview.filter(|o| !o.trim().is_empty()),
            poster_url: title
                .poster_path
                .filter(|p| !p.trim().is_empty())
                .map(|p| format!("{}{}", self.image_base_url, p)),
        }
    }
}

#[async_trait]
impl MetadataLookup for TmdbClient {
    async fn lookup(&self, item: &CatalogItem) -> Result<Option<Metadata>> {
        if let Some(id) = item.known_external_id {
            match self.by_id(item.media_kind, id).await {
                Ok(Some(found)) => return Ok(Some(found)),
                Ok(None) => log::debug!("No metadata entry {} for {}, searching", id, item.title),
                Err(e) => log::debug!("Metadata lookup by id failed for {}: {}", item.title, e),
            }
        }
        self.search(item).await
    }
}

/// Enriches titles with bounded concurrency, preserving input order.
pub struct Enricher {
    lookup: Arc<dyn MetadataLookup>,
    timeout: Duration,
    max_concurrent: usize,
}

impl Enricher {
    pub fn new(lookup: Arc<dyn MetadataLookup>, timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            lookup,
            timeout,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn from_config(config: &MetadataConfig, lookup: Arc<dyn MetadataLookup>) -> Self {
        Self::new(
            lookup,
            Duration::from_secs(config.timeout_secs),
            config.max_concurrent,
        )
    }

    /// Enrich every item. Output order matches input order.
    pub async fn enrich_all(&self, items: Vec<CatalogItem>) -> Vec<EnrichedItem> {
        stream::iter(items)
            .map(|item| self.enrich(item))
            .buffered(self.max_concurrent)
            .collect()
            .await
    }

    /// Enrich one item; failures fall back to the catalog's own fields.
    pub async fn enrich(&self, item: CatalogItem) -> EnrichedItem {
        let found = match tokio::time::timeout(self.timeout, self.lookup.lookup(&item)).await {
            Ok(Ok(Some(found))) => Some(found),
            Ok(Ok(None)) => {
                log::debug!("No metadata match for {} ({})", item.title, item.identity);
                None
            }
            Ok(Err(e)) => {
                log::debug!("Metadata lookup failed for {}: {}", item.title, e);
                None
            }
            Err(_) => {
                log::debug!(
                    "Metadata lookup for {} timed out after {:?}",
                    item.title,
                    self.timeout
                );
                None
            }
        };

        let mut enriched = EnrichedItem::bare(item);
        if let Some(found) = found {
            enriched.localized_synopsis = found.synopsis;
            enriched.poster_url = found.poster_url;
            enriched.external_id = found.external_id;
        }
        enriched
    }
}
