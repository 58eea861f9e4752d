//! Application configuration structures.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::mask_secret;

/// Hard limit of cards per webhook message on the target platform.
pub const MAX_CARDS_PER_MESSAGE: usize = 10;

/// Hard limit on the summed text of all cards in one webhook message.
pub const MAX_EMBED_CHARS_PER_MESSAGE: usize = 6000;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Primary catalog provider settings
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Secondary metadata provider settings
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Webhook delivery and card layout
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Deep link templates
    #[serde(default)]
    pub links: LinkConfig,

    /// Regions and lookback window
    #[serde(default)]
    pub run: RunConfig,

    /// Persisted state locations
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub http: HttpConfig,

    /// API keys and webhook endpoint, normally supplied through the environment
    #[serde(default)]
    pub credentials: Credentials,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_process_env(&mut self) {
        self.apply_env(|key| std::env::var(key).ok());
    }

    /// Apply environment-style overrides from a lookup function.
    ///
    /// Blank values are ignored. Unparseable numbers and enum labels are
    /// logged and leave the existing value in place.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = get(env::CATALOG_KEY) {
            self.credentials.catalog_api_key = Some(key);
        }
        if let Some(key) = get(env::METADATA_KEY) {
            self.credentials.metadata_api_key = Some(key);
        }
        if let Some(url) = get(env::WEBHOOK) {
            self.credentials.webhook_url = Some(url);
        }
        if let Some(list) = get(env::REGIONS) {
            self.run.regions = parse_region_list(&list);
        }
        if let Some(days) = get(env::LOOKBACK_DAYS) {
            match days.parse::<u32>() {
                Ok(days) => self.run.lookback_days = days,
                Err(e) => log::warn!("Ignoring {}='{}': {}", env::LOOKBACK_DAYS, days, e),
            }
        }
        if let Some(shape) = get(env::PROVIDER) {
            match ProviderShape::from_label(&shape) {
                Some(shape) => self.catalog.provider = shape,
                None => log::warn!("Ignoring unknown {}='{}'", env::PROVIDER, shape),
            }
        }
        if let Some(policy) = get(env::MISSING_AVAILABILITY) {
            match MissingAvailabilityPolicy::from_label(&policy) {
                Some(policy) => self.catalog.missing_availability = policy,
                None => log::warn!(
                    "Ignoring unknown {}='{}'",
                    env::MISSING_AVAILABILITY,
                    policy
                ),
            }
        }
        if let Some(path) = get(env::STORE_PATH) {
            self.paths.store_file = PathBuf::from(path);
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.run.regions.is_empty() {
            return Err(AppError::validation("run.regions is empty"));
        }
        if self.run.lookback_days == 0 {
            return Err(AppError::validation("run.lookback_days must be > 0"));
        }
        if self.catalog.page_size == 0 {
            return Err(AppError::validation("catalog.page_size must be > 0"));
        }
        if self.catalog.timeout_secs == 0 {
            return Err(AppError::validation("catalog.timeout_secs must be > 0"));
        }
        if self.metadata.timeout_secs == 0 {
            return Err(AppError::validation("metadata.timeout_secs must be > 0"));
        }
        if self.metadata.max_concurrent == 0 {
            return Err(AppError::validation("metadata.max_concurrent must be > 0"));
        }
        if self.webhook.timeout_secs == 0 {
            return Err(AppError::validation("webhook.timeout_secs must be > 0"));
        }
        if self.webhook.max_attempts == 0 {
            return Err(AppError::validation("webhook.max_attempts must be > 0"));
        }
        if !(1..=MAX_CARDS_PER_MESSAGE).contains(&self.webhook.batch_size) {
            return Err(AppError::validation(format!(
                "webhook.batch_size must be between 1 and {MAX_CARDS_PER_MESSAGE}"
            )));
        }
        if self.webhook.synopsis_max_chars <= 3 {
            return Err(AppError::validation(
                "webhook.synopsis_max_chars must be > 3",
            ));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        Ok(())
    }

    /// Check the credentials a run cannot start without.
    pub fn require_credentials(&self) -> Result<()> {
        if self.credentials.catalog_api_key.is_none() {
            return Err(AppError::config(format!(
                "catalog API key missing (set {})",
                env::CATALOG_KEY
            )));
        }
        if self.credentials.webhook_url.is_none() {
            return Err(AppError::config(format!(
                "webhook endpoint missing (set {})",
                env::WEBHOOK
            )));
        }
        Ok(())
    }
}

/// Environment variable names.
pub mod env {
    pub const CATALOG_KEY: &str = "RAPIDAPI_KEY";
    pub const METADATA_KEY: &str = "TMDB_API_KEY";
    pub const WEBHOOK: &str = "DISCORD_WEBHOOK";
    pub const REGIONS: &str = "COUNTRIES";
    pub const LOOKBACK_DAYS: &str = "DAYS_BACK";
    pub const PROVIDER: &str = "CATALOG_PROVIDER";
    pub const MISSING_AVAILABILITY: &str = "MISSING_AVAILABILITY";
    pub const STORE_PATH: &str = "STORE_PATH";
}

/// Split a comma-separated region list, upper-casing and dropping blanks and repeats.
pub fn parse_region_list(list: &str) -> Vec<String> {
    let mut regions: Vec<String> = Vec::new();
    for code in list.split(',') {
        let code = code.trim().to_ascii_uppercase();
        if !code.is_empty() && !regions.contains(&code) {
            regions.push(code);
        }
    }
    regions
}

/// How the catalog provider handles regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProviderShape {
    /// The provider filters by region itself.
    #[default]
    #[serde(rename = "region_search")]
    RegionParameterized,
    /// The provider returns everything with an inline availability map per title.
    #[serde(rename = "global_list")]
    GlobalWithAvailabilityMap,
}

impl ProviderShape {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "region_search" | "region" => Some(Self::RegionParameterized),
            "global_list" | "global" => Some(Self::GlobalWithAvailabilityMap),
            _ => None,
        }
    }
}

/// Treatment of titles whose availability is absent or unparseable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingAvailabilityPolicy {
    /// Treat as available everywhere.
    #[default]
    Include,
    /// Treat as available nowhere.
    Exclude,
}

impl MissingAvailabilityPolicy {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "include" => Some(Self::Include),
            "exclude" => Some(Self::Exclude),
            _ => None,
        }
    }
}

/// Catalog provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub provider: ProviderShape,

    #[serde(default = "defaults::catalog_base_url")]
    pub base_url: String,

    /// Value of the `X-RapidAPI-Host` header
    #[serde(default = "defaults::catalog_api_host")]
    pub api_host: String,

    /// Titles requested per call
    #[serde(default = "defaults::page_size")]
    pub page_size: u32,

    /// Sort order hint
    #[serde(default = "defaults::order_by")]
    pub order_by: String,

    #[serde(default = "defaults::catalog_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub missing_availability: MissingAvailabilityPolicy,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            provider: ProviderShape::default(),
            base_url: defaults::catalog_base_url(),
            api_host: defaults::catalog_api_host(),
            page_size: defaults::page_size(),
            order_by: defaults::order_by(),
            timeout_secs: defaults::catalog_timeout(),
            missing_availability: MissingAvailabilityPolicy::default(),
        }
    }
}

/// Metadata provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "defaults::metadata_base_url")]
    pub base_url: String,

    /// Prefix joined with the provider's poster path
    #[serde(default = "defaults::image_base_url")]
    pub image_base_url: String,

    #[serde(default = "defaults::language")]
    pub language: String,

    #[serde(default = "defaults::metadata_timeout")]
    pub timeout_secs: u64,

    /// Concurrent lookups per region
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::metadata_base_url(),
            image_base_url: defaults::image_base_url(),
            language: defaults::language(),
            timeout_secs: defaults::metadata_timeout(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Webhook delivery and card layout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "defaults::webhook_timeout")]
    pub timeout_secs: u64,

    /// Attempts per batch before it counts as failed
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u8,

    /// Backoff before the second attempt, doubled afterwards
    #[serde(default = "defaults::retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Cards per message, at most 10
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,

    #[serde(default = "defaults::synopsis_max_chars")]
    pub synopsis_max_chars: usize,

    #[serde(default = "defaults::username")]
    pub username: String,

    #[serde(default = "defaults::avatar_url")]
    pub avatar_url: Option<String>,

    #[serde(default = "defaults::movie_badge")]
    pub movie_badge: String,

    #[serde(default = "defaults::series_badge")]
    pub series_badge: String,

    #[serde(default = "defaults::no_synopsis")]
    pub no_synopsis: String,

    #[serde(default = "defaults::links_label")]
    pub links_label: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::webhook_timeout(),
            max_attempts: defaults::max_attempts(),
            retry_backoff_ms: defaults::retry_backoff(),
            batch_size: defaults::batch_size(),
            synopsis_max_chars: defaults::synopsis_max_chars(),
            username: defaults::username(),
            avatar_url: defaults::avatar_url(),
            movie_badge: defaults::movie_badge(),
            series_badge: defaults::series_badge(),
            no_synopsis: defaults::no_synopsis(),
            links_label: defaults::links_label(),
        }
    }
}

/// Deep link templates.
///
/// Placeholders: `{id}`, `{kind}` (`movie`/`tv`), `{query}` (URL-encoded title).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "defaults::catalog_title_url")]
    pub catalog_title_url: String,

    #[serde(default = "defaults::catalog_search_url")]
    pub catalog_search_url: String,

    #[serde(default = "defaults::metadata_page_url")]
    pub metadata_page_url: String,

    #[serde(default = "defaults::imdb_url")]
    pub imdb_url: String,

    #[serde(default = "defaults::catalog_title_label")]
    pub catalog_title_label: String,

    #[serde(default = "defaults::catalog_search_label")]
    pub catalog_search_label: String,

    #[serde(default = "defaults::metadata_page_label")]
    pub metadata_page_label: String,

    #[serde(default = "defaults::imdb_label")]
    pub imdb_label: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            catalog_title_url: defaults::catalog_title_url(),
            catalog_search_url: defaults::catalog_search_url(),
            metadata_page_url: defaults::metadata_page_url(),
            imdb_url: defaults::imdb_url(),
            catalog_title_label: defaults::catalog_title_label(),
            catalog_search_label: defaults::catalog_search_label(),
            metadata_page_label: defaults::metadata_page_label(),
            imdb_label: defaults::imdb_label(),
        }
    }
}

/// Regions and lookback window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "defaults::regions")]
    pub regions: Vec<String>,

    /// Days back from today within which an addition counts as new
    #[serde(default = "defaults::lookback_days")]
    pub lookback_days: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            regions: defaults::regions(),
            lookback_days: defaults::lookback_days(),
        }
    }
}

/// Persisted state locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::store_file")]
    pub store_file: PathBuf,

    #[serde(default = "defaults::summary_file")]
    pub summary_file: PathBuf,

    /// Rolling log of provider calls
    #[serde(default = "defaults::journal_file")]
    pub journal_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            store_file: defaults::store_file(),
            summary_file: defaults::summary_file(),
            journal_file: defaults::journal_file(),
        }
    }
}

/// HTTP client settings shared by all providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
        }
    }
}

/// Secrets. `Debug` output is masked.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct Credentials {
    #[serde(default, skip_serializing)]
    pub catalog_api_key: Option<String>,

    #[serde(default, skip_serializing)]
    pub metadata_api_key: Option<String>,

    #[serde(default, skip_serializing)]
    pub webhook_url: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked = |v: &Option<String>| v.as_deref().map(mask_secret);
        f.debug_struct("Credentials")
            .field("catalog_api_key", &masked(&self.catalog_api_key))
            .field("metadata_api_key", &masked(&self.metadata_api_key))
            .field("webhook_url", &masked(&self.webhook_url))
            .finish()
    }
}

mod defaults {
    use std::path::PathBuf;

    // Catalog defaults
    pub fn catalog_base_url() -> String {
        "https://unogsng.p.rapidapi.com".into()
    }
    pub fn catalog_api_host() -> String {
        "unogsng.p.rapidapi.com".into()
    }
    pub fn page_size() -> u32 {
        100
    }
    pub fn order_by() -> String {
        "date_added".into()
    }
    pub fn catalog_timeout() -> u64 {
        30
    }

    // Metadata defaults
    pub fn metadata_base_url() -> String {
        "https://api.themoviedb.org/3".into()
    }
    pub fn image_base_url() -> String {
        "https://image.tmdb.org/t/p/w500".into()
    }
    pub fn language() -> String {
        "fr-FR".into()
    }
    pub fn metadata_timeout() -> u64 {
        10
    }
    pub fn max_concurrent() -> usize {
        5
    }

    // Webhook defaults
    pub fn webhook_timeout() -> u64 {
        10
    }
    pub fn max_attempts() -> u8 {
        2
    }
    pub fn retry_backoff() -> u64 {
        500
    }
    pub fn batch_size() -> usize {
        super::MAX_CARDS_PER_MESSAGE
    }
    pub fn synopsis_max_chars() -> usize {
        280
    }
    pub fn username() -> String {
        "Netflix Notifier 🎬".into()
    }
    pub fn avatar_url() -> Option<String> {
        Some(
            "https://cdn.icon-icons.com/icons2/2699/PNG/512/netflix_official_logo_icon_168085.png"
                .into(),
        )
    }
    pub fn movie_badge() -> String {
        "Film".into()
    }
    pub fn series_badge() -> String {
        "Série".into()
    }
    pub fn no_synopsis() -> String {
        "Pas de synopsis disponible.".into()
    }
    pub fn links_label() -> String {
        "🔗 Liens".into()
    }

    // Link defaults
    pub fn catalog_title_url() -> String {
        "https://www.netflix.com/title/{id}".into()
    }
    pub fn catalog_search_url() -> String {
        "https://www.netflix.com/search?q={query}".into()
    }
    pub fn metadata_page_url() -> String {
        "https://www.themoviedb.org/{kind}/{id}".into()
    }
    pub fn imdb_url() -> String {
        "https://www.imdb.com/title/{id}".into()
    }
    pub fn catalog_title_label() -> String {
        "▶️ Netflix".into()
    }
    pub fn catalog_search_label() -> String {
        "🍿 Recherche".into()
    }
    pub fn metadata_page_label() -> String {
        "📊 TMDB".into()
    }
    pub fn imdb_label() -> String {
        "🎬 IMDb".into()
    }

    // Run defaults
    pub fn regions() -> Vec<String> {
        vec!["FR".into()]
    }
    pub fn lookback_days() -> u32 {
        7
    }

    // Path defaults
    pub fn store_file() -> PathBuf {
        PathBuf::from("data/sent_ids.json")
    }
    pub fn summary_file() -> PathBuf {
        PathBuf::from("data/last_run.json")
    }
    pub fn journal_file() -> PathBuf {
        PathBuf::from("data/api_debug.json")
    }

    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; catalog-notifier/0.1)".into()
    }
}
