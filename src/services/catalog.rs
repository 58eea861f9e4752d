// src/services/catalog.rs

//! Catalog fetcher service.
//!
//! Retrieves candidate titles from the catalog provider. Two provider shapes
//! share one contract: a region-filtered search, and a global list where each
//! title carries its own availability map.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{
    ApiCall, Availability, CatalogConfig, CatalogItem, Config, HttpConfig, MediaKind,
    ProviderShape,
};
use crate::services::journal::{CallRecorder, masked_params};
use crate::utils::http::{body_excerpt, create_async_client};

/// Source of candidate titles.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Whether the provider filters by region itself.
    fn shape(&self) -> ProviderShape;

    /// Fetch candidate titles, restricted to `region` when the provider supports it.
    ///
    /// An empty list is a successful outcome.
    async fn fetch(&self, region: Option<&str>) -> Result<Vec<CatalogItem>>;
}

/// uNoGS-style catalog client behind RapidAPI.
pub struct UnogsFetcher {
    client: Client,
    endpoint: String,
    api_host: String,
    api_key: String,
    page_size: u32,
    order_by: String,
    shape: ProviderShape,
    recorder: CallRecorder,
}

impl UnogsFetcher {
    pub fn new(config: &CatalogConfig, http: &HttpConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = create_async_client(http, config.timeout_secs)?;
        Ok(Self {
            client,
            endpoint: format!("{}/search", config.base_url.trim_end_matches('/')),
            api_host: config.api_host.clone(),
            api_key: api_key.into(),
            page_size: config.page_size,
            order_by: config.order_by.clone(),
            shape: config.provider,
            recorder: CallRecorder::new(),
        })
    }

    /// Journal every call into `recorder`.
    pub fn with_recorder(mut self, recorder: CallRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    /// Build from the full configuration; the catalog key is required.
    pub fn from_config(config: &Config) -> Result<Self> {
        let key = config
            .credentials
            .catalog_api_key
            .as_deref()
            .ok_or_else(|| AppError::config("catalog API key missing"))?;
        Self::new(&config.catalog, &config.http, key)
    }

    fn query(&self, region: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("limit", self.page_size.to_string()),
            ("orderby", self.order_by.clone()),
        ];
        if let (ProviderShape::RegionParameterized, Some(region)) = (self.shape, region) {
            params.push(("country_list", region.to_string()));
        }
        params
    }

    async fn request(
        &self,
        context: &str,
        params: &[(&'static str, String)],
        call: &mut ApiCall,
    ) -> Result<Vec<CatalogItem>> {
        let response = self
            .client
            .get(&self.endpoint)
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", &self.api_host)
            .query(params)
            .send()
            .await
            .map_err(|e| AppError::fetch(context, e))?;

        let status = response.status();
        call.status_code = Some(status.as_u16());
        let body = response
            .text()
            .await
            .map_err(|e| AppError::fetch(context, e))?;
        call.response = Some(body_excerpt(&body));
        if !status.is_success() {
            return Err(AppError::fetch(
                context,
                format!("HTTP {}: {}", status, body_excerpt(&body)),
            ));
        }

        parse_results(&body).map_err(|e| AppError::fetch(context, e))
    }
}

#[async_trait]
impl CatalogFetcher for UnogsFetcher {
    fn name(&self) -> &str {
        "unogs"
    }

    fn shape(&self) -> ProviderShape {
        self.shape
    }

    async fn fetch(&self, region: Option<&str>) -> Result<Vec<CatalogItem>> {
        let context = format!("catalog {}", region.unwrap_or("global"));
        let params = self.query(region);
        log::debug!("GET {} {:?}", self.endpoint, params);

        let mut call = ApiCall::new("catalog", &self.endpoint);
        call.params = masked_params(&params);
        let result = self.request(&context, &params, &mut call).await;
        match &result {
            Ok(items) => log::info!("{}: {} titles", context, items.len()),
            Err(e) => call.error = Some(e.to_string()),
        }
        self.recorder.record(call);
        result
    }
}

/// Response envelope. A missing or null `results` list means no titles.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    results: Option<Vec<Value>>,
}

/// One title as sent by the provider. Fields vary in type across API versions.
#[derive(Deserialize)]
struct RawTitle {
    #[serde(default)]
    nfid: Value,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    year: Value,
    #[serde(default)]
    vtype: Option<String>,
    #[serde(default)]
    titledate: Option<String>,
    #[serde(default)]
    synopsis: Option<String>,
    #[serde(default)]
    img: Option<String>,
    #[serde(default)]
    poster: Option<String>,
    #[serde(default)]
    imdbid: Option<String>,
    #[serde(default)]
    tmid: Value,
    #[serde(default)]
    clist: Option<Value>,
}

/// Parse a provider response body.
///
/// A malformed envelope is an error. Individually malformed titles are
/// logged and skipped.
pub fn parse_results(body: &str) -> std::result::Result<Vec<CatalogItem>, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(body)?;
    let records = envelope.results.unwrap_or_default();

    let mut items = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value::<RawTitle>(record)
            .map_err(|e| AppError::parse(format!("result #{index}"), e))
            .and_then(|raw| raw.into_item(index))
        {
            Ok(item) => items.push(item),
            Err(e) => log::warn!("Skipping catalog record: {}", e),
        }
    }
    Ok(items)
}

impl RawTitle {
    fn into_item(self, index: usize) -> Result<CatalogItem> {
        let identity = scalar_string(&self.nfid)
            .ok_or_else(|| AppError::parse(format!("result #{index}"), "missing id"))?;
        let context = || format!("title {identity}");

        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::parse(context(), "missing title"))?;
        let added_date = self
            .titledate
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| AppError::parse(context(), "missing added date"))?;

        Ok(CatalogItem {
            title,
            release_year: scalar_string(&self.year).and_then(|y| y.parse().ok()),
            media_kind: self
                .vtype
                .as_deref()
                .map(MediaKind::from_label)
                .unwrap_or(MediaKind::Movie),
            added_date,
            availability: decode_availability(self.clist.as_ref()),
            native_synopsis: non_empty(self.synopsis),
            native_poster: non_empty(self.img).or_else(|| non_empty(self.poster)),
            imdb_id: non_empty(self.imdbid),
            known_external_id: scalar_string(&self.tmid).and_then(|id| id.parse().ok()),
            identity,
        })
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

static QUOTED_CODE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#""([A-Za-z]{2})"\s*:"#).ok());
static CODE_LIST: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{2}(\s*,\s*[A-Za-z]{2})*$").ok());

fn is_region_code(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic())
}

fn codes_from<'a>(codes: impl Iterator<Item = &'a str>) -> Availability {
    Availability::from_codes(codes.map(str::trim).filter(|c| is_region_code(c)))
}

/// Decode a title's availability encoding.
///
/// Accepts an object keyed by region code, an array of codes, or the compact
/// `"FR":"France","US":"United States"` string with or without braces.
/// Anything absent, empty or unreadable is `Unknown`.
pub fn decode_availability(raw: Option<&Value>) -> Availability {
    match raw {
        Some(Value::Object(map)) => codes_from(map.keys().map(String::as_str)),
        Some(Value::Array(values)) => codes_from(values.iter().filter_map(Value::as_str)),
        Some(Value::String(s)) => decode_availability_str(s),
        _ => Availability::Unknown,
    }
}

fn decode_availability_str(raw: &str) -> Availability {
    let raw = raw.trim();
    if raw.is_empty() {
        return Availability::Unknown;
    }

    let wrapped = if raw.starts_with('{') {
        raw.to_string()
    } else {
        format!("{{{raw}}}")
    };
    if let Ok(map) = serde_json::from_str::<serde_json::Map<String, Value>>(&wrapped) {
        return codes_from(map.keys().map(String::as_str));
    }

    if CODE_LIST.as_ref().is_some_and(|re| re.is_match(raw)) {
        return codes_from(raw.split(','));
    }

    // Truncated or otherwise broken JSON: salvage the quoted keys.
    match QUOTED_CODE.as_ref() {
        Some(re) => codes_from(re.captures_iter(raw).filter_map(|c| c.get(1)).map(|m| m.as_str())),
        None => Availability::Unknown,
    }
}
