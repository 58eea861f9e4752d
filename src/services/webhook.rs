// src/services/webhook.rs

//! Notification dispatch.
//!
//! Formats enriched titles into Discord embeds and posts them in batches.
//! A batch holds at most 10 cards and 6000 characters of card text.
//! Batches are independent: a failed batch leaves earlier deliveries intact
//! and its titles stay eligible for the next run.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{
    Config, EnrichedItem, LinkConfig, MAX_CARDS_PER_MESSAGE, MAX_EMBED_CHARS_PER_MESSAGE,
    MediaKind, NotifiedRecord, WebhookConfig,
};
use crate::utils::http::{body_excerpt, create_async_client};
use crate::utils::{encode_query, fill_template, truncate_graphemes};

const MOVIE_COLOR: u32 = 0xE5_09_14;
const SERIES_COLOR: u32 = 0x00_99_FF;
const TITLE_MAX_CHARS: usize = 256;
const MAX_RETRY_WAIT: Duration = Duration::from_secs(60);

/// One message card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
}

impl Embed {
    /// Characters counted against the per-message text limit.
    pub fn text_len(&self) -> usize {
        self.title.chars().count()
            + self.description.chars().count()
            + self
                .fields
                .iter()
                .map(|f| f.name.chars().count() + f.value.chars().count())
                .sum::<usize>()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Body of one webhook call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookPayload {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub embeds: Vec<Embed>,
}

/// Builds embeds from enriched titles.
#[derive(Debug, Clone)]
pub struct CardFormatter {
    webhook: WebhookConfig,
    links: LinkConfig,
}

impl CardFormatter {
    pub fn new(webhook: WebhookConfig, links: LinkConfig) -> Self {
        Self { webhook, links }
    }

    pub fn format(&self, entry: &EnrichedItem, now: DateTime<Utc>) -> Embed {
        let item = &entry.item;
        let (emoji, color, badge) = match item.media_kind {
            MediaKind::Movie => ("🎬", MOVIE_COLOR, &self.webhook.movie_badge),
            MediaKind::Series => ("📺", SERIES_COLOR, &self.webhook.series_badge),
        };

        let synopsis = match entry.synopsis() {
            Some(text) => truncate_graphemes(text, self.webhook.synopsis_max_chars),
            None => self.webhook.no_synopsis.clone(),
        };

        let links = EmbedField {
            name: self.webhook.links_label.clone(),
            value: self.links(entry).join(" • "),
            inline: false,
        };

        Embed {
            title: truncate_graphemes(
                &format!("{} {} ({})", emoji, item.title, item.year_label()),
                TITLE_MAX_CHARS,
            ),
            description: format!("**[{badge}]**\n\n{synopsis}"),
            color,
            url: self.metadata_page(entry),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            image: entry.poster().map(|url| EmbedImage {
                url: url.to_string(),
            }),
            fields: vec![links],
        }
    }

    fn metadata_page(&self, entry: &EnrichedItem) -> Option<String> {
        entry.external_id.map(|id| {
            fill_template(
                &self.links.metadata_page_url,
                &[
                    ("kind", entry.item.media_kind.metadata_segment()),
                    ("id", &id.to_string()),
                ],
            )
        })
    }

    /// Markdown links in display order.
    fn links(&self, entry: &EnrichedItem) -> Vec<String> {
        let item = &entry.item;
        let links = &self.links;
        let mut out = vec![format!(
            "[{}]({})",
            links.catalog_title_label,
            fill_template(&links.catalog_title_url, &[("id", &item.identity)])
        )];
        if let Some(imdb) = &item.imdb_id {
            out.push(format!(
                "[{}]({})",
                links.imdb_label,
                fill_template(&links.imdb_url, &[("id", imdb)])
            ));
        }
        if let Some(page) = self.metadata_page(entry) {
            out.push(format!("[{}]({page})", links.metadata_page_label));
        }
        out.push(format!(
            "[{}]({})",
            links.catalog_search_label,
            fill_template(
                &links.catalog_search_url,
                &[("query", &encode_query(&item.title))]
            )
        ));
        out
    }
}

/// Delivery of one payload, single attempt.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, payload: &WebhookPayload) -> Result<()>;
}

/// Discord webhook endpoint.
pub struct DiscordWebhook {
    client: Client,
    url: String,
}

impl DiscordWebhook {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let url = config
            .credentials
            .webhook_url
            .as_deref()
            .ok_or_else(|| AppError::config("webhook endpoint missing"))?;
        let client = create_async_client(&config.http, config.webhook.timeout_secs)?;
        Ok(Self::new(client, url))
    }
}

/// Body of a rate-limit answer; `retry_after` is in seconds.
#[derive(Deserialize)]
struct RateLimited {
    retry_after: Option<f64>,
}

#[async_trait]
impl WebhookTransport for DiscordWebhook {
    async fn post(&self, payload: &WebhookPayload) -> Result<()> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let header_wait = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok());
        let body = response.text().await.unwrap_or_default();
        let retry_after = serde_json::from_str::<RateLimited>(&body)
            .ok()
            .and_then(|r| r.retry_after)
            .or(header_wait)
            .filter(|secs| secs.is_finite() && *secs >= 0.0);

        Err(AppError::Rejected {
            status: status.as_u16(),
            retry_after_ms: retry_after.map(|secs| (secs * 1000.0).ceil() as u64),
            message: body_excerpt(&body),
        })
    }
}

/// A batch that could not be delivered.
#[derive(Debug, Clone)]
pub struct FailedBatch {
    /// 1-based batch number within the dispatch
    pub batch: usize,
    pub identities: Vec<String>,
    pub error: String,
}

/// Outcome of dispatching a list of titles.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Titles in successfully delivered batches, stamped with delivery time
    pub delivered: Vec<NotifiedRecord>,
    pub failed: Vec<FailedBatch>,
    pub batches: usize,
}

impl DispatchReport {
    pub fn sent(&self) -> usize {
        self.delivered.len()
    }

    pub fn failed_items(&self) -> usize {
        self.failed.iter().map(|b| b.identities.len()).sum()
    }
}

/// Batches cards and posts them with retries.
pub struct Dispatcher {
    transport: Arc<dyn WebhookTransport>,
    formatter: CardFormatter,
    username: String,
    avatar_url: Option<String>,
    batch_size: usize,
    max_attempts: u8,
    backoff: Duration,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn WebhookTransport>,
        webhook: &WebhookConfig,
        links: &LinkConfig,
    ) -> Self {
        Self {
            transport,
            formatter: CardFormatter::new(webhook.clone(), links.clone()),
            username: webhook.username.clone(),
            avatar_url: webhook.avatar_url.clone(),
            batch_size: webhook.batch_size.clamp(1, MAX_CARDS_PER_MESSAGE),
            max_attempts: webhook.max_attempts.max(1),
            backoff: Duration::from_millis(webhook.retry_backoff_ms),
        }
    }

    /// Post `items` in order, splitting batches at `batch_size` cards or
    /// the per-message text limit, whichever comes first.
    pub async fn dispatch(&self, items: &[EnrichedItem]) -> DispatchReport {
        let mut report = DispatchReport::default();
        if items.is_empty() {
            return report;
        }

        let now = Utc::now();
        let cards: Vec<Embed> = items.iter().map(|e| self.formatter.format(e, now)).collect();
        let ranges = self.batch_ranges(&cards);
        let total = ranges.len();
        report.batches = total;

        for (index, range) in ranges.into_iter().enumerate() {
            let batch = index + 1;
            let chunk = &items[range.clone()];
            let payload = WebhookPayload {
                username: self.username.clone(),
                avatar_url: self.avatar_url.clone(),
                embeds: cards[range].to_vec(),
            };

            match self.post_with_retry(batch, &payload).await {
                Ok(()) => {
                    log::info!("Batch {}/{}: delivered {} cards", batch, total, chunk.len());
                    let sent_at = Utc::now();
                    report.delivered.extend(chunk.iter().map(|e| {
                        NotifiedRecord::new(e.item.identity.clone(), e.item.title.clone(), sent_at)
                    }));
                }
                Err(e) => {
                    log::error!("Batch {}/{} failed: {}", batch, total, e);
                    report.failed.push(FailedBatch {
                        batch,
                        identities: chunk.iter().map(|e| e.item.identity.clone()).collect(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Consecutive card ranges, each within the card count and text limits.
    /// A single oversized card still gets a batch of its own.
    fn batch_ranges(&self, cards: &[Embed]) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut start = 0;
        let mut chars = 0;
        for (i, card) in cards.iter().enumerate() {
            let len = card.text_len();
            let full = i - start == self.batch_size || chars + len > MAX_EMBED_CHARS_PER_MESSAGE;
            if i > start && full {
                ranges.push(start..i);
                start = i;
                chars = 0;
            }
            chars += len;
        }
        if start < cards.len() {
            ranges.push(start..cards.len());
        }
        ranges
    }

    async fn post_with_retry(&self, batch: usize, payload: &WebhookPayload) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.transport.post(payload).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_attempts && e.is_transient() => {
                    let delay = e
                        .retry_after()
                        .unwrap_or_else(|| self.backoff.saturating_mul(1u32 << (attempt - 1).min(10)))
                        .min(MAX_RETRY_WAIT);
                    log::warn!(
                        "Batch {} attempt {} failed: {}; retrying in {:?}",
                        batch,
                        attempt,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(AppError::dispatch(batch, e)),
            }
        }
    }
}
