//! Service layer for the notifier.
//!
//! This module contains the provider-facing parts of a run:
//! - Catalog fetching (`CatalogFetcher`, `UnogsFetcher`)
//! - Metadata enrichment (`MetadataLookup`, `TmdbClient`, `Enricher`)
//! - Webhook dispatch (`CardFormatter`, `WebhookTransport`, `Dispatcher`)
//! - Provider call journaling (`CallRecorder`)

pub mod catalog;
pub mod journal;
pub mod metadata;
pub mod webhook;

pub use catalog::{CatalogFetcher, UnogsFetcher, decode_availability};
pub use journal::CallRecorder;
pub use metadata::{Enricher, Metadata, MetadataLookup, NoLookup, TmdbClient};
pub use webhook::{
    CardFormatter, DiscordWebhook, DispatchReport, Dispatcher, Embed, FailedBatch, WebhookPayload,
    WebhookTransport,
};
