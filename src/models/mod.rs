// src/models/mod.rs

//! Domain models for the notifier.
//!
//! Catalog titles and their enrichment, the notified set persisted between
//! runs, per-run summaries, the provider call journal, and configuration.

mod catalog;
mod config;
mod journal;
mod notified;
mod summary;

#[cfg(test)]
pub(crate) mod fixtures;

// Re-export all public types
pub use catalog::{Availability, CatalogItem, EnrichedItem, MediaKind};
pub use config::{
    CatalogConfig, Config, Credentials, HttpConfig, LinkConfig, MAX_CARDS_PER_MESSAGE,
    MAX_EMBED_CHARS_PER_MESSAGE, MetadataConfig, MissingAvailabilityPolicy, PathsConfig, ProviderShape, RunConfig,
    WebhookConfig, env, parse_region_list,
};
pub use journal::{API_JOURNAL_CAPACITY, ApiCall, ApiJournal};
pub use notified::{NotifiedRecord, NotifiedSet};
pub use summary::{RegionSummary, RunSummary};
