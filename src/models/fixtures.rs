//! Shared test builders.

use chrono::{DateTime, TimeZone, Utc};

use super::{Availability, CatalogItem, MediaKind, NotifiedRecord};

/// A movie added on `added`, with native synopsis and poster.
pub(crate) fn item(id: &str, added: &str) -> CatalogItem {
    CatalogItem {
        identity: id.to_string(),
        title: format!("Title {id}"),
        release_year: Some(2024),
        media_kind: MediaKind::Movie,
        added_date: added.to_string(),
        availability: Availability::Unknown,
        native_synopsis: Some(format!("Synopsis of {id}")),
        native_poster: None,
        imdb_id: None,
        known_external_id: None,
    }
}

/// Same as [`item`] but listed in the given regions.
pub(crate) fn item_in(id: &str, added: &str, regions: &[&str]) -> CatalogItem {
    CatalogItem {
        availability: Availability::from_codes(regions.iter().copied()),
        ..item(id, added)
    }
}

pub(crate) fn record(id: &str) -> NotifiedRecord {
    NotifiedRecord::new(id, format!("Title {id}"), sent_at())
}

pub(crate) fn sent_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap()
}
