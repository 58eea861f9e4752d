//! Catalog title data structures.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Kind of catalog title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Series,
}

impl MediaKind {
    /// Parse the provider's media type label. Unknown labels are movies.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "series" | "show" | "tv" => MediaKind::Series,
            _ => MediaKind::Movie,
        }
    }

    /// Path segment used by the metadata provider (`movie` or `tv`).
    pub fn metadata_segment(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Series => "tv",
        }
    }
}

/// Regions in which a title is licensed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "regions", rename_all = "snake_case")]
pub enum Availability {
    /// No usable information from the provider.
    #[default]
    Unknown,
    /// Upper-cased region codes.
    Listed(BTreeSet<String>),
}

impl Availability {
    /// Build from region codes; an empty list yields `Unknown`.
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = codes
            .into_iter()
            .map(|c| c.as_ref().trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .collect();
        if set.is_empty() {
            Availability::Unknown
        } else {
            Availability::Listed(set)
        }
    }

    /// Membership check. `None` when the provider gave no usable data.
    pub fn contains(&self, region: &str) -> Option<bool> {
        match self {
            Availability::Unknown => None,
            Availability::Listed(set) => Some(set.contains(&region.trim().to_ascii_uppercase())),
        }
    }
}

/// A candidate title as returned by the catalog provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Provider-assigned unique id, the dedup key
    pub identity: String,

    /// Display name
    pub title: String,

    /// Release year if the provider knows it
    pub release_year: Option<i32>,

    pub media_kind: MediaKind,

    /// Raw date the provider recorded the addition
    pub added_date: String,

    pub availability: Availability,

    /// Provider-supplied synopsis
    #[serde(default)]
    pub native_synopsis: Option<String>,

    /// Provider-supplied poster URL
    #[serde(default)]
    pub native_poster: Option<String>,

    /// IMDb id when the provider carries one
    #[serde(default)]
    pub imdb_id: Option<String>,

    /// Metadata-provider id when the provider already knows it
    #[serde(default)]
    pub known_external_id: Option<u64>,
}

impl CatalogItem {
    /// Parse `added_date` into a calendar date.
    ///
    /// Accepts `YYYY-MM-DD` and RFC 3339 timestamps.
    pub fn added_on(&self) -> Result<NaiveDate> {
        let raw = self.added_date.trim();
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(date);
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Ok(ts.date_naive());
        }
        Err(AppError::parse(
            format!("title {} ({})", self.identity, self.title),
            format!("unrecognised added date '{raw}'"),
        ))
    }

    /// Year for display, `N/A` when unknown.
    pub fn year_label(&self) -> String {
        self.release_year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }
}

/// A catalog item plus optional localized metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedItem {
    pub item: CatalogItem,
    pub localized_synopsis: Option<String>,
    pub poster_url: Option<String>,
    /// Metadata-provider id, used for the deep link
    pub external_id: Option<u64>,
}

impl EnrichedItem {
    /// Wrap an item with no enrichment data.
    pub fn bare(item: CatalogItem) -> Self {
        Self {
            item,
            localized_synopsis: None,
            poster_url: None,
            external_id: None,
        }
    }

    /// Synopsis by precedence: localized, then native. `None` means use the placeholder.
    pub fn synopsis(&self) -> Option<&str> {
        non_blank(self.localized_synopsis.as_deref())
            .or_else(|| non_blank(self.item.native_synopsis.as_deref()))
    }

    /// Poster by precedence: localized, then native.
    pub fn poster(&self) -> Option<&str> {
        non_blank(self.poster_url.as_deref()).or_else(|| non_blank(self.item.native_poster.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
