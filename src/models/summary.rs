//! Run summary structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counts for one region of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSummary {
    /// Region code, or `*` for an unfiltered global pass
    pub region: String,
    /// Items returned by the catalog provider
    pub examined: usize,
    /// Items surviving the recency and availability filter
    pub recent: usize,
    /// Items absent from the notified set
    pub new: usize,
    /// Items in successfully delivered batches
    pub sent: usize,
    /// Items in batches that failed
    pub failed: usize,
    /// Fetch error that skipped the region, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
}

impl RegionSummary {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Self::default()
        }
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub regions: Vec<RegionSummary>,
    /// Identities in the store after the run
    pub store_size: usize,
    /// Whether the store was written
    pub persisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

impl RunSummary {
    pub fn examined(&self) -> usize {
        self.regions.iter().map(|r| r.examined).sum()
    }

    pub fn recent(&self) -> usize {
        self.regions.iter().map(|r| r.recent).sum()
    }

    pub fn new_items(&self) -> usize {
        self.regions.iter().map(|r| r.new).sum()
    }

    pub fn sent(&self) -> usize {
        self.regions.iter().map(|r| r.sent).sum()
    }

    pub fn failed(&self) -> usize {
        self.regions.iter().map(|r| r.failed).sum()
    }

    /// Summary lines for the run log.
    pub fn lines(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Regions processed", self.regions.len().to_string()),
            ("Items examined", self.examined().to_string()),
            ("Recent", self.recent().to_string()),
            ("New", self.new_items().to_string()),
            ("Sent", self.sent().to_string()),
            ("Failed", self.failed().to_string()),
            ("Store size", self.store_size.to_string()),
            (
                "Persisted",
                match (&self.persist_error, self.persisted) {
                    (Some(err), _) => format!("failed ({err})"),
                    (None, true) => "yes".to_string(),
                    (None, false) => "no changes".to_string(),
                },
            ),
        ]
    }
}
