//! Rolling journal of provider calls, kept for the read-only dashboard.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entries kept in the persisted journal; older ones are dropped first.
pub const API_JOURNAL_CAPACITY: usize = 100;

/// One outbound provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    pub timestamp: DateTime<Utc>,

    /// Provider label (`catalog`, `metadata`)
    pub api: String,

    pub endpoint: String,

    /// Query parameters with secrets masked
    #[serde(default)]
    pub params: Vec<(String, String)>,

    /// HTTP status, absent when no response arrived
    #[serde(default)]
    pub status_code: Option<u16>,

    /// Excerpt of the response body
    #[serde(default)]
    pub response: Option<String>,

    #[serde(default)]
    pub error: Option<String>,
}

impl ApiCall {
    pub fn new(api: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            api: api.into(),
            endpoint: endpoint.into(),
            params: Vec::new(),
            status_code: None,
            response: None,
            error: None,
        }
    }
}

/// Bounded, oldest-first list of [`ApiCall`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiJournal {
    entries: VecDeque<ApiCall>,
}

impl ApiJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append calls, then drop the oldest beyond [`API_JOURNAL_CAPACITY`].
    pub fn extend<I>(&mut self, calls: I)
    where
        I: IntoIterator<Item = ApiCall>,
    {
        self.entries.extend(calls);
        let excess = self.entries.len().saturating_sub(API_JOURNAL_CAPACITY);
        self.entries.drain(..excess);
    }

    /// The `limit` newest entries, newest first.
    pub fn latest(&self, limit: usize) -> Vec<&ApiCall> {
        self.entries.iter().rev().take(limit).collect()
    }
}
