//! Storage abstractions for the notified set.
//!
//! The notified set is one JSON document mapping identity to record. Two
//! more documents exist for read-only viewers: the last run summary and a
//! rolling journal of provider calls.
//!
//! ```text
//! data/
//! ├── sent_ids.json    # {"81234": {"identity": "81234", "title": "...", "sent_at": "..."}}
//! ├── last_run.json    # RunSummary of the latest run
//! └── api_debug.json   # last 100 provider calls
//! ```

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ApiJournal, NotifiedSet, RunSummary};

// Re-export for convenience
pub use local::LocalStorage;

/// Trait for notified-set storage backends.
#[async_trait]
pub trait NotifiedStore: Send + Sync {
    /// Load the notified set. A missing document is an empty set.
    async fn load(&self) -> Result<NotifiedSet>;

    /// Replace the stored set.
    async fn save(&self, set: &NotifiedSet) -> Result<()>;

    /// Replace the stored set with an empty one.
    async fn reset(&self) -> Result<()> {
        self.save(&NotifiedSet::new()).await
    }

    async fn save_summary(&self, summary: &RunSummary) -> Result<()>;

    async fn load_summary(&self) -> Result<Option<RunSummary>>;

    /// Load the provider call journal. A missing document is an empty journal.
    async fn load_journal(&self) -> Result<ApiJournal>;

    async fn save_journal(&self, journal: &ApiJournal) -> Result<()>;

    /// Human-readable location of the notified set.
    fn location(&self) -> String;
}
