//! Pipeline stages and run orchestration.
//!
//! - `filter`: recency and availability filter
//! - `dedup`: drop titles already announced
//! - `run`: sequence fetch, filter, dedup, enrich, dispatch and persist

pub mod dedup;
pub mod filter;
pub mod run;

pub use dedup::{DedupGate, DedupResult};
pub use filter::{FilterStats, RecencyFilter};
pub use run::Notifier;
