//! Dedup gate.
//!
//! Drops titles already announced. The snapshot is the notified set loaded
//! at run start and is never written here; titles claimed earlier in the same
//! run (another region, or a repeated record) are dropped as well.

use std::collections::HashSet;

use crate::models::{CatalogItem, NotifiedSet};

/// Result of one gate pass.
#[derive(Debug, Default)]
pub struct DedupResult {
    /// Titles to announce, in input order
    pub fresh: Vec<CatalogItem>,
    /// Dropped because the store already holds them
    pub already_notified: usize,
    /// Dropped because this run already claimed them
    pub claimed_this_run: usize,
}

pub struct DedupGate<'a> {
    snapshot: &'a NotifiedSet,
    claimed: HashSet<String>,
}

impl<'a> DedupGate<'a> {
    pub fn new(snapshot: &'a NotifiedSet) -> Self {
        Self {
            snapshot,
            claimed: HashSet::new(),
        }
    }

    /// Keep titles absent from the snapshot and not yet claimed, then claim them.
    pub fn admit(&mut self, items: Vec<CatalogItem>) -> DedupResult {
        let mut result = DedupResult::default();
        for item in items {
            if self.snapshot.contains(&item.identity) {
                log::debug!("Already notified: {} ({})", item.title, item.identity);
                result.already_notified += 1;
            } else if !self.claimed.insert(item.identity.clone()) {
                log::debug!("Claimed earlier this run: {} ({})", item.title, item.identity);
                result.claimed_this_run += 1;
            } else {
                result.fresh.push(item);
            }
        }
        result
    }

    /// Identities claimed so far this run.
    pub fn claimed(&self) -> usize {
        self.claimed.len()
    }
}
