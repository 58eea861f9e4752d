//! Recency and availability filter.

use chrono::{Days, NaiveDate};

use crate::models::{CatalogItem, MissingAvailabilityPolicy};

/// Counts from one filter pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub examined: usize,
    pub kept: usize,
    pub too_old: usize,
    pub unavailable: usize,
    pub bad_date: usize,
}

/// Keeps titles added within the lookback window and available in a region.
#[derive(Debug, Clone, Copy)]
pub struct RecencyFilter {
    lookback_days: u32,
    missing: MissingAvailabilityPolicy,
}

impl RecencyFilter {
    pub fn new(lookback_days: u32, missing: MissingAvailabilityPolicy) -> Self {
        Self {
            lookback_days,
            missing,
        }
    }

    /// Earliest added date still considered new.
    pub fn cutoff(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.lookback_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Filter `items`, preserving their order.
    ///
    /// `region` is `None` when the provider already filtered by region.
    pub fn apply(
        &self,
        items: &[CatalogItem],
        region: Option<&str>,
        today: NaiveDate,
    ) -> (Vec<CatalogItem>, FilterStats) {
        let cutoff = self.cutoff(today);
        let mut stats = FilterStats {
            examined: items.len(),
            ..FilterStats::default()
        };

        let mut kept = Vec::new();
        for item in items {
            let added = match item.added_on() {
                Ok(date) => date,
                Err(e) => {
                    log::warn!("{}", e);
                    stats.bad_date += 1;
                    continue;
                }
            };
            if added < cutoff {
                stats.too_old += 1;
                continue;
            }
            if let Some(region) = region {
                if !self.is_available(item, region) {
                    log::debug!("{} ({}) not available in {}", item.title, item.identity, region);
                    stats.unavailable += 1;
                    continue;
                }
            }
            kept.push(item.clone());
        }

        stats.kept = kept.len();
        (kept, stats)
    }

    fn is_available(&self, item: &CatalogItem, region: &str) -> bool {
        item.availability
            .contains(region)
            .unwrap_or(self.missing == MissingAvailabilityPolicy::Include)
    }
}
