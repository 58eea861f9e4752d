// src/pipeline/run.rs

//! Run orchestration.
//!
//! One run: load the notified set, then per region fetch, filter, dedup,
//! enrich and dispatch; finally merge the delivered titles and persist once.
//! Provider calls made during the run are appended to the call journal.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::error::{AppError, Result};
use crate::models::{
    ApiJournal, CatalogItem, Config, NotifiedRecord, NotifiedSet, ProviderShape, RegionSummary,
    RunSummary,
};
use crate::pipeline::dedup::DedupGate;
use crate::pipeline::filter::RecencyFilter;
use crate::services::{
    CallRecorder, CatalogFetcher, DiscordWebhook, Dispatcher, Enricher, MetadataLookup,
    TmdbClient, UnogsFetcher, WebhookTransport,
};
use crate::storage::NotifiedStore;

/// The assembled pipeline.
pub struct Notifier {
    fetcher: Arc<dyn CatalogFetcher>,
    enricher: Enricher,
    dispatcher: Dispatcher,
    store: Arc<dyn NotifiedStore>,
    filter: RecencyFilter,
    regions: Vec<String>,
    recorder: CallRecorder,
}

impl Notifier {
    /// Assemble from explicit collaborators.
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn CatalogFetcher>,
        lookup: Arc<dyn MetadataLookup>,
        transport: Arc<dyn WebhookTransport>,
        store: Arc<dyn NotifiedStore>,
    ) -> Self {
        Self {
            fetcher,
            enricher: Enricher::from_config(&config.metadata, lookup),
            dispatcher: Dispatcher::new(transport, &config.webhook, &config.links),
            store,
            filter: RecencyFilter::new(
                config.run.lookback_days,
                config.catalog.missing_availability,
            ),
            regions: config.run.regions.clone(),
            recorder: CallRecorder::new(),
        }
    }

    /// Share the recorder the provider clients journal into.
    pub fn with_recorder(mut self, recorder: CallRecorder) -> Self {
        self.recorder = recorder;
        self
    }

    /// Assemble the production clients.
    ///
    /// Fails before any network call when a required credential is missing.
    pub fn from_config(config: &Config, store: Arc<dyn NotifiedStore>) -> Result<Self> {
        config.require_credentials()?;
        config.validate()?;

        let recorder = CallRecorder::new();
        let fetcher = Arc::new(UnogsFetcher::from_config(config)?.with_recorder(recorder.clone()));
        let lookup = TmdbClient::lookup_from_config(config, recorder.clone())?;
        let transport = Arc::new(DiscordWebhook::from_config(config)?);
        Ok(Self::new(config, fetcher, lookup, transport, store).with_recorder(recorder))
    }

    /// Execute one run. Per-region and persistence failures are recorded in
    /// the summary rather than returned.
    pub async fn run(&self, today: NaiveDate) -> RunSummary {
        let started_at = Utc::now();
        log::info!(
            "Run starting: {} region(s), provider {} ({:?}), window from {}",
            self.regions.len(),
            self.fetcher.name(),
            self.fetcher.shape(),
            self.filter.cutoff(today)
        );

        let (snapshot, load_failed) = match self.store.load().await {
            Ok(set) => {
                log::info!("Loaded {} notified records from {}", set.len(), self.store.location());
                (set, false)
            }
            Err(e) => {
                log::warn!("Could not read notified set, starting empty: {}", e);
                (NotifiedSet::new(), true)
            }
        };

        let mut gate = DedupGate::new(&snapshot);
        let mut delivered: Vec<NotifiedRecord> = Vec::new();
        let mut regions = Vec::with_capacity(self.regions.len());

        let global = match self.fetcher.shape() {
            ProviderShape::GlobalWithAvailabilityMap => Some(self.fetcher.fetch(None).await),
            ProviderShape::RegionParameterized => None,
        };
        if let Some(Err(e)) = &global {
            log::warn!("Catalog fetch failed, no region can be processed: {}", e);
        }

        for region in &self.regions {
            let mut summary = RegionSummary::new(region);
            log::info!("Region {}", region);

            match &global {
                Some(Ok(items)) => {
                    let sent = self
                        .process_region(
                            items,
                            Some(region.as_str()),
                            &mut gate,
                            today,
                            &mut summary,
                        )
                        .await;
                    delivered.extend(sent);
                }
                Some(Err(e)) => summary.fetch_error = Some(e.to_string()),
                None => match self.fetcher.fetch(Some(region.as_str())).await {
                    Ok(items) => {
                        let sent = self
                            .process_region(&items, None, &mut gate, today, &mut summary)
                            .await;
                        delivered.extend(sent);
                    }
                    Err(e) => {
                        log::warn!("Skipping region {}: {}", region, e);
                        summary.fetch_error = Some(e.to_string());
                    }
                },
            }
            regions.push(summary);
        }
        drop(gate);

        let mut store_set = snapshot;
        let (persisted, persist_error) = if delivered.is_empty() {
            log::info!("Nothing delivered, notified set unchanged");
            (false, None)
        } else {
            match self.persist(&mut store_set, delivered, load_failed).await {
                Ok(()) => (true, None),
                Err(e) => {
                    log::error!("Failed to persist notified set: {}", e);
                    (false, Some(e.to_string()))
                }
            }
        };

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            regions,
            store_size: store_set.len(),
            persisted,
            persist_error,
        };

        if let Err(e) = self.store.save_summary(&summary).await {
            log::warn!("Failed to write run summary: {}", e);
        }
        self.save_journal().await;
        for (label, value) in summary.lines() {
            log::info!("{:<18} {}", label, value);
        }
        summary
    }

    /// Merge `delivered` into `set` and write it back.
    ///
    /// When the run started without a readable store, the document is read
    /// again first and left untouched if that still fails.
    async fn persist(
        &self,
        set: &mut NotifiedSet,
        delivered: Vec<NotifiedRecord>,
        load_failed: bool,
    ) -> Result<()> {
        if load_failed {
            let current = self.store.load().await.map_err(|e| {
                AppError::store(format!(
                    "notified set still unreadable, {} delivered titles not recorded: {}",
                    delivered.len(),
                    e
                ))
            })?;
            log::info!("Re-read {} notified records before saving", current.len());
            *set = current;
        }
        set.merge(delivered);
        self.store.save(set).await
    }

    /// Append this run's provider calls to the persisted journal.
    async fn save_journal(&self) {
        let calls = self.recorder.take();
        if calls.is_empty() {
            return;
        }
        let mut journal = match self.store.load_journal().await {
            Ok(journal) => journal,
            Err(e) => {
                log::warn!("Could not read call journal, starting a new one: {}", e);
                ApiJournal::new()
            }
        };
        journal.extend(calls);
        if let Err(e) = self.store.save_journal(&journal).await {
            log::warn!("Failed to write call journal: {}", e);
        }
    }

    /// Filter, dedup, enrich and dispatch one region's titles.
    ///
    /// Returns the records for titles in delivered batches.
    async fn process_region(
        &self,
        items: &[CatalogItem],
        region_filter: Option<&str>,
        gate: &mut DedupGate<'_>,
        today: NaiveDate,
        summary: &mut RegionSummary,
    ) -> Vec<NotifiedRecord> {
        summary.examined = items.len();

        let (recent, stats) = self.filter.apply(items, region_filter, today);
        summary.recent = recent.len();
        log::info!(
            "{}: {} examined, {} recent ({} too old, {} unavailable, {} bad dates)",
            summary.region,
            stats.examined,
            stats.kept,
            stats.too_old,
            stats.unavailable,
            stats.bad_date
        );

        let dedup = gate.admit(recent);
        summary.new = dedup.fresh.len();
        log::info!(
            "{}: {} new ({} already notified, {} claimed earlier this run)",
            summary.region,
            dedup.fresh.len(),
            dedup.already_notified,
            dedup.claimed_this_run
        );
        if dedup.fresh.is_empty() {
            return Vec::new();
        }

        let enriched = self.enricher.enrich_all(dedup.fresh).await;
        let report = self.dispatcher.dispatch(&enriched).await;
        summary.sent = report.sent();
        summary.failed = report.failed_items();
        report.delivered
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::AppError;
    use crate::models::fixtures::{item, item_in, record};
    use crate::models::{API_JOURNAL_CAPACITY, ApiCall};
    use crate::services::{Metadata, NoLookup, WebhookPayload};

    /// Serves fixed items per region key (`*` for the global list).
    struct FakeCatalog {
        shape: ProviderShape,
        items: HashMap<String, Vec<CatalogItem>>,
        calls: Mutex<Vec<Option<String>>>,
    }

    impl FakeCatalog {
        fn new(shape: ProviderShape, entries: Vec<(&str, Vec<CatalogItem>)>) -> Self {
            Self {
                shape,
                items: entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CatalogFetcher for FakeCatalog {
        fn name(&self) -> &str {
            "fake"
        }

        fn shape(&self) -> ProviderShape {
            self.shape
        }

        async fn fetch(&self, region: Option<&str>) -> Result<Vec<CatalogItem>> {
            self.calls.lock().unwrap().push(region.map(str::to_string));
            let key = region.unwrap_or("*");
            self.items
                .get(key)
                .cloned()
                .ok_or_else(|| AppError::fetch(format!("catalog {key}"), "HTTP 503"))
        }
    }

    /// Counts lookups; answers every title.
    #[derive(Default)]
    struct CountingLookup {
        looked_up: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MetadataLookup for CountingLookup {
        async fn lookup(&self, item: &CatalogItem) -> Result<Option<Metadata>> {
            self.looked_up.lock().unwrap().push(item.identity.clone());
            Ok(Some(Metadata {
                external_id: Some(1),
                synopsis: Some("Résumé".to_string()),
                poster_url: None,
            }))
        }
    }

    /// Records posted identities per call; fails listed call numbers.
    #[derive(Default)]
    struct FakeWebhook {
        fail_calls: Vec<usize>,
        posts: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl WebhookTransport for FakeWebhook {
        async fn post(&self, payload: &WebhookPayload) -> Result<()> {
            let mut posts = self.posts.lock().unwrap();
            posts.push(payload.embeds.len());
            if self.fail_calls.contains(&posts.len()) {
                return Err(AppError::fetch("webhook", "HTTP 500"));
            }
            Ok(())
        }
    }

    /// In-memory store. The first `failing_loads` loads return an error.
    #[derive(Default)]
    struct MemoryStore {
        set: Mutex<NotifiedSet>,
        saves: Mutex<usize>,
        failing_loads: Mutex<usize>,
        fail_save: bool,
        summary: Mutex<Option<RunSummary>>,
        journal: Mutex<ApiJournal>,
    }

    impl MemoryStore {
        fn with(records: Vec<NotifiedRecord>) -> Self {
            Self {
                set: Mutex::new(records.into_iter().collect()),
                ..Default::default()
            }
        }

        fn snapshot(&self) -> NotifiedSet {
            self.set.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotifiedStore for MemoryStore {
        async fn load(&self) -> Result<NotifiedSet> {
            let mut failing = self.failing_loads.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(AppError::store("GetObject: service unavailable"));
            }
            Ok(self.snapshot())
        }

        async fn save(&self, set: &NotifiedSet) -> Result<()> {
            if self.fail_save {
                return Err(AppError::store("disk full"));
            }
            *self.saves.lock().unwrap() += 1;
            *self.set.lock().unwrap() = set.clone();
            Ok(())
        }

        async fn save_summary(&self, summary: &RunSummary) -> Result<()> {
            *self.summary.lock().unwrap() = Some(summary.clone());
            Ok(())
        }

        async fn load_summary(&self) -> Result<Option<RunSummary>> {
            Ok(self.summary.lock().unwrap().clone())
        }

        async fn load_journal(&self) -> Result<ApiJournal> {
            Ok(self.journal.lock().unwrap().clone())
        }

        async fn save_journal(&self, journal: &ApiJournal) -> Result<()> {
            *self.journal.lock().unwrap() = journal.clone();
            Ok(())
        }

        fn location(&self) -> String {
            "memory".to_string()
        }
    }

    fn config(regions: &[&str]) -> Config {
        let mut config = Config::default();
        config.run.regions = regions.iter().map(|r| r.to_string()).collect();
        config.run.lookback_days = 7;
        config.webhook.max_attempts = 1;
        config.webhook.retry_backoff_ms = 0;
        config
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn many(prefix: &str, n: usize) -> Vec<CatalogItem> {
        (0..n).map(|i| item(&format!("{prefix}{i}"), "2026-10-17")).collect()
    }

    #[tokio::test]
    async fn test_known_identity_is_left_alone() {
        let catalog = Arc::new(FakeCatalog::new(
            ProviderShape::RegionParameterized,
            vec![("FR", vec![item("100", "2026-10-17"), item("101", "2026-10-17")])],
        ));
        let lookup = Arc::new(CountingLookup::default());
        let webhook = Arc::new(FakeWebhook::default());
        let store = Arc::new(MemoryStore::with(vec![record("100")]));
        let notifier = Notifier::new(
            &config(&["FR"]),
            catalog,
            lookup.clone(),
            webhook.clone(),
            store.clone(),
        );

        let summary = notifier.run(today()).await;

        assert_eq!(*lookup.looked_up.lock().unwrap(), vec!["101".to_string()]);
        assert_eq!(*webhook.posts.lock().unwrap(), vec![1]);
        let set = store.snapshot();
        assert_eq!(set.len(), 2);
        assert!(set.contains("101"));
        assert_eq!(set.get("100"), Some(&record("100")));
        assert_eq!(summary.sent(), 1);
        assert!(summary.persisted);
    }

    #[tokio::test]
    async fn test_second_run_sends_nothing() {
        let catalog = Arc::new(FakeCatalog::new(
            ProviderShape::RegionParameterized,
            vec![("FR", many("t", 12))],
        ));
        let webhook = Arc::new(FakeWebhook::default());
        let store = Arc::new(MemoryStore::default());
        let notifier = Notifier::new(
            &config(&["FR"]),
            catalog,
            Arc::new(NoLookup),
            webhook.clone(),
            store.clone(),
        );

        let first = notifier.run(today()).await;
        let second = notifier.run(today()).await;

        assert_eq!(first.sent(), 12);
        assert_eq!(second.sent(), 0);
        assert_eq!(second.new_items(), 0);
        assert!(!second.persisted);
        assert_eq!(*webhook.posts.lock().unwrap(), vec![10, 2]);
        assert_eq!(*store.saves.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_stays_eligible() {
        let catalog = Arc::new(FakeCatalog::new(
            ProviderShape::RegionParameterized,
            vec![("FR", many("t", 25))],
        ));
        let webhook = Arc::new(FakeWebhook {
            fail_calls: vec![2],
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::default());
        let notifier = Notifier::new(
            &config(&["FR"]),
            catalog,
            Arc::new(NoLookup),
            webhook,
            store.clone(),
        );

        let summary = notifier.run(today()).await;

        let set = store.snapshot();
        assert_eq!(summary.sent(), 15);
        assert_eq!(summary.failed(), 10);
        assert!(set.contains("t9"));
        assert!(!set.contains("t10"));
        assert!(!set.contains("t19"));
        assert!(set.contains("t20"));
    }

    #[tokio::test]
    async fn test_region_fetch_failure_is_contained() {
        let catalog = Arc::new(FakeCatalog::new(
            ProviderShape::RegionParameterized,
            vec![("US", vec![item("1", "2026-10-17")])],
        ));
        let store = Arc::new(MemoryStore::default());
        let notifier = Notifier::new(
            &config(&["FR", "US"]),
            catalog,
            Arc::new(NoLookup),
            Arc::new(FakeWebhook::default()),
            store.clone(),
        );

        let summary = notifier.run(today()).await;

        assert_eq!(summary.regions.len(), 2);
        assert!(summary.regions[0].fetch_error.is_some());
        assert_eq!(summary.regions[1].sent, 1);
        assert!(store.snapshot().contains("1"));
        assert!(store.summary.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_global_list_fetched_once_and_claimed_once() {
        let catalog = Arc::new(FakeCatalog::new(
            ProviderShape::GlobalWithAvailabilityMap,
            vec![(
                "*",
                vec![
                    item_in("both", "2026-10-17", &["FR", "US"]),
                    item_in("us-only", "2026-10-17", &["US"]),
                    item("unknown", "2026-10-17"),
                    item_in("old", "2026-09-01", &["FR"]),
                ],
            )],
        ));
        let webhook = Arc::new(FakeWebhook::default());
        let store = Arc::new(MemoryStore::default());
        let notifier = Notifier::new(
            &config(&["FR", "US"]),
            catalog.clone(),
            Arc::new(NoLookup),
            webhook.clone(),
            store.clone(),
        );

        let summary = notifier.run(today()).await;

        assert_eq!(*catalog.calls.lock().unwrap(), vec![None]);
        assert_eq!(summary.regions[0].sent, 2);
        assert_eq!(summary.regions[1].sent, 1);
        assert_eq!(summary.regions[1].recent, 3);
        assert_eq!(store.snapshot().len(), 3);
        assert!(!store.snapshot().contains("old"));
    }

    fn unreadable_store(failing_loads: usize) -> Arc<MemoryStore> {
        let store = MemoryStore::with(vec![record("100"), record("50")]);
        *store.failing_loads.lock().unwrap() = failing_loads;
        Arc::new(store)
    }

    fn notifier_over(store: Arc<MemoryStore>) -> Notifier {
        let catalog = Arc::new(FakeCatalog::new(
            ProviderShape::RegionParameterized,
            vec![("FR", vec![item("100", "2026-10-17"), item("101", "2026-10-17")])],
        ));
        Notifier::new(
            &config(&["FR"]),
            catalog,
            Arc::new(NoLookup),
            Arc::new(FakeWebhook::default()),
            store,
        )
    }

    #[tokio::test]
    async fn test_unreadable_store_is_never_overwritten() {
        let store = unreadable_store(usize::MAX);

        let summary = notifier_over(store.clone()).run(today()).await;

        assert_eq!(summary.sent(), 2);
        assert!(!summary.persisted);
        assert!(
            summary
                .persist_error
                .as_deref()
                .unwrap_or_default()
                .contains("2 delivered titles not recorded")
        );
        assert_eq!(*store.saves.lock().unwrap(), 0);
        let set = store.snapshot();
        assert_eq!(set.len(), 2);
        assert!(set.contains("50"));
        assert!(!set.contains("101"));
    }

    #[tokio::test]
    async fn test_store_read_again_before_saving() {
        let store = unreadable_store(1);

        let summary = notifier_over(store.clone()).run(today()).await;

        assert!(summary.persisted);
        let set = store.snapshot();
        assert_eq!(set.len(), 3);
        assert!(set.contains("50"));
        assert!(set.contains("101"));
        assert_eq!(set.get("100"), Some(&record("100")));
    }

    #[tokio::test]
    async fn test_run_appends_calls_to_capped_journal() {
        let store = Arc::new(MemoryStore::default());
        store.journal.lock().unwrap().extend(
            (0..API_JOURNAL_CAPACITY - 1).map(|n| ApiCall::new("catalog", format!("old-{n}"))),
        );
        let recorder = CallRecorder::new();
        recorder.record(ApiCall::new("catalog", "new-1"));
        recorder.record(ApiCall::new("metadata", "new-2"));
        let notifier = notifier_over(store.clone()).with_recorder(recorder.clone());

        notifier.run(today()).await;

        let journal = store.journal.lock().unwrap().clone();
        assert_eq!(journal.len(), API_JOURNAL_CAPACITY);
        let latest: Vec<&str> = journal.latest(2).iter().map(|c| c.endpoint.as_str()).collect();
        assert_eq!(latest, vec!["new-2", "new-1"]);
        assert!(recorder.take().is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_is_reported() {
        let catalog = Arc::new(FakeCatalog::new(
            ProviderShape::RegionParameterized,
            vec![("FR", vec![item("1", "2026-10-17")])],
        ));
        let webhook = Arc::new(FakeWebhook::default());
        let store = Arc::new(MemoryStore {
            fail_save: true,
            ..Default::default()
        });
        let notifier = Notifier::new(
            &config(&["FR"]),
            catalog,
            Arc::new(NoLookup),
            webhook.clone(),
            store,
        );

        let summary = notifier.run(today()).await;

        assert_eq!(summary.sent(), 1);
        assert!(!summary.persisted);
        assert!(summary.persist_error.as_deref().unwrap_or_default().contains("disk full"));
        assert_eq!(*webhook.posts.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_from_config_requires_credentials() {
        let store = Arc::new(MemoryStore::default());
        let result = Notifier::from_config(&Config::default(), store);
        assert!(matches!(result, Err(ref e) if e.is_fatal()));
    }
}
