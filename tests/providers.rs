//! HTTP-level tests against mock catalog, metadata and webhook servers.

use std::sync::Arc;
use std::time::Duration;

use catalog_notifier::error::AppError;
use catalog_notifier::models::{
    Availability, CatalogItem, Config, EnrichedItem, HttpConfig, LinkConfig, MediaKind,
    ProviderShape, WebhookConfig,
};
use catalog_notifier::pipeline::Notifier;
use catalog_notifier::services::{
    CatalogFetcher, DiscordWebhook, Dispatcher, MetadataLookup, TmdbClient, UnogsFetcher,
    WebhookPayload, WebhookTransport,
};
use catalog_notifier::storage::{LocalStorage, NotifiedStore};
use catalog_notifier::utils::http::create_async_client;
use chrono::NaiveDate;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn title(id: u64, added: &str) -> Value {
    json!({
        "nfid": id,
        "title": format!("Title {id}"),
        "year": "2024",
        "vtype": "movie",
        "titledate": added,
        "synopsis": format!("Synopsis {id}"),
        "img": format!("https://img.example/{id}.jpg"),
    })
}

fn catalog_config(server: &MockServer, shape: ProviderShape) -> Config {
    let mut config = Config::default();
    config.catalog.base_url = server.uri();
    config.catalog.provider = shape;
    config.catalog.timeout_secs = 1;
    config
}

fn sample(id: &str, title: &str, kind: MediaKind, year: Option<i32>) -> CatalogItem {
    CatalogItem {
        identity: id.to_string(),
        title: title.to_string(),
        release_year: year,
        media_kind: kind,
        added_date: "2026-10-17".to_string(),
        availability: Availability::Unknown,
        native_synopsis: Some("Native".to_string()),
        native_poster: None,
        imdb_id: None,
        known_external_id: None,
    }
}

#[tokio::test]
async fn catalog_region_search_sends_filter_and_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("limit", "100"))
        .and(query_param("orderby", "date_added"))
        .and(query_param("country_list", "FR"))
        .and(header("X-RapidAPI-Key", "catalog-key"))
        .and(header("X-RapidAPI-Host", "unogsng.p.rapidapi.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 2,
            "results": [title(100, "2026-10-17"), title(101, "2026-10-16")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = catalog_config(&server, ProviderShape::RegionParameterized);
    let fetcher = UnogsFetcher::new(&config.catalog, &config.http, "catalog-key").unwrap();
    let items = fetcher.fetch(Some("FR")).await.unwrap();

    let ids: Vec<&str> = items.iter().map(|i| i.identity.as_str()).collect();
    assert_eq!(ids, vec!["100", "101"]);
    assert_eq!(items[0].release_year, Some(2024));
    assert_eq!(items[0].native_poster.as_deref(), Some("https://img.example/100.jpg"));
}

#[tokio::test]
async fn catalog_global_list_decodes_availability() {
    let server = MockServer::start().await;
    let mut listed = title(200, "2026-10-17");
    listed["clist"] = json!("\"FR\":\"France\",\"BE\":\"Belgium\"");
    let mut broken = title(201, "2026-10-17");
    broken["clist"] = json!("{{not a map");

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "results": [listed, broken] })),
        )
        .mount(&server)
        .await;

    let config = catalog_config(&server, ProviderShape::GlobalWithAvailabilityMap);
    let fetcher = UnogsFetcher::new(&config.catalog, &config.http, "key").unwrap();
    let items = fetcher.fetch(None).await.unwrap();

    assert_eq!(items[0].availability.contains("BE"), Some(true));
    assert_eq!(items[1].availability, Availability::Unknown);

    let requests = server.received_requests().await.unwrap();
    assert!(
        requests[0]
            .url
            .query_pairs()
            .all(|(k, _)| k != "country_list")
    );
}

#[tokio::test]
async fn catalog_errors_are_fetch_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("country_list", "FR"))
        .respond_with(ResponseTemplate::new(503).set_body_string("quota exceeded"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("country_list", "US"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("country_list", "DE"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "results": [] }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("country_list", "CA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .mount(&server)
        .await;

    let config = catalog_config(&server, ProviderShape::RegionParameterized);
    let fetcher = UnogsFetcher::new(&config.catalog, &config.http, "key").unwrap();

    for region in ["FR", "US", "DE"] {
        let err = fetcher.fetch(Some(region)).await.unwrap_err();
        assert!(matches!(err, AppError::Fetch { .. }), "{region}: {err}");
    }
    assert!(fetcher.fetch(Some("CA")).await.unwrap().is_empty());
}

#[tokio::test]
async fn metadata_search_uses_year_key_per_kind() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search/movie"))
        .and(query_param("query", "Lupin"))
        .and(query_param("year", "2021"))
        .and(query_param("language", "fr-FR"))
        .and(query_param("api_key", "tmdb-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"id": 42, "overview": "Un gentleman cambrioleur.", "poster_path": "/lupin.jpg"},
                {"id": 43, "overview": "Autre", "poster_path": null}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/tv"))
        .and(query_param("first_air_date_year", "2017"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.metadata.base_url = server.uri();
    let client = create_async_client(&HttpConfig::default(), 2).unwrap();
    let tmdb = TmdbClient::new(&config.metadata, client, "tmdb-key");

    let movie = sample("1", "Lupin", MediaKind::Movie, Some(2021));
    let found = tmdb.lookup(&movie).await.unwrap().unwrap();
    assert_eq!(found.external_id, Some(42));
    assert_eq!(found.synopsis.as_deref(), Some("Un gentleman cambrioleur."));
    assert_eq!(
        found.poster_url.as_deref(),
        Some("https://image.tmdb.org/t/p/w500/lupin.jpg")
    );

    let series = sample("2", "Dark", MediaKind::Series, Some(2017));
    assert!(tmdb.lookup(&series).await.unwrap().is_none());
}

#[tokio::test]
async fn metadata_known_id_falls_back_to_search_on_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tv/999"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/search/tv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"id": 7, "overview": "", "poster_path": "/p.jpg"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = Config::default();
    config.metadata.base_url = server.uri();
    let client = create_async_client(&HttpConfig::default(), 2).unwrap();
    let tmdb = TmdbClient::new(&config.metadata, client, "key");

    let mut item = sample("3", "Dark", MediaKind::Series, None);
    item.known_external_id = Some(999);
    let found = tmdb.lookup(&item).await.unwrap().unwrap();

    assert_eq!(found.external_id, Some(7));
    assert_eq!(found.synopsis, None);
}

#[tokio::test]
async fn webhook_batches_of_ten() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/webhooks/1/token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(3)
        .mount(&server)
        .await;

    let client = create_async_client(&HttpConfig::default(), 2).unwrap();
    let transport = Arc::new(DiscordWebhook::new(
        client,
        format!("{}/api/webhooks/1/token", server.uri()),
    ));
    let dispatcher = Dispatcher::new(transport, &WebhookConfig::default(), &LinkConfig::default());

    let items: Vec<EnrichedItem> = (0..21)
        .map(|i| EnrichedItem::bare(sample(&i.to_string(), "Film", MediaKind::Movie, None)))
        .collect();
    let report = dispatcher.dispatch(&items).await;

    assert_eq!(report.sent(), 21);
    let requests = server.received_requests().await.unwrap();
    let sizes: Vec<usize> = requests
        .iter()
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["embeds"].as_array().unwrap().len()
        })
        .collect();
    assert_eq!(sizes, vec![10, 10, 1]);
}

#[tokio::test]
async fn webhook_rejection_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"retry_after": 1.5})))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_async_client(&HttpConfig::default(), 2).unwrap();
    let webhook = DiscordWebhook::new(client, server.uri());
    let payload = WebhookPayload {
        username: "notifier".to_string(),
        avatar_url: None,
        embeds: Vec::new(),
    };

    let err = webhook.post(&payload).await.unwrap_err();
    assert!(matches!(err, AppError::Rejected { status: 429, .. }));
    assert_eq!(err.retry_after(), Some(Duration::from_millis(1500)));
    assert!(err.is_transient());
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn webhook_bad_request_is_attempted_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "Invalid Form Body"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = create_async_client(&HttpConfig::default(), 2).unwrap();
    let transport = Arc::new(DiscordWebhook::new(client, server.uri()));
    let webhook = WebhookConfig {
        max_attempts: 3,
        retry_backoff_ms: 0,
        ..WebhookConfig::default()
    };
    let dispatcher = Dispatcher::new(transport, &webhook, &LinkConfig::default());

    let items = vec![EnrichedItem::bare(sample("1", "Film", MediaKind::Movie, None))];
    let report = dispatcher.dispatch(&items).await;

    assert_eq!(report.failed_items(), 1);
    assert!(report.failed[0].error.contains("Invalid Form Body"));
}

#[tokio::test]
async fn full_run_persists_only_delivered_batches() {
    let catalog = MockServer::start().await;
    let metadata = MockServer::start().await;
    let discord = MockServer::start().await;

    let mut results = vec![title(100, "2026-10-17")];
    results.extend((1..=25).map(|i| title(1000 + i, "2026-10-16")));
    results.push(title(5000, "2026-09-01"));
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": results })))
        .mount(&catalog)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&metadata)
        .await;

    // First call succeeds, second fails, the rest succeed.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&discord)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(2)
        .mount(&discord)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .with_priority(3)
        .mount(&discord)
        .await;

    let tmp = TempDir::new().unwrap();
    let store_path = tmp.path().join("sent_ids.json");
    std::fs::write(
        &store_path,
        r#"{"100": {"title": "Title 100", "sent_at": "2026-10-17T08:00:00"}}"#,
    )
    .unwrap();

    let mut config = Config::default();
    config.catalog.base_url = catalog.uri();
    config.metadata.base_url = metadata.uri();
    config.run.regions = vec!["FR".to_string()];
    config.webhook.max_attempts = 1;
    config.webhook.retry_backoff_ms = 0;
    config.credentials.catalog_api_key = Some("catalog-key".to_string());
    config.credentials.metadata_api_key = Some("tmdb-key".to_string());
    config.credentials.webhook_url = Some(format!("{}/api/webhooks/1/token", discord.uri()));
    config.paths.store_file = store_path.clone();
    config.paths.summary_file = tmp.path().join("last_run.json");
    config.paths.journal_file = tmp.path().join("api_debug.json");

    let storage = Arc::new(LocalStorage::from_config(&config.paths));
    let notifier = Notifier::from_config(&config, storage.clone()).unwrap();
    let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();

    let summary = notifier.run(today).await;

    assert_eq!(summary.examined(), 27);
    assert_eq!(summary.recent(), 26);
    assert_eq!(summary.new_items(), 25);
    assert_eq!(summary.sent(), 15);
    assert_eq!(summary.failed(), 10);
    assert!(summary.persisted);

    let set = storage.load().await.unwrap();
    assert_eq!(set.len(), 16);
    assert_eq!(set.get("100").unwrap().title, "Title 100");
    assert!(set.contains("1001"));
    assert!(!set.contains("1011"));
    assert!(set.contains("1021"));
    assert!(storage.load_summary().await.unwrap().is_some());

    let journal = storage.load_journal().await.unwrap();
    assert_eq!(journal.len(), 26);
    let calls = journal.latest(26);
    let fetch = calls.iter().find(|c| c.api == "catalog").unwrap();
    assert_eq!(fetch.status_code, Some(200));
    let lookup = calls.iter().find(|c| c.api == "metadata").unwrap();
    assert_eq!(lookup.status_code, Some(500));
    assert!(lookup.error.is_some());
    assert!(
        lookup
            .params
            .contains(&("api_key".to_string(), "tmdb***".to_string()))
    );
    let raw = std::fs::read_to_string(tmp.path().join("api_debug.json")).unwrap();
    assert!(!raw.contains("tmdb-key"));

    // Failed batch is retried on the next run; nothing else is re-sent.
    let second = notifier.run(today).await;
    assert_eq!(second.new_items(), 10);
    assert_eq!(second.sent(), 10);
    assert_eq!(storage.load().await.unwrap().len(), 26);
    assert_eq!(storage.load_journal().await.unwrap().len(), 37);
}
