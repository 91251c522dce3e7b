//! End-to-end enrichment passes against mock geolocation and weather APIs.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use geowx_core::{GeoPoint, GeoRecord, PendingItem, WeatherRecord};
use geowx_enrich::{EnrichmentPipeline, PassSummary, Scheduler, SessionUpdater, TickOutcome};
use geowx_geo::{open_geo_cache, GeoCache, GeoIpClient, GeoResolver};
use geowx_store::{
    Claim, Database, DbResult, PendingQueue, SessionStore, SqlitePendingQueue, SqliteSessionStore,
};
use geowx_weather::{open_weather_cache, WeatherCache, WeatherProvider, WeatherResolver};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    pipeline: EnrichmentPipeline,
    queue: SqlitePendingQueue,
    sessions: SqliteSessionStore,
    geo_cache: GeoCache,
    weather_cache: WeatherCache,
}

fn harness(geo_url: &str, weather_url: &str) -> Harness {
    harness_with_queue(geo_url, weather_url, None)
}

fn harness_with_queue(
    geo_url: &str,
    weather_url: &str,
    queue_override: Option<Arc<dyn PendingQueue>>,
) -> Harness {
    let db = Database::open_in_memory().unwrap();
    let queue = SqlitePendingQueue::new(&db).unwrap();
    let sessions = SqliteSessionStore::new(&db).unwrap();
    let geo_cache = open_geo_cache(&db, chrono::Duration::hours(24)).unwrap();
    let weather_cache = open_weather_cache(&db, chrono::Duration::hours(3)).unwrap();

    let geo = GeoResolver::new(
        geo_cache.clone(),
        GeoIpClient::new(geo_url, Duration::from_secs(5)).unwrap(),
    );
    let weather = WeatherResolver::new(
        weather_cache.clone(),
        WeatherProvider::new(
            weather_url,
            Some("test-key".to_string()),
            "metric",
            Duration::from_secs(5),
        )
        .unwrap(),
    );

    let pipeline_queue: Arc<dyn PendingQueue> =
        queue_override.unwrap_or_else(|| Arc::new(queue.clone()));
    let pipeline = EnrichmentPipeline::new(
        pipeline_queue,
        geo,
        weather,
        SessionUpdater::new(Arc::new(sessions.clone())),
    );

    Harness {
        pipeline,
        queue,
        sessions,
        geo_cache,
        weather_cache,
    }
}

fn seed(h: &Harness, id: &str, ip: &str) {
    h.sessions.create(id, ip).unwrap();
    h.queue.enqueue(&PendingItem::new(id, ip)).unwrap();
}

async fn completed(pipeline: &EnrichmentPipeline) -> PassSummary {
    match pipeline.tick().await.unwrap() {
        TickOutcome::Completed(summary) => summary,
        TickOutcome::AlreadyRunning => panic!("pass unexpectedly skipped"),
    }
}

async fn mount_geo(server: &MockServer, ip: &str, body: serde_json::Value, calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/geoip/{}", ip)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(calls)
        .mount(server)
        .await;
}

async fn mount_clear_weather(server: &MockServer, calls: u64) {
    Mock::given(method("GET"))
        .and(path("/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "weather": [{"main": "Clear", "icon": "01d"}],
            "main": {"temp": 15.2}
        })))
        .expect(calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_enrichment_of_a_pending_session() {
    let geo_server = MockServer::start().await;
    let weather_server = MockServer::start().await;

    mount_geo(
        &geo_server,
        "1.2.3.4",
        serde_json::json!({"latitude": 10.0, "longitude": 20.0, "country": "X"}),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/weather"))
        .and(query_param("lat", "10"))
        .and(query_param("lon", "20"))
        .and(query_param("units", "metric"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "weather": [{"main": "Clear", "icon": "01d"}],
            "main": {"temp": 15.2}
        })))
        .expect(1)
        .mount(&weather_server)
        .await;

    let h = harness(
        &format!("{}/geoip", geo_server.uri()),
        &format!("{}/weather", weather_server.uri()),
    );
    seed(&h, "s1", "1.2.3.4");

    let before = Utc::now();
    let summary = completed(&h.pipeline).await;
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.enriched, 1);
    assert_eq!(summary.geo_missing, 0);
    assert_eq!(summary.weather_missing, 0);

    let geo_entry = h.geo_cache.get("1.2.3.4").await.unwrap().unwrap();
    assert!(geo_entry.expires_at >= before + chrono::Duration::hours(24) - chrono::Duration::seconds(1));
    assert!(geo_entry.expires_at <= Utc::now() + chrono::Duration::hours(24));

    let weather_entry = h.weather_cache.get("20,10").await.unwrap().unwrap();
    assert_eq!(weather_entry.expires_at - weather_entry.created_at, chrono::Duration::hours(3));

    let session = h.sessions.get("s1").unwrap().unwrap();
    let geo = session.enrichment.geo.unwrap();
    assert_eq!(geo.country, "X");
    assert_eq!(geo.longitude, 20.0);
    assert_eq!(geo.latitude, 10.0);
    assert_eq!(
        session.enrichment.point,
        Some(GeoPoint {
            longitude: 20.0,
            latitude: 10.0
        })
    );
    assert_eq!(
        session.enrichment.weather,
        Some(WeatherRecord {
            kind: "Clear".to_string(),
            temperature: 15.2,
            weather_icon: "01d".to_string(),
        })
    );
    assert_eq!(h.queue.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn test_geolocation_transport_error_degrades_to_nulls() {
    let weather_server = MockServer::start().await;
    mount_clear_weather(&weather_server, 0).await;

    // Nothing listens on port 1.
    let h = harness(
        "http://127.0.0.1:1/geoip",
        &format!("{}/weather", weather_server.uri()),
    );
    seed(&h, "s1", "1.2.3.4");

    let summary = completed(&h.pipeline).await;
    assert_eq!(summary.enriched, 1);
    assert_eq!(summary.geo_missing, 1);
    assert_eq!(summary.weather_missing, 1);

    let session = h.sessions.get("s1").unwrap().unwrap();
    assert!(session.enrichment.geo.is_none());
    assert!(session.enrichment.point.is_none());
    assert!(session.enrichment.weather.is_none());

    assert!(h.geo_cache.is_empty().unwrap());
    assert!(h.weather_cache.is_empty().unwrap());
}

#[tokio::test]
async fn test_weather_failure_still_writes_geolocation() {
    let geo_server = MockServer::start().await;
    let weather_server = MockServer::start().await;

    mount_geo(
        &geo_server,
        "1.2.3.4",
        serde_json::json!({"latitude": 10.0, "longitude": 20.0}),
        1,
    )
    .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&weather_server)
        .await;

    let h = harness(
        &format!("{}/geoip", geo_server.uri()),
        &format!("{}/weather", weather_server.uri()),
    );
    seed(&h, "s1", "1.2.3.4");

    let summary = completed(&h.pipeline).await;
    assert_eq!(summary.weather_missing, 1);
    assert_eq!(summary.geo_missing, 0);

    let session = h.sessions.get("s1").unwrap().unwrap();
    assert_eq!(session.enrichment.geo, Some(GeoRecord::at(20.0, 10.0)));
    assert!(session.enrichment.weather.is_none());
    assert!(h.weather_cache.is_empty().unwrap());
}

#[tokio::test]
async fn test_second_pass_is_served_from_caches() {
    let geo_server = MockServer::start().await;
    let weather_server = MockServer::start().await;

    mount_geo(
        &geo_server,
        "1.2.3.4",
        serde_json::json!({"latitude": 10.0, "longitude": 20.0}),
        1,
    )
    .await;
    mount_clear_weather(&weather_server, 1).await;

    let h = harness(
        &format!("{}/geoip", geo_server.uri()),
        &format!("{}/weather", weather_server.uri()),
    );

    seed(&h, "s1", "1.2.3.4");
    completed(&h.pipeline).await;

    seed(&h, "s2", "1.2.3.4");
    let summary = completed(&h.pipeline).await;
    assert_eq!(summary.enriched, 1);

    let first = h.sessions.get("s1").unwrap().unwrap();
    let second = h.sessions.get("s2").unwrap().unwrap();
    assert_eq!(first.enrichment, second.enrichment);
}

#[tokio::test]
async fn test_empty_queue_completes_without_calls() {
    let geo_server = MockServer::start().await;
    let weather_server = MockServer::start().await;
    mount_geo(&geo_server, "1.2.3.4", serde_json::json!({}), 0).await;
    mount_clear_weather(&weather_server, 0).await;

    let h = harness(
        &format!("{}/geoip", geo_server.uri()),
        &format!("{}/weather", weather_server.uri()),
    );

    let summary = completed(&h.pipeline).await;
    assert_eq!(summary, PassSummary::default());
}

/// Queue that replays a fixed set of claims, including lost races.
struct ScriptedQueue {
    claims: Mutex<Vec<Claim>>,
}

impl PendingQueue for ScriptedQueue {
    fn enqueue(&self, item: &PendingItem) -> DbResult<()> {
        self.claims.lock().unwrap().push(Claim::observed(item.clone()));
        Ok(())
    }

    fn claim_all(&self) -> DbResult<Vec<Claim>> {
        Ok(std::mem::take(&mut *self.claims.lock().unwrap()))
    }

    fn pending_count(&self) -> DbResult<usize> {
        Ok(self.claims.lock().unwrap().len())
    }
}

#[tokio::test]
async fn test_lost_claims_are_discarded() {
    let geo_server = MockServer::start().await;
    let weather_server = MockServer::start().await;

    mount_geo(
        &geo_server,
        "1.2.3.4",
        serde_json::json!({"latitude": 10.0, "longitude": 20.0}),
        1,
    )
    .await;
    mount_clear_weather(&weather_server, 1).await;

    let scripted = Arc::new(ScriptedQueue {
        claims: Mutex::new(vec![
            Claim::lost(),
            Claim::observed(PendingItem::new("s1", "1.2.3.4")),
            Claim::lost(),
        ]),
    });
    let h = harness_with_queue(
        &format!("{}/geoip", geo_server.uri()),
        &format!("{}/weather", weather_server.uri()),
        Some(scripted),
    );
    h.sessions.create("s1", "1.2.3.4").unwrap();

    let summary = completed(&h.pipeline).await;
    assert_eq!(summary.claimed, 3);
    assert_eq!(summary.discarded, 2);
    assert_eq!(summary.enriched, 1);
    assert!(h.sessions.get("s1").unwrap().unwrap().enrichment.geo.is_some());
}

#[tokio::test]
async fn test_missing_session_is_counted() {
    let geo_server = MockServer::start().await;
    let weather_server = MockServer::start().await;
    mount_geo(
        &geo_server,
        "1.2.3.4",
        serde_json::json!({"latitude": 10.0, "longitude": 20.0}),
        1,
    )
    .await;
    mount_clear_weather(&weather_server, 1).await;

    let h = harness(
        &format!("{}/geoip", geo_server.uri()),
        &format!("{}/weather", weather_server.uri()),
    );
    h.queue.enqueue(&PendingItem::new("ghost", "1.2.3.4")).unwrap();

    let summary = completed(&h.pipeline).await;
    assert_eq!(summary.session_missing, 1);
    assert_eq!(summary.enriched, 0);
}

#[tokio::test]
async fn test_overlapping_tick_is_turned_away() {
    let geo_server = MockServer::start().await;
    let weather_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/geoip/1.2.3.4"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"latitude": 10.0, "longitude": 20.0}))
                .set_delay(Duration::from_millis(500)),
        )
        .expect(1)
        .mount(&geo_server)
        .await;
    mount_clear_weather(&weather_server, 1).await;

    let h = harness(
        &format!("{}/geoip", geo_server.uri()),
        &format!("{}/weather", weather_server.uri()),
    );
    seed(&h, "s1", "1.2.3.4");
    let pipeline = Arc::new(h.pipeline);

    let first = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.tick().await.unwrap() }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(pipeline.guard().is_running());
    assert_eq!(pipeline.tick().await.unwrap(), TickOutcome::AlreadyRunning);

    let outcome = first.await.unwrap();
    assert!(matches!(outcome, TickOutcome::Completed(s) if s.enriched == 1));
    assert!(!pipeline.guard().is_running());

    // Guard released: the next tick runs (and finds nothing to do).
    assert!(matches!(
        pipeline.tick().await.unwrap(),
        TickOutcome::Completed(s) if s.claimed == 0
    ));
}

#[tokio::test]
async fn test_concurrent_items_each_get_their_own_enrichment() {
    let geo_server = MockServer::start().await;
    let weather_server = MockServer::start().await;

    mount_geo(
        &geo_server,
        "1.1.1.1",
        serde_json::json!({"latitude": 1.0, "longitude": 2.0, "city": "A"}),
        1,
    )
    .await;
    mount_geo(
        &geo_server,
        "2.2.2.2",
        serde_json::json!({"latitude": 3.0, "longitude": 4.0, "city": "B"}),
        1,
    )
    .await;
    mount_clear_weather(&weather_server, 2).await;

    let mut h = harness(
        &format!("{}/geoip", geo_server.uri()),
        &format!("{}/weather", weather_server.uri()),
    );
    h.pipeline = h.pipeline.with_max_concurrent_items(4);
    seed(&h, "a", "1.1.1.1");
    seed(&h, "b", "2.2.2.2");

    let summary = completed(&h.pipeline).await;
    assert_eq!(summary.enriched, 2);

    let a = h.sessions.get("a").unwrap().unwrap().enrichment.geo.unwrap();
    let b = h.sessions.get("b").unwrap().unwrap().enrichment.geo.unwrap();
    assert_eq!(a.city, "A");
    assert_eq!(b.city, "B");
    assert_eq!(h.weather_cache.len().unwrap(), 2);
}

#[tokio::test]
async fn test_pass_purges_expired_cache_rows() {
    let h = harness("http://127.0.0.1:1/geoip", "http://127.0.0.1:1/weather");
    let long_ago = Utc::now() - chrono::Duration::hours(30);
    h.geo_cache
        .store_at("9.9.9.9", &GeoRecord::at(0.0, 0.0), long_ago)
        .unwrap();

    let pipeline = h.pipeline.with_purge_expired(true);
    let summary = match pipeline.tick().await.unwrap() {
        TickOutcome::Completed(summary) => summary,
        TickOutcome::AlreadyRunning => panic!("pass unexpectedly skipped"),
    };

    assert_eq!(summary.purged, 1);
    assert!(h.geo_cache.is_empty().unwrap());
}

#[tokio::test]
async fn test_scheduler_runs_passes_until_cancelled() {
    let geo_server = MockServer::start().await;
    let weather_server = MockServer::start().await;
    mount_geo(
        &geo_server,
        "1.2.3.4",
        serde_json::json!({"latitude": 10.0, "longitude": 20.0}),
        1,
    )
    .await;
    mount_clear_weather(&weather_server, 1).await;

    let h = harness(
        &format!("{}/geoip", geo_server.uri()),
        &format!("{}/weather", weather_server.uri()),
    );
    seed(&h, "s1", "1.2.3.4");

    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(Arc::new(h.pipeline), Duration::from_millis(50));
    let handle = tokio::spawn(scheduler.run(cancel.clone()));

    let mut enriched = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if h.sessions.get("s1").unwrap().unwrap().enrichment.weather.is_some() {
            enriched = true;
            break;
        }
    }
    assert!(enriched, "scheduler never enriched the pending session");

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop after cancellation")
        .unwrap();
}
