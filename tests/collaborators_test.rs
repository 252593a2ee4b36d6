// ABOUTME: Integration tests for the provider and portal collaborators against mock HTTP servers
// ABOUTME: Covers envelope parsing, failures, snapshot paging, commits and a full daemon cycle

use serde_json::{json, Value};
use station_sync::collaborators::{DestinationStore, ProviderSource};
use station_sync::config::{PortalSettings, ProviderSettings};
use station_sync::daemon::{DaemonConfig, SyncDaemon};
use station_sync::engine::{
    FieldWhitelist, JoinKey, RecordHandle, StationId, StationRegistry, SyncEngine, SyncError,
};
use station_sync::portal::{FeatureLayer, PortalSession};
use station_sync::provider::ProviderClient;
use station_sync::state::CycleSummary;
use station_sync::utils::RetryPolicy;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const LAYER_PATH: &str = "/server/rest/services/KoreaAirQuality/FeatureServer/0";

fn provider_settings(server: &MockServer) -> ProviderSettings {
    ProviderSettings {
        base_url: format!("{}/B552584/ArpltnInforInqireSvc", server.uri()),
        service_key: "test-service-key".to_string(),
        sido_name: "전국".to_string(),
        num_of_rows: 1000,
    }
}

fn portal_settings(server: &MockServer) -> PortalSettings {
    PortalSettings {
        portal_url: server.uri(),
        username: "gis-user".to_string(),
        password: "hunter2".to_string(),
        layer_title: "KoreaAirQuality".to_string(),
        layer_url: None,
    }
}

fn envelope(items: Value) -> Value {
    json!({
        "response": {
            "body": {"totalCount": items.as_array().map_or(0, Vec::len), "items": items, "pageNo": 1, "numOfRows": 1000},
            "header": {"resultMsg": "NORMAL_CODE", "resultCode": "00"}
        }
    })
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/sharing/rest/generateToken"))
        .and(body_string_contains("username=gis-user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "portal-token",
            "expires": 4_102_444_800_000i64,
            "ssl": true
        })))
        .mount(server)
        .await;
}

async fn mount_layer_query(server: &MockServer, features: Value) {
    Mock::given(method("GET"))
        .and(path(format!("{}/query", LAYER_PATH)))
        .and(query_param("token", "portal-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "objectIdFieldName": "objectid",
            "features": features,
            "exceededTransferLimit": false
        })))
        .mount(server)
        .await;
}

fn layer(server: &MockServer) -> FeatureLayer {
    let session = PortalSession::new(portal_settings(server), RetryPolicy::none()).unwrap();
    FeatureLayer::with_url(session, format!("{}{}", server.uri(), LAYER_PATH))
}

/// Decode the `updates` form field of an applyEdits request.
fn submitted_updates(request: &Request) -> Vec<Value> {
    let updates = url::form_urlencoded::parse(&request.body)
        .find(|(k, _)| k == "updates")
        .map(|(_, v)| v.into_owned())
        .expect("applyEdits request without updates");
    serde_json::from_str(&updates).unwrap()
}

#[tokio::test]
async fn test_provider_fetch_parses_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/B552584/ArpltnInforInqireSvc/getCtprvnRltmMesureDnsty"))
        .and(query_param("serviceKey", "test-service-key"))
        .and(query_param("returnType", "json"))
        .and(query_param("sidoName", "전국"))
        .and(query_param("numOfRows", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            {"stationName": "중구", "pm10Value": "45", "pm10Grade": "2"},
            {"stationName": "종로구", "pm10Value": "-", "pm10Grade": null}
        ]))))
        .expect(1)
        .mount(&server)
        .await;

    let client = ProviderClient::new(provider_settings(&server), RetryPolicy::none()).unwrap();
    let rows = client.fetch_latest_readings().await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].join_value("stationName"), Some("중구"));
    assert_eq!(rows[1].attributes.get("pm10Grade"), Some(&Value::Null));
}

#[tokio::test]
async fn test_provider_error_status_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = ProviderClient::new(provider_settings(&server), RetryPolicy::none()).unwrap();
    let err = client.fetch_latest_readings().await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::ProviderUnavailable(_))
    ));
    assert!(!err.to_string().contains("test-service-key"));
}

#[tokio::test]
async fn test_provider_malformed_envelope_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let client = ProviderClient::new(provider_settings(&server), RetryPolicy::none()).unwrap();
    let err = client.fetch_latest_readings().await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::ProviderUnavailable(_))
    ));
}

fn page(items: Value, total_count: u64, page_no: u32) -> Value {
    json!({
        "response": {
            "body": {"totalCount": total_count, "items": items, "pageNo": page_no, "numOfRows": 2},
            "header": {"resultMsg": "NORMAL_CODE", "resultCode": "00"}
        }
    })
}

fn two_row_pages(server: &MockServer) -> ProviderSettings {
    ProviderSettings {
        num_of_rows: 2,
        ..provider_settings(server)
    }
}

#[tokio::test]
async fn test_provider_fetch_follows_total_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("pageNo", "1"))
        .and(query_param("numOfRows", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            json!([{"stationName": "중구"}, {"stationName": "종로구"}]),
            3,
            1,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("pageNo", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            json!([{"stationName": "용산구"}]),
            3,
            2,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let client = ProviderClient::new(two_row_pages(&server), RetryPolicy::none()).unwrap();
    let rows = client.fetch_latest_readings().await.unwrap();

    let stations: Vec<_> = rows.iter().filter_map(|r| r.join_value("stationName")).collect();
    assert_eq!(stations, vec!["중구", "종로구", "용산구"]);
}

#[tokio::test]
async fn test_provider_short_snapshot_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("pageNo", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            json!([{"stationName": "중구"}, {"stationName": "종로구"}]),
            5,
            1,
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("pageNo", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([]), 5, 2)))
        .mount(&server)
        .await;

    let client = ProviderClient::new(two_row_pages(&server), RetryPolicy::none()).unwrap();
    let err = client.fetch_latest_readings().await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::ProviderUnavailable(_))
    ));
    assert!(err.to_string().contains("reported 5 rows"));
}

#[tokio::test]
async fn test_layer_lookup_by_title() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/sharing/rest/search"))
        .and(query_param(
            "q",
            "owner:gis-user AND title:KoreaAirQuality AND type:\"Feature Service\"",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 1,
            "results": [{
                "id": "abc123",
                "title": "KoreaAirQuality",
                "owner": "gis-user",
                "url": format!("{}/server/rest/services/KoreaAirQuality/FeatureServer", server.uri())
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = PortalSession::new(portal_settings(&server), RetryPolicy::none()).unwrap();
    let layer = FeatureLayer::open(session).await.unwrap();

    assert_eq!(layer.url(), format!("{}{}", server.uri(), LAYER_PATH));
}

#[tokio::test]
async fn test_layer_lookup_without_results_fails() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/sharing/rest/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 0, "results": []})))
        .mount(&server)
        .await;

    let session = PortalSession::new(portal_settings(&server), RetryPolicy::none()).unwrap();
    let err = FeatureLayer::open(session).await.err().unwrap();

    assert!(err.to_string().contains("Could not find feature service"));
}

#[tokio::test]
async fn test_portal_error_body_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sharing/rest/generateToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"code": 400, "message": "Unable to generate token.", "details": ["Invalid username or password."]}
        })))
        .mount(&server)
        .await;

    let err = layer(&server).fetch_current_records().await.unwrap_err();
    let message = format!("{:#}", err);

    assert!(message.contains("Invalid username or password."));
    assert!(!message.contains("hunter2"));
}

#[tokio::test]
async fn test_fetch_current_records_reads_handles_and_geometry() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_layer_query(
        &server,
        json!([
            {"attributes": {"objectid": 1, "stationname": "중구", "pm10value": "30"}, "geometry": {"x": 126.99, "y": 37.56}},
            {"attributes": {"objectid": 2, "stationname": "종로구", "pm10value": "28"}, "geometry": {"x": 127.0, "y": 37.57}},
            {"attributes": {"stationname": "no id"}}
        ]),
    )
    .await;

    let records = layer(&server).fetch_current_records().await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].handle, RecordHandle(1));
    assert_eq!(records[1].join_value("stationName"), Some("종로구"));
    assert_eq!(records[0].geometry, Some(json!({"x": 126.99, "y": 37.56})));
}

#[tokio::test]
async fn test_fetch_current_records_follows_transfer_limit() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("{}/query", LAYER_PATH)))
        .and(query_param("resultOffset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "objectIdFieldName": "objectid",
            "features": [{"attributes": {"objectid": 1, "stationname": "A"}}],
            "exceededTransferLimit": true
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/query", LAYER_PATH)))
        .and(query_param("resultOffset", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "objectIdFieldName": "objectid",
            "features": [{"attributes": {"objectid": 2, "stationname": "B"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = layer(&server).fetch_current_records().await.unwrap();

    let handles: Vec<RecordHandle> = records.iter().map(|r| r.handle).collect();
    assert_eq!(handles, vec![RecordHandle(1), RecordHandle(2)]);
}

#[tokio::test]
async fn test_rejected_token_is_regenerated_on_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sharing/rest/generateToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "portal-token",
            "expires": 4_102_444_800_000i64
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}/query", LAYER_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": {"code": 498, "message": "Invalid token.", "details": []}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_layer_query(
        &server,
        json!([{"attributes": {"objectid": 1, "stationname": "중구"}}]),
    )
    .await;

    let retry = RetryPolicy {
        max_retries: 1,
        initial_delay: std::time::Duration::ZERO,
    };
    let session = PortalSession::new(portal_settings(&server), retry).unwrap();
    let layer = FeatureLayer::with_url(session, format!("{}{}", server.uri(), LAYER_PATH));

    let records = layer.fetch_current_records().await.unwrap();

    assert_eq!(records.len(), 1);
}

fn seoul_busan_engine() -> SyncEngine {
    SyncEngine::new(
        StationRegistry::new(["Seoul", "Busan"]),
        FieldWhitelist::new(["pm10Value", "pm10Grade"]),
        JoinKey::default(),
    )
}

async fn mount_seoul_busan(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/B552584/ArpltnInforInqireSvc/getCtprvnRltmMesureDnsty"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            {"stationName": "Seoul", "pm10Value": "45", "pm10Grade": "Good", "so2Value": "0.004"}
        ]))))
        .mount(server)
        .await;
    mount_token(server).await;
    mount_layer_query(
        server,
        json!([
            {"attributes": {"objectid": 1, "stationname": "Seoul", "pm10value": "30", "pm10grade": "Moderate", "so2value": "0.003"}, "geometry": {"x": 126.97, "y": 37.56}},
            {"attributes": {"objectid": 2, "stationname": "Busan", "pm10value": "30", "pm10grade": "Moderate", "so2value": "0.002"}, "geometry": {"x": 129.07, "y": 35.17}}
        ]),
    )
    .await;
}

#[tokio::test]
async fn test_sync_cycle_commits_only_matched_whitelisted_fields() {
    let server = MockServer::start().await;
    mount_seoul_busan(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/applyEdits", LAYER_PATH)))
        .and(body_string_contains("token=portal-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "addResults": [],
            "updateResults": [{"objectId": 1, "success": true}],
            "deleteResults": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state_dir = TempDir::new().unwrap();
    let state_path = state_dir.path().join("last_cycle.json");
    let daemon = SyncDaemon::new(
        seoul_busan_engine(),
        ProviderClient::new(provider_settings(&server), RetryPolicy::none()).unwrap(),
        layer(&server),
        DaemonConfig {
            state_path: Some(state_path.clone()),
            ..DaemonConfig::default()
        },
    );

    let stats = daemon.run_sync_cycle().await.unwrap();

    assert_eq!(stats.batch.len(), 1);
    assert_eq!(stats.report.counts.unmatched, 1);
    assert!(stats.ensure_committed().is_ok());
    assert_eq!(stats.commit.as_ref().unwrap().succeeded(), 1);

    let requests = server.received_requests().await.unwrap();
    let apply = requests
        .iter()
        .find(|r| r.url.path().ends_with("/applyEdits"))
        .unwrap();
    let updates = submitted_updates(apply);
    assert_eq!(updates.len(), 1);
    let attributes = &updates[0]["attributes"];
    assert_eq!(attributes["objectid"], json!(1));
    assert_eq!(attributes["pm10value"], json!("45"));
    assert_eq!(attributes["pm10grade"], json!("Good"));
    assert_eq!(attributes["so2value"], json!("0.003"));
    assert_eq!(updates[0]["geometry"], json!({"x": 126.97, "y": 37.56}));

    let summary = CycleSummary::load(&state_path).await.unwrap().unwrap();
    assert_eq!(summary.counts.updated, 1);
    assert_eq!(summary.committed, Some(1));
    assert_eq!(summary.issues, vec!["station 'Busan' has no provider record"]);
}

#[tokio::test]
async fn test_sync_cycle_reports_rejected_records() {
    let server = MockServer::start().await;
    mount_seoul_busan(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/applyEdits", LAYER_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "updateResults": [{"objectId": 1, "success": false, "error": {"code": 1019, "description": "Object is missing."}}]
        })))
        .mount(&server)
        .await;

    let daemon = SyncDaemon::new(
        seoul_busan_engine(),
        ProviderClient::new(provider_settings(&server), RetryPolicy::none()).unwrap(),
        layer(&server),
        DaemonConfig {
            state_path: None,
            ..DaemonConfig::default()
        },
    );

    let stats = daemon.run_sync_cycle().await.unwrap();

    let commit = stats.commit.as_ref().unwrap();
    assert_eq!(commit.failed_count(), 1);
    let rejected = commit.failed().next().unwrap();
    assert_eq!(rejected.station, StationId::new("Seoul"));
    assert_eq!(rejected.error.as_deref(), Some("error 1019: Object is missing."));
    assert!(matches!(
        stats.ensure_committed(),
        Err(SyncError::CommitPartialFailure {
            attempted: 1,
            failed: 1
        })
    ));
}

#[tokio::test]
async fn test_dry_run_does_not_commit() {
    let server = MockServer::start().await;
    mount_seoul_busan(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/applyEdits", LAYER_PATH)))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let daemon = SyncDaemon::new(
        seoul_busan_engine(),
        ProviderClient::new(provider_settings(&server), RetryPolicy::none()).unwrap(),
        layer(&server),
        DaemonConfig {
            dry_run: true,
            state_path: None,
            ..DaemonConfig::default()
        },
    );

    let stats = daemon.run_sync_cycle().await.unwrap();

    assert!(stats.commit.is_none());
    assert_eq!(stats.batch.len(), 1);
    assert_eq!(
        stats.batch.records()[0].get("pm10value"),
        Some(&json!("45"))
    );
}

#[tokio::test]
async fn test_provider_outage_aborts_cycle_before_commit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/B552584/ArpltnInforInqireSvc/getCtprvnRltmMesureDnsty"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_token(&server).await;
    mount_layer_query(&server, json!([])).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/applyEdits", LAYER_PATH)))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let daemon = SyncDaemon::new(
        seoul_busan_engine(),
        ProviderClient::new(provider_settings(&server), RetryPolicy::none()).unwrap(),
        layer(&server),
        DaemonConfig {
            state_path: None,
            ..DaemonConfig::default()
        },
    );

    let err = daemon.run_sync_cycle().await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<SyncError>(),
        Some(SyncError::ProviderUnavailable(_))
    ));
}

#[tokio::test]
async fn test_empty_batch_skips_commit() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/applyEdits", LAYER_PATH)))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = layer(&server)
        .commit(&station_sync::engine::SyncBatch::default())
        .await
        .unwrap();

    assert!(result.outcomes.is_empty());
}
