//! Handshake, playlist and HTTP-surface tests against a mock origin.
//!
//! One `wiremock::MockServer` stands in for both the auth origin and the
//! streaming tier.

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use radio_proto::config::Config;
use radio_proto::error::RadioError;
use radio_proto::protocol::{AuthResponse, ErrorBody, StreamResponse};
use radio_relay::auth::partial_key;
use radio_relay::http::{router, RelayState};
use tower::ServiceExt;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.origin.auth_base_url = server.uri();
    config.origin.stream_base_url = server.uri();
    config
}

fn relay_for(server: &MockServer) -> RelayState {
    RelayState::with_client(config_for(server), reqwest::Client::new())
}

fn auth1_ok() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("X-Radiko-AuthToken", "tok-123")
        .insert_header("X-Radiko-KeyOffset", "8")
        .insert_header("X-Radiko-KeyLength", "16")
}

async fn mount_auth_ok(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v2/api/auth1"))
        .respond_with(auth1_ok())
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/api/auth2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("JP27,大阪府,OSAKA JAPAN\r\n"))
        .mount(server)
        .await;
}

async fn body_json<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_leg1_failure_never_attempts_leg2() {
    let server = MockServer::start().await;
    Mock::given(path("/v2/api/auth1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/v2/api/auth2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let err = relay.auth.authenticate(Some("203.0.113.7")).await.unwrap_err();
    assert!(
        matches!(err, RadioError::Upstream { ref leg, .. } if leg == "auth1"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_missing_token_header_is_bad_response() {
    let server = MockServer::start().await;
    Mock::given(path("/v2/api/auth1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Radiko-KeyOffset", "0")
                .insert_header("X-Radiko-KeyLength", "16"),
        )
        .mount(&server)
        .await;
    Mock::given(path("/v2/api/auth2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let err = relay.auth.authenticate(Some("203.0.113.7")).await.unwrap_err();
    assert!(matches!(err, RadioError::BadResponse(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_handshake_forwards_ip_and_partial_key() {
    let server = MockServer::start().await;
    let expected_key = partial_key(8, 16).unwrap();

    Mock::given(path("/v2/api/auth1"))
        .and(header("X-Real-IP", "203.0.113.7"))
        .and(header("X-Radiko-App", "pc_html5"))
        .respond_with(auth1_ok())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/v2/api/auth2"))
        .and(header("X-Real-IP", "203.0.113.7"))
        .and(header("X-Radiko-AuthToken", "tok-123"))
        .and(header("X-Radiko-PartialKey", expected_key.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string("JP27,大阪府,OSAKA JAPAN\r\n"))
        .expect(1)
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let grant = relay.auth.authenticate(Some("203.0.113.7")).await.unwrap();
    assert_eq!(
        grant,
        AuthResponse {
            token: "tok-123".into(),
            region_code: "JP27".into(),
        }
    );
}

#[tokio::test]
async fn test_leg2_failure_is_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(path("/v2/api/auth1"))
        .respond_with(auth1_ok())
        .mount(&server)
        .await;
    Mock::given(path("/v2/api/auth2"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let err = relay.auth.authenticate(None).await.unwrap_err();
    assert!(matches!(err, RadioError::Upstream { ref leg, .. } if leg == "auth2"));
}

#[tokio::test]
async fn test_empty_area_falls_back_to_default_region() {
    let server = MockServer::start().await;
    Mock::given(path("/v2/api/auth1"))
        .respond_with(auth1_ok())
        .mount(&server)
        .await;
    Mock::given(path("/v2/api/auth2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("   "))
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let grant = relay.auth.authenticate(Some("198.51.100.1")).await.unwrap();
    assert_eq!(grant.region_code, "JP13");
}

#[tokio::test]
async fn test_concurrent_callers_share_one_handshake() {
    let server = MockServer::start().await;
    Mock::given(path("/v2/api/auth1"))
        .respond_with(auth1_ok().set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/v2/api/auth2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("JP13,東京都,tokyo Japan"))
        .expect(1)
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let (a, b) = tokio::join!(
        relay.auth.authenticate(Some("203.0.113.7")),
        relay.auth.authenticate(Some("203.0.113.7")),
    );
    assert_eq!(a.unwrap(), b.unwrap());
}

#[tokio::test]
async fn test_sequential_calls_run_fresh_handshakes() {
    let server = MockServer::start().await;
    Mock::given(path("/v2/api/auth1"))
        .respond_with(auth1_ok())
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(path("/v2/api/auth2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("JP13"))
        .expect(2)
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    relay.auth.authenticate(Some("203.0.113.7")).await.unwrap();
    relay.auth.authenticate(Some("203.0.113.7")).await.unwrap();
}

#[tokio::test]
async fn test_playlist_resolves_first_variant() {
    let server = MockServer::start().await;
    Mock::given(path("/so/playlist.m3u8"))
        .and(query_param("station_id", "TBS"))
        .and(header("X-Radiko-AuthToken", "tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=52973\nhttps://edge.example.invalid/tbs/chunklist.m3u8\n",
        ))
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let uri = relay.playlist.resolve("TBS", "tok-123").await.unwrap();
    assert_eq!(uri, "https://edge.example.invalid/tbs/chunklist.m3u8");
}

#[tokio::test]
async fn test_playlist_without_variant_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(path("/so/playlist.m3u8"))
        .respond_with(ResponseTemplate::new(200).set_body_string("#EXTM3U\n#EXT-X-ENDLIST\n"))
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let err = relay.playlist.resolve("TBS", "tok").await.unwrap_err();
    assert_eq!(err, RadioError::PlaylistNotFound("TBS".into()));
}

#[tokio::test]
async fn test_playlist_http_error_is_upstream() {
    let server = MockServer::start().await;
    Mock::given(path("/so/playlist.m3u8"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let err = relay.playlist.resolve("TBS", "tok").await.unwrap_err();
    assert!(matches!(err, RadioError::Upstream { .. }));
}

// ── HTTP surface ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_auth_endpoint_requires_ip() {
    let server = MockServer::start().await;
    let app = router(relay_for(&server));

    let resp = app
        .oneshot(Request::get("/auth").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = body_json(resp).await;
    assert!(body.error.contains("ip"));
}

#[tokio::test]
async fn test_auth_endpoint_sets_cache_lifetime() {
    let server = MockServer::start().await;
    mount_auth_ok(&server).await;
    let app = router(relay_for(&server));

    let resp = app
        .oneshot(
            Request::get("/auth?ip=203.0.113.7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("cache-control").unwrap(),
        "private, max-age=480"
    );
    let grant: AuthResponse = body_json(resp).await;
    assert_eq!(grant.token, "tok-123");
    assert_eq!(grant.region_code, "JP27");
}

#[tokio::test]
async fn test_auth_endpoint_maps_upstream_failure_to_502() {
    let server = MockServer::start().await;
    Mock::given(path("/v2/api/auth1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let app = router(relay_for(&server));

    let resp = app
        .oneshot(
            Request::get("/auth?ip=203.0.113.7")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let body: ErrorBody = body_json(resp).await;
    assert!(body.error.contains("auth1"));
}

#[tokio::test]
async fn test_stream_endpoint_runs_handshake_then_playlist() {
    let server = MockServer::start().await;
    mount_auth_ok(&server).await;
    Mock::given(path("/so/playlist.m3u8"))
        .and(query_param("station_id", "QRR"))
        .and(header("X-Radiko-AuthToken", "tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nhttps://edge.example.invalid/qrr.m3u8\n",
        ))
        .expect(1)
        .mount(&server)
        .await;
    let app = router(relay_for(&server));

    let resp = app
        .oneshot(
            Request::get("/stream?station_id=QRR")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: StreamResponse = body_json(resp).await;
    assert_eq!(body.stream_uri, "https://edge.example.invalid/qrr.m3u8");
}

#[tokio::test]
async fn test_stream_endpoint_requires_station_id() {
    let server = MockServer::start().await;
    let app = router(relay_for(&server));

    let resp = app
        .oneshot(Request::get("/stream").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_origin_passthrough_streams_station_list() {
    let server = MockServer::start().await;
    let xml = "<stations><station><id>TBS</id><name>TBS Radio</name></station></stations>";
    Mock::given(path("/v3/station/list/JP13.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/xml")
                .set_body_string(xml),
        )
        .mount(&server)
        .await;
    let app = router(relay_for(&server));

    let resp = app
        .oneshot(
            Request::get("/radiko/v3/station/list/JP13.xml")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-type").unwrap(), "application/xml");
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(std::str::from_utf8(&bytes).unwrap(), xml);
}

#[tokio::test]
async fn test_frequencies_are_served_from_directory() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("JP13.json"), r#"{"TBS":{"type":"AM"}}"#).unwrap();

    let mut config = config_for(&server);
    config.paths.frequencies_dir = dir.path().to_path_buf();
    let app = router(RelayState::with_client(config, reqwest::Client::new()));

    let ok = app
        .clone()
        .oneshot(
            Request::get("/frequencies/JP13.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let missing = app
        .clone()
        .oneshot(
            Request::get("/frequencies/JP01.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let bad = app
        .oneshot(
            Request::get("/frequencies/JP13.txt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_abandoned_handshake_result_is_not_replayed() {
    let server = MockServer::start().await;
    Mock::given(path("/v2/api/auth1"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(200)))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    let relay = relay_for(&server);
    let auth = relay.auth.clone();
    let waiter = tokio::spawn(async move { auth.authenticate(Some("203.0.113.7")).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    waiter.abort();

    // Let the abandoned handshake fail against the origin.
    tokio::time::sleep(Duration::from_millis(400)).await;
    mount_auth_ok(&server).await;

    let grant = relay.auth.authenticate(Some("203.0.113.7")).await.unwrap();
    assert_eq!(grant.token, "tok-123");
    assert_eq!(grant.region_code, "JP27");
}
