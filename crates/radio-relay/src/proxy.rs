/// Byte pass-through to the commercial network's hosts.
///
/// Serves `GET /radiko/*path` (station directory XML and other origin
/// resources) and `GET /playlist` (streaming-tier master playlists).
/// Each request opens **one** upstream request through the relay's shared
/// `reqwest::Client` and streams the body straight back, so the player sees
/// the origin's bytes while every upstream call leaves from the relay's
/// address.
///
/// Design notes
/// ─────────────
/// • Query strings are forwarded verbatim.
/// • `/radiko/*` forwards the caller's request headers minus `host`,
///   `origin`, `referer` and hop-by-hop headers; `/playlist` forwards only
///   the auth token header.
/// • Upstream status codes are passed through unchanged; a connect failure
///   becomes `502`.
use axum::body::Body;
use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::auth::HEADER_AUTH_TOKEN;
use crate::http::RelayState;

/// Request headers never sent upstream.
const DROPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "origin",
    "referer",
    "connection",
    "content-length",
    "transfer-encoding",
    "accept-encoding",
];

/// Response headers copied back to the caller.
fn forward_response_header(name: &str) -> bool {
    name == "content-type"
        || name == "cache-control"
        || name == "last-modified"
        || name == "etag"
        || name.starts_with("x-radiko-")
}

// ── Route handlers ────────────────────────────────────────────────────────────

pub async fn origin_passthrough(
    State(state): State<RelayState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let base = format!(
        "{}/{}",
        state.config.origin.auth_base_url,
        path.trim_start_matches('/')
    );
    let url = with_query(base, query.as_deref());

    let mut forwarded = HeaderMap::new();
    for (name, value) in headers.iter() {
        if !DROPPED_REQUEST_HEADERS.contains(&name.as_str()) {
            forwarded.append(name.clone(), value.clone());
        }
    }

    forward(&state, url, forwarded).await
}

pub async fn playlist_passthrough(
    State(state): State<RelayState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let url = with_query(state.playlist.playlist_url(), query.as_deref());

    let mut forwarded = HeaderMap::new();
    let token = headers
        .get(HEADER_AUTH_TOKEN)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(""));
    forwarded.insert(HeaderName::from_static("x-radiko-authtoken"), token);

    forward(&state, url, forwarded).await
}

fn with_query(base: String, query: Option<&str>) -> String {
    match query {
        Some(q) if !q.is_empty() => format!("{}?{}", base, q),
        _ => base,
    }
}

async fn forward(state: &RelayState, url: String, headers: HeaderMap) -> Response {
    info!("proxy: opening upstream {}", url);

    let upstream = match state.client.get(&url).headers(headers).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!("proxy: upstream connect failed for {}: {}", url, e);
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let upstream_status = upstream.status();
    if !upstream_status.is_success() {
        warn!("proxy: upstream returned {} for {}", upstream_status, url);
    }

    let mut builder = Response::builder().status(upstream_status);
    for (name, value) in upstream.headers() {
        if forward_response_header(name.as_str()) {
            builder = builder.header(name, value);
        }
    }

    // Stream bytes from upstream directly to the caller
    let byte_stream = upstream.bytes_stream();
    let reader = tokio_util::io::StreamReader::new(
        byte_stream.map(|result| result.map_err(std::io::Error::other)),
    );
    let body = Body::from_stream(ReaderStream::new(reader));

    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response())
}
