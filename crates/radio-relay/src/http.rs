use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use reqwest::Client;
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use radio_proto::config::Config;
use radio_proto::error::RadioError;
use radio_proto::protocol::{ErrorBody, StreamResponse};

use crate::auth::AuthRelay;
use crate::playlist::PlaylistResolver;
use crate::proxy;

/// Everything a request handler needs.  The auth relay, the playlist
/// resolver and the pass-through proxy all hold clones of the same
/// `reqwest::Client`, so every upstream call shares one connection pool
/// and one egress path.
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<Config>,
    pub client: Client,
    pub auth: AuthRelay,
    pub playlist: PlaylistResolver,
}

impl RelayState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.relay.request_timeout_secs))
            // Follow redirects (the streaming tier bounces between edges)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: Config, client: Client) -> Self {
        let auth = AuthRelay::new(client.clone(), config.origin.clone());
        let playlist = PlaylistResolver::new(client.clone(), config.origin.stream_base_url.clone());
        Self {
            config: Arc::new(config),
            client,
            auth,
            playlist,
        }
    }
}

/// Relay errors as HTTP responses: `502` for anything the origin did wrong,
/// `404` for missing local resources.
pub struct ApiError(pub RadioError);

impl From<RadioError> for ApiError {
    fn from(e: RadioError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RadioError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_GATEWAY,
        };
        error_response(status, self.0.to_string())
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct AuthQuery {
    ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    station_id: Option<String>,
    ip: Option<String>,
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/auth", get(authenticate))
        .route("/stream", get(stream_uri))
        .route("/playlist", get(proxy::playlist_passthrough))
        .route("/radiko/*path", get(proxy::origin_passthrough))
        .route("/frequencies/:file", get(frequencies))
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .with_state(state)
}

pub fn start_server(
    bind_address: String,
    port: u16,
    state: RelayState,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind relay to {}: {}", addr, e);
                return;
            }
        };

        info!("Relay listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("Relay server error: {}", e);
        }
    })
}

async fn authenticate(
    State(state): State<RelayState>,
    Query(query): Query<AuthQuery>,
) -> Response {
    let Some(ip) = query.ip.filter(|ip| !ip.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing ip query parameter");
    };

    info!("HTTP API: auth for {}", ip);
    match state.auth.authenticate(Some(ip.trim())).await {
        Ok(grant) => {
            let cache = format!("private, max-age={}", state.config.relay.token_max_age_secs);
            ([(header::CACHE_CONTROL, cache)], Json(grant)).into_response()
        }
        Err(e) => {
            warn!("HTTP API: auth failed: {}", e);
            ApiError(e).into_response()
        }
    }
}

/// Handshake and playlist lookup in one request, so both happen from the
/// same egress within the token's lifetime.
async fn stream_uri(
    State(state): State<RelayState>,
    Query(query): Query<StreamQuery>,
) -> Response {
    let Some(station_id) = query.station_id.filter(|s| !s.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing station_id query parameter");
    };
    let ip = query.ip.filter(|ip| !ip.trim().is_empty());

    info!("HTTP API: stream for {}", station_id);
    let result: Result<String, RadioError> = async {
        let grant = state.auth.authenticate(ip.as_deref()).await?;
        state.playlist.resolve(&station_id, &grant.token).await
    }
    .await;

    match result {
        Ok(stream_uri) => Json(StreamResponse { stream_uri }).into_response(),
        Err(e) => {
            warn!("HTTP API: stream for {} failed: {}", station_id, e);
            ApiError(e).into_response()
        }
    }
}

async fn frequencies(State(state): State<RelayState>, Path(file): Path<String>) -> Response {
    let Some(region) = file.strip_suffix(".json").filter(|r| is_region_name(r)) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid frequency directory name");
    };

    let path = state.config.paths.frequencies_dir.join(format!("{}.json", region));
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => {
            warn!("HTTP API: frequency directory {:?}: {}", path, e);
            ApiError(RadioError::not_found(format!("frequency directory {}", region)))
                .into_response()
        }
    }
}

fn is_region_name(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_name_validation() {
        assert!(is_region_name("JP13"));
        assert!(is_region_name("all"));
        assert!(!is_region_name(""));
        assert!(!is_region_name("../etc"));
        assert!(!is_region_name("JP 13"));
    }

    #[test]
    fn test_api_error_status() {
        let upstream = ApiError(RadioError::upstream("auth1", "HTTP 500")).into_response();
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
        let missing = ApiError(RadioError::not_found("x")).into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
