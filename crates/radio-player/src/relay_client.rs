//! HTTP client for the relay, plus the in-memory token cache.
//!
//! All commercial-network traffic goes through the relay so the origin sees
//! one address; only the public broadcaster's directory is fetched directly.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use radio_proto::config::PlayerConfig;
use radio_proto::error::{RadioError, Result};
use radio_proto::protocol::{AuthResponse, AuthSession, ErrorBody, StreamResponse};

use crate::directory::{
    parse_frequency_directory, parse_public_directory, parse_station_list, CommercialStation,
    FrequencyDirectory, PublicArea,
};

#[derive(Clone)]
pub struct RelayClient {
    client: Client,
    base_url: String,
    public_directory_url: String,
}

impl RelayClient {
    pub fn new(config: &PlayerConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self::with_client(
            client,
            config.relay_url.clone(),
            config.public_directory_url.clone(),
        ))
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        public_directory_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            public_directory_url: public_directory_url.into(),
        }
    }

    pub async fn authenticate(&self, client_ip: Option<&str>) -> Result<AuthResponse> {
        let mut query = Vec::new();
        if let Some(ip) = client_ip {
            query.push(("ip", ip));
        }
        let body = self.get_text("relay auth", "/auth", &query).await?;
        decode_json(&body, "relay auth")
    }

    /// Ask the relay to authenticate and resolve `station_id` in one go.
    pub async fn stream_uri(&self, station_id: &str, client_ip: Option<&str>) -> Result<String> {
        let mut query = vec![("station_id", station_id)];
        if let Some(ip) = client_ip {
            query.push(("ip", ip));
        }
        let body = self.get_text("relay stream", "/stream", &query).await?;
        let resp: StreamResponse = decode_json(&body, "relay stream")?;
        Ok(resp.stream_uri)
    }

    pub async fn station_list(&self, region: &str) -> Result<Vec<CommercialStation>> {
        let path = format!("/radiko/v3/station/list/{}.xml", region);
        let xml = self.get_text("station list", &path, &[]).await?;
        parse_station_list(&xml)
    }

    pub async fn frequencies(&self, region: &str) -> Result<FrequencyDirectory> {
        let path = format!("/frequencies/{}.json", region);
        let json = self.get_text("frequencies", &path, &[]).await?;
        parse_frequency_directory(&json)
    }

    pub async fn public_directory(&self) -> Result<Vec<PublicArea>> {
        let resp = self
            .client
            .get(&self.public_directory_url)
            .send()
            .await
            .map_err(|e| RadioError::upstream("public directory", e))?;
        let xml = read_body(resp, "public directory").await?;
        parse_public_directory(&xml)
    }

    async fn get_text(&self, leg: &str, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        debug!("relay client: GET {}", url);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| RadioError::upstream(leg, e))?;
        read_body(resp, leg).await
    }
}

async fn read_body(resp: reqwest::Response, leg: &str) -> Result<String> {
    let status = resp.status();
    let text = resp.text().await.map_err(|e| RadioError::upstream(leg, e))?;
    if status == StatusCode::NOT_FOUND {
        return Err(RadioError::not_found(leg.to_string()));
    }
    if !status.is_success() {
        let detail = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or_else(|_| format!("HTTP {}", status));
        warn!("relay client: {} returned {}: {}", leg, status, detail);
        return Err(RadioError::upstream(leg, detail));
    }
    Ok(text)
}

fn decode_json<T: serde::de::DeserializeOwned>(body: &str, leg: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| RadioError::bad_response(format!("{}: {}", leg, e)))
}

// ── Token cache ───────────────────────────────────────────────────────────────

/// Keeps the last auth answer while it is fresh.  A failed refresh keeps
/// serving the previous session; only with nothing cached does it fail.
pub struct TokenCache {
    relay: RelayClient,
    client_ip: Option<String>,
    ttl: chrono::Duration,
    session: Option<AuthSession>,
}

impl TokenCache {
    pub fn new(relay: RelayClient, client_ip: Option<String>, ttl_secs: u64) -> Self {
        Self {
            relay,
            client_ip,
            ttl: ttl_from_secs(ttl_secs),
            session: None,
        }
    }

    pub fn cached(&self) -> Option<&AuthSession> {
        self.session.as_ref()
    }

    pub async fn get_or_refresh(&mut self, now: DateTime<Utc>) -> Result<AuthSession> {
        if let Some(session) = self.session.as_ref().filter(|s| s.is_fresh(now, self.ttl)) {
            return Ok(session.clone());
        }

        match self.relay.authenticate(self.client_ip.as_deref()).await {
            Ok(resp) => {
                let session = AuthSession::from_response(resp, now);
                info!("token cache: refreshed, region={}", session.region_code);
                self.session = Some(session.clone());
                Ok(session)
            }
            Err(e) => match &self.session {
                Some(stale) => {
                    warn!("token cache: refresh failed, keeping cached token: {}", e);
                    Ok(stale.clone())
                }
                None => Err(e),
            },
        }
    }
}

/// Configured lifetimes too large for `chrono` saturate instead of panicking.
fn ttl_from_secs(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}
