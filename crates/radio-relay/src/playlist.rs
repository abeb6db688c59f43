//! Station master-playlist resolution on the commercial streaming tier.
//!
//! Must share the relay's HTTP client with [`AuthRelay`](crate::auth::AuthRelay):
//! the streaming tier rejects tokens presented from an address other than the
//! one that obtained them.

use reqwest::Client;
use tracing::{debug, warn};

use radio_proto::error::{RadioError, Result};

use crate::auth::HEADER_AUTH_TOKEN;

/// Fixed listener-session id the HTML5 player sends.
const LSID: &str = "11cbd3124cef9e8004f9b5e9f77b66";
const VARIANT_TAG: &str = "#EXT-X-STREAM-INF";

#[derive(Clone)]
pub struct PlaylistResolver {
    client: Client,
    stream_base_url: String,
}

impl PlaylistResolver {
    pub fn new(client: Client, stream_base_url: impl Into<String>) -> Self {
        Self {
            client,
            stream_base_url: stream_base_url.into(),
        }
    }

    pub fn playlist_url(&self) -> String {
        format!("{}/so/playlist.m3u8", self.stream_base_url)
    }

    /// Fetch `station_id`'s master playlist and return its first variant URI.
    pub async fn resolve(&self, station_id: &str, token: &str) -> Result<String> {
        let resp = self
            .client
            .get(self.playlist_url())
            .query(&[
                ("station_id", station_id),
                ("type", "b"),
                ("l", "15"),
                ("lsid", LSID),
            ])
            .header(HEADER_AUTH_TOKEN, token)
            .send()
            .await
            .map_err(|e| RadioError::upstream("playlist", e))?;

        let status = resp.status();
        if !status.is_success() {
            warn!("playlist: {} returned {}", station_id, status);
            return Err(RadioError::upstream("playlist", format!("HTTP {}", status)));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| RadioError::upstream("playlist", e))?;

        match first_variant_uri(&text) {
            Some(uri) => {
                debug!("playlist: {} → {}", station_id, uri);
                Ok(uri.to_string())
            }
            None => Err(RadioError::PlaylistNotFound(station_id.to_string())),
        }
    }
}

/// First absolute URI line that follows a variant-stream tag.
///
/// Blank lines and other tags between the tag and its URI are skipped; a
/// relative URI ends that variant without matching.
pub fn first_variant_uri(playlist: &str) -> Option<&str> {
    let mut after_variant_tag = false;
    for line in playlist.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(VARIANT_TAG) {
            after_variant_tag = true;
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        if after_variant_tag && line.starts_with("http") {
            return Some(line);
        }
        after_variant_tag = false;
    }
    None
}
