use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub origin: OriginConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Where the relay's own HTTP surface listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds clients may cache an `/auth` answer.  Kept below the
    /// upstream token's real lifetime.
    #[serde(default = "default_token_max_age")]
    pub token_max_age_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Upstream hosts of the commercial network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Base of the handshake legs and the station directory.
    #[serde(default = "default_auth_base_url")]
    pub auth_base_url: String,
    /// Base of the streaming tier serving master playlists.
    #[serde(default = "default_stream_base_url")]
    pub stream_base_url: String,
    /// Region used when the second handshake leg has no parsable area.
    #[serde(default = "default_region")]
    pub fallback_region: String,
}

/// Client-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_relay_url")]
    pub relay_url: String,
    #[serde(default = "default_public_directory_url")]
    pub public_directory_url: String,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// How long a fetched playback token is treated as fresh.
    #[serde(default = "default_token_max_age")]
    pub token_ttl_secs: u64,
    /// Address the relay impersonates on this player's behalf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory of `<region>.json` frequency directory files.
    #[serde(default = "platform::default_frequencies_dir")]
    pub frequencies_dir: PathBuf,
    /// Relay log file.
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            token_max_age_secs: default_token_max_age(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            auth_base_url: default_auth_base_url(),
            stream_base_url: default_stream_base_url(),
            fallback_region: default_region(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            relay_url: default_relay_url(),
            public_directory_url: default_public_directory_url(),
            state_file: default_state_file(),
            token_ttl_secs: default_token_max_age(),
            client_ip: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            frequencies_dir: platform::default_frequencies_dir(),
            log_file: default_log_file(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::RELAY_HTTP_PORT
}

fn default_token_max_age() -> u64 {
    // 8 minutes
    480
}

fn default_request_timeout() -> u64 {
    15
}

fn default_auth_base_url() -> String {
    "https://radiko.jp".to_string()
}

fn default_stream_base_url() -> String {
    "https://si-f-radiko.smartstream.ne.jp".to_string()
}

pub fn default_region() -> String {
    "JP13".to_string()
}

fn default_relay_url() -> String {
    platform::relay_base_url()
}

fn default_public_directory_url() -> String {
    "https://www.nhk.or.jp/radio/config/config_web.xml".to_string()
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("player_state.json")
}

fn default_log_file() -> PathBuf {
    platform::data_dir().join("relay.log")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
