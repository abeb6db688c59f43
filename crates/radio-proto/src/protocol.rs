use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which radio network a station belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Geo-restricted commercial network; playback needs the relay's token.
    Commercial,
    /// Public broadcaster; stream URLs are played directly.
    Public,
}

/// Broadcast band.  Serialised as `"AM"` / `"FM"` to match the frequency
/// directory files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Band {
    #[serde(rename = "AM")]
    Am,
    #[default]
    #[serde(rename = "FM")]
    Fm,
}

impl Band {
    pub fn label(&self) -> &'static str {
        match self {
            Band::Am => "AM",
            Band::Fm => "FM",
        }
    }

    /// Display unit for frequencies on this band.
    pub fn unit(&self) -> &'static str {
        match self {
            Band::Am => "kHz",
            Band::Fm => "MHz",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity of a station: `(network, id)` for commercial stations and
/// `(network, url)` for public ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "network", content = "key", rename_all = "lowercase")]
pub enum StationIdentity {
    Commercial(String),
    Public(String),
}

/// A selectable station.  Never mutated after construction; re-selecting a
/// station (e.g. with a different frequency) builds a new descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StationDescriptor {
    pub network: Network,
    /// Commercial station id (e.g. `"TBS"`).  `None` for public stations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Direct stream URL.  `None` for commercial stations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub name: String,
    pub band: Band,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

impl StationDescriptor {
    pub fn commercial(
        id: impl Into<String>,
        name: impl Into<String>,
        band: Band,
        frequency: Option<f64>,
        logo_url: Option<String>,
    ) -> Self {
        Self {
            network: Network::Commercial,
            id: Some(id.into()),
            url: None,
            name: name.into(),
            band,
            frequency,
            logo_url,
        }
    }

    pub fn public(url: impl Into<String>, name: impl Into<String>, band: Band) -> Self {
        Self {
            network: Network::Public,
            id: None,
            url: Some(url.into()),
            name: name.into(),
            band,
            frequency: None,
            logo_url: None,
        }
    }

    pub fn identity(&self) -> StationIdentity {
        match self.network {
            Network::Commercial => {
                StationIdentity::Commercial(self.id.clone().unwrap_or_default())
            }
            Network::Public => StationIdentity::Public(self.url.clone().unwrap_or_default()),
        }
    }

    /// A copy of this descriptor tuned to another band/frequency.
    pub fn retuned(&self, band: Band, frequency: f64) -> Self {
        Self {
            band,
            frequency: Some(frequency),
            ..self.clone()
        }
    }
}

/// One (station, band, frequency) combination eligible for sequential tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TunableEntry {
    pub station_id: String,
    pub name: String,
    pub band: Band,
    pub frequency: f64,
    #[serde(default)]
    pub logo_url: Option<String>,
}

impl TunableEntry {
    pub fn to_descriptor(&self) -> StationDescriptor {
        StationDescriptor::commercial(
            self.station_id.clone(),
            self.name.clone(),
            self.band,
            Some(self.frequency),
            self.logo_url.clone(),
        )
    }
}

// ── Relay wire bodies ─────────────────────────────────────────────────────────

/// `200` body of `GET /auth`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub region_code: String,
}

/// A playback token plus the region it was issued for.  Lives in memory
/// only; it is never written to the state file.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub token: String,
    pub region_code: String,
    pub issued_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn from_response(resp: AuthResponse, issued_at: DateTime<Utc>) -> Self {
        Self {
            token: resp.token,
            region_code: resp.region_code,
            issued_at,
        }
    }

    /// True while younger than `ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.issued_at) < ttl
    }
}

/// `200` body of `GET /stream`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamResponse {
    pub stream_uri: String,
}

/// Body of every non-2xx relay response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}
