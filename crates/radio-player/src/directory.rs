//! Station directories: the commercial network's station list (XML), the
//! per-region frequency map (JSON) and the public broadcaster's config
//! (XML).
//!
//! Missing elements fall back to empty/zero values instead of failing the
//! whole document.

use std::collections::HashMap;

use radio_proto::error::{RadioError, Result};
use radio_proto::protocol::{Band, StationDescriptor};
use serde::Deserialize;

// ── Commercial station list ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommercialStation {
    pub id: String,
    pub name: String,
    pub ascii_name: String,
    pub ruby: String,
    pub areafree: bool,
    pub timefree: bool,
    pub logos: Vec<String>,
    pub banner: String,
    pub href: String,
    pub simul_max_delay: u32,
    pub tf_max_delay: u32,
}

impl CommercialStation {
    pub fn logo_url(&self) -> Option<&str> {
        self.logos.first().map(String::as_str).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct StationListXml {
    #[serde(rename = "station", default)]
    stations: Vec<StationXml>,
}

#[derive(Debug, Deserialize)]
struct StationXml {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    ascii_name: String,
    #[serde(default)]
    ruby: String,
    #[serde(default)]
    areafree: String,
    #[serde(default)]
    timefree: String,
    #[serde(rename = "logo", default)]
    logos: Vec<LogoXml>,
    #[serde(default)]
    banner: String,
    #[serde(default)]
    href: String,
    #[serde(default)]
    simul_max_delay: String,
    #[serde(default)]
    tf_max_delay: String,
}

#[derive(Debug, Deserialize)]
struct LogoXml {
    #[serde(rename = "$text", default)]
    url: String,
}

fn number(text: &str) -> u32 {
    text.trim().parse().unwrap_or(0)
}

impl From<StationXml> for CommercialStation {
    fn from(x: StationXml) -> Self {
        Self {
            id: x.id.trim().to_string(),
            name: x.name.trim().to_string(),
            ascii_name: x.ascii_name,
            ruby: x.ruby,
            areafree: number(&x.areafree) == 1,
            timefree: number(&x.timefree) == 1,
            logos: x.logos.into_iter().map(|l| l.url.trim().to_string()).collect(),
            banner: x.banner,
            href: x.href,
            simul_max_delay: number(&x.simul_max_delay),
            tf_max_delay: number(&x.tf_max_delay),
        }
    }
}

pub fn parse_station_list(xml: &str) -> Result<Vec<CommercialStation>> {
    let list: StationListXml = quick_xml::de::from_str(xml)
        .map_err(|e| RadioError::bad_response(format!("station list: {}", e)))?;
    Ok(list
        .stations
        .into_iter()
        .map(CommercialStation::from)
        .filter(|s| !s.id.is_empty())
        .collect())
}

// ── Frequency directory ───────────────────────────────────────────────────────

/// Frequencies keyed by commercial station id.
pub type FrequencyDirectory = HashMap<String, StationFrequencies>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StationFrequencies {
    #[serde(rename = "type")]
    pub band: Band,
    #[serde(default)]
    pub frequencies_fm: Option<Vec<AreaFrequency>>,
    #[serde(default)]
    pub frequencies_am: Option<Vec<AreaFrequency>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AreaFrequency {
    #[serde(default)]
    pub area: Vec<String>,
    pub frequency: f64,
    #[serde(default)]
    pub primary: bool,
}

impl StationFrequencies {
    pub fn areas(&self, band: Band) -> &[AreaFrequency] {
        let list = match band {
            Band::Fm => &self.frequencies_fm,
            Band::Am => &self.frequencies_am,
        };
        list.as_deref().unwrap_or_default()
    }

    /// The transmitter flagged `primary` on `band`.
    pub fn primary(&self, band: Band) -> Option<&AreaFrequency> {
        self.areas(band).iter().find(|a| a.primary)
    }
}

pub fn parse_frequency_directory(json: &str) -> Result<FrequencyDirectory> {
    serde_json::from_str(json)
        .map_err(|e| RadioError::bad_response(format!("frequency directory: {}", e)))
}

// ── Public broadcaster ────────────────────────────────────────────────────────

/// One region of the public broadcaster: two AM-equivalent channels and one
/// FM channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PublicArea {
    pub areajp: String,
    pub area: String,
    pub apikey: u32,
    pub areakey: u32,
    pub r1hls: String,
    pub r2hls: String,
    pub fmhls: String,
}

impl PublicArea {
    /// The region's channels as selectable stations, skipping empty URLs.
    pub fn stations(&self) -> Vec<StationDescriptor> {
        [
            (&self.r1hls, "R1", Band::Am),
            (&self.r2hls, "R2", Band::Am),
            (&self.fmhls, "FM", Band::Fm),
        ]
        .into_iter()
        .filter(|(url, _, _)| !url.is_empty())
        .map(|(url, channel, band)| {
            StationDescriptor::public(url.clone(), format!("{} {}", channel, self.areajp), band)
        })
        .collect()
    }
}

#[derive(Debug, Deserialize)]
struct PublicConfigXml {
    #[serde(default)]
    stream_url: StreamUrlXml,
}

#[derive(Debug, Default, Deserialize)]
struct StreamUrlXml {
    #[serde(rename = "data", default)]
    data: Vec<PublicAreaXml>,
}

#[derive(Debug, Deserialize)]
struct PublicAreaXml {
    #[serde(default)]
    areajp: String,
    #[serde(default)]
    area: String,
    #[serde(default)]
    apikey: String,
    #[serde(default)]
    areakey: String,
    #[serde(default)]
    r1hls: String,
    #[serde(default)]
    r2hls: String,
    #[serde(default)]
    fmhls: String,
}

pub fn parse_public_directory(xml: &str) -> Result<Vec<PublicArea>> {
    let config: PublicConfigXml = quick_xml::de::from_str(xml)
        .map_err(|e| RadioError::bad_response(format!("public directory: {}", e)))?;
    Ok(config
        .stream_url
        .data
        .into_iter()
        .map(|d| PublicArea {
            areajp: d.areajp.trim().to_string(),
            area: d.area.trim().to_string(),
            apikey: number(&d.apikey),
            areakey: number(&d.areakey),
            r1hls: d.r1hls.trim().to_string(),
            r2hls: d.r2hls.trim().to_string(),
            fmhls: d.fmhls.trim().to_string(),
        })
        .collect())
}
