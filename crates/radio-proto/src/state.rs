use crate::presets::{ChannelPreset, ChannelPresetStore};
use crate::protocol::{Band, StationDescriptor};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Maximum number of stations kept in the recent-station history.
pub const HISTORY_LIMIT: usize = 20;

/// A user-chosen alternative frequency for a station broadcasting from
/// several transmitters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CustomFrequency {
    pub station_id: String,
    pub band: Band,
    pub frequency: f64,
}

/// Key bindings, stored as normalised key names (see [`normalize_key`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct HotkeyBindings {
    pub play_pause: String,
    pub stop: String,
    pub prev_or_tune_down: String,
    pub next_or_tune_up: String,
    pub volume_up: String,
    pub volume_down: String,
    pub mute: String,
    pub seek_back: String,
    pub seek_forward: String,
    pub toggle_pip: String,
    pub toggle_fullscreen: String,
    pub mode_file: String,
    pub mode_radio: String,
    pub mode_screen: String,
    pub mode_aux: String,
    pub open_settings: String,
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        Self {
            play_pause: "space".into(),
            stop: "s".into(),
            prev_or_tune_down: "arrowleft".into(),
            next_or_tune_up: "arrowright".into(),
            volume_up: "arrowup".into(),
            volume_down: "arrowdown".into(),
            mute: "m".into(),
            seek_back: "j".into(),
            seek_forward: "l".into(),
            toggle_pip: "i".into(),
            toggle_fullscreen: "f".into(),
            mode_file: "e".into(),
            mode_radio: "r".into(),
            mode_screen: "t".into(),
            mode_aux: "y".into(),
            open_settings: "/".into(),
        }
    }
}

/// Map a raw key name (`" "`, `"ArrowLeft"`, `"K"`) to the stored form.
pub fn normalize_key(key: &str) -> String {
    match key {
        " " => "space".into(),
        "ArrowLeft" => "arrowleft".into(),
        "ArrowRight" => "arrowright".into(),
        "ArrowUp" => "arrowup".into(),
        "ArrowDown" => "arrowdown".into(),
        "Enter" => "enter".into(),
        "Escape" => "escape".into(),
        "Backspace" => "backspace".into(),
        "Tab" => "tab".into(),
        "Delete" => "delete".into(),
        other => other.to_lowercase(),
    }
}

/// Everything the player keeps across restarts.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersistentState {
    pub last_station: Option<StationDescriptor>,
    pub history: Vec<StationDescriptor>,
    pub presets: ChannelPresetStore,
    pub custom_frequencies: Vec<CustomFrequency>,
    pub hotkeys: HotkeyBindings,
}

impl PersistentState {
    /// Decode leniently: each field (and each list element) that fails to
    /// parse is treated as absent instead of discarding the whole file.
    pub fn from_json_lenient(content: &str) -> Self {
        let value: serde_json::Value = match serde_json::from_str(content) {
            Ok(v) => v,
            Err(e) => {
                warn!("state: unreadable state file, using defaults: {}", e);
                return Self::default();
            }
        };
        let Some(obj) = value.as_object() else {
            warn!("state: state file is not an object, using defaults");
            return Self::default();
        };

        let mut history: Vec<StationDescriptor> = decode_list(obj.get("history"));
        history.truncate(HISTORY_LIMIT);

        Self {
            last_station: decode_field(obj.get("lastStation")),
            history,
            presets: ChannelPresetStore::from_presets(decode_list::<ChannelPreset>(
                obj.get("presets"),
            )),
            custom_frequencies: decode_list(obj.get("customFrequencies")),
            hotkeys: decode_field(obj.get("hotkeys")).unwrap_or_default(),
        }
    }

    /// Put `station` at the front of the history, dropping any older entry
    /// with the same identity and anything past [`HISTORY_LIMIT`].
    pub fn record_history(&mut self, station: &StationDescriptor) {
        let identity = station.identity();
        self.history.retain(|s| s.identity() != identity);
        self.history.insert(0, station.clone());
        self.history.truncate(HISTORY_LIMIT);
    }

    pub fn custom_frequency(&self, station_id: &str) -> Option<&CustomFrequency> {
        self.custom_frequencies
            .iter()
            .find(|c| c.station_id == station_id)
    }

    /// Record (or replace) the chosen frequency for a station.
    pub fn set_custom_frequency(&mut self, custom: CustomFrequency) {
        self.custom_frequencies
            .retain(|c| c.station_id != custom.station_id);
        self.custom_frequencies.push(custom);
    }
}

fn decode_field<T: DeserializeOwned>(value: Option<&serde_json::Value>) -> Option<T> {
    let value = value?;
    if value.is_null() {
        return None;
    }
    match serde_json::from_value(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!("state: dropping malformed field: {}", e);
            None
        }
    }
}

fn decode_list<T: DeserializeOwned>(value: Option<&serde_json::Value>) -> Vec<T> {
    match value.and_then(|v| v.as_array()) {
        Some(items) => items.iter().filter_map(|v| decode_field(Some(v))).collect(),
        None => Vec::new(),
    }
}

/// Owns the persistent state and the file it lives in.
pub struct StateStore {
    state: PersistentState,
    state_file: PathBuf,
}

impl StateStore {
    pub fn new(state_file: PathBuf) -> Self {
        let state = Self::load_persistent(&state_file);
        Self { state, state_file }
    }

    pub fn state(&self) -> &PersistentState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PersistentState {
        &mut self.state
    }

    pub fn path(&self) -> &Path {
        &self.state_file
    }

    pub async fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.state_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(&self.state)?;
        tokio::fs::write(&self.state_file, json).await?;
        Ok(())
    }

    fn load_persistent(state_file: &Path) -> PersistentState {
        match std::fs::read_to_string(state_file) {
            Ok(content) => PersistentState::from_json_lenient(&content),
            Err(_) => PersistentState::default(),
        }
    }
}
