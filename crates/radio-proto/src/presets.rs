//! Channel presets: six shortcut slots per band per region.
//!
//! Presets are only created or overwritten by an explicit user assignment and
//! never expire.  The store is persisted as part of
//! [`PersistentState`](crate::state::PersistentState).

use serde::{Deserialize, Serialize};

use crate::protocol::{Band, StationDescriptor};

pub const SLOT_COUNT: u8 = 6;

/// A preset slot number, always in `1..=6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PresetSlot(u8);

impl PresetSlot {
    pub fn new(n: u8) -> Option<Self> {
        (1..=SLOT_COUNT).contains(&n).then_some(Self(n))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = PresetSlot> {
        (1..=SLOT_COUNT).map(PresetSlot)
    }
}

impl TryFrom<u8> for PresetSlot {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::new(n).ok_or_else(|| format!("preset slot {} out of range 1..={}", n, SLOT_COUNT))
    }
}

impl From<PresetSlot> for u8 {
    fn from(slot: PresetSlot) -> u8 {
        slot.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPreset {
    pub region: String,
    pub band: Band,
    pub slot: PresetSlot,
    pub frequency: f64,
    pub station_id: String,
    pub station_name: String,
}

impl ChannelPreset {
    /// Descriptor to select when this slot is recalled.
    pub fn to_descriptor(&self) -> StationDescriptor {
        StationDescriptor::commercial(
            self.station_id.clone(),
            self.station_name.clone(),
            self.band,
            Some(self.frequency),
            None,
        )
    }
}

/// Why an assignment was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AssignError {
    #[error("only commercial stations can be assigned to a preset slot")]
    NotCommercial,
    #[error("station {0} has no frequency on this band")]
    NoFrequency(String),
}

/// Presets keyed by `(region, band, slot)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ChannelPresetStore {
    presets: Vec<ChannelPreset>,
}

impl ChannelPresetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-decoded presets.  Later duplicates of the same key
    /// win, matching what sequential assignment would have produced.
    pub fn from_presets(presets: impl IntoIterator<Item = ChannelPreset>) -> Self {
        let mut store = Self::new();
        for p in presets {
            store.upsert(p);
        }
        store
    }

    pub fn get(&self, region: &str, band: Band, slot: PresetSlot) -> Option<&ChannelPreset> {
        self.presets
            .iter()
            .find(|p| p.region == region && p.band == band && p.slot == slot)
    }

    /// Assign `station` (on its own band) to `slot`, replacing whatever was
    /// there.  Returns the stored preset.
    pub fn assign(
        &mut self,
        region: &str,
        slot: PresetSlot,
        station: &StationDescriptor,
    ) -> Result<&ChannelPreset, AssignError> {
        let station_id = station.id.clone().ok_or(AssignError::NotCommercial)?;
        let frequency = station
            .frequency
            .ok_or_else(|| AssignError::NoFrequency(station_id.clone()))?;
        let preset = ChannelPreset {
            region: region.to_string(),
            band: station.band,
            slot,
            frequency,
            station_id,
            station_name: station.name.clone(),
        };
        let idx = self.upsert(preset);
        Ok(&self.presets[idx])
    }

    /// Remove a slot's assignment.  Returns the removed preset, if any.
    pub fn clear(&mut self, region: &str, band: Band, slot: PresetSlot) -> Option<ChannelPreset> {
        let idx = self
            .presets
            .iter()
            .position(|p| p.region == region && p.band == band && p.slot == slot)?;
        Some(self.presets.remove(idx))
    }

    /// Every `(band, slot)` in `region` that points at `station_id`,
    /// FM first then by slot.
    pub fn slots_for_station(&self, region: &str, station_id: &str) -> Vec<(Band, PresetSlot)> {
        let mut out: Vec<(Band, PresetSlot)> = self
            .presets
            .iter()
            .filter(|p| p.region == region && p.station_id == station_id)
            .map(|p| (p.band, p.slot))
            .collect();
        out.sort_by_key(|(band, slot)| (*band != Band::Fm, *slot));
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelPreset> {
        self.presets.iter()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    fn upsert(&mut self, preset: ChannelPreset) -> usize {
        match self.presets.iter().position(|p| {
            p.region == preset.region && p.band == preset.band && p.slot == preset.slot
        }) {
            Some(idx) => {
                self.presets[idx] = preset;
                idx
            }
            None => {
                self.presets.push(preset);
                self.presets.len() - 1
            }
        }
    }
}
