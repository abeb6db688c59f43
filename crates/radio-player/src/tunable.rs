use std::cmp::Ordering;

use radio_proto::protocol::{Band, TunableEntry};
use radio_proto::state::CustomFrequency;

use crate::directory::{CommercialStation, FrequencyDirectory};

/// Build the dial: one entry per (station, band) with a primary transmitter,
/// with user-chosen frequencies taking precedence.  FM sorts before AM, then
/// by frequency, then by station id.
pub fn derive_tunable_entries(
    stations: &[CommercialStation],
    frequencies: &FrequencyDirectory,
    custom: &[CustomFrequency],
) -> Vec<TunableEntry> {
    let mut entries = Vec::new();

    for station in stations {
        let Some(record) = frequencies.get(&station.id) else {
            continue;
        };
        let custom = custom.iter().find(|c| c.station_id == station.id);

        for band in [Band::Fm, Band::Am] {
            let frequency = match custom {
                Some(c) if c.band == band => Some(c.frequency),
                _ => record.primary(band).map(|a| a.frequency),
            };
            if let Some(frequency) = frequency {
                entries.push(TunableEntry {
                    station_id: station.id.clone(),
                    name: station.name.clone(),
                    band,
                    frequency,
                    logo_url: station.logo_url().map(str::to_owned),
                });
            }
        }
    }

    entries.sort_by(dial_order);
    entries
}

fn dial_order(a: &TunableEntry, b: &TunableEntry) -> Ordering {
    let band_rank = |band: Band| match band {
        Band::Fm => 0,
        Band::Am => 1,
    };
    band_rank(a.band)
        .cmp(&band_rank(b.band))
        .then(a.frequency.total_cmp(&b.frequency))
        .then_with(|| a.station_id.cmp(&b.station_id))
}
