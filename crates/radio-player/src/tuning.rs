//! Tuning Engine: seek to the next/previous tunable entry with an animated
//! frequency sweep, plus the channel-preset shortcut.
//!
//! The engine is a plain state machine.  [`TuningEngine::begin`] creates the
//! single tuning job and [`TuningEngine::tick`] advances it by one step; the
//! caller owns the 100 ms timer and feeds ticks in tagged with the job id, so
//! a tick from a replaced job is simply reported as stale.

use std::time::Duration;

use radio_proto::presets::{ChannelPresetStore, PresetSlot};
use radio_proto::protocol::{Band, StationDescriptor, TunableEntry};
use tracing::debug;

pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// A tick stops once the remaining sweep is below this many steps.
const COMPLETION_TOLERANCE: f64 = 0.45;
/// Entries closer than this many steps to the baseline are not "next".
const SEARCH_GUARD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandPlan {
    pub band: Band,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

pub const FM_PLAN: BandPlan = BandPlan {
    band: Band::Fm,
    min: 76.0,
    max: 99.0,
    step: 0.1,
};

pub const AM_PLAN: BandPlan = BandPlan {
    band: Band::Am,
    min: 531.0,
    max: 1602.0,
    step: 9.0,
};

impl BandPlan {
    pub fn for_band(band: Band) -> &'static BandPlan {
        match band {
            Band::Fm => &FM_PLAN,
            Band::Am => &AM_PLAN,
        }
    }

    /// Frequency an unassigned preset slot falls back to.
    pub fn default_frequency(&self) -> f64 {
        self.min
    }

    /// Length of one lap around the dial: stepping up from `max` lands on `min`.
    pub fn span(&self) -> f64 {
        self.max - self.min + self.step
    }

    /// Round to the step grid.
    pub fn snap(&self, frequency: f64) -> f64 {
        if self.step < 1.0 {
            let per_unit = (1.0 / self.step).round();
            (frequency * per_unit).round() / per_unit
        } else {
            (frequency / self.step).round() * self.step
        }
    }

    /// Wrap an unbounded sweep position onto the dial and snap it.
    pub fn display(&self, position: f64) -> f64 {
        let offset = (position - self.min).rem_euclid(self.span());
        let mut value = self.snap(self.min + offset);
        if value > self.max + self.step * 0.5 {
            value = self.min;
        }
        value.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub u64);

#[derive(Debug, Clone)]
struct TuningJob {
    id: JobId,
    plan: &'static BandPlan,
    direction: Direction,
    /// Unwrapped sweep position.
    position: f64,
    remaining: f64,
    display: f64,
    target: TunableEntry,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The dial moved; show `display`.
    Moved { display: f64 },
    /// The sweep arrived.  The display is cleared and `target` should be
    /// committed.
    Completed { target: StationDescriptor },
    /// Not the current job (cancelled or replaced).
    Stale,
}

#[derive(Debug, Default)]
pub struct TuningEngine {
    job: Option<TuningJob>,
    next_id: u64,
}

impl TuningEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_job(&self) -> Option<JobId> {
        self.job.as_ref().map(|j| j.id)
    }

    /// Frequency shown on the dial while a sweep runs.
    pub fn animated_frequency(&self) -> Option<f64> {
        self.job.as_ref().map(|j| j.display)
    }

    /// Drop the running job.  Returns whether there was one.
    pub fn cancel(&mut self) -> bool {
        self.job.take().is_some()
    }

    /// Start a sweep from the current position toward the next entry in
    /// `direction`.  Replaces any running job.  Returns `None` (leaving any
    /// running job alone) when `band` has no entries.
    pub fn begin(
        &mut self,
        current: Option<&StationDescriptor>,
        band: Band,
        direction: Direction,
        entries: &[TunableEntry],
    ) -> Option<JobId> {
        let plan = BandPlan::for_band(band);
        let band_entries = entries_on_band(entries, band);
        let first = band_entries.first()?;

        let baseline = self
            .job
            .as_ref()
            .filter(|j| j.plan.band == band)
            .map(|j| j.display)
            .or_else(|| current.filter(|c| c.band == band).and_then(|c| c.frequency))
            .unwrap_or(first.frequency)
            .clamp(plan.min, plan.max);

        let target = find_next(&band_entries, baseline, direction, plan.step).clone();
        let distance = match direction {
            Direction::Up => (target.frequency - baseline).rem_euclid(plan.span()),
            Direction::Down => (baseline - target.frequency).rem_euclid(plan.span()),
        };

        self.next_id += 1;
        let id = JobId(self.next_id);
        debug!(
            "tuning: {:?} {:?} {} -> {} ({} {}), sweep {:.2}",
            id, direction, baseline, target.frequency, target.station_id, band, distance
        );
        self.job = Some(TuningJob {
            id,
            plan,
            direction,
            position: baseline,
            remaining: distance,
            display: plan.display(baseline),
            target,
        });
        Some(id)
    }

    /// Advance job `id` by one step.
    pub fn tick(&mut self, id: JobId) -> TickOutcome {
        let Some(job) = self.job.as_mut().filter(|j| j.id == id) else {
            return TickOutcome::Stale;
        };

        if job.remaining < job.plan.step * COMPLETION_TOLERANCE {
            let target = job.target.to_descriptor();
            self.job = None;
            return TickOutcome::Completed { target };
        }

        let advance = job.plan.step.min(job.remaining);
        job.position += job.direction.sign() * advance;
        job.remaining -= advance;
        job.display = job.plan.display(job.position);
        TickOutcome::Moved {
            display: job.display,
        }
    }
}

fn entries_on_band(entries: &[TunableEntry], band: Band) -> Vec<&TunableEntry> {
    let mut on_band: Vec<&TunableEntry> = entries.iter().filter(|e| e.band == band).collect();
    on_band.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
    on_band
}

/// Nearest entry strictly beyond the half-step guard, wrapping to the
/// opposite end.  `entries` must be non-empty and frequency-sorted.
fn find_next<'a>(
    entries: &[&'a TunableEntry],
    baseline: f64,
    direction: Direction,
    step: f64,
) -> &'a TunableEntry {
    let guard = step * SEARCH_GUARD;
    let found = match direction {
        Direction::Up => entries.iter().find(|e| e.frequency > baseline + guard),
        Direction::Down => entries.iter().rev().find(|e| e.frequency < baseline - guard),
    };
    match (found, direction) {
        (Some(e), _) => e,
        (None, Direction::Up) => entries[0],
        (None, Direction::Down) => entries[entries.len() - 1],
    }
}

/// Tunable entry closest to the band's default frequency.  Ties go to the
/// lower frequency.
pub fn nearest_to_default(entries: &[TunableEntry], band: Band) -> Option<&TunableEntry> {
    let default = BandPlan::for_band(band).default_frequency();
    entries_on_band(entries, band)
        .into_iter()
        .reduce(|best, e| {
            if (e.frequency - default).abs() < (best.frequency - default).abs() {
                e
            } else {
                best
            }
        })
}

/// What recalling `(band, slot)` selects: the stored preset if there is one,
/// else the entry nearest the band default.
pub fn preset_target(
    presets: &ChannelPresetStore,
    region: Option<&str>,
    band: Band,
    slot: PresetSlot,
    entries: &[TunableEntry],
) -> Option<StationDescriptor> {
    if let Some(preset) = region.and_then(|r| presets.get(r, band, slot)) {
        return Some(preset.to_descriptor());
    }
    nearest_to_default(entries, band).map(TunableEntry::to_descriptor)
}
