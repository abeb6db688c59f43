/// PlayerCore: single-owner event loop for all player state.
///
/// Everything that mutates playback goes through `PlayerEvent` messages on
/// one `mpsc` channel.  PlayerCore owns the shared audio rig, the session
/// manager, the tuning engine, the capture connector and the state store
/// exclusively.  Network round trips and the tuning ticker run as tokio
/// tasks that only ever report back through the channel.
///
/// Races with newer selections are settled by a selection generation: every
/// user-triggered mode or station change bumps it, and a playlist
/// resolution tagged with an older generation is dropped on arrival.
///
/// After each event the derived `PlayerSnapshot` is broadcast if it changed.
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use radio_proto::config::PlayerConfig;
use radio_proto::error::{RadioError, Result};
use radio_proto::presets::PresetSlot;
use radio_proto::protocol::{Band, Network, StationDescriptor, TunableEntry};
use radio_proto::state::{CustomFrequency, PersistentState, StateStore};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use crate::audio::{ContextState, SharedAudio};
use crate::capture::{AuxConnector, CaptureKind, CaptureProvider};
use crate::directory::{CommercialStation, FrequencyDirectory};
use crate::relay_client::{RelayClient, TokenCache};
use crate::session::{DemuxerFactory, SessionId, SessionManager, SessionState};
use crate::tunable::derive_tunable_entries;
use crate::tuning::{self, Direction, JobId, TickOutcome, TuningEngine, TICK_INTERVAL};

// ── Commands & events ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Off,
    Radio,
    File,
    Aux,
}

/// What the UI (or a hotkey) asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    SwitchSource(SourceMode),
    SelectStation(StationDescriptor),
    Tune(Direction),
    SelectPreset(PresetSlot),
    AssignPreset {
        slot: PresetSlot,
        station: StationDescriptor,
    },
    ClearPreset {
        band: Band,
        slot: PresetSlot,
    },
    SetCustomFrequency(CustomFrequency),
    RefreshDirectory,
    Play,
    Stop,
    ConnectAux(CaptureKind),
    DisconnectAux,
}

/// The commercial directory for one region.
#[derive(Debug, Clone)]
pub struct Directory {
    pub region: String,
    pub stations: Vec<CommercialStation>,
    pub frequencies: FrequencyDirectory,
}

/// All inputs into the PlayerCore loop.
#[derive(Debug)]
pub enum PlayerEvent {
    Command(PlayerCommand),
    /// The 100 ms ticker fired for `job`.
    TuneTick { job: JobId },
    /// The relay answered a `/stream` lookup made under `generation`.
    PlaylistResolved {
        generation: u64,
        station: StationDescriptor,
        result: Result<String>,
    },
    DirectoryLoaded(Result<Directory>),
    /// The host demuxer attached the element for `session`.
    MediaAttached { session: SessionId },
    ContextStateChanged(ContextState),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Idle,
    Connecting,
    Playing,
    Stopped,
}

/// What the display needs to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub mode: SourceMode,
    pub station: Option<StationDescriptor>,
    /// Dial readout while a tuning sweep runs.
    pub tuning_frequency: Option<f64>,
    pub playback: PlaybackStatus,
    pub region: Option<String>,
    pub aux_connected: bool,
    pub error: Option<String>,
}

// ── PlayerCore ────────────────────────────────────────────────────────────────

pub struct PlayerCore {
    config: PlayerConfig,
    audio: SharedAudio,
    session: SessionManager,
    tuning: TuningEngine,
    aux: AuxConnector,
    capture: Box<dyn CaptureProvider>,
    relay: RelayClient,
    tokens: Arc<Mutex<TokenCache>>,
    store: StateStore,
    event_tx: mpsc::Sender<PlayerEvent>,
    snapshot_tx: broadcast::Sender<PlayerSnapshot>,
    mode: SourceMode,
    /// Station currently committed (playing or last played).
    current: Option<StationDescriptor>,
    /// Commercial station whose playlist lookup is in flight.
    pending: Option<StationDescriptor>,
    region: Option<String>,
    directory: Option<Directory>,
    entries: Vec<TunableEntry>,
    generation: u64,
    /// The one tuning ticker, if a sweep is running.
    ticker: Option<AbortHandle>,
    /// Re-authenticates and reloads the directory once per token lifetime.
    refresher: Option<AbortHandle>,
    last_error: Option<RadioError>,
    last_snapshot: Option<PlayerSnapshot>,
}

impl PlayerCore {
    pub fn new(
        config: PlayerConfig,
        audio: SharedAudio,
        demuxers: Box<dyn DemuxerFactory>,
        capture: Box<dyn CaptureProvider>,
        relay: RelayClient,
        event_tx: mpsc::Sender<PlayerEvent>,
        snapshot_tx: broadcast::Sender<PlayerSnapshot>,
    ) -> Self {
        let store = StateStore::new(config.state_file.clone());
        let current = store.state().last_station.clone();
        let tokens = TokenCache::new(
            relay.clone(),
            config.client_ip.clone(),
            config.token_ttl_secs,
        );

        Self {
            config,
            audio,
            session: SessionManager::new(demuxers),
            tuning: TuningEngine::new(),
            aux: AuxConnector::new(),
            capture,
            relay,
            tokens: Arc::new(Mutex::new(tokens)),
            store,
            event_tx,
            snapshot_tx,
            mode: SourceMode::Off,
            current,
            pending: None,
            region: None,
            directory: None,
            entries: Vec::new(),
            generation: 0,
            ticker: None,
            refresher: None,
            last_error: None,
            last_snapshot: None,
        }
    }

    /// Sender for hosts to feed commands and host signals in.
    pub fn event_sender(&self) -> mpsc::Sender<PlayerEvent> {
        self.event_tx.clone()
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    pub fn current_station(&self) -> Option<&StationDescriptor> {
        self.current.as_ref()
    }

    pub fn pending_station(&self) -> Option<&StationDescriptor> {
        self.pending.as_ref()
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn tuning(&self) -> &TuningEngine {
        &self.tuning
    }

    pub fn entries(&self) -> &[TunableEntry] {
        &self.entries
    }

    pub fn selection_generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> &PersistentState {
        self.store.state()
    }

    /// Run the event loop.  Returns on `Shutdown` or when every sender is
    /// gone.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<PlayerEvent>) -> anyhow::Result<()> {
        info!("PlayerCore: starting event loop");
        self.refresh_directory();
        let period = Duration::from_secs(self.config.token_ttl_secs.max(1));
        self.refresher = Some(spawn_refresh_ticker(self.event_tx.clone(), period));
        self.publish();

        while let Some(evt) = event_rx.recv().await {
            if matches!(evt, PlayerEvent::Shutdown) {
                info!("PlayerCore: shutdown requested");
                break;
            }
            self.handle_event(evt).await;
        }

        self.cleanup().await;
        Ok(())
    }

    pub async fn handle_event(&mut self, evt: PlayerEvent) {
        match evt {
            PlayerEvent::Command(cmd) => {
                info!("PlayerCore: command {:?}", cmd);
                self.handle_command(cmd).await;
            }
            PlayerEvent::TuneTick { job } => self.on_tune_tick(job).await,
            PlayerEvent::PlaylistResolved {
                generation,
                station,
                result,
            } => self.on_playlist_resolved(generation, station, result).await,
            PlayerEvent::DirectoryLoaded(result) => self.on_directory_loaded(result),
            PlayerEvent::MediaAttached { session } => {
                self.session.on_media_attached(&mut self.audio, session)
            }
            PlayerEvent::ContextStateChanged(state) => {
                self.session.on_context_state(&mut self.audio, state)
            }
            PlayerEvent::Shutdown => {}
        }
        self.publish();
    }

    async fn handle_command(&mut self, cmd: PlayerCommand) {
        match cmd {
            PlayerCommand::SwitchSource(mode) => self.switch_source(mode).await,
            PlayerCommand::SelectStation(station) => self.select_station(station).await,
            PlayerCommand::Tune(direction) => self.tune(direction),
            PlayerCommand::SelectPreset(slot) => self.select_preset(slot).await,
            PlayerCommand::AssignPreset { slot, station } => {
                self.assign_preset(slot, station).await
            }
            PlayerCommand::ClearPreset { band, slot } => self.clear_preset(band, slot).await,
            PlayerCommand::SetCustomFrequency(custom) => {
                self.store.state_mut().set_custom_frequency(custom);
                self.rederive_entries();
                self.save().await;
            }
            PlayerCommand::RefreshDirectory => self.refresh_directory(),
            PlayerCommand::Play => match self.current.clone() {
                Some(station) => self.select_station(station).await,
                None => debug!("PlayerCore: play with no station"),
            },
            PlayerCommand::Stop => {
                self.preempt();
                self.session.unload(&mut self.audio);
                self.audio.element_mut().pause();
            }
            PlayerCommand::ConnectAux(kind) => self.connect_aux(kind),
            PlayerCommand::DisconnectAux => self.aux.disconnect(&mut self.audio),
        }
    }

    // ── Selection ─────────────────────────────────────────────────────────────

    /// Cancel the tuning sweep and invalidate in-flight lookups.
    fn preempt(&mut self) {
        self.cancel_tuning();
        self.generation += 1;
        self.pending = None;
    }

    fn cancel_tuning(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if self.tuning.cancel() {
            debug!("PlayerCore: tuning sweep cancelled");
        }
    }

    fn enter_radio_mode(&mut self) {
        self.preempt();
        if self.mode == SourceMode::Aux {
            self.aux.disconnect(&mut self.audio);
        }
        self.mode = SourceMode::Radio;
    }

    async fn select_station(&mut self, station: StationDescriptor) {
        self.enter_radio_mode();
        // Resume now, while still in the gesture: a commercial load only
        // happens after a network round trip.
        self.audio.resume_context();
        self.start_selection(station).await;
    }

    async fn start_selection(&mut self, station: StationDescriptor) {
        match station.network {
            Network::Public => {
                let Some(url) = station.url.clone().filter(|u| !u.is_empty()) else {
                    warn!("PlayerCore: public station {} has no stream url", station.name);
                    self.last_error = Some(RadioError::not_found(station.name.clone()));
                    return;
                };
                self.session.load(&mut self.audio, &url);
                self.last_error = None;
                self.commit(station).await;
            }
            Network::Commercial => {
                let Some(station_id) = station.id.clone().filter(|id| !id.is_empty()) else {
                    warn!("PlayerCore: commercial station {} has no id", station.name);
                    self.last_error = Some(RadioError::not_found(station.name.clone()));
                    return;
                };

                let generation = self.generation;
                let relay = self.relay.clone();
                let client_ip = self.config.client_ip.clone();
                let tx = self.event_tx.clone();
                self.pending = Some(station.clone());

                tokio::spawn(async move {
                    let result = relay.stream_uri(&station_id, client_ip.as_deref()).await;
                    let _ = tx
                        .send(PlayerEvent::PlaylistResolved {
                            generation,
                            station,
                            result,
                        })
                        .await;
                });
            }
        }
    }

    async fn on_playlist_resolved(
        &mut self,
        generation: u64,
        station: StationDescriptor,
        result: Result<String>,
    ) {
        if generation != self.generation || self.mode != SourceMode::Radio {
            debug!(
                "PlayerCore: dropping stale playlist for {} (gen {} < {})",
                station.name, generation, self.generation
            );
            return;
        }
        self.pending = None;

        match result {
            Ok(stream_uri) => {
                self.session.load(&mut self.audio, &stream_uri);
                self.last_error = None;
                self.commit(station).await;
            }
            Err(e) if e.is_transport() => {
                self.session.fail(&mut self.audio, e.clone());
                self.last_error = Some(e);
            }
            Err(e) => {
                warn!(
                    "PlayerCore: {} not playable, keeping previous session: {}",
                    station.name, e
                );
                self.last_error = Some(e);
            }
        }
    }

    async fn commit(&mut self, station: StationDescriptor) {
        let state = self.store.state_mut();
        state.last_station = Some(station.clone());
        state.record_history(&station);
        self.current = Some(station);
        self.save().await;
    }

    async fn switch_source(&mut self, mode: SourceMode) {
        if mode == self.mode {
            return;
        }
        self.preempt();
        match mode {
            SourceMode::Off | SourceMode::File => {
                self.session.unload(&mut self.audio);
                self.aux.disconnect(&mut self.audio);
            }
            SourceMode::Aux => self.session.unload(&mut self.audio),
            SourceMode::Radio => self.aux.disconnect(&mut self.audio),
        }
        self.mode = mode;

        if mode == SourceMode::Radio {
            if let Some(station) = self.current.clone() {
                self.audio.resume_context();
                self.start_selection(station).await;
            }
        }
    }

    // ── Tuning ────────────────────────────────────────────────────────────────

    fn tune(&mut self, direction: Direction) {
        if self.mode != SourceMode::Radio {
            debug!("PlayerCore: tune ignored outside radio mode");
            return;
        }
        // A station still resolving counts as the one on the dial.
        let selected = self.pending.as_ref().or(self.current.as_ref());
        let band = selected.map(|s| s.band).unwrap_or_default();
        let Some(job) = self.tuning.begin(selected, band, direction, &self.entries) else {
            warn!("PlayerCore: nothing to tune on {}", band);
            return;
        };
        self.audio.resume_context();

        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.generation += 1;
        self.pending = None;
        self.session.unload(&mut self.audio);
        self.ticker = Some(spawn_ticker(self.event_tx.clone(), job));
    }

    async fn on_tune_tick(&mut self, job: JobId) {
        match self.tuning.tick(job) {
            TickOutcome::Stale => debug!("PlayerCore: stale tick for {:?}", job),
            TickOutcome::Moved { .. } => {}
            TickOutcome::Completed { target } => {
                if let Some(ticker) = self.ticker.take() {
                    ticker.abort();
                }
                info!(
                    "PlayerCore: tuned to {} ({} {})",
                    target.name,
                    target.frequency.unwrap_or_default(),
                    target.band.unit()
                );
                self.start_selection(target).await;
            }
        }
    }

    // ── Presets ───────────────────────────────────────────────────────────────

    async fn select_preset(&mut self, slot: PresetSlot) {
        let band = self
            .pending
            .as_ref()
            .or(self.current.as_ref())
            .map(|s| s.band)
            .unwrap_or_default();
        let target = tuning::preset_target(
            &self.store.state().presets,
            self.region.as_deref(),
            band,
            slot,
            &self.entries,
        );

        match target {
            Some(station) => self.select_station(station).await,
            None => {
                self.enter_radio_mode();
                warn!("PlayerCore: preset {} on {}: no station", slot.get(), band);
                self.last_error = Some(RadioError::not_found(format!(
                    "{} preset {}",
                    band,
                    slot.get()
                )));
            }
        }
    }

    async fn assign_preset(&mut self, slot: PresetSlot, station: StationDescriptor) {
        let Some(region) = self.region.clone() else {
            warn!("PlayerCore: cannot assign preset before the region is known");
            return;
        };
        match self.store.state_mut().presets.assign(&region, slot, &station) {
            Ok(preset) => info!(
                "PlayerCore: preset {} {} -> {}",
                preset.band,
                slot.get(),
                preset.station_id
            ),
            Err(e) => {
                warn!("PlayerCore: preset {} not assigned: {}", slot.get(), e);
                return;
            }
        }
        self.save().await;
    }

    async fn clear_preset(&mut self, band: Band, slot: PresetSlot) {
        let Some(region) = self.region.clone() else {
            return;
        };
        if self
            .store
            .state_mut()
            .presets
            .clear(&region, band, slot)
            .is_some()
        {
            self.save().await;
        }
    }

    // ── Directory ─────────────────────────────────────────────────────────────

    fn refresh_directory(&self) {
        let tokens = Arc::clone(&self.tokens);
        let relay = self.relay.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = load_directory(&tokens, &relay).await;
            let _ = tx.send(PlayerEvent::DirectoryLoaded(result)).await;
        });
    }

    fn on_directory_loaded(&mut self, result: Result<Directory>) {
        match result {
            Ok(directory) => {
                info!(
                    "PlayerCore: directory for {}: {} stations",
                    directory.region,
                    directory.stations.len()
                );
                self.region = Some(directory.region.clone());
                self.directory = Some(directory);
                self.rederive_entries();
            }
            Err(e) => {
                warn!("PlayerCore: directory refresh failed: {}", e);
                self.last_error = Some(e);
            }
        }
    }

    fn rederive_entries(&mut self) {
        if let Some(directory) = &self.directory {
            self.entries = derive_tunable_entries(
                &directory.stations,
                &directory.frequencies,
                &self.store.state().custom_frequencies,
            );
            debug!("PlayerCore: {} tunable entries", self.entries.len());
        }
    }

    // ── Aux ───────────────────────────────────────────────────────────────────

    fn connect_aux(&mut self, kind: CaptureKind) {
        self.preempt();
        self.session.unload(&mut self.audio);
        self.mode = SourceMode::Aux;

        match self.capture.request(&kind) {
            Ok(stream) => {
                self.aux.connect(&mut self.audio, stream);
                self.last_error = None;
            }
            Err(e) => {
                warn!("PlayerCore: capture unavailable: {}", e);
                self.last_error = Some(e);
            }
        }
    }

    // ── Snapshot & persistence ────────────────────────────────────────────────

    pub fn snapshot(&self) -> PlayerSnapshot {
        let playback = match self.session.state() {
            _ if self.pending.is_some() => PlaybackStatus::Connecting,
            SessionState::Idle => PlaybackStatus::Idle,
            SessionState::Attaching => PlaybackStatus::Connecting,
            SessionState::Playing => PlaybackStatus::Playing,
            SessionState::Stopped(_) => PlaybackStatus::Stopped,
        };
        let session_error = match self.session.state() {
            SessionState::Stopped(Some(e)) => Some(e.to_string()),
            _ => None,
        };

        PlayerSnapshot {
            mode: self.mode,
            station: self.pending.clone().or_else(|| self.current.clone()),
            tuning_frequency: self.tuning.animated_frequency(),
            playback,
            region: self.region.clone(),
            aux_connected: self.aux.is_connected(),
            error: self
                .last_error
                .as_ref()
                .map(ToString::to_string)
                .or(session_error),
        }
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        if self.last_snapshot.as_ref() == Some(&snapshot) {
            return;
        }
        // No receivers is fine.
        let _ = self.snapshot_tx.send(snapshot.clone());
        self.last_snapshot = Some(snapshot);
    }

    async fn save(&self) {
        if let Err(e) = self.store.save().await {
            error!("PlayerCore: failed to save state: {}", e);
        }
    }

    async fn cleanup(&mut self) {
        info!("PlayerCore: cleaning up");
        if let Some(refresher) = self.refresher.take() {
            refresher.abort();
        }
        self.cancel_tuning();
        self.session.unload(&mut self.audio);
        self.aux.disconnect(&mut self.audio);
        self.save().await;
    }
}

fn spawn_ticker(tx: mpsc::Sender<PlayerEvent>, job: JobId) -> AbortHandle {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            if tx.send(PlayerEvent::TuneTick { job }).await.is_err() {
                break;
            }
        }
    })
    .abort_handle()
}

fn spawn_refresh_ticker(tx: mpsc::Sender<PlayerEvent>, period: Duration) -> AbortHandle {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // Startup already refreshed once.
        interval.tick().await;
        loop {
            interval.tick().await;
            let refresh = PlayerEvent::Command(PlayerCommand::RefreshDirectory);
            if tx.send(refresh).await.is_err() {
                break;
            }
        }
    })
    .abort_handle()
}

async fn load_directory(tokens: &Mutex<TokenCache>, relay: &RelayClient) -> Result<Directory> {
    let session = tokens.lock().await.get_or_refresh(Utc::now()).await?;
    let region = session.region_code;
    let stations = relay.station_list(&region).await?;
    let frequencies = relay.frequencies(&region).await?;
    Ok(Directory {
        region,
        stations,
        frequencies,
    })
}
