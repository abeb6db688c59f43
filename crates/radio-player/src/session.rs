/// Streaming Session Manager: bridges an HLS demuxer (or the element's
/// native HLS support) to the shared audio element.
///
/// State machine: `Idle → Attaching → Playing`, or `Stopped(err)` when the
/// host refuses playback.  `load` and `unload` are synchronous: the previous
/// session is fully torn down before the next one starts attaching, so two
/// sessions never buffer into the element at the same time.
///
/// Every session gets a fresh, monotonically increasing [`SessionId`].  The
/// host demuxer reports `MediaAttached(id)` asynchronously; a signal whose id
/// is not the live session's is ignored.
use radio_proto::error::RadioError;
use tracing::{debug, info, warn};

use crate::audio::{ContextState, InputHandle, InputNode, MediaElement, SharedAudio};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

/// A host HLS demuxer instance.  One per session, never reused.
pub trait Demuxer: Send {
    fn load_source(&mut self, url: &str);
    /// Bind to the element.  The host reports `MediaAttached` for this
    /// demuxer's session once the element is ready.
    fn attach_media(&mut self, element: &mut dyn MediaElement);
    /// Release all buffers and listeners and detach from the element.
    fn destroy(&mut self);
}

pub trait DemuxerFactory: Send {
    /// `false` when the host can only play HLS natively.
    fn is_supported(&self) -> bool;
    fn create(&mut self, session: SessionId) -> Box<dyn Demuxer>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Attaching,
    Playing,
    Stopped(Option<RadioError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Demuxed,
    Native,
}

struct Attachment {
    id: SessionId,
    demuxer: Option<Box<dyn Demuxer>>,
    input: InputHandle,
}

impl Attachment {
    fn kind(&self) -> SessionKind {
        if self.demuxer.is_some() {
            SessionKind::Demuxed
        } else {
            SessionKind::Native
        }
    }
}

pub struct SessionManager {
    factory: Box<dyn DemuxerFactory>,
    state: SessionState,
    attachment: Option<Attachment>,
    next_id: u64,
    /// Set when the context left `Running`; records whether playback was
    /// active at that moment.
    interrupted_while_playing: Option<bool>,
}

impl SessionManager {
    pub fn new(factory: Box<dyn DemuxerFactory>) -> Self {
        Self {
            factory,
            state: SessionState::Idle,
            attachment: None,
            next_id: 1,
            interrupted_while_playing: None,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == SessionState::Playing
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.attachment.as_ref().map(|a| a.id)
    }

    pub fn kind(&self) -> Option<SessionKind> {
        self.attachment.as_ref().map(Attachment::kind)
    }

    /// Start a session for `url`, tearing down any existing one first.
    pub fn load(&mut self, audio: &mut SharedAudio, url: &str) -> SessionId {
        self.teardown(audio);

        // Resume while still inside the caller's (user-gesture) stack.
        audio.resume_context();

        let id = SessionId(self.next_id);
        self.next_id += 1;
        let input = audio.connect_input(InputNode::MediaElement);

        if self.factory.is_supported() {
            info!("session: {:?} demuxed load of {}", id, url);
            let mut demuxer = self.factory.create(id);
            demuxer.load_source(url);
            demuxer.attach_media(audio.element_mut());
            self.attachment = Some(Attachment {
                id,
                demuxer: Some(demuxer),
                input,
            });
            self.state = SessionState::Attaching;
        } else {
            info!("session: {:?} native load of {}", id, url);
            audio.element_mut().set_source(url);
            self.attachment = Some(Attachment {
                id,
                demuxer: None,
                input,
            });
            self.state = SessionState::Attaching;
            audio.resume_context();
            self.start_playback(audio);
        }

        id
    }

    /// The host demuxer finished attaching for `session`.
    pub fn on_media_attached(&mut self, audio: &mut SharedAudio, session: SessionId) {
        let live = self
            .attachment
            .as_ref()
            .is_some_and(|a| a.id == session && a.kind() == SessionKind::Demuxed);
        if !live || self.state != SessionState::Attaching {
            debug!("session: ignoring stale MediaAttached for {:?}", session);
            return;
        }

        audio.resume_context();
        self.start_playback(audio);
    }

    /// Stop whatever is playing.  Safe to call with no session.
    pub fn unload(&mut self, audio: &mut SharedAudio) {
        self.teardown(audio);
        self.state = SessionState::Idle;
    }

    /// Tear down and remember why, e.g. after a failed playlist lookup.
    pub fn fail(&mut self, audio: &mut SharedAudio, error: RadioError) {
        self.teardown(audio);
        warn!("session: stopped: {}", error);
        self.state = SessionState::Stopped(Some(error));
    }

    /// Power-management recovery.  Call on every context state change.
    pub fn on_context_state(&mut self, audio: &mut SharedAudio, state: ContextState) {
        debug!("session: context -> {:?} (session {:?})", state, self.state);
        match state {
            ContextState::Interrupted | ContextState::Suspended => {
                if self.interrupted_while_playing.is_none() {
                    self.interrupted_while_playing = Some(self.is_playing());
                }
                if state.is_resumable() && self.interrupted_while_playing == Some(true) {
                    audio.resume_context();
                }
            }
            ContextState::Running => {
                if self.interrupted_while_playing.take() == Some(true) && self.attachment.is_some()
                {
                    info!("session: context back, restarting playback");
                    self.start_playback(audio);
                }
            }
            ContextState::Closed => {
                self.interrupted_while_playing = None;
                if self.attachment.is_some() {
                    self.teardown(audio);
                    self.state = SessionState::Stopped(None);
                }
            }
        }
    }

    /// Play, with one context resume and one retry if the host refuses.
    fn start_playback(&mut self, audio: &mut SharedAudio) {
        if let Err(first) = audio.element_mut().play() {
            warn!("session: play refused ({}), resuming context and retrying", first);
            audio.resume_context();
            if let Err(second) = audio.element_mut().play() {
                let error = match second {
                    RadioError::PlaybackRejected(_) => second,
                    other => RadioError::PlaybackRejected(other.to_string()),
                };
                warn!("session: play refused again: {}", error);
                self.state = SessionState::Stopped(Some(error));
                return;
            }
        }
        audio.start_analyzer();
        self.state = SessionState::Playing;
    }

    fn teardown(&mut self, audio: &mut SharedAudio) {
        self.interrupted_while_playing = None;
        match self.attachment.take() {
            Some(Attachment {
                id,
                demuxer: Some(mut demuxer),
                input,
            }) => {
                debug!("session: destroying demuxed {:?}", id);
                demuxer.destroy();
                audio.disconnect_input(input);
                // Drop the lingering media-source URL so file playback can
                // take the element over.
                let element = audio.element_mut();
                element.clear_source();
                element.reload();
            }
            Some(Attachment {
                id,
                demuxer: None,
                input,
            }) => {
                debug!("session: pausing native {:?}", id);
                audio.disconnect_input(input);
                audio.element_mut().pause();
            }
            None => audio.element_mut().pause(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::fake;

    fn manager() -> (SessionManager, SharedAudio, fake::Log) {
        let (audio, factory, log) = fake::rig();
        (SessionManager::new(Box::new(factory)), audio, log)
    }

    #[test]
    fn test_demuxed_load_plays_on_attach() {
        let (mut sm, mut audio, log) = manager();
        let id = sm.load(&mut audio, "https://example.invalid/a.m3u8");
        assert_eq!(sm.state(), &SessionState::Attaching);
        assert_eq!(sm.kind(), Some(SessionKind::Demuxed));
        assert!(log.lock().unwrap().paused);

        sm.on_media_attached(&mut audio, id);
        assert_eq!(sm.state(), &SessionState::Playing);
        let log = log.lock().unwrap();
        assert!(!log.paused);
        assert_eq!(log.analyzer_starts, 1);
        assert_eq!(log.demuxers[0].source.as_deref(), Some("https://example.invalid/a.m3u8"));
    }

    #[test]
    fn test_load_resumes_context_before_anything_else() {
        let (mut sm, mut audio, log) = manager();
        sm.load(&mut audio, "https://example.invalid/a.m3u8");
        let log = log.lock().unwrap();
        assert_eq!(log.resumes, 1);
        assert_eq!(log.context, ContextState::Running);
    }

    #[test]
    fn test_loading_twice_never_leaves_two_demuxers() {
        let (mut sm, mut audio, log) = manager();
        let first = sm.load(&mut audio, "https://example.invalid/a.m3u8");
        let second = sm.load(&mut audio, "https://example.invalid/b.m3u8");
        assert!(second > first);

        {
            let log = log.lock().unwrap();
            assert_eq!(log.demuxers.len(), 2);
            assert!(log.demuxers[0].destroyed);
            assert_eq!(log.live_demuxers(), 1);
            assert_eq!(log.inputs.len(), 1);
        }
        assert_eq!(audio.active_inputs(), 1);
    }

    #[test]
    fn test_stale_attach_signal_is_ignored() {
        let (mut sm, mut audio, log) = manager();
        let stale = sm.load(&mut audio, "https://example.invalid/a.m3u8");
        let live = sm.load(&mut audio, "https://example.invalid/b.m3u8");

        sm.on_media_attached(&mut audio, stale);
        assert_eq!(sm.state(), &SessionState::Attaching);
        assert_eq!(log.lock().unwrap().play_calls, 0);

        sm.on_media_attached(&mut audio, live);
        assert_eq!(sm.state(), &SessionState::Playing);
    }

    #[test]
    fn test_native_path_sets_source_and_plays() {
        let (mut sm, mut audio, log) = manager();
        log.lock().unwrap().demux_supported = false;

        sm.load(&mut audio, "https://example.invalid/native.m3u8");
        assert_eq!(sm.kind(), Some(SessionKind::Native));
        assert_eq!(sm.state(), &SessionState::Playing);
        let log = log.lock().unwrap();
        assert_eq!(log.source.as_deref(), Some("https://example.invalid/native.m3u8"));
        assert!(log.demuxers.is_empty());
    }

    #[test]
    fn test_unload_without_session_is_noop_and_paused() {
        let (mut sm, mut audio, log) = manager();
        sm.unload(&mut audio);
        assert_eq!(sm.state(), &SessionState::Idle);
        assert!(audio.element().is_paused());
        assert_eq!(log.lock().unwrap().reloads, 0);
    }

    #[test]
    fn test_unload_demuxed_clears_source_for_file_playback() {
        let (mut sm, mut audio, log) = manager();
        let id = sm.load(&mut audio, "https://example.invalid/a.m3u8");
        sm.on_media_attached(&mut audio, id);
        log.lock().unwrap().source = Some("blob:mediasource".into());

        sm.unload(&mut audio);
        assert_eq!(sm.state(), &SessionState::Idle);
        assert_eq!(sm.current_session(), None);
        let log = log.lock().unwrap();
        assert!(log.demuxers[0].destroyed);
        assert_eq!(log.source, None);
        assert_eq!(log.reloads, 1);
        assert!(log.inputs.is_empty());
    }

    #[test]
    fn test_rejected_play_is_retried_once() {
        let (mut sm, mut audio, log) = manager();
        log.lock().unwrap().reject_plays = 1;
        let id = sm.load(&mut audio, "https://example.invalid/a.m3u8");
        sm.on_media_attached(&mut audio, id);

        assert_eq!(sm.state(), &SessionState::Playing);
        assert_eq!(log.lock().unwrap().play_calls, 2);
    }

    #[test]
    fn test_second_rejection_stops_without_looping() {
        let (mut sm, mut audio, log) = manager();
        log.lock().unwrap().reject_plays = 5;
        let id = sm.load(&mut audio, "https://example.invalid/a.m3u8");
        sm.on_media_attached(&mut audio, id);

        assert!(matches!(
            sm.state(),
            SessionState::Stopped(Some(RadioError::PlaybackRejected(_)))
        ));
        let log = log.lock().unwrap();
        assert_eq!(log.play_calls, 2);
        assert_eq!(log.analyzer_starts, 0);
    }

    #[test]
    fn test_interruption_restarts_only_if_playing() {
        let (mut sm, mut audio, log) = manager();
        let id = sm.load(&mut audio, "https://example.invalid/a.m3u8");
        sm.on_media_attached(&mut audio, id);

        log.lock().unwrap().paused = true;
        sm.on_context_state(&mut audio, ContextState::Interrupted);
        sm.on_context_state(&mut audio, ContextState::Suspended);
        assert_eq!(log.lock().unwrap().context, ContextState::Running);
        sm.on_context_state(&mut audio, ContextState::Running);

        let log = log.lock().unwrap();
        assert!(!log.paused);
        assert_eq!(log.analyzer_starts, 2);
        assert_eq!(log.play_calls, 2);
    }

    #[test]
    fn test_interruption_while_idle_does_not_start_playback() {
        let (mut sm, mut audio, log) = manager();
        sm.on_context_state(&mut audio, ContextState::Interrupted);
        sm.on_context_state(&mut audio, ContextState::Running);

        let log = log.lock().unwrap();
        assert_eq!(log.play_calls, 0);
        assert_eq!(log.analyzer_starts, 0);
        assert_eq!(sm.state(), &SessionState::Idle);
    }

    #[test]
    fn test_closed_context_stops_session() {
        let (mut sm, mut audio, log) = manager();
        let id = sm.load(&mut audio, "https://example.invalid/a.m3u8");
        sm.on_media_attached(&mut audio, id);

        sm.on_context_state(&mut audio, ContextState::Closed);
        assert_eq!(sm.state(), &SessionState::Stopped(None));
        assert_eq!(log.lock().unwrap().live_demuxers(), 0);
    }
}
