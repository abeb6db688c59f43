/// Aux capture connector: routes a microphone or screen-share capture
/// stream into the shared analysis graph.
///
/// The capture goes through a ×3 gain stage and the analyser's monitor
/// output is muted while it is connected, so the captured audio is analysed
/// but never played back into the room.
use radio_proto::error::Result;
use tracing::{info, warn};

use crate::audio::{InputHandle, InputNode, SharedAudio};

pub const CAPTURE_GAIN: f32 = 3.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureKind {
    /// An input device, with echo cancellation, noise suppression and
    /// auto gain all off.
    Device { device_id: String },
    /// Whole-monitor screen share with its audio track.
    Screen,
}

/// A live capture stream owned by the host.
pub trait CaptureStream: Send {
    fn stop_tracks(&mut self);
}

pub trait CaptureProvider: Send {
    /// Ask the host for a capture stream.  A refusal is `PermissionDenied`.
    fn request(&mut self, kind: &CaptureKind) -> Result<Box<dyn CaptureStream>>;
}

#[derive(Default)]
pub struct AuxConnector {
    stream: Option<Box<dyn CaptureStream>>,
    input: Option<InputHandle>,
}

impl AuxConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.input.is_some()
    }

    /// Connect `stream`, replacing any capture connected before.
    pub fn connect(&mut self, audio: &mut SharedAudio, stream: Box<dyn CaptureStream>) {
        self.release(audio);

        let input = audio.connect_input(InputNode::Capture { gain: CAPTURE_GAIN });
        audio.set_monitor_muted(true);
        audio.start_analyzer();
        info!("aux: capture connected");

        self.stream = Some(stream);
        self.input = Some(input);
    }

    /// Stop the capture and remove only this connector's input.
    pub fn disconnect(&mut self, audio: &mut SharedAudio) {
        if self.release(audio) {
            audio.set_monitor_muted(false);
            info!("aux: capture disconnected");
        }
    }

    fn release(&mut self, audio: &mut SharedAudio) -> bool {
        if let Some(mut stream) = self.stream.take() {
            stream.stop_tracks();
        }
        match self.input.take() {
            Some(input) => {
                audio.disconnect_input(input);
                true
            }
            None => false,
        }
    }
}

impl Drop for AuxConnector {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            warn!("aux: connector dropped with a live capture, stopping tracks");
            stream.stop_tracks();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{self, InputNode};

    #[test]
    fn test_connect_mutes_monitor_and_boosts_gain() {
        let (mut audio, _factory, audio_log) = audio::fake::rig();
        let (mut provider, capture_log) = fake::provider();
        let mut aux = AuxConnector::new();

        let stream = provider.request(&CaptureKind::Screen).unwrap();
        aux.connect(&mut audio, stream);

        assert!(aux.is_connected());
        let log = audio_log.lock().unwrap();
        assert!(log.monitor_muted);
        assert_eq!(log.analyzer_starts, 1);
        assert_eq!(log.inputs.len(), 1);
        assert_eq!(log.inputs[0].1, InputNode::Capture { gain: 3.0 });
        assert_eq!(capture_log.lock().unwrap().stopped, vec![false]);
    }

    #[test]
    fn test_reconnect_stops_previous_tracks() {
        let (mut audio, _factory, audio_log) = audio::fake::rig();
        let (mut provider, capture_log) = fake::provider();
        let mut aux = AuxConnector::new();

        let kind = CaptureKind::Device {
            device_id: "mic-1".into(),
        };
        aux.connect(&mut audio, provider.request(&kind).unwrap());
        aux.connect(&mut audio, provider.request(&kind).unwrap());

        assert_eq!(capture_log.lock().unwrap().stopped, vec![true, false]);
        assert_eq!(audio_log.lock().unwrap().inputs.len(), 1);
    }

    #[test]
    fn test_disconnect_leaves_sibling_inputs() {
        let (mut audio, _factory, audio_log) = audio::fake::rig();
        let (mut provider, capture_log) = fake::provider();
        let mut aux = AuxConnector::new();

        let element = audio.connect_input(InputNode::MediaElement);
        aux.connect(&mut audio, provider.request(&CaptureKind::Screen).unwrap());
        aux.disconnect(&mut audio);

        assert!(!aux.is_connected());
        {
            let log = audio_log.lock().unwrap();
            assert!(!log.monitor_muted);
            assert_eq!(log.inputs.len(), 1);
            assert_eq!(log.inputs[0].1, InputNode::MediaElement);
        }
        assert_eq!(capture_log.lock().unwrap().stopped, vec![true]);
        audio.disconnect_input(element);
    }

    #[test]
    fn test_disconnect_when_idle_keeps_monitor() {
        let (mut audio, _factory, audio_log) = audio::fake::rig();
        audio.set_monitor_muted(true);
        let mut aux = AuxConnector::new();
        aux.disconnect(&mut audio);
        assert!(audio_log.lock().unwrap().monitor_muted);
    }
}
