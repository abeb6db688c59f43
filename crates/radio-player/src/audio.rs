/// The one audio element and one analysis context shared by every source.
///
/// Host primitives sit behind the traits below.  `SharedAudio` owns them and
/// is lent (`&mut`) to whichever connector is currently routing audio: the
/// streaming session manager for radio, the aux connector for capture.
///
/// Inputs to the analysis graph are registered through
/// [`SharedAudio::connect_input`], which hands back an [`InputHandle`].  The
/// handle is deliberately neither `Clone` nor `Copy`, and
/// [`SharedAudio::disconnect_input`] consumes it, so a connector can only ever
/// remove the node it registered itself.
use radio_proto::error::Result;
use tracing::debug;

/// Web-Audio style context states, including the non-standard
/// `Interrupted` that some mobile hosts report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    Suspended,
    Interrupted,
    Closed,
}

impl ContextState {
    /// Whether `resume()` can bring the context back to `Running`.
    pub fn is_resumable(self) -> bool {
        matches!(self, ContextState::Running | ContextState::Suspended)
    }
}

pub trait MediaElement: Send {
    fn set_source(&mut self, url: &str);
    fn clear_source(&mut self);
    /// Re-run the element's load algorithm (drops any lingering media source).
    fn reload(&mut self);
    /// Start playback.  Fails with `PlaybackRejected` when the host refuses.
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
}

pub trait AudioContext: Send {
    fn state(&self) -> ContextState;
    /// Ask the host to resume.  State changes arrive separately.
    fn resume(&mut self);
}

/// What feeds an analysis input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputNode {
    /// The shared media element.
    MediaElement,
    /// A capture stream through a gain stage.
    Capture { gain: f32 },
}

/// Host-side identity of a registered input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);

pub trait AnalysisGraph: Send {
    fn connect_input(&mut self, node: InputNode) -> NodeId;
    fn disconnect_input(&mut self, node: NodeId);
    /// Start producing spectrum snapshots.
    fn start(&mut self);
    /// Silence the analyser's monitor output without touching its inputs.
    fn set_monitor_muted(&mut self, muted: bool);
}

/// Proof of one registered analysis input.  Only its owner can disconnect it.
#[derive(Debug)]
pub struct InputHandle {
    node: NodeId,
    kind: InputNode,
}

impl InputHandle {
    pub fn kind(&self) -> InputNode {
        self.kind
    }
}

pub struct SharedAudio {
    element: Box<dyn MediaElement>,
    context: Box<dyn AudioContext>,
    graph: Box<dyn AnalysisGraph>,
    active_inputs: Vec<NodeId>,
}

impl SharedAudio {
    pub fn new(
        element: Box<dyn MediaElement>,
        context: Box<dyn AudioContext>,
        graph: Box<dyn AnalysisGraph>,
    ) -> Self {
        Self {
            element,
            context,
            graph,
            active_inputs: Vec::new(),
        }
    }

    pub fn element(&self) -> &dyn MediaElement {
        self.element.as_ref()
    }

    pub fn element_mut(&mut self) -> &mut dyn MediaElement {
        self.element.as_mut()
    }

    pub fn context_state(&self) -> ContextState {
        self.context.state()
    }

    pub fn resume_context(&mut self) {
        debug!("audio: resume requested (state {:?})", self.context.state());
        self.context.resume();
    }

    pub fn start_analyzer(&mut self) {
        self.graph.start();
    }

    pub fn set_monitor_muted(&mut self, muted: bool) {
        self.graph.set_monitor_muted(muted);
    }

    pub fn connect_input(&mut self, kind: InputNode) -> InputHandle {
        let node = self.graph.connect_input(kind);
        self.active_inputs.push(node);
        debug!("audio: connected {:?} as {:?}", kind, node);
        InputHandle { node, kind }
    }

    pub fn disconnect_input(&mut self, handle: InputHandle) {
        self.graph.disconnect_input(handle.node);
        self.active_inputs.retain(|n| *n != handle.node);
        debug!("audio: disconnected {:?}", handle.node);
    }

    /// Number of inputs currently registered by any connector.
    pub fn active_inputs(&self) -> usize {
        self.active_inputs.len()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_disconnect_only_their_own_node() {
        let (mut audio, _factory, log) = fake::rig();
        let element = audio.connect_input(InputNode::MediaElement);
        let capture = audio.connect_input(InputNode::Capture { gain: 3.0 });
        assert_eq!(audio.active_inputs(), 2);

        audio.disconnect_input(capture);
        assert_eq!(audio.active_inputs(), 1);
        let inputs = log.lock().unwrap().inputs.clone();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].1, InputNode::MediaElement);

        assert_eq!(element.kind(), InputNode::MediaElement);
        audio.disconnect_input(element);
        assert_eq!(audio.active_inputs(), 0);
    }

    #[test]
    fn test_resumable_states() {
        assert!(ContextState::Running.is_resumable());
        assert!(ContextState::Suspended.is_resumable());
        assert!(!ContextState::Interrupted.is_resumable());
        assert!(!ContextState::Closed.is_resumable());
    }
}
