//! Playback engine contract
//!
//! The engine owns the playback thread: it activates the renderers handed to
//! it, reports state changes and diagnostics, and applies renderer messages.
//! Reports flow back to the player through an [`EngineEventSink`] so they are
//! handled on the player's task, in order, together with build results.

mod headless;

pub use headless::{HeadlessEngine, HeadlessEngineConfig};

use crate::events::{FormatTrigger, InfoEvent, InternalError};
use crate::player::Inbound;
use crate::renderer::{RendererMessage, RendererSet};
use crate::types::{Cue, MediaFormat, Metadata, PlaybackState, TrackSelection, TrackType, VideoSize};
use crate::{Error, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Playback state as reported by the engine itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Idle,
    Preparing,
    Buffering,
    Ready,
    Ended,
}

impl From<EngineState> for PlaybackState {
    fn from(state: EngineState) -> Self {
        match state {
            EngineState::Idle => PlaybackState::Idle,
            EngineState::Preparing => PlaybackState::Preparing,
            EngineState::Buffering => PlaybackState::Buffering,
            EngineState::Ready => PlaybackState::Ready,
            EngineState::Ended => PlaybackState::Ended,
        }
    }
}

/// Reports from the engine's playback thread
#[derive(Debug)]
pub enum EngineEvent {
    /// Engine state or play-when-ready flag changed
    StateChanged {
        play_when_ready: bool,
        state: EngineState,
    },
    /// Unrecoverable playback failure
    PlayerError(Error),
    VideoSizeChanged(VideoSize),
    /// The format fed to a renderer changed
    DownstreamFormatChanged {
        source_type: TrackType,
        format: MediaFormat,
        trigger: FormatTrigger,
        media_time_ms: u64,
    },
    /// Cues to display now, empty to clear
    Cues(Vec<Cue>),
    Metadata(Metadata),
    /// Diagnostic error that does not stop playback by itself
    Internal(InternalError),
    Info(InfoEvent),
}

/// Where an engine delivers its [`EngineEvent`]s
#[derive(Debug, Clone)]
pub struct EngineEventSink {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl EngineEventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { tx }
    }

    /// Returns false once the player is gone
    pub fn emit(&self, event: EngineEvent) -> bool {
        self.tx.send(Inbound::Engine(event)).is_ok()
    }
}

/// Adaptive-streaming engine driven by [`crate::MediaPlayer`]
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Register where engine reports are delivered
    fn set_event_sink(&mut self, sink: EngineEventSink);

    /// Activate a full renderer set on the playback thread
    fn prepare(&mut self, renderers: RendererSet);

    /// Stop playback and drop the current renderers
    fn stop(&mut self);

    /// Release every engine resource; the engine is unusable afterwards
    fn release(&mut self);

    fn set_play_when_ready(&mut self, play_when_ready: bool);

    fn play_when_ready(&self) -> bool;

    fn playback_state(&self) -> EngineState;

    fn seek_to(&mut self, position_ms: u64);

    fn current_position(&self) -> u64;

    /// Presentation duration in milliseconds, `None` when unknown
    fn duration(&self) -> Option<u64>;

    fn buffered_percentage(&self) -> u8;

    fn track_count(&self, track_type: TrackType) -> usize;

    fn track_format(&self, track_type: TrackType, index: usize) -> Option<MediaFormat>;

    fn selected_track(&self, track_type: TrackType) -> TrackSelection;

    fn set_selected_track(&mut self, track_type: TrackType, selection: TrackSelection);

    /// Queue a message for a renderer without waiting for it
    fn send_message(&self, target: TrackType, message: RendererMessage);

    /// Deliver a message to a renderer and wait until the playback thread handled it
    async fn blocking_send_message(&self, target: TrackType, message: RendererMessage)
        -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_state_passes_through() {
        assert_eq!(PlaybackState::from(EngineState::Idle), PlaybackState::Idle);
        assert_eq!(PlaybackState::from(EngineState::Buffering), PlaybackState::Buffering);
        assert_eq!(PlaybackState::from(EngineState::Ended), PlaybackState::Ended);
    }

    #[test]
    fn test_sink_reports_closed_player() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EngineEventSink::new(tx);
        assert!(sink.emit(EngineEvent::Cues(vec![])));
        drop(rx);
        assert!(!sink.emit(EngineEvent::Cues(vec![])));
    }
}
