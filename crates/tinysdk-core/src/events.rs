//! Player events and their delivery channels
//!
//! Every consumer owns one ordered channel. Public listeners receive
//! [`PlayerEvent`]s; the optional diagnostic observers (at most one of each)
//! receive internal errors, captions, timed metadata and loading info.

use crate::types::{Cue, MediaFormat, Metadata, PlaybackState, TimeRange, TrackType, VideoSize};
use crate::Error;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Events delivered to every registered listener
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// The `(play_when_ready, state)` pair changed
    StateChanged {
        play_when_ready: bool,
        state: PlaybackState,
    },
    /// Renderer build failed or the engine hit a fatal error
    Error(Arc<Error>),
    /// Decoded video dimensions changed
    VideoSizeChanged(VideoSize),
}

/// Errors the engine recovers from or escalates later; informational only
#[derive(Debug, Clone)]
pub enum InternalError {
    RendererInitialization(Arc<Error>),
    AudioTrackInitialization(Arc<Error>),
    AudioTrackWrite(Arc<Error>),
    /// Raised by engines with an audio sink; the headless engine has none
    AudioTrackUnderrun {
        buffer_size: usize,
        buffer_size_ms: u64,
        elapsed_since_last_feed_ms: u64,
    },
    DecoderInitialization(Arc<Error>),
    Crypto(Arc<Error>),
    Load {
        source_type: TrackType,
        error: Arc<Error>,
    },
    DrmSessionManager(Arc<Error>),
}

/// Why the engine switched formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTrigger {
    Initial,
    Adaptive,
    Manual,
    Unknown,
}

/// Loading and format information for debugging overlays
#[derive(Debug, Clone)]
pub enum InfoEvent {
    VideoFormatEnabled {
        format: MediaFormat,
        trigger: FormatTrigger,
        media_time_ms: u64,
    },
    AudioFormatEnabled {
        format: MediaFormat,
        trigger: FormatTrigger,
        media_time_ms: u64,
    },
    DroppedFrames {
        count: u64,
        elapsed_ms: u64,
    },
    BandwidthSample {
        elapsed_ms: u64,
        bytes: u64,
        bitrate_estimate: Option<u64>,
    },
    /// `source_type` is `None` for manifest loads
    LoadStarted {
        source_type: Option<TrackType>,
        length: Option<u64>,
        format: Option<MediaFormat>,
        media_start_ms: u64,
        media_end_ms: u64,
    },
    LoadCompleted {
        source_type: Option<TrackType>,
        bytes_loaded: u64,
        format: Option<MediaFormat>,
        media_start_ms: u64,
        media_end_ms: u64,
        load_duration_ms: u64,
    },
    DecoderInitialized {
        decoder_name: String,
        initialization_duration_ms: u64,
    },
    AvailableRangeChanged(TimeRange),
}

pub type PlayerEventSender = mpsc::UnboundedSender<PlayerEvent>;
pub type PlayerEventReceiver = mpsc::UnboundedReceiver<PlayerEvent>;

/// Identifies a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listeners in registration order
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: Vec<(ListenerId, PlayerEventSender)>,
    next_id: u64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sender: PlayerEventSender) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, sender));
        id
    }

    /// Register a new channel and return its receiving end
    pub fn subscribe(&mut self) -> (ListenerId, PlayerEventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.add(tx), rx)
    }

    /// Returns false when the id was not registered
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver to every listener in registration order, pruning closed ones
    pub fn notify(&mut self, event: &PlayerEvent) {
        self.listeners.retain(|(id, sender)| {
            let delivered = sender.send(event.clone()).is_ok();
            if !delivered {
                debug!(listener = id.0, "Dropping closed listener");
            }
            delivered
        });
    }
}

/// Optional single observer of one event kind
#[derive(Debug)]
pub struct ObserverSlot<T> {
    sender: Option<mpsc::UnboundedSender<T>>,
}

impl<T> Default for ObserverSlot<T> {
    fn default() -> Self {
        Self { sender: None }
    }
}

impl<T> ObserverSlot<T> {
    /// Replace the observer; `None` unregisters it
    pub fn set(&mut self, sender: Option<mpsc::UnboundedSender<T>>) {
        self.sender = sender;
    }

    /// Register a fresh channel as the observer and return its receiving end
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sender = Some(tx);
        rx
    }

    pub fn is_set(&self) -> bool {
        self.sender.is_some()
    }

    /// Deliver to the observer; a closed observer is unregistered
    pub fn notify(&mut self, event: T) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                self.sender = None;
            }
        }
    }
}

/// The diagnostic observers of one player
#[derive(Debug, Default)]
pub struct Observers {
    pub internal_error: ObserverSlot<InternalError>,
    pub captions: ObserverSlot<Vec<Cue>>,
    pub metadata: ObserverSlot<Metadata>,
    pub info: ObserverSlot<InfoEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_event(state: PlaybackState) -> PlayerEvent {
        PlayerEvent::StateChanged {
            play_when_ready: true,
            state,
        }
    }

    #[test]
    fn test_registration_order() {
        let mut registry = ListenerRegistry::new();
        let (first, _rx1) = registry.subscribe();
        let (second, _rx2) = registry.subscribe();
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
        assert!(registry.remove(first));
        assert!(!registry.remove(first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_notify_prunes_closed_listeners() {
        let mut registry = ListenerRegistry::new();
        let (_, rx_closed) = registry.subscribe();
        let (_, mut rx_open) = registry.subscribe();
        drop(rx_closed);

        registry.notify(&state_event(PlaybackState::Preparing));

        assert_eq!(registry.len(), 1);
        assert!(matches!(
            rx_open.try_recv(),
            Ok(PlayerEvent::StateChanged {
                state: PlaybackState::Preparing,
                ..
            })
        ));
    }

    #[test]
    fn test_observer_slot() {
        let mut slot: ObserverSlot<Vec<Cue>> = ObserverSlot::default();
        slot.notify(vec![]);
        assert!(!slot.is_set());

        let mut rx = slot.subscribe();
        slot.notify(vec![Cue::new("Hello", 0.0, 1.0)]);
        assert_eq!(rx.try_recv().unwrap().len(), 1);

        drop(rx);
        slot.notify(vec![]);
        assert!(!slot.is_set());
    }
}
