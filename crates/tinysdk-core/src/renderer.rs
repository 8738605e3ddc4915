//! Renderer handles produced by renderer builders and consumed by the engine

use crate::types::{MediaFormat, TrackType, RENDERER_COUNT};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Render target handed in by the application.
///
/// The player only forwards the handle; the platform owns the underlying window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Surface {
    id: Uuid,
}

impl Surface {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new()
    }
}

/// Message delivered to a renderer on the engine's playback thread
#[derive(Debug, Clone, PartialEq)]
pub enum RendererMessage {
    /// Attach the given surface, or detach with `None`
    SetSurface(Option<Surface>),
}

/// Decoder counters of a media codec renderer
#[derive(Debug, Default)]
pub struct CodecCounters {
    decoder_inits: AtomicU64,
    decoded_frames: AtomicU64,
    rendered_frames: AtomicU64,
    dropped_frames: AtomicU64,
}

/// Point-in-time copy of [`CodecCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecCountersSnapshot {
    pub decoder_inits: u64,
    pub decoded_frames: u64,
    pub rendered_frames: u64,
    pub dropped_frames: u64,
}

impl CodecCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_decoder_init(&self) {
        self.decoder_inits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rendered(&self, frames: u64) {
        self.decoded_frames.fetch_add(frames, Ordering::Relaxed);
        self.rendered_frames.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, frames: u64) {
        self.decoded_frames.fetch_add(frames, Ordering::Relaxed);
        self.dropped_frames.fetch_add(frames, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CodecCountersSnapshot {
        CodecCountersSnapshot {
            decoder_inits: self.decoder_inits.load(Ordering::Relaxed),
            decoded_frames: self.decoded_frames.load(Ordering::Relaxed),
            rendered_frames: self.rendered_frames.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
        }
    }
}

/// Renderer for one track type, carrying the tracks it can render
#[derive(Debug, Clone)]
pub struct Renderer {
    id: Uuid,
    track_type: TrackType,
    formats: Vec<MediaFormat>,
    codec_counters: Option<Arc<CodecCounters>>,
}

impl Renderer {
    /// Renderer without a decoder (text, metadata)
    pub fn new(track_type: TrackType, formats: Vec<MediaFormat>) -> Self {
        Self {
            id: Uuid::new_v4(),
            track_type,
            formats,
            codec_counters: None,
        }
    }

    /// Renderer backed by a media codec, exposing decoder counters
    pub fn media_codec(track_type: TrackType, formats: Vec<MediaFormat>) -> Self {
        Self {
            codec_counters: Some(Arc::new(CodecCounters::new())),
            ..Self::new(track_type, formats)
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn track_type(&self) -> TrackType {
        self.track_type
    }

    pub fn formats(&self) -> &[MediaFormat] {
        &self.formats
    }

    pub fn codec_counters(&self) -> Option<Arc<CodecCounters>> {
        self.codec_counters.clone()
    }
}

/// Cheap reference to an installed renderer kept by the player
#[derive(Debug, Clone)]
pub struct RendererHandle {
    pub id: Uuid,
    pub track_type: TrackType,
    pub codec_counters: Option<Arc<CodecCounters>>,
}

impl From<&Renderer> for RendererHandle {
    fn from(renderer: &Renderer) -> Self {
        Self {
            id: renderer.id,
            track_type: renderer.track_type,
            codec_counters: renderer.codec_counters.clone(),
        }
    }
}

/// One renderer slot: an installed renderer or the no-op placeholder
#[derive(Debug, Clone, Default)]
pub enum RendererSlot {
    Active(Renderer),
    #[default]
    Absent,
}

impl RendererSlot {
    pub fn renderer(&self) -> Option<&Renderer> {
        match self {
            RendererSlot::Active(renderer) => Some(renderer),
            RendererSlot::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, RendererSlot::Absent)
    }
}

/// Renderers of one build, exactly one slot per track type
#[derive(Debug, Clone, Default)]
pub struct RendererSet {
    slots: [RendererSlot; RENDERER_COUNT],
    duration: Option<Duration>,
}

impl RendererSet {
    /// Fill every slot, placing each renderer by its own track type.
    ///
    /// Missing renderers become [`RendererSlot::Absent`].
    pub fn backfill(renderers: [Option<Renderer>; RENDERER_COUNT]) -> Self {
        let mut set = Self::default();
        for renderer in renderers.into_iter().flatten() {
            let slot = &mut set.slots[renderer.track_type().index()];
            if !slot.is_absent() {
                tracing::warn!(
                    track_type = %renderer.track_type(),
                    "Duplicate renderer for track type, keeping the last one"
                );
            }
            *slot = RendererSlot::Active(renderer);
        }
        set
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    pub fn slot(&self, track_type: TrackType) -> &RendererSlot {
        &self.slots[track_type.index()]
    }

    pub fn renderer(&self, track_type: TrackType) -> Option<&Renderer> {
        self.slot(track_type).renderer()
    }

    pub fn slots(&self) -> &[RendererSlot; RENDERER_COUNT] {
        &self.slots
    }

    /// Presentation duration, `None` for live or unknown
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Tracks available for a type, empty when the slot is absent
    pub fn formats(&self, track_type: TrackType) -> &[MediaFormat] {
        self.renderer(track_type)
            .map(Renderer::formats)
            .unwrap_or(&[])
    }
}

/// Build result as delivered by a renderer builder, indexed by track type slot
pub type PartialRenderers = [Option<Renderer>; RENDERER_COUNT];
