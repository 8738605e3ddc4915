//! Core types for tinysdk

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Number of renderer slots a build produces, one per [`TrackType`]
pub const RENDERER_COUNT: usize = 4;

/// Track type categories, each backed by one renderer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    Video,
    Audio,
    Text,
    Metadata,
}

impl TrackType {
    /// All track types in renderer slot order
    pub const ALL: [TrackType; RENDERER_COUNT] = [
        TrackType::Video,
        TrackType::Audio,
        TrackType::Text,
        TrackType::Metadata,
    ];

    /// Renderer slot index for this type
    pub fn index(&self) -> usize {
        match self {
            TrackType::Video => 0,
            TrackType::Audio => 1,
            TrackType::Text => 2,
            TrackType::Metadata => 3,
        }
    }
}

impl std::fmt::Display for TrackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackType::Video => write!(f, "video"),
            TrackType::Audio => write!(f, "audio"),
            TrackType::Text => write!(f, "text"),
            TrackType::Metadata => write!(f, "metadata"),
        }
    }
}

/// Track selection within one track type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackSelection {
    /// No track of this type is rendered
    Disabled,
    /// Track at the given dense index
    Index(usize),
}

impl TrackSelection {
    pub fn is_disabled(&self) -> bool {
        matches!(self, TrackSelection::Disabled)
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            TrackSelection::Disabled => None,
            TrackSelection::Index(i) => Some(*i),
        }
    }
}

impl Default for TrackSelection {
    fn default() -> Self {
        TrackSelection::Index(0)
    }
}

impl std::fmt::Display for TrackSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackSelection::Disabled => write!(f, "off"),
            TrackSelection::Index(i) => write!(f, "{}", i),
        }
    }
}

/// Externally visible playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Nothing prepared
    Idle,
    /// Renderers are being built or handed to the engine
    Preparing,
    /// Waiting for enough media to play
    Buffering,
    /// Able to play from the current position
    Ready,
    /// Reached the end of the media
    Ended,
    /// Last build or playback attempt failed
    Error,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Preparing => write!(f, "preparing"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Ready => write!(f, "ready"),
            PlaybackState::Ended => write!(f, "ended"),
            PlaybackState::Error => write!(f, "error"),
        }
    }
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Format of one selectable track as announced by the manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFormat {
    /// Representation or adaptation set identifier
    pub id: String,
    /// MIME type of the samples (e.g. "video/mp4")
    pub mime_type: String,
    /// RFC 6381 codec string
    pub codecs: Option<String>,
    /// Bandwidth in bits per second
    pub bitrate: Option<u64>,
    /// Video resolution
    pub resolution: Option<Resolution>,
    /// Video frame rate
    pub frame_rate: Option<f32>,
    /// BCP-47 language code
    pub language: Option<String>,
    /// Audio channel count
    pub channels: Option<u16>,
    /// Audio sampling rate in Hz
    pub sample_rate: Option<u32>,
}

impl MediaFormat {
    /// Create a format with only an identifier and MIME type
    pub fn new(id: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            mime_type: mime_type.into(),
            codecs: None,
            bitrate: None,
            resolution: None,
            frame_rate: None,
            language: None,
            channels: None,
            sample_rate: None,
        }
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Some(Resolution::new(width, height));
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Human-readable label used for track menus
    pub fn label(&self) -> String {
        let mut parts = Vec::new();
        if let Some(resolution) = self.resolution {
            parts.push(resolution.to_string());
        }
        if let Some(language) = &self.language {
            parts.push(language.clone());
        }
        if let Some(channels) = self.channels {
            parts.push(format!("{}ch", channels));
        }
        if let Some(bitrate) = self.bitrate {
            parts.push(format!("{:.2} Mbit", bitrate as f64 / 1_000_000.0));
        }
        if parts.is_empty() {
            self.id.clone()
        } else {
            parts.join(", ")
        }
    }
}

/// One selectable track within a track type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    /// Dense index within the track type
    pub index: usize,
    /// Menu label
    pub label: String,
    /// Underlying format
    pub format: MediaFormat,
}

impl TrackDescriptor {
    pub fn new(index: usize, format: MediaFormat) -> Self {
        Self {
            index,
            label: format.label(),
            format,
        }
    }
}

impl std::fmt::Display for TrackDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label)
    }
}

/// Timed text cue currently on screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Cue text content (may contain markup)
    pub text: String,
    /// Start time in seconds
    pub start_time: f64,
    /// End time in seconds
    pub end_time: f64,
}

impl Cue {
    pub fn new(text: impl Into<String>, start_time: f64, end_time: f64) -> Self {
        Self {
            text: text.into(),
            start_time,
            end_time,
        }
    }
}

/// Decoded video dimensions reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
    pub unapplied_rotation_degrees: i32,
    pub pixel_width_height_ratio: f32,
}

impl VideoSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            unapplied_rotation_degrees: 0,
            pixel_width_height_ratio: 1.0,
        }
    }

    /// Display aspect ratio, `1.0` when the height is unknown
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            (self.width as f32 * self.pixel_width_height_ratio) / self.height as f32
        }
    }
}

/// Seekable range of the presentation in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Timed metadata (ID3 frames and similar) keyed by frame id
pub type Metadata = HashMap<String, serde_json::Value>;
