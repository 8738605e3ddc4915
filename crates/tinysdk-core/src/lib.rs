//! tinysdk Core - Playback SDK over an adaptive-streaming engine
//!
//! This crate provides the player facade and its collaborators:
//! - `MediaPlayer` session lifecycle and renderer-build state machine
//! - Renderer builders selected by source type (DASH, HLS, SmoothStreaming)
//! - The playback engine contract and a headless engine
//! - Ordered listener events and diagnostic observers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          tinysdk Core                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐                          ┌──────────────┐     │
//! │  │   Renderer   │── BuildReply ──┐         │  Listeners & │     │
//! │  │   Builder    │                │         │  Observers   │     │
//! │  └──────▲───────┘                ▼         └──────▲───────┘     │
//! │         │                 ┌─────────────┐         │             │
//! │         └──── prepare ────│ MediaPlayer │─────────┘             │
//! │                           │   (inbox)   │                       │
//! │                           └──┬───────▲──┘                       │
//! │                 renderers,   │       │  EngineEvent             │
//! │                 messages     ▼       │                          │
//! │                           ┌──────────┴──┐                       │
//! │                           │   Playback  │                       │
//! │                           │    Engine   │                       │
//! │                           └─────────────┘                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod bandwidth;
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod player;
pub mod renderer;
pub mod source;
pub mod types;

pub use bandwidth::BandwidthMeter;
pub use builder::{create_renderer_builder, BuildReply, BuildRequest, BuiltRenderers, RendererBuilder};
pub use config::PlayerConfiguration;
pub use engine::{EngineEvent, EngineEventSink, EngineState, HeadlessEngine, HeadlessEngineConfig, PlaybackEngine};
pub use error::{Error, Result};
pub use events::{FormatTrigger, InfoEvent, InternalError, ListenerId, PlayerEvent};
pub use player::MediaPlayer;
pub use renderer::{Renderer, RendererMessage, RendererSet, RendererSlot, Surface};
pub use source::{SourceType, Stream};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library, logging its version
pub fn init() {
    tracing::info!(version = VERSION, "tinysdk core initialized");
}
