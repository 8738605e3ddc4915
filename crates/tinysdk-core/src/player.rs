//! Media player - owns one playback session end to end
//!
//! Coordinates:
//! - Asynchronous renderer building and its cancellation
//! - Handing renderers and the display surface to the engine
//! - Derived playback state and deduplicated listener notification
//! - Routing engine diagnostics to the optional observers
//!
//! Builder replies and engine reports arrive through one ordered inbox and
//! are handled on the caller's task by [`MediaPlayer::process_pending`] or
//! [`MediaPlayer::process_next`].

use crate::bandwidth::BandwidthMeter;
use crate::builder::{create_renderer_builder, BuildReply, BuildRequest, BuiltRenderers, RendererBuilder};
use crate::config::PlayerConfiguration;
use crate::engine::{EngineEvent, EngineEventSink, EngineState, PlaybackEngine};
use crate::events::{
    InfoEvent, InternalError, ListenerId, ListenerRegistry, Observers, PlayerEvent,
    PlayerEventReceiver, PlayerEventSender,
};
use crate::renderer::{CodecCounters, RendererHandle, RendererMessage, RendererSet, Surface};
use crate::source::Stream;
use crate::types::{
    Cue, MediaFormat, Metadata, PlaybackState, TrackDescriptor, TrackSelection, TrackType,
};
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Messages handled on the player's task, in arrival order
#[derive(Debug)]
pub(crate) enum Inbound {
    RenderersReady { generation: u64, built: BuiltRenderers },
    RenderersError { generation: u64, error: Error },
    BuildInfo { generation: u64, event: InfoEvent },
    Engine(EngineEvent),
}

/// Renderer build phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildState {
    Idle,
    Building,
    Built,
}

/// Player facade over a renderer builder and a playback engine
pub struct MediaPlayer {
    stream: Stream,
    config: Arc<PlayerConfiguration>,
    builder: Box<dyn RendererBuilder>,
    engine: Box<dyn PlaybackEngine>,
    inbox_tx: mpsc::UnboundedSender<Inbound>,
    inbox_rx: mpsc::UnboundedReceiver<Inbound>,
    build_state: BuildState,
    build_generation: u64,
    last_reported: (bool, PlaybackState),
    /// Set by a build failure or fatal engine error until the next prepare
    failed: bool,
    released: bool,
    surface: Option<Surface>,
    video_renderer: Option<RendererHandle>,
    codec_counters: Option<Arc<CodecCounters>>,
    video_format: Option<MediaFormat>,
    bandwidth_meter: Option<Arc<BandwidthMeter>>,
    video_aspect_ratio: Option<f32>,
    resume_position: u64,
    listeners: ListenerRegistry,
    observers: Observers,
}

impl MediaPlayer {
    /// Create a player using the builder for the stream's source type
    pub fn new(
        stream: Stream,
        config: PlayerConfiguration,
        engine: Box<dyn PlaybackEngine>,
    ) -> Result<Self> {
        let builder = create_renderer_builder(&stream, &config)?;
        Ok(Self::with_builder(stream, config, builder, engine))
    }

    /// Create a player with an explicit renderer builder
    pub fn with_builder(
        stream: Stream,
        config: PlayerConfiguration,
        builder: Box<dyn RendererBuilder>,
        mut engine: Box<dyn PlaybackEngine>,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        engine.set_event_sink(EngineEventSink::new(inbox_tx.clone()));
        engine.set_selected_track(TrackType::Text, TrackSelection::Disabled);

        info!(stream = %stream, source_type = %stream.source_type(), "Media player created");

        Self {
            stream,
            config: Arc::new(config),
            builder,
            engine,
            inbox_tx,
            inbox_rx,
            build_state: BuildState::Idle,
            build_generation: 0,
            last_reported: (false, PlaybackState::Idle),
            failed: false,
            released: false,
            surface: None,
            video_renderer: None,
            codec_counters: None,
            video_format: None,
            bandwidth_meter: None,
            video_aspect_ratio: None,
            resume_position: 0,
            listeners: ListenerRegistry::new(),
            observers: Observers::default(),
        }
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    pub fn config(&self) -> &PlayerConfiguration {
        &self.config
    }

    // ------------------------------------------------------------------
    // Listeners and observers
    // ------------------------------------------------------------------

    pub fn add_listener(&mut self, sender: PlayerEventSender) -> ListenerId {
        self.listeners.add(sender)
    }

    /// Register a listener channel and return its receiving end
    pub fn subscribe(&mut self) -> (ListenerId, PlayerEventReceiver) {
        self.listeners.subscribe()
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn set_internal_error_observer(&mut self, sender: Option<mpsc::UnboundedSender<InternalError>>) {
        self.observers.internal_error.set(sender);
    }

    pub fn subscribe_internal_errors(&mut self) -> mpsc::UnboundedReceiver<InternalError> {
        self.observers.internal_error.subscribe()
    }

    pub fn set_caption_observer(&mut self, sender: Option<mpsc::UnboundedSender<Vec<Cue>>>) {
        self.observers.captions.set(sender);
    }

    pub fn subscribe_captions(&mut self) -> mpsc::UnboundedReceiver<Vec<Cue>> {
        self.observers.captions.subscribe()
    }

    pub fn set_metadata_observer(&mut self, sender: Option<mpsc::UnboundedSender<Metadata>>) {
        self.observers.metadata.set(sender);
    }

    pub fn subscribe_metadata(&mut self) -> mpsc::UnboundedReceiver<Metadata> {
        self.observers.metadata.subscribe()
    }

    pub fn set_info_observer(&mut self, sender: Option<mpsc::UnboundedSender<InfoEvent>>) {
        self.observers.info.set(sender);
    }

    pub fn subscribe_info(&mut self) -> mpsc::UnboundedReceiver<InfoEvent> {
        self.observers.info.subscribe()
    }

    // ------------------------------------------------------------------
    // Display surface
    // ------------------------------------------------------------------

    /// Attach the render target; pushed at once if a video renderer is active
    pub fn set_display(&mut self, surface: Surface) {
        self.surface = Some(surface);
        self.push_surface();
    }

    pub fn surface(&self) -> Option<Surface> {
        self.surface
    }

    /// Detach the surface and wait until the playback thread dropped it.
    ///
    /// Call before the platform destroys the window backing the surface.
    pub async fn clear_display_surface(&mut self) -> Result<()> {
        self.surface = None;
        if self.video_renderer.is_none() {
            return Ok(());
        }
        self.engine
            .blocking_send_message(TrackType::Video, RendererMessage::SetSurface(None))
            .await?;
        debug!("Display surface cleared");
        Ok(())
    }

    fn push_surface(&self) {
        if self.video_renderer.is_some() {
            self.engine
                .send_message(TrackType::Video, RendererMessage::SetSurface(self.surface));
        }
    }

    // ------------------------------------------------------------------
    // Tracks
    // ------------------------------------------------------------------

    pub fn track_count(&self, track_type: TrackType) -> usize {
        self.engine.track_count(track_type)
    }

    pub fn track(&self, track_type: TrackType, index: usize) -> Option<TrackDescriptor> {
        self.engine
            .track_format(track_type, index)
            .map(|format| TrackDescriptor::new(index, format))
    }

    /// All tracks of a type in index order
    pub fn tracks(&self, track_type: TrackType) -> Vec<TrackDescriptor> {
        (0..self.track_count(track_type))
            .filter_map(|index| self.track(track_type, index))
            .collect()
    }

    pub fn selected_track(&self, track_type: TrackType) -> TrackSelection {
        self.engine.selected_track(track_type)
    }

    /// Select a track; disabling text clears the captions on screen.
    ///
    /// Indices are checked against the installed renderers. Before that the
    /// selection is handed to the engine as is and applies to the next build.
    pub fn set_selected_track(
        &mut self,
        track_type: TrackType,
        selection: TrackSelection,
    ) -> Result<()> {
        if let TrackSelection::Index(index) = selection {
            if self.build_state == BuildState::Built && index >= self.engine.track_count(track_type) {
                return Err(Error::TrackOutOfRange { track_type, index });
            }
        }

        debug!(track_type = %track_type, selection = %selection, "Selecting track");
        self.engine.set_selected_track(track_type, selection);

        if track_type == TrackType::Text && selection.is_disabled() {
            self.observers.captions.notify(Vec::new());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start building renderers for the stream, cancelling any build in flight
    #[instrument(skip(self), fields(stream = %self.stream))]
    pub fn prepare(&mut self) -> Result<()> {
        if self.released {
            return Err(Error::Released);
        }

        if self.build_state == BuildState::Built {
            self.engine.stop();
        }
        self.engine.set_play_when_ready(true);
        self.builder.cancel();
        self.video_format = None;
        self.video_renderer = None;
        self.failed = false;

        self.build_generation += 1;
        self.build_state = BuildState::Building;
        info!(generation = self.build_generation, "Building renderers");
        self.maybe_report_state();

        self.builder.build_renderers(BuildRequest {
            stream: self.stream.clone(),
            config: self.config.clone(),
            reply: BuildReply::new(self.build_generation, self.inbox_tx.clone()),
        });
        Ok(())
    }

    /// Install the renderers of the current build and hand them to the engine
    pub(crate) fn on_renderers_ready(&mut self, built: BuiltRenderers) {
        let renderers = RendererSet::backfill(built.renderers).with_duration(built.duration);

        self.video_renderer = renderers.renderer(TrackType::Video).map(RendererHandle::from);
        self.codec_counters = self
            .video_renderer
            .as_ref()
            .and_then(|video| video.codec_counters.clone())
            .or_else(|| {
                renderers
                    .renderer(TrackType::Audio)
                    .and_then(|audio| audio.codec_counters())
            });
        self.bandwidth_meter = built.bandwidth_meter;

        self.push_surface();
        self.engine.prepare(renderers);
        self.build_state = BuildState::Built;
        info!(
            generation = self.build_generation,
            has_video = self.video_renderer.is_some(),
            "Renderers ready"
        );
    }

    /// Report a failed build and fall back to idle
    pub(crate) fn on_renderers_error(&mut self, error: Error) {
        warn!(generation = self.build_generation, error = %error, "Renderer build failed");
        let error = Arc::new(error);

        self.observers
            .internal_error
            .notify(InternalError::RendererInitialization(error.clone()));
        self.listeners.notify(&PlayerEvent::Error(error));

        self.build_state = BuildState::Idle;
        self.failed = true;
        self.maybe_report_state();
    }

    /// Tear the session down, keeping the position for a later resume.
    ///
    /// Calling it again is a no-op. Also performed on drop.
    #[instrument(skip(self), fields(stream = %self.stream))]
    pub fn release(&mut self) {
        if self.released {
            return;
        }

        self.resume_position = self.engine.current_position();
        self.builder.cancel();
        self.build_state = BuildState::Idle;
        self.failed = false;
        self.surface = None;
        self.video_renderer = None;
        self.engine.release();
        self.released = true;

        info!(resume_position_ms = self.resume_position, "Media player released");
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    // ------------------------------------------------------------------
    // Playback control
    // ------------------------------------------------------------------

    pub fn seek_to(&mut self, position_ms: u64) {
        self.engine.seek_to(position_ms);
    }

    pub fn current_position(&self) -> u64 {
        if self.released {
            self.resume_position
        } else {
            self.engine.current_position()
        }
    }

    /// Duration in milliseconds, `None` when unknown or live
    pub fn duration(&self) -> Option<u64> {
        self.engine.duration()
    }

    pub fn buffered_percentage(&self) -> u8 {
        self.engine.buffered_percentage()
    }

    pub fn play_when_ready(&self) -> bool {
        self.engine.play_when_ready()
    }

    /// Pause (`false`) or resume (`true`) playback
    pub fn set_play_when_ready(&mut self, play_when_ready: bool) {
        self.engine.set_play_when_ready(play_when_ready);
    }

    /// Position cached by the last [`release`](Self::release)
    pub fn resume_position(&self) -> u64 {
        self.resume_position
    }

    /// Externally visible state, derived from the build phase and the engine
    pub fn playback_state(&self) -> PlaybackState {
        if self.build_state == BuildState::Building {
            return PlaybackState::Preparing;
        }
        if self.failed {
            return PlaybackState::Error;
        }
        let engine_state = self.engine.playback_state();
        if self.build_state == BuildState::Built && engine_state == EngineState::Idle {
            // Renderers are still on their way to the playback thread
            return PlaybackState::Preparing;
        }
        engine_state.into()
    }

    /// Last video format the engine switched to
    pub fn format(&self) -> Option<&MediaFormat> {
        self.video_format.as_ref()
    }

    pub fn bandwidth_meter(&self) -> Option<Arc<BandwidthMeter>> {
        self.bandwidth_meter.clone()
    }

    pub fn codec_counters(&self) -> Option<Arc<CodecCounters>> {
        self.codec_counters.clone()
    }

    /// Display aspect ratio from the last video size report
    pub fn video_aspect_ratio(&self) -> Option<f32> {
        self.video_aspect_ratio
    }

    fn maybe_report_state(&mut self) {
        let reported = (self.engine.play_when_ready(), self.playback_state());
        if reported != self.last_reported {
            let (play_when_ready, state) = reported;
            debug!(play_when_ready, state = %state, "Reporting player state");
            self.listeners.notify(&PlayerEvent::StateChanged {
                play_when_ready,
                state,
            });
            self.last_reported = reported;
        }
    }

    // ------------------------------------------------------------------
    // Inbox
    // ------------------------------------------------------------------

    /// Handle every message already queued; returns how many were handled
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(inbound) = self.inbox_rx.try_recv() {
            self.handle(inbound);
            handled += 1;
        }
        handled
    }

    /// Wait for the next message and handle it
    pub async fn process_next(&mut self) -> Result<()> {
        if self.released {
            return Err(Error::Released);
        }
        // The player holds a sender itself, so the inbox never closes
        if let Some(inbound) = self.inbox_rx.recv().await {
            self.handle(inbound);
        }
        Ok(())
    }

    fn accepts_build(&self, generation: u64) -> bool {
        !self.released && self.build_state == BuildState::Building && generation == self.build_generation
    }

    fn handle(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::RenderersReady { generation, built } => {
                if self.accepts_build(generation) {
                    self.on_renderers_ready(built);
                } else {
                    debug!(generation, current = self.build_generation, "Dropping stale renderers");
                }
            }
            Inbound::RenderersError { generation, error } => {
                if self.accepts_build(generation) {
                    self.on_renderers_error(error);
                } else {
                    debug!(generation, current = self.build_generation, "Dropping stale build error");
                }
            }
            Inbound::BuildInfo { generation, event } => {
                if self.accepts_build(generation) {
                    self.observers.info.notify(event);
                }
            }
            Inbound::Engine(event) => {
                if self.released {
                    debug!(event = ?event, "Dropping engine event after release");
                } else {
                    self.handle_engine_event(event);
                }
            }
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::StateChanged { .. } => self.maybe_report_state(),
            EngineEvent::PlayerError(error) if self.build_state != BuildState::Built => {
                // Raised by the session prepare() already stopped
                debug!(error = %error, phase = ?self.build_state, "Dropping stale playback error");
            }
            EngineEvent::PlayerError(error) => {
                warn!(error = %error, "Playback error");
                self.build_state = BuildState::Idle;
                self.failed = true;
                self.listeners.notify(&PlayerEvent::Error(Arc::new(error)));
                self.maybe_report_state();
            }
            EngineEvent::VideoSizeChanged(size) => {
                self.video_aspect_ratio = Some(size.aspect_ratio());
                self.listeners.notify(&PlayerEvent::VideoSizeChanged(size));
            }
            EngineEvent::DownstreamFormatChanged {
                source_type,
                format,
                trigger,
                media_time_ms,
            } => match source_type {
                TrackType::Video => {
                    self.video_format = Some(format.clone());
                    self.observers.info.notify(InfoEvent::VideoFormatEnabled {
                        format,
                        trigger,
                        media_time_ms,
                    });
                }
                TrackType::Audio => self.observers.info.notify(InfoEvent::AudioFormatEnabled {
                    format,
                    trigger,
                    media_time_ms,
                }),
                _ => {}
            },
            EngineEvent::Cues(cues) => {
                if !self.engine.selected_track(TrackType::Text).is_disabled() {
                    self.observers.captions.notify(cues);
                }
            }
            EngineEvent::Metadata(metadata) => {
                if !self.engine.selected_track(TrackType::Metadata).is_disabled() {
                    self.observers.metadata.notify(metadata);
                }
            }
            EngineEvent::Internal(error) => {
                debug!(error = ?error, "Engine diagnostic");
                self.observers.internal_error.notify(error);
            }
            EngineEvent::Info(info) => self.observers.info.notify(info),
        }
    }
}

impl Drop for MediaPlayer {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MediaPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaPlayer")
            .field("stream", &self.stream)
            .field("build_state", &self.build_state)
            .field("build_generation", &self.build_generation)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
