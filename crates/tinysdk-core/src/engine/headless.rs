//! Headless engine: drives the playback state machine and position clock
//! on a tokio task without decoding media.

use super::{EngineEvent, EngineEventSink, EngineState, PlaybackEngine};
use crate::config::PlayerConfiguration;
use crate::events::{FormatTrigger, InfoEvent};
use crate::renderer::{RendererMessage, RendererSet, Surface};
use crate::types::{MediaFormat, TimeRange, TrackSelection, TrackType, VideoSize, RENDERER_COUNT};
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

const DEFAULT_FRAME_RATE: f32 = 25.0;

/// Timing of the headless playback task
#[derive(Debug, Clone)]
pub struct HeadlessEngineConfig {
    /// Playback clock resolution
    pub tick: Duration,
    /// Ticks spent buffering after prepare or seek
    pub buffering_ticks: u32,
}

impl Default for HeadlessEngineConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            buffering_ticks: 2,
        }
    }
}

impl HeadlessEngineConfig {
    /// Default tick, buffering for the configured `min_buffer_ms`
    pub fn from_configuration(config: &PlayerConfiguration) -> Self {
        let tick = Self::default().tick;
        let tick_ms = tick.as_millis() as u64;
        Self {
            tick,
            buffering_ticks: config.min_buffer_ms.div_ceil(tick_ms) as u32,
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: EngineState,
    play_when_ready: bool,
    position_ms: u64,
    renderers: Option<RendererSet>,
    selections: [TrackSelection; RENDERER_COUNT],
    surface: Option<Surface>,
    sink: Option<EngineEventSink>,
    released: bool,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: EngineState::Idle,
            play_when_ready: false,
            position_ms: 0,
            renderers: None,
            selections: [TrackSelection::default(); RENDERER_COUNT],
            surface: None,
            sink: None,
            released: false,
        }
    }

    fn duration_ms(&self) -> Option<u64> {
        self.renderers
            .as_ref()
            .and_then(|set| set.duration())
            .map(|d| d.as_millis() as u64)
    }

    fn selected_format(&self, track_type: TrackType) -> Option<MediaFormat> {
        let index = self.selections[track_type.index()].index()?;
        self.renderers
            .as_ref()
            .and_then(|set| set.formats(track_type).get(index).cloned())
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(event);
        }
    }

    fn transition(&mut self, state: EngineState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "Engine state transition");
            self.state = state;
            self.emit(EngineEvent::StateChanged {
                play_when_ready: self.play_when_ready,
                state,
            });
        }
    }
}

enum Command {
    Prepare,
    Seek,
    Message {
        target: TrackType,
        message: RendererMessage,
        ack: Option<oneshot::Sender<()>>,
    },
    Release,
}

/// Engine without a media pipeline.
///
/// State changes, format reports and renderer messages follow the engine
/// contract; the position advances on the tick while ready and playing.
/// Must be created inside a tokio runtime.
pub struct HeadlessEngine {
    shared: Arc<Mutex<Shared>>,
    commands: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::with_config(HeadlessEngineConfig::default())
    }

    pub fn with_config(config: HeadlessEngineConfig) -> Self {
        let shared = Arc::new(Mutex::new(Shared::new()));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_playback(shared.clone(), command_rx, config));

        Self {
            shared,
            commands,
            task: Some(task),
        }
    }

    /// Surface currently attached to the video renderer
    pub fn surface(&self) -> Option<Surface> {
        self.shared.lock().surface
    }

    /// Report an event as if the playback task produced it
    pub fn emit(&self, event: EngineEvent) {
        self.shared.lock().emit(event);
    }

    fn send(&self, command: Command) {
        // A closed channel means the task already stopped after release
        let _ = self.commands.send(command);
    }
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HeadlessEngine {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl PlaybackEngine for HeadlessEngine {
    fn set_event_sink(&mut self, sink: EngineEventSink) {
        self.shared.lock().sink = Some(sink);
    }

    fn prepare(&mut self, renderers: RendererSet) {
        self.shared.lock().renderers = Some(renderers);
        self.send(Command::Prepare);
    }

    fn stop(&mut self) {
        let mut shared = self.shared.lock();
        shared.renderers = None;
        shared.surface = None;
        shared.transition(EngineState::Idle);
    }

    fn release(&mut self) {
        {
            let mut shared = self.shared.lock();
            if shared.released {
                return;
            }
            shared.released = true;
            shared.state = EngineState::Idle;
            shared.renderers = None;
            shared.surface = None;
            shared.sink = None;
        }
        self.send(Command::Release);
        self.task.take();
        info!("Headless engine released");
    }

    fn set_play_when_ready(&mut self, play_when_ready: bool) {
        let mut shared = self.shared.lock();
        if shared.play_when_ready != play_when_ready {
            shared.play_when_ready = play_when_ready;
            let state = shared.state;
            shared.emit(EngineEvent::StateChanged {
                play_when_ready,
                state,
            });
        }
    }

    fn play_when_ready(&self) -> bool {
        self.shared.lock().play_when_ready
    }

    fn playback_state(&self) -> EngineState {
        self.shared.lock().state
    }

    fn seek_to(&mut self, position_ms: u64) {
        {
            let mut shared = self.shared.lock();
            shared.position_ms = match shared.duration_ms() {
                Some(duration) => position_ms.min(duration),
                None => position_ms,
            };
        }
        self.send(Command::Seek);
    }

    fn current_position(&self) -> u64 {
        self.shared.lock().position_ms
    }

    fn duration(&self) -> Option<u64> {
        self.shared.lock().duration_ms()
    }

    fn buffered_percentage(&self) -> u8 {
        let shared = self.shared.lock();
        match (shared.state, shared.duration_ms()) {
            (EngineState::Ready | EngineState::Ended, Some(duration)) if duration > 0 => {
                // Treat one extra minute ahead of the playhead as buffered
                let buffered = (shared.position_ms + 60_000).min(duration);
                ((buffered * 100) / duration) as u8
            }
            _ => 0,
        }
    }

    fn track_count(&self, track_type: TrackType) -> usize {
        self.shared
            .lock()
            .renderers
            .as_ref()
            .map(|set| set.formats(track_type).len())
            .unwrap_or(0)
    }

    fn track_format(&self, track_type: TrackType, index: usize) -> Option<MediaFormat> {
        self.shared
            .lock()
            .renderers
            .as_ref()
            .and_then(|set| set.formats(track_type).get(index).cloned())
    }

    fn selected_track(&self, track_type: TrackType) -> TrackSelection {
        self.shared.lock().selections[track_type.index()]
    }

    fn set_selected_track(&mut self, track_type: TrackType, selection: TrackSelection) {
        let mut shared = self.shared.lock();
        shared.selections[track_type.index()] = selection;
        if track_type == TrackType::Video || track_type == TrackType::Audio {
            if let Some(format) = shared.selected_format(track_type) {
                let media_time_ms = shared.position_ms;
                shared.emit(EngineEvent::DownstreamFormatChanged {
                    source_type: track_type,
                    format,
                    trigger: FormatTrigger::Manual,
                    media_time_ms,
                });
            }
        }
    }

    fn send_message(&self, target: TrackType, message: RendererMessage) {
        self.send(Command::Message {
            target,
            message,
            ack: None,
        });
    }

    async fn blocking_send_message(
        &self,
        target: TrackType,
        message: RendererMessage,
    ) -> Result<()> {
        let (ack, processed) = oneshot::channel();
        self.commands
            .send(Command::Message {
                target,
                message,
                ack: Some(ack),
            })
            .map_err(|_| Error::EngineReleased)?;
        processed.await.map_err(|_| Error::EngineReleased)
    }
}

async fn run_playback(
    shared: Arc<Mutex<Shared>>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    config: HeadlessEngineConfig,
) {
    let mut ticker = tokio::time::interval(config.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let tick_ms = config.tick.as_millis() as u64;
    let mut buffering_left = 0u32;
    let mut last_tick: Option<Instant> = None;

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else { break };
                let mut shared = shared.lock();
                match command {
                    Command::Prepare => {
                        if shared.renderers.is_some() {
                            shared.transition(EngineState::Preparing);
                            initialize_decoders(&shared);
                            if let Some(end_ms) = shared.duration_ms() {
                                shared.emit(EngineEvent::Info(InfoEvent::AvailableRangeChanged(
                                    TimeRange { start_ms: 0, end_ms },
                                )));
                            }
                        }
                    }
                    Command::Seek => {
                        if matches!(shared.state, EngineState::Ready | EngineState::Ended) {
                            buffering_left = config.buffering_ticks;
                            shared.transition(EngineState::Buffering);
                        }
                    }
                    Command::Message { target, message, ack } => {
                        match message {
                            RendererMessage::SetSurface(surface) if target == TrackType::Video => {
                                trace!(attached = surface.is_some(), "Video surface updated");
                                shared.surface = surface;
                            }
                            other => {
                                debug!(renderer = %target, message = ?other, "Ignoring renderer message");
                            }
                        }
                        if let Some(ack) = ack {
                            let _ = ack.send(());
                        }
                    }
                    Command::Release => break,
                }
            }
            now = ticker.tick() => {
                let mut shared = shared.lock();
                if let Some(previous) = last_tick.replace(now) {
                    drop_frames(&shared, missed_ticks(now - previous, config.tick), tick_ms);
                }
                advance(&mut shared, tick_ms, &mut buffering_left, config.buffering_ticks);
            }
        }
    }

    debug!("Headless playback task stopped");
}

fn initialize_decoders(shared: &Shared) {
    let Some(set) = shared.renderers.as_ref() else { return };
    for renderer in set.slots().iter().filter_map(|slot| slot.renderer()) {
        if let Some(counters) = renderer.codec_counters() {
            counters.record_decoder_init();
            shared.emit(EngineEvent::Info(InfoEvent::DecoderInitialized {
                decoder_name: format!("headless.{}", renderer.track_type()),
                initialization_duration_ms: 0,
            }));
        }
    }
}

/// Ticks skipped between two consecutive ticks `gap` apart
fn missed_ticks(gap: Duration, tick: Duration) -> u64 {
    if tick.is_zero() {
        return 0;
    }
    (gap.as_nanos() / tick.as_nanos()).saturating_sub(1) as u64
}

/// Frames the video renderer shows in `elapsed_ms` at the selected frame rate
fn frames_in(shared: &Shared, elapsed_ms: u64) -> u64 {
    let frame_rate = shared
        .selected_format(TrackType::Video)
        .and_then(|format| format.frame_rate)
        .unwrap_or(DEFAULT_FRAME_RATE);
    (frame_rate * elapsed_ms as f32 / 1000.0) as u64
}

/// Account the frames of skipped ticks as dropped while playing
fn drop_frames(shared: &Shared, missed: u64, tick_ms: u64) {
    if missed == 0 || shared.state != EngineState::Ready || !shared.play_when_ready {
        return;
    }
    let Some(counters) = shared
        .renderers
        .as_ref()
        .and_then(|set| set.renderer(TrackType::Video))
        .and_then(|video| video.codec_counters())
    else {
        return;
    };

    let elapsed_ms = missed * tick_ms;
    let count = frames_in(shared, elapsed_ms);
    if count > 0 {
        counters.record_dropped(count);
        debug!(count, elapsed_ms, "Playback task fell behind, frames dropped");
        shared.emit(EngineEvent::Info(InfoEvent::DroppedFrames { count, elapsed_ms }));
    }
}

fn advance(shared: &mut Shared, tick_ms: u64, buffering_left: &mut u32, buffering_ticks: u32) {
    match shared.state {
        EngineState::Preparing => {
            *buffering_left = buffering_ticks;
            shared.transition(EngineState::Buffering);
            for track_type in [TrackType::Video, TrackType::Audio] {
                if let Some(format) = shared.selected_format(track_type) {
                    let media_time_ms = shared.position_ms;
                    shared.emit(EngineEvent::DownstreamFormatChanged {
                        source_type: track_type,
                        format,
                        trigger: FormatTrigger::Initial,
                        media_time_ms,
                    });
                }
            }
        }
        EngineState::Buffering => {
            if *buffering_left > 0 {
                *buffering_left -= 1;
                return;
            }
            shared.transition(EngineState::Ready);
            if let Some(resolution) = shared
                .selected_format(TrackType::Video)
                .and_then(|format| format.resolution)
            {
                shared.emit(EngineEvent::VideoSizeChanged(VideoSize::new(
                    resolution.width,
                    resolution.height,
                )));
            }
        }
        EngineState::Ready if shared.play_when_ready => {
            shared.position_ms += tick_ms;
            if let Some(counters) = shared
                .renderers
                .as_ref()
                .and_then(|set| set.renderer(TrackType::Video))
                .and_then(|video| video.codec_counters())
            {
                counters.record_rendered(frames_in(shared, tick_ms));
            }
            if let Some(duration) = shared.duration_ms() {
                if shared.position_ms >= duration {
                    shared.position_ms = duration;
                    shared.transition(EngineState::Ended);
                }
            }
        }
        _ => {}
    }
}
