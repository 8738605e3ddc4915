//! CLI command implementations

use crate::output::{to_json, to_json_line, to_table, OutputFormat};
use crate::samples;
use anyhow::{anyhow, Context};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tinysdk_core::{
    Error, HeadlessEngine, HeadlessEngineConfig, MediaPlayer, PlaybackState, PlayerConfiguration,
    PlayerEvent, Stream, Surface, TrackSelection, TrackType,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Track types offered in track menus
const MENU_TRACK_TYPES: [TrackType; 3] = [TrackType::Video, TrackType::Audio, TrackType::Text];

/// Parse a track selection argument: `off` or a track index
pub fn parse_selection(s: &str) -> Result<TrackSelection, String> {
    match s.trim().to_lowercase().as_str() {
        "off" | "none" | "disabled" => Ok(TrackSelection::Disabled),
        other => other
            .parse()
            .map(TrackSelection::Index)
            .map_err(|_| format!("expected 'off' or a track index, got '{}'", s)),
    }
}

/// List sample streams
pub fn list(format: &str) -> anyhow::Result<()> {
    let samples = samples::dash_samples();

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", to_json(&samples)?),
        OutputFormat::Table => println!("{}", to_table(&samples)),
        OutputFormat::Text => {
            println!("DASH - MP4:");
            for sample in &samples {
                println!("  {} ({}) [{}]", sample.name, sample.content_id, sample.provider);
                println!("    {}", sample.uri.trim());
            }
        }
    }

    Ok(())
}

/// Options of the `play` command
#[derive(Debug, Clone)]
pub struct PlayOptions {
    pub position_ms: u64,
    pub video: Option<TrackSelection>,
    pub audio: Option<TrackSelection>,
    pub captions: Option<TrackSelection>,
    pub retries: u32,
    pub max_seconds: Option<u64>,
}

#[derive(Debug)]
enum SessionEnd {
    Finished,
    TimedOut,
    Failed(Arc<Error>),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StateLine {
    play_when_ready: bool,
    playback_state: PlaybackState,
}

/// Play a stream headlessly, printing every state change
pub async fn play(
    target: &str,
    config: PlayerConfiguration,
    options: PlayOptions,
    format: &str,
) -> anyhow::Result<()> {
    let stream = Stream::parse(&samples::resolve(target))
        .with_context(|| format!("invalid stream locator '{}'", target))?;
    let format = OutputFormat::from(format);
    let deadline = options
        .max_seconds
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    println!("Playing: {} ({})", stream, stream.source_type());

    let mut position_ms = options.position_ms;
    let mut attempt = 0;
    loop {
        let (end, resume_position) =
            play_session(&stream, &config, position_ms, &options, deadline, format).await?;
        position_ms = resume_position;

        match end {
            SessionEnd::Finished | SessionEnd::TimedOut => break,
            SessionEnd::Failed(error) if attempt < options.retries && error.is_recoverable() => {
                attempt += 1;
                warn!(error = %error, attempt, "Playback failed, retrying");
                println!(
                    "Error: {} - retrying ({}/{}) from {} ms",
                    error, attempt, options.retries, position_ms
                );
            }
            SessionEnd::Failed(error) => {
                println!("Resume position: {} ms", position_ms);
                return Err(anyhow!("playback failed [{}]: {}", error.error_code(), error));
            }
        }
    }

    println!("Resume position: {} ms", position_ms);
    Ok(())
}

/// One player lifetime, from creation to release
async fn play_session(
    stream: &Stream,
    config: &PlayerConfiguration,
    position_ms: u64,
    options: &PlayOptions,
    deadline: Option<Instant>,
    format: OutputFormat,
) -> anyhow::Result<(SessionEnd, u64)> {
    let mut player = MediaPlayer::new(
        stream.clone(),
        config.clone(),
        Box::new(HeadlessEngine::with_config(
            HeadlessEngineConfig::from_configuration(config),
        )),
    )?;
    let (_, mut events) = player.subscribe();
    let mut captions = player.subscribe_captions();

    player.seek_to(position_ms);
    player.set_display(Surface::new());
    player.prepare()?;

    let mut selections_applied = false;
    let mut last_error = None;

    let end = loop {
        let next = match deadline {
            Some(deadline) => {
                match tokio::time::timeout_at(deadline, player.process_next()).await {
                    Ok(result) => result,
                    Err(_) => break SessionEnd::TimedOut,
                }
            }
            None => player.process_next().await,
        };
        next?;

        while let Ok(event) = events.try_recv() {
            match event {
                PlayerEvent::StateChanged {
                    play_when_ready,
                    state,
                } => print_state(play_when_ready, state, format)?,
                PlayerEvent::Error(error) => {
                    println!("Error: {}", error);
                    last_error = Some(error);
                }
                PlayerEvent::VideoSizeChanged(size) => {
                    debug!(width = size.width, height = size.height, "Video size changed");
                }
            }
        }

        while let Ok(cues) = captions.try_recv() {
            for cue in cues {
                println!("[captions] {}", cue.text);
            }
        }

        if !selections_applied && MENU_TRACK_TYPES.iter().any(|t| player.track_count(*t) > 0) {
            apply_selections(&mut player, options);
            selections_applied = true;
        }

        match player.playback_state() {
            PlaybackState::Ended => break SessionEnd::Finished,
            PlaybackState::Error => {
                break SessionEnd::Failed(
                    last_error
                        .take()
                        .unwrap_or_else(|| Arc::new(Error::Playback("unknown error".into()))),
                )
            }
            _ => {}
        }
    };

    if let Some(counters) = player.codec_counters() {
        let counters = counters.snapshot();
        info!(
            decoder_inits = counters.decoder_inits,
            rendered = counters.rendered_frames,
            dropped = counters.dropped_frames,
            "Codec counters"
        );
    }
    if let Some(bitrate) = player.bandwidth_meter().and_then(|m| m.bitrate_estimate()) {
        info!(bitrate, "Bandwidth estimate");
    }

    player.clear_display_surface().await?;
    player.release();
    info!(resume_position_ms = player.resume_position(), "Session ended");

    Ok((end, player.resume_position()))
}

fn apply_selections(player: &mut MediaPlayer, options: &PlayOptions) {
    let requested = [
        (TrackType::Video, options.video),
        (TrackType::Audio, options.audio),
        (TrackType::Text, options.captions),
    ];
    for (track_type, selection) in requested {
        let Some(selection) = selection else { continue };
        if let Err(e) = player.set_selected_track(track_type, selection) {
            println!("Cannot select {} track {}: {}", track_type, selection, e);
        }
    }
}

fn print_state(play_when_ready: bool, state: PlaybackState, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!(
            "{}",
            to_json_line(&StateLine {
                play_when_ready,
                playback_state: state,
            })?
        ),
        OutputFormat::Text | OutputFormat::Table => {
            println!("playWhenReady={}, playbackState={}", play_when_ready, state)
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct TrackMenu {
    track_type: TrackType,
    selected: TrackSelection,
    tracks: Vec<tinysdk_core::TrackDescriptor>,
}

/// Build the renderers of a stream and list its tracks
pub async fn tracks(target: &str, config: PlayerConfiguration, format: &str) -> anyhow::Result<()> {
    let stream = Stream::parse(&samples::resolve(target))
        .with_context(|| format!("invalid stream locator '{}'", target))?;
    let wait = config.request_timeout() + Duration::from_secs(5);

    let engine = HeadlessEngine::with_config(HeadlessEngineConfig::from_configuration(&config));
    let mut player = MediaPlayer::new(stream, config, Box::new(engine))?;
    let (_, mut events) = player.subscribe();
    player.prepare()?;

    tokio::time::timeout(wait, async {
        while player.playback_state() == PlaybackState::Preparing
            && MENU_TRACK_TYPES.iter().all(|t| player.track_count(*t) == 0)
        {
            player.process_next().await?;
        }
        Ok::<_, Error>(())
    })
    .await
    .context("timed out waiting for renderers")??;

    while let Ok(event) = events.try_recv() {
        if let PlayerEvent::Error(error) = event {
            player.release();
            return Err(anyhow!("renderer build failed [{}]: {}", error.error_code(), error));
        }
    }

    let menus: Vec<TrackMenu> = MENU_TRACK_TYPES
        .iter()
        .map(|&track_type| TrackMenu {
            track_type,
            selected: player.selected_track(track_type),
            tracks: player.tracks(track_type),
        })
        .collect();
    player.release();

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", to_json(&menus)?),
        OutputFormat::Text | OutputFormat::Table => {
            for menu in &menus {
                println!("{}:", menu.track_type);
                let mark = |selected: bool| if selected { "[x]" } else { "[ ]" };
                println!("  {} Off", mark(menu.selected.is_disabled()));
                for track in &menu.tracks {
                    println!(
                        "  {} {}",
                        mark(menu.selected.index() == Some(track.index)),
                        track
                    );
                }
            }
        }
    }

    Ok(())
}
