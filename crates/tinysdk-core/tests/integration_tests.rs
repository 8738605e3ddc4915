//! Integration tests for tinysdk Core

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tinysdk_core::{
    BuildRequest, BuiltRenderers, Error, FormatTrigger, HeadlessEngine, HeadlessEngineConfig,
    InfoEvent, MediaFormat, MediaPlayer, PlaybackState, PlayerConfiguration, PlayerEvent,
    Renderer, RendererBuilder, SourceType, Stream, Surface, TrackSelection, TrackType,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// =============================================================================
// Helpers
// =============================================================================

fn fast_engine() -> Box<HeadlessEngine> {
    Box::new(HeadlessEngine::with_config(HeadlessEngineConfig {
        tick: Duration::from_millis(5),
        buffering_ticks: 1,
    }))
}

fn sample_renderers(duration: Duration) -> BuiltRenderers {
    BuiltRenderers {
        renderers: [
            Some(Renderer::media_codec(
                TrackType::Video,
                vec![
                    MediaFormat::new("v360", "video/mp4")
                        .with_resolution(640, 360)
                        .with_bitrate(800_000),
                    MediaFormat::new("v720", "video/mp4")
                        .with_resolution(1280, 720)
                        .with_bitrate(2_500_000),
                ],
            )),
            Some(Renderer::media_codec(
                TrackType::Audio,
                vec![MediaFormat::new("a-en", "audio/mp4").with_language("en")],
            )),
            None,
            None,
        ],
        duration: Some(duration),
        bandwidth_meter: None,
    }
}

/// Replies from the build call itself; fails the first `failures` builds
struct ScriptedBuilder {
    duration: Duration,
    failures: usize,
    builds: Arc<AtomicUsize>,
}

impl ScriptedBuilder {
    fn new(duration: Duration) -> Self {
        Self {
            duration,
            failures: 0,
            builds: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing(mut self, failures: usize) -> Self {
        self.failures = failures;
        self
    }
}

impl RendererBuilder for ScriptedBuilder {
    fn build_renderers(&mut self, request: BuildRequest) {
        let attempt = self.builds.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            request
                .reply
                .failed(Error::ManifestFetch("HTTP 503 Service Unavailable".into()));
        } else {
            request.reply.ready(sample_renderers(self.duration));
        }
    }

    fn cancel(&mut self) {}
}

fn scripted_player(builder: ScriptedBuilder) -> MediaPlayer {
    MediaPlayer::with_builder(
        Stream::parse("https://example.com/manifest.mpd").unwrap(),
        PlayerConfiguration::default(),
        Box::new(builder),
        fast_engine(),
    )
}

async fn drive_until(player: &mut MediaPlayer, mut done: impl FnMut(&MediaPlayer) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(player) {
            player.process_next().await.unwrap();
        }
    })
    .await
    .expect("player did not reach the expected condition");
    // The engine may have reported more than the condition looked at
    player.process_pending();
}

fn states(rx: &mut tinysdk_core::events::PlayerEventReceiver) -> Vec<PlaybackState> {
    let mut states = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let PlayerEvent::StateChanged { state, .. } = event {
            states.push(state);
        }
    }
    states
}

/// Serve one HTTP response on a local port and return its URL
async fn serve_once(path: &str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/dash+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
    });
    format!("http://{}{}", addr, path)
}

const MPD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static" mediaPresentationDuration="PT0.2S">
  <Period>
    <AdaptationSet contentType="video" mimeType="video/mp4">
      <Representation id="hi" bandwidth="3000000" width="1920" height="1080" codecs="avc1.640028"/>
      <Representation id="lo" bandwidth="400000" width="480" height="270" codecs="avc1.42c015"/>
    </AdaptationSet>
    <AdaptationSet contentType="audio" mimeType="audio/mp4" lang="fr">
      <Representation id="aud" bandwidth="96000" codecs="mp4a.40.2"/>
    </AdaptationSet>
  </Period>
</MPD>"#;

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_playback_runs_to_end() {
    let mut player = scripted_player(ScriptedBuilder::new(Duration::from_millis(100)));
    let (_, mut rx) = player.subscribe();
    player.set_display(Surface::new());

    player.prepare().unwrap();
    drive_until(&mut player, |p| p.playback_state() == PlaybackState::Ended).await;

    assert_eq!(
        states(&mut rx),
        vec![
            PlaybackState::Preparing,
            PlaybackState::Buffering,
            PlaybackState::Ready,
            PlaybackState::Ended,
        ]
    );
    assert_eq!(player.current_position(), 100);
    assert!(player.codec_counters().is_some());
}

#[tokio::test]
async fn test_video_size_and_format_reported() {
    let mut player = scripted_player(ScriptedBuilder::new(Duration::from_secs(60)));
    let mut info = player.subscribe_info();

    player.prepare().unwrap();
    drive_until(&mut player, |p| p.playback_state() == PlaybackState::Ready).await;

    assert_eq!(player.format().map(|f| f.id.as_str()), Some("v360"));
    assert_eq!(player.video_aspect_ratio(), Some(640.0 / 360.0));
    let reported: Vec<_> = std::iter::from_fn(|| info.try_recv().ok()).collect();
    assert!(reported
        .iter()
        .any(|e| matches!(e, InfoEvent::DecoderInitialized { .. })));
    assert!(reported.iter().any(|e| matches!(
        e,
        InfoEvent::VideoFormatEnabled {
            trigger: FormatTrigger::Initial,
            ..
        }
    )));
}

#[tokio::test]
async fn test_manual_track_selection() {
    let mut player = scripted_player(ScriptedBuilder::new(Duration::from_secs(60)));
    let mut info = player.subscribe_info();

    player.prepare().unwrap();
    drive_until(&mut player, |p| p.playback_state() == PlaybackState::Ready).await;
    while info.try_recv().is_ok() {}

    let labels: Vec<_> = player
        .tracks(TrackType::Video)
        .into_iter()
        .map(|t| t.label)
        .collect();
    assert_eq!(labels, vec!["640x360, 0.80 Mbit", "1280x720, 2.50 Mbit"]);

    player
        .set_selected_track(TrackType::Video, TrackSelection::Index(1))
        .unwrap();
    player.process_pending();

    assert_eq!(player.selected_track(TrackType::Video), TrackSelection::Index(1));
    assert_eq!(player.format().map(|f| f.id.as_str()), Some("v720"));
    assert!(matches!(
        info.try_recv(),
        Ok(InfoEvent::VideoFormatEnabled {
            trigger: FormatTrigger::Manual,
            ..
        })
    ));
}

#[tokio::test]
async fn test_clear_display_surface_waits_for_engine() {
    let mut player = scripted_player(ScriptedBuilder::new(Duration::from_secs(60)));
    player.set_display(Surface::new());
    player.prepare().unwrap();
    drive_until(&mut player, |p| p.playback_state() == PlaybackState::Ready).await;

    player.clear_display_surface().await.unwrap();
    assert!(player.surface().is_none());
}

#[tokio::test]
async fn test_release_caches_position() {
    let mut player = scripted_player(ScriptedBuilder::new(Duration::from_secs(60)));
    player.prepare().unwrap();
    drive_until(&mut player, |p| p.current_position() >= 50).await;

    player.release();
    let resume = player.resume_position();
    assert!(resume >= 50);
    assert_eq!(player.current_position(), resume);
    assert_eq!(player.playback_state(), PlaybackState::Idle);

    player.release();
    assert_eq!(player.resume_position(), resume);
    assert!(matches!(player.process_next().await, Err(Error::Released)));
}

#[tokio::test]
async fn test_retry_after_build_failure() {
    let mut player = scripted_player(ScriptedBuilder::new(Duration::from_secs(60)).failing(1));
    let (_, mut rx) = player.subscribe();

    player.prepare().unwrap();
    drive_until(&mut player, |p| p.playback_state() == PlaybackState::Error).await;
    assert!(rx
        .try_recv()
        .map(|e| matches!(e, PlayerEvent::StateChanged { .. }))
        .unwrap());
    assert!(matches!(rx.try_recv(), Ok(PlayerEvent::Error(e)) if e.is_recoverable()));

    player.prepare().unwrap();
    drive_until(&mut player, |p| p.playback_state() == PlaybackState::Ready).await;
    assert_eq!(
        states(&mut rx),
        vec![
            PlaybackState::Error,
            PlaybackState::Preparing,
            PlaybackState::Buffering,
            PlaybackState::Ready,
        ]
    );
}

// =============================================================================
// Builder Selection Tests
// =============================================================================

#[tokio::test]
async fn test_other_source_rejected() {
    let result = MediaPlayer::new(
        Stream::parse("https://example.com/movie.mp4").unwrap(),
        PlayerConfiguration::default(),
        fast_engine(),
    );
    assert!(matches!(
        result,
        Err(Error::UnsupportedSourceType(SourceType::Other))
    ));
}

#[tokio::test]
async fn test_hls_reports_unsupported() {
    let mut player = MediaPlayer::new(
        Stream::parse("https://example.com/master.m3u8").unwrap(),
        PlayerConfiguration::default(),
        fast_engine(),
    )
    .unwrap();
    let (_, mut rx) = player.subscribe();

    player.prepare().unwrap();
    drive_until(&mut player, |p| p.playback_state() == PlaybackState::Error).await;

    let errors: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|e| match e {
            PlayerEvent::Error(e) => Some(e),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(*errors[0], Error::UnsupportedSourceType(SourceType::Hls)));
}

#[tokio::test]
async fn test_dash_stream_from_local_server() {
    let url = serve_once("/stream/manifest.mpd", MPD).await;
    let mut player = MediaPlayer::new(
        Stream::parse(&url).unwrap(),
        PlayerConfiguration::default(),
        fast_engine(),
    )
    .unwrap();
    let mut info = player.subscribe_info();

    player.prepare().unwrap();
    drive_until(&mut player, |p| p.track_count(TrackType::Video) > 0).await;

    let video = player.tracks(TrackType::Video);
    assert_eq!(video.len(), 2);
    assert_eq!(video[0].format.id, "lo");
    assert_eq!(player.track(TrackType::Audio, 0).unwrap().format.language.as_deref(), Some("fr"));
    assert_eq!(player.track_count(TrackType::Text), 0);
    assert_eq!(player.duration(), Some(200));
    assert!(player.bandwidth_meter().is_some());

    let reported: Vec<_> = std::iter::from_fn(|| info.try_recv().ok()).collect();
    assert!(matches!(
        reported.first(),
        Some(InfoEvent::LoadStarted {
            source_type: None,
            ..
        })
    ));
    assert!(reported.iter().any(|e| matches!(
        e,
        InfoEvent::LoadCompleted { bytes_loaded, .. } if *bytes_loaded == MPD.len() as u64
    )));
    assert!(reported.iter().any(|e| matches!(
        e,
        InfoEvent::BandwidthSample { bytes, .. } if *bytes == MPD.len() as u64
    )));
}

#[tokio::test]
async fn test_dash_fetch_failure() {
    // Bind and drop to get a port nothing listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut player = MediaPlayer::new(
        Stream::parse(&format!("http://127.0.0.1:{}/manifest.mpd", port)).unwrap(),
        PlayerConfiguration::default(),
        fast_engine(),
    )
    .unwrap();
    let mut internal = player.subscribe_internal_errors();

    player.prepare().unwrap();
    drive_until(&mut player, |p| p.playback_state() == PlaybackState::Error).await;

    match internal.try_recv() {
        Ok(tinysdk_core::InternalError::RendererInitialization(e)) => {
            assert!(matches!(*e, Error::ManifestFetch(_)))
        }
        other => panic!("unexpected {:?}", other),
    }
}
