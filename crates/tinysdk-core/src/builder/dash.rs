//! DASH renderer builder
//!
//! Fetches the MPD, turns its adaptation sets into track formats and builds
//! one renderer per track type present:
//! - video: one track per Representation, sorted by bandwidth
//! - audio and text: one track per AdaptationSet

use super::{BuildReply, BuildRequest, BuiltRenderers, RendererBuilder};
use crate::bandwidth::BandwidthMeter;
use crate::config::PlayerConfiguration;
use crate::events::InfoEvent;
use crate::renderer::Renderer;
use crate::types::{MediaFormat, TrackType};
use crate::{Error, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Builds renderers for MPEG-DASH streams
pub struct DashRendererBuilder {
    client: Client,
    task: Option<JoinHandle<()>>,
}

impl DashRendererBuilder {
    pub fn new(config: &PlayerConfiguration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client, task: None }
    }
}

impl RendererBuilder for DashRendererBuilder {
    fn build_renderers(&mut self, request: BuildRequest) {
        self.cancel();

        let BuildRequest { stream, reply, .. } = request;
        let client = self.client.clone();
        let generation = reply.generation();
        info!(url = %stream, generation, "Building DASH renderers");

        self.task = Some(tokio::spawn(async move {
            match build(&client, stream.url(), &reply).await {
                Ok(built) => reply.ready(built),
                Err(e) => {
                    warn!(error = %e, generation, "DASH renderer build failed");
                    reply.failed(e)
                }
            }
        }));
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                debug!("Cancelling in-flight DASH build");
            }
            task.abort();
        }
    }
}

impl Drop for DashRendererBuilder {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[instrument(skip(client, reply), fields(generation = reply.generation()))]
async fn build(client: &Client, url: &Url, reply: &BuildReply) -> Result<BuiltRenderers> {
    reply.info(InfoEvent::LoadStarted {
        source_type: None,
        length: None,
        format: None,
        media_start_ms: 0,
        media_end_ms: 0,
    });

    let started = Instant::now();
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| Error::ManifestFetch(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::ManifestFetch(format!("HTTP {} for {}", status, url)));
    }

    let content = response
        .text()
        .await
        .map_err(|e| Error::ManifestFetch(e.to_string()))?;
    let elapsed = started.elapsed();
    let bytes = content.len() as u64;

    let meter = Arc::new(BandwidthMeter::new());
    meter.add_sample(elapsed, bytes);
    reply.info(InfoEvent::LoadCompleted {
        source_type: None,
        bytes_loaded: bytes,
        format: None,
        media_start_ms: 0,
        media_end_ms: 0,
        load_duration_ms: elapsed.as_millis() as u64,
    });
    reply.info(InfoEvent::BandwidthSample {
        elapsed_ms: elapsed.as_millis() as u64,
        bytes,
        bitrate_estimate: meter.bitrate_estimate(),
    });

    let presentation = parse_mpd(&content)?;
    info!(
        video = presentation.video.len(),
        audio = presentation.audio.len(),
        text = presentation.text.len(),
        is_live = presentation.is_live,
        "MPD parsed"
    );

    Ok(presentation.into_built(meter))
}

/// Tracks and timing extracted from an MPD
#[derive(Debug, Clone, Default)]
pub struct ParsedPresentation {
    pub is_live: bool,
    pub duration: Option<Duration>,
    pub video: Vec<MediaFormat>,
    pub audio: Vec<MediaFormat>,
    pub text: Vec<MediaFormat>,
}

impl ParsedPresentation {
    fn into_built(self, meter: Arc<BandwidthMeter>) -> BuiltRenderers {
        let non_empty = |formats: Vec<MediaFormat>| (!formats.is_empty()).then_some(formats);

        BuiltRenderers {
            renderers: [
                non_empty(self.video).map(|f| Renderer::media_codec(TrackType::Video, f)),
                non_empty(self.audio).map(|f| Renderer::media_codec(TrackType::Audio, f)),
                non_empty(self.text).map(|f| Renderer::new(TrackType::Text, f)),
                None,
            ],
            duration: self.duration,
            bandwidth_meter: Some(meter),
        }
    }
}

/// Parse MPD content into per-type track formats
pub fn parse_mpd(content: &str) -> Result<ParsedPresentation> {
    if !content.contains("<MPD") {
        return Err(Error::InvalidManifest("Missing MPD element".to_string()));
    }

    let is_live = content.contains("type=\"dynamic\"");
    let duration = if is_live {
        None
    } else {
        extract_attr(content, "mediaPresentationDuration").and_then(|d| parse_iso8601_duration(&d))
    };

    let mut presentation = ParsedPresentation {
        is_live,
        duration,
        ..Default::default()
    };

    for (set_index, set_chunk) in element_chunks(content, "AdaptationSet").enumerate() {
        let set_body = match set_chunk.find("</AdaptationSet>") {
            Some(end) => &set_chunk[..end],
            None => set_chunk,
        };
        let set_attrs = &set_body[..set_body.find('>').unwrap_or(set_body.len())];

        let representations: Vec<MediaFormat> = element_chunks(set_body, "Representation")
            .enumerate()
            .map(|(i, rep)| {
                let attrs = &rep[..rep.find('>').unwrap_or(rep.len())];
                representation_format(set_attrs, set_body, attrs, set_index, i)
            })
            .collect();

        let Some(first) = representations.first() else {
            debug!(set = set_index, "AdaptationSet without representations");
            continue;
        };

        match classify(set_attrs, first) {
            Some(TrackType::Video) => presentation.video.extend(representations),
            Some(TrackType::Audio) => {
                let mut format = best_representation(representations);
                if let Some(id) = extract_attr(set_attrs, "id") {
                    format.id = id;
                }
                presentation.audio.push(format);
            }
            Some(TrackType::Text) => {
                let mut format = best_representation(representations);
                if let Some(id) = extract_attr(set_attrs, "id") {
                    format.id = id;
                }
                presentation.text.push(format);
            }
            _ => debug!(set = set_index, "Skipping AdaptationSet of unknown type"),
        }
    }

    presentation.video.sort_by_key(|f| f.bitrate.unwrap_or(0));

    if presentation.video.is_empty() && presentation.audio.is_empty() {
        return Err(Error::InvalidManifest(
            "No audio or video adaptation sets in MPD".to_string(),
        ));
    }

    Ok(presentation)
}

fn representation_format(
    set_attrs: &str,
    set_body: &str,
    attrs: &str,
    set_index: usize,
    index: usize,
) -> MediaFormat {
    let attr = |name: &str| extract_attr(attrs, name).or_else(|| extract_attr(set_attrs, name));

    let mut format = MediaFormat::new(
        extract_attr(attrs, "id").unwrap_or_else(|| format!("set{}_rep{}", set_index, index)),
        attr("mimeType").unwrap_or_default(),
    );
    format.codecs = attr("codecs");
    format.bitrate = extract_attr(attrs, "bandwidth").and_then(|s| s.parse().ok());
    format.language = extract_attr(set_attrs, "lang");
    format.sample_rate = attr("audioSamplingRate").and_then(|s| s.parse().ok());
    format.frame_rate = attr("frameRate").and_then(|s| parse_frame_rate(&s));

    if let (Some(width), Some(height)) = (
        attr("width").and_then(|s| s.parse().ok()),
        attr("height").and_then(|s| s.parse().ok()),
    ) {
        format.resolution = Some(crate::types::Resolution::new(width, height));
    }

    format.channels = element_chunks(set_body, "AudioChannelConfiguration")
        .next()
        .and_then(|chunk| extract_attr(chunk, "value"))
        .and_then(|s| s.parse().ok());

    format
}

fn classify(set_attrs: &str, first: &MediaFormat) -> Option<TrackType> {
    if let Some(content_type) = extract_attr(set_attrs, "contentType") {
        match content_type.as_str() {
            "video" => return Some(TrackType::Video),
            "audio" => return Some(TrackType::Audio),
            "text" => return Some(TrackType::Text),
            _ => {}
        }
    }

    let mime = first.mime_type.as_str();
    if mime.starts_with("video/") {
        return Some(TrackType::Video);
    }
    if mime.starts_with("audio/") {
        return Some(TrackType::Audio);
    }
    if mime.starts_with("text/") || mime == "application/ttml+xml" {
        return Some(TrackType::Text);
    }

    let codecs = first.codecs.as_deref().unwrap_or_default().to_lowercase();
    if ["stpp", "wvtt"].iter().any(|c| codecs.starts_with(c)) {
        Some(TrackType::Text)
    } else if ["avc", "hvc", "hev", "vp09", "av01"].iter().any(|c| codecs.starts_with(c)) {
        Some(TrackType::Video)
    } else if ["mp4a", "ac-3", "ec-3", "opus"].iter().any(|c| codecs.starts_with(c)) {
        Some(TrackType::Audio)
    } else {
        None
    }
}

/// Highest bandwidth representation of a non-empty set
fn best_representation(representations: Vec<MediaFormat>) -> MediaFormat {
    representations
        .into_iter()
        .max_by_key(|f| f.bitrate.unwrap_or(0))
        .unwrap_or_else(|| MediaFormat::new("", ""))
}

/// Chunks of `content` following each `<name` element opening
fn element_chunks<'a>(content: &'a str, name: &str) -> impl Iterator<Item = &'a str> {
    let open = format!("<{}", name);
    let starts: Vec<usize> = content
        .match_indices(open.as_str())
        .map(|(i, _)| i + open.len())
        .collect();
    starts
        .into_iter()
        .map(move |start| &content[start..])
        .filter(|rest| rest.starts_with(|c: char| c.is_whitespace() || c == '>' || c == '/'))
}

/// Attribute value from an XML attribute list; the name must start a token
fn extract_attr(attrs: &str, name: &str) -> Option<String> {
    let pattern = format!("{}=\"", name);
    attrs.match_indices(pattern.as_str()).find_map(|(start, _)| {
        let starts_token = attrs[..start]
            .chars()
            .next_back()
            .map_or(true, char::is_whitespace);
        if !starts_token {
            return None;
        }
        let value_start = start + pattern.len();
        attrs[value_start..]
            .find('"')
            .map(|end| attrs[value_start..value_start + end].to_string())
    })
}

fn parse_frame_rate(s: &str) -> Option<f32> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f32 = num.parse().ok()?;
            let den: f32 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => s.parse().ok(),
    }
}

/// `mediaPresentationDuration` value (`PnDTnHnMnS`); years and months are rejected
fn parse_iso8601_duration(s: &str) -> Option<Duration> {
    let rest = s.trim().strip_prefix('P')?;
    let (date, time) = rest.split_once('T').unwrap_or((rest, ""));

    let mut seconds = 0.0;
    for (value, unit) in designators(date)? {
        seconds += value
            * match unit {
                'W' => 604_800.0,
                'D' => 86_400.0,
                _ => return None,
            };
    }
    for (value, unit) in designators(time)? {
        seconds += value
            * match unit {
                'H' => 3600.0,
                'M' => 60.0,
                'S' => 1.0,
                _ => return None,
            };
    }

    (seconds > 0.0).then(|| Duration::from_secs_f64(seconds))
}

/// `(value, unit)` pairs of one duration part; `None` on a dangling number
fn designators(part: &str) -> Option<Vec<(f64, char)>> {
    let mut pairs = Vec::new();
    let mut start = 0;
    for (i, c) in part.char_indices() {
        if c.is_ascii_alphabetic() {
            pairs.push((part[start..i].parse().ok()?, c));
            start = i + c.len_utf8();
        }
    }
    (start == part.len()).then_some(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Stream;
    use tokio::sync::mpsc;

    const MPD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" type="static" mediaPresentationDuration="PT2M30.5S" minBufferTime="PT2S">
  <Period id="p0">
    <AdaptationSet id="1" contentType="video" mimeType="video/mp4" frameRate="25">
      <Representation id="v720" bandwidth="2500000" width="1280" height="720" codecs="avc1.64001f"/>
      <Representation id="v360" bandwidth="800000" width="640" height="360" codecs="avc1.4d401e"/>
    </AdaptationSet>
    <AdaptationSet id="2" mimeType="audio/mp4" lang="en">
      <AudioChannelConfiguration schemeIdUri="urn:mpeg:dash:23003:3:audio_channel_configuration:2011" value="2"/>
      <Representation id="a128" bandwidth="128000" codecs="mp4a.40.2" audioSamplingRate="48000"/>
      <Representation id="a64" bandwidth="64000" codecs="mp4a.40.5" audioSamplingRate="48000"/>
    </AdaptationSet>
    <AdaptationSet id="3" mimeType="audio/mp4" lang="de">
      <Representation id="a128de" bandwidth="128000" codecs="mp4a.40.2"/>
    </AdaptationSet>
    <AdaptationSet id="4" mimeType="application/mp4" lang="en">
      <Representation id="sub-en" bandwidth="1000" codecs="stpp"/>
    </AdaptationSet>
  </Period>
</MPD>"#;

    #[test]
    fn test_parse_mpd_tracks() {
        let presentation = parse_mpd(MPD).unwrap();

        assert!(!presentation.is_live);
        assert_eq!(presentation.duration, Some(Duration::from_secs_f64(150.5)));

        let video_ids: Vec<_> = presentation.video.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(video_ids, vec!["v360", "v720"]);
        assert_eq!(presentation.video[1].resolution.unwrap().height, 720);
        assert_eq!(presentation.video[0].frame_rate, Some(25.0));

        assert_eq!(presentation.audio.len(), 2);
        assert_eq!(presentation.audio[0].id, "2");
        assert_eq!(presentation.audio[0].language.as_deref(), Some("en"));
        assert_eq!(presentation.audio[0].bitrate, Some(128_000));
        assert_eq!(presentation.audio[0].channels, Some(2));
        assert_eq!(presentation.audio[1].language.as_deref(), Some("de"));

        assert_eq!(presentation.text.len(), 1);
        assert_eq!(presentation.text[0].id, "4");
    }

    #[test]
    fn test_built_renderers_leave_metadata_absent() {
        let built = parse_mpd(MPD)
            .unwrap()
            .into_built(Arc::new(BandwidthMeter::new()));
        assert!(built.renderers[TrackType::Video.index()].is_some());
        assert!(built.renderers[TrackType::Audio.index()].is_some());
        assert!(built.renderers[TrackType::Text.index()].is_some());
        assert!(built.renderers[TrackType::Metadata.index()].is_none());
        assert!(built.bandwidth_meter.is_some());
    }

    #[test]
    fn test_live_mpd_has_no_duration() {
        let mpd = r#"<MPD type="dynamic" mediaPresentationDuration="PT10S">
            <AdaptationSet mimeType="video/mp4"><Representation id="v" bandwidth="1"/></AdaptationSet>
        </MPD>"#;
        let presentation = parse_mpd(mpd).unwrap();
        assert!(presentation.is_live);
        assert_eq!(presentation.duration, None);
    }

    #[test]
    fn test_rejects_non_mpd() {
        assert!(matches!(parse_mpd("#EXTM3U"), Err(Error::InvalidManifest(_))));
        assert!(matches!(
            parse_mpd("<MPD><Period/></MPD>"),
            Err(Error::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_extract_attr_matches_whole_names() {
        let attrs = r#" schemeIdUri="x" id="7" contentId="9""#;
        assert_eq!(extract_attr(attrs, "id"), Some("7".to_string()));
        assert_eq!(extract_attr(attrs, "Id"), None);
    }

    #[test]
    fn test_parse_iso8601_duration() {
        assert_eq!(parse_iso8601_duration("PT1H30M"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_iso8601_duration("PT45.5S"), Some(Duration::from_secs_f64(45.5)));
        assert_eq!(parse_iso8601_duration("P1DT2H"), Some(Duration::from_secs(93_600)));
        assert_eq!(parse_iso8601_duration("PT0S"), None);
        assert_eq!(parse_iso8601_duration("P1Y"), None);
        assert_eq!(parse_iso8601_duration("PT12"), None);
        assert_eq!(parse_iso8601_duration("30S"), None);
    }

    #[tokio::test]
    async fn test_cancel_suppresses_reply() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = PlayerConfiguration::default();
        let mut builder = DashRendererBuilder::new(&config).unwrap();
        builder.build_renderers(BuildRequest {
            stream: Stream::parse("http://127.0.0.1:9/manifest.mpd").unwrap(),
            config: Arc::new(config),
            reply: BuildReply::new(1, tx),
        });
        builder.cancel();
        builder.cancel();

        let outcome = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        // The aborted task drops its reply, closing the channel without a message
        assert!(matches!(outcome, Ok(None) | Err(_)));
    }
}
