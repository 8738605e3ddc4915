//! Renderer builders
//!
//! A builder constructs the per-track-type renderers for one stream
//! asynchronously and answers through the [`BuildReply`] of the request.
//! A reply is consumed when used, so one build completes at most once.

#[cfg(feature = "dash")]
mod dash;
mod unsupported;

#[cfg(feature = "dash")]
pub use dash::{parse_mpd, DashRendererBuilder, ParsedPresentation};
pub use unsupported::{HlsRendererBuilder, SmoothStreamingRendererBuilder};

use crate::bandwidth::BandwidthMeter;
use crate::config::PlayerConfiguration;
use crate::events::InfoEvent;
use crate::player::Inbound;
use crate::renderer::PartialRenderers;
use crate::source::{SourceType, Stream};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Builds renderers for the player
pub trait RendererBuilder: Send {
    /// Start building renderers for `request`.
    ///
    /// Exactly one of [`BuildReply::ready`] or [`BuildReply::failed`] must be
    /// called unless the build is cancelled first.
    fn build_renderers(&mut self, request: BuildRequest);

    /// Cancel the current build, if any.
    ///
    /// A cancelled build must not reply. Cancelling without a build is a no-op.
    fn cancel(&mut self);
}

/// Everything a builder needs for one build
#[derive(Debug)]
pub struct BuildRequest {
    pub stream: Stream,
    pub config: Arc<PlayerConfiguration>,
    pub reply: BuildReply,
}

/// Result of a successful build
#[derive(Debug, Default)]
pub struct BuiltRenderers {
    /// Renderers by track type slot; `None` where the stream has no such tracks
    pub renderers: PartialRenderers,
    /// Presentation duration, `None` for live or unknown
    pub duration: Option<Duration>,
    /// Estimator fed by the builder's downloads
    pub bandwidth_meter: Option<Arc<BandwidthMeter>>,
}

/// Answer channel of one build, tagged with its generation
#[derive(Debug)]
pub struct BuildReply {
    generation: u64,
    tx: mpsc::UnboundedSender<Inbound>,
}

impl BuildReply {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Inbound>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Report loading progress of the build to the info observer
    pub fn info(&self, event: InfoEvent) {
        let _ = self.tx.send(Inbound::BuildInfo {
            generation: self.generation,
            event,
        });
    }

    /// Report the built renderers
    pub fn ready(self, built: BuiltRenderers) {
        if self
            .tx
            .send(Inbound::RenderersReady {
                generation: self.generation,
                built,
            })
            .is_err()
        {
            debug!(generation = self.generation, "Player gone, dropping built renderers");
        }
    }

    /// Report a build failure
    pub fn failed(self, error: Error) {
        if self
            .tx
            .send(Inbound::RenderersError {
                generation: self.generation,
                error,
            })
            .is_err()
        {
            debug!(generation = self.generation, "Player gone, dropping build error");
        }
    }
}

/// Select the builder for a stream's source type
pub fn create_renderer_builder(
    stream: &Stream,
    config: &PlayerConfiguration,
) -> Result<Box<dyn RendererBuilder>> {
    match stream.source_type() {
        #[cfg(feature = "dash")]
        SourceType::MpegDash => Ok(Box::new(DashRendererBuilder::new(config)?)),
        #[cfg(not(feature = "dash"))]
        SourceType::MpegDash => Err(Error::UnsupportedSourceType(SourceType::MpegDash)),
        SourceType::Hls => Ok(Box::new(HlsRendererBuilder::new(config))),
        SourceType::SmoothStreaming => Ok(Box::new(SmoothStreamingRendererBuilder::new(config))),
        SourceType::Other => Err(Error::UnsupportedSourceType(SourceType::Other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn test_other_source_has_no_builder() {
        let stream = Stream::with_type(
            Url::parse("https://example.com/movie.mp4").unwrap(),
            SourceType::Other,
        );
        let result = create_renderer_builder(&stream, &PlayerConfiguration::default());
        assert!(matches!(
            result,
            Err(Error::UnsupportedSourceType(SourceType::Other))
        ));
    }

    #[tokio::test]
    async fn test_adaptive_sources_have_builders() {
        let config = PlayerConfiguration::default();
        for locator in [
            "https://example.com/manifest.mpd",
            "https://example.com/master.m3u8",
            "https://example.com/smurfs.ism/Manifest",
        ] {
            let stream = Stream::parse(locator).unwrap();
            assert!(create_renderer_builder(&stream, &config).is_ok(), "{}", locator);
        }
    }

    #[test]
    fn test_reply_carries_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reply = BuildReply::new(7, tx);
        assert_eq!(reply.generation(), 7);
        reply.failed(Error::RendererBuild("boom".into()));
        match rx.try_recv() {
            Ok(Inbound::RenderersError { generation, .. }) => assert_eq!(generation, 7),
            other => panic!("unexpected {:?}", other),
        }
    }
}
