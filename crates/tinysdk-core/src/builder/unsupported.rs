//! Builders for source types without renderer support

use super::{BuildRequest, RendererBuilder};
use crate::config::PlayerConfiguration;
use crate::source::SourceType;
use crate::Error;
use tracing::warn;

fn reject(source_type: SourceType, request: BuildRequest) {
    warn!(stream = %request.stream, source_type = %source_type, "No renderers for source type");
    request.reply.failed(Error::UnsupportedSourceType(source_type));
}

/// HLS builder; every build fails with [`Error::UnsupportedSourceType`]
#[derive(Debug, Default)]
pub struct HlsRendererBuilder;

impl HlsRendererBuilder {
    pub fn new(_config: &PlayerConfiguration) -> Self {
        Self
    }
}

impl RendererBuilder for HlsRendererBuilder {
    fn build_renderers(&mut self, request: BuildRequest) {
        reject(SourceType::Hls, request);
    }

    fn cancel(&mut self) {}
}

/// SmoothStreaming builder; every build fails with [`Error::UnsupportedSourceType`]
#[derive(Debug, Default)]
pub struct SmoothStreamingRendererBuilder;

impl SmoothStreamingRendererBuilder {
    pub fn new(_config: &PlayerConfiguration) -> Self {
        Self
    }
}

impl RendererBuilder for SmoothStreamingRendererBuilder {
    fn build_renderers(&mut self, request: BuildRequest) {
        reject(SourceType::SmoothStreaming, request);
    }

    fn cancel(&mut self) {}
}
