//! Media source descriptors

use crate::Result;
use serde::{Deserialize, Serialize};
use url::Url;

/// Delivery format of a stream, selects the renderer builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    MpegDash,
    Hls,
    SmoothStreaming,
    Other,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::MpegDash => write!(f, "MPEG-DASH"),
            SourceType::Hls => write!(f, "HLS"),
            SourceType::SmoothStreaming => write!(f, "SmoothStreaming"),
            SourceType::Other => write!(f, "other"),
        }
    }
}

/// Detect the source type from the URL path
pub fn detect_source_type(url: &Url) -> SourceType {
    let path = url.path().to_lowercase();
    if path.ends_with(".mpd") {
        return SourceType::MpegDash;
    }
    if path.ends_with(".m3u8") || path.ends_with(".m3u") {
        return SourceType::Hls;
    }
    if path.ends_with(".ism")
        || path.ends_with(".isml")
        || path.ends_with(".ism/manifest")
        || path.ends_with(".isml/manifest")
    {
        return SourceType::SmoothStreaming;
    }
    SourceType::Other
}

/// Stream to be played: a locator plus its delivery format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    url: Url,
    source_type: SourceType,
}

impl Stream {
    /// Create a stream, inferring the source type from the URL
    pub fn new(url: Url) -> Self {
        let source_type = detect_source_type(&url);
        Self { url, source_type }
    }

    /// Create a stream with an explicit source type
    pub fn with_type(url: Url, source_type: SourceType) -> Self {
        Self { url, source_type }
    }

    /// Parse a locator, ignoring surrounding whitespace
    pub fn parse(locator: &str) -> Result<Self> {
        let url = Url::parse(locator.trim())?;
        Ok(Self::new(url))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_dash() {
        let url = Url::parse("http://dash.edgesuite.net/envivio/dashpr/clear/Manifest.mpd").unwrap();
        assert_eq!(detect_source_type(&url), SourceType::MpegDash);
    }

    #[test]
    fn test_detect_hls() {
        let url = Url::parse("https://example.com/master.m3u8").unwrap();
        assert_eq!(detect_source_type(&url), SourceType::Hls);
    }

    #[test]
    fn test_detect_smooth_streaming() {
        let url = Url::parse("https://example.com/video/smurfs.ism/Manifest").unwrap();
        assert_eq!(detect_source_type(&url), SourceType::SmoothStreaming);
    }

    #[test]
    fn test_detect_other() {
        let url = Url::parse("https://example.com/movie.mp4").unwrap();
        assert_eq!(detect_source_type(&url), SourceType::Other);
    }

    #[test]
    fn test_parse_trims_locator() {
        let stream =
            Stream::parse(" http://demo.unified-streaming.com/video/smurfs/smurfs.ism/smurfs.mpd")
                .unwrap();
        assert_eq!(stream.source_type(), SourceType::MpegDash);
        assert_eq!(stream.url().host_str(), Some("demo.unified-streaming.com"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Stream::parse("not a url").is_err());
    }
}
