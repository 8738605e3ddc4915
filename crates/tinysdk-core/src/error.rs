//! Error types for tinysdk core

use crate::source::SourceType;
use crate::types::TrackType;
use thiserror::Error;

/// Result type alias for player operations
pub type Result<T> = std::result::Result<T, Error>;

/// Player error types
#[derive(Error, Debug)]
pub enum Error {
    // Renderer build errors
    #[error("Unsupported source type: {0}")]
    UnsupportedSourceType(SourceType),

    #[error("Failed to fetch manifest: {0}")]
    ManifestFetch(String),

    #[error("Invalid manifest format: {0}")]
    InvalidManifest(String),

    #[error("Renderer build failed: {0}")]
    RendererBuild(String),

    // Fatal engine errors
    #[error("Playback failed: {0}")]
    Playback(String),

    // Engine diagnostics
    #[error("Decoder initialization failed: {decoder}")]
    DecoderInitialization { decoder: String },

    #[error("Audio track initialization failed: {0}")]
    AudioTrackInitialization(String),

    #[error("Audio track write failed: {0}")]
    AudioTrackWrite(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("DRM session error: {0}")]
    DrmSession(String),

    #[error("Load error on {source_type} source: {message}")]
    Load {
        source_type: TrackType,
        message: String,
    },

    // Lifecycle errors
    #[error("Player has been released")]
    Released,

    #[error("Playback engine has been released")]
    EngineReleased,

    #[error("No {track_type} track at index {index}")]
    TrackOutOfRange { track_type: TrackType, index: usize },

    // Network errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid stream URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns true if retrying `prepare` may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ManifestFetch(_)
                | Error::Network(_)
                | Error::Load { .. }
                | Error::Playback(_)
                | Error::AudioTrackWrite(_)
        )
    }

    /// Returns true for errors the engine reports for information only
    pub fn is_diagnostic(&self) -> bool {
        matches!(
            self,
            Error::DecoderInitialization { .. }
                | Error::AudioTrackInitialization(_)
                | Error::AudioTrackWrite(_)
                | Error::Crypto(_)
                | Error::DrmSession(_)
                | Error::Load { .. }
        )
    }

    /// Returns the error code for logs and the demo front end
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::UnsupportedSourceType(_) => "UNSUPPORTED_SOURCE",
            Error::ManifestFetch(_) => "MANIFEST_FETCH",
            Error::InvalidManifest(_) => "INVALID_MANIFEST",
            Error::RendererBuild(_) => "RENDERER_BUILD",
            Error::Playback(_) => "PLAYBACK",
            Error::DecoderInitialization { .. } => "DECODER_INIT",
            Error::AudioTrackInitialization(_) => "AUDIO_TRACK_INIT",
            Error::AudioTrackWrite(_) => "AUDIO_TRACK_WRITE",
            Error::Crypto(_) => "CRYPTO",
            Error::DrmSession(_) => "DRM_SESSION",
            Error::Load { .. } => "LOAD",
            Error::Released => "RELEASED",
            Error::EngineReleased => "ENGINE_RELEASED",
            Error::TrackOutOfRange { .. } => "TRACK_OUT_OF_RANGE",
            Error::Network(_) => "NETWORK",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::Io(_) => "IO",
            Error::Json(_) => "JSON",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_source_is_not_recoverable() {
        let err = Error::UnsupportedSourceType(SourceType::Hls);
        assert!(!err.is_recoverable());
        assert_eq!(err.error_code(), "UNSUPPORTED_SOURCE");
        assert_eq!(err.to_string(), "Unsupported source type: HLS");
    }

    #[test]
    fn test_diagnostic_errors() {
        assert!(Error::Crypto("bad key".into()).is_diagnostic());
        assert!(Error::Load {
            source_type: TrackType::Video,
            message: "timeout".into(),
        }
        .is_diagnostic());
        assert!(!Error::Playback("decoder died".into()).is_diagnostic());
        assert!(!Error::Released.is_diagnostic());
    }
}
