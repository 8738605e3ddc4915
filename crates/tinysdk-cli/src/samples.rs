//! Built-in sample streams

use serde::Serialize;
use tabled::Tabled;

/// A playable sample
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct StreamSample {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Content ID")]
    pub content_id: String,
    #[tabled(rename = "Provider")]
    pub provider: String,
    #[tabled(rename = "URI")]
    pub uri: String,
}

impl StreamSample {
    /// Sample from the default provider; the content id is the lowercased
    /// name without whitespace
    pub fn new(name: &str, uri: &str) -> Self {
        let content_id = name
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        Self {
            name: name.to_string(),
            content_id,
            provider: "FOX".to_string(),
            uri: uri.to_string(),
        }
    }
}

/// DASH MP4 samples
pub fn dash_samples() -> Vec<StreamSample> {
    vec![
        StreamSample::new(
            "Smurfs",
            " http://demo.unified-streaming.com/video/smurfs/smurfs.ism/smurfs.mpd",
        ),
        StreamSample::new(
            "Formula 1",
            "http://dash.edgesuite.net/envivio/dashpr/clear/Manifest.mpd",
        ),
    ]
}

/// Look up a sample by name or content id, ignoring case
pub fn find(key: &str) -> Option<StreamSample> {
    let key = key.trim().to_lowercase();
    dash_samples()
        .into_iter()
        .find(|s| s.content_id == key || s.name.to_lowercase() == key)
}

/// Resolve a sample name to its URI; anything else is taken as a URI
pub fn resolve(target: &str) -> String {
    find(target).map(|s| s.uri).unwrap_or_else(|| target.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id() {
        assert_eq!(StreamSample::new("Formula 1", "x").content_id, "formula1");
    }

    #[test]
    fn test_resolve() {
        assert!(resolve("formula1").ends_with("Manifest.mpd"));
        assert!(resolve("SMURFS").ends_with("smurfs.mpd"));
        assert_eq!(resolve("https://example.com/a.mpd"), "https://example.com/a.mpd");
    }
}
