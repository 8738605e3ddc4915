//! Player configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Values required to start a playback session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfiguration {
    /// Name of the embedding application
    pub app_name: String,
    /// User agent sent with manifest requests
    pub user_agent: String,
    /// Media buffered before playback starts (milliseconds)
    pub min_buffer_ms: u64,
    /// Media buffered before playback resumes after a stall (milliseconds)
    pub min_rebuffer_ms: u64,
    /// Manifest request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for PlayerConfiguration {
    fn default() -> Self {
        Self {
            app_name: "tinysdk".to_string(),
            user_agent: format!("tinysdk/{}", crate::VERSION),
            min_buffer_ms: 1000,
            min_rebuffer_ms: 5000,
            request_timeout_ms: 10000,
        }
    }
}

impl PlayerConfiguration {
    pub fn new(app_name: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            user_agent: user_agent.into(),
            ..Default::default()
        }
    }

    /// Load a configuration from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PlayerConfiguration = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_agent.trim().is_empty() {
            return Err(Error::InvalidConfig("user_agent must not be empty".to_string()));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlayerConfiguration::new("appDemo", "appDemo/1.0");
        assert_eq!(config.user_agent, "appDemo/1.0");
        assert_eq!(config.min_buffer_ms, 1000);
        assert_eq!(config.min_rebuffer_ms, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PlayerConfiguration =
            serde_json::from_str(r#"{ "user_agent": "demo/2.0" }"#).unwrap();
        assert_eq!(config.user_agent, "demo/2.0");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_empty_user_agent_rejected() {
        let config = PlayerConfiguration::new("app", "  ");
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }
}
