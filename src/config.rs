//! Configuration loading and management

use std::path::PathBuf;
use anyhow::Result;

/// Default playback language (BCP-47 tag)
pub const DEFAULT_LANGUAGE: &str = "pt-BR";

/// Default playback rate multiplier
pub const DEFAULT_RATE: f32 = 1.5;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// API key for the cloud text detection service
    pub vision_api_key: Option<String>,

    /// Language tag passed to the speech engine
    pub language: String,

    /// Playback rate multiplier (1.0 = normal speed)
    pub rate: f32,

    /// Override for the speech synthesis program
    pub speech_command: Option<String>,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("scanspeak");

        let socket_path = data_dir.join("daemon.sock");

        let vision_api_key = std::env::var("SCANSPEAK_VISION_API_KEY").ok();
        let language =
            std::env::var("SCANSPEAK_LANGUAGE").unwrap_or_else(|_| DEFAULT_LANGUAGE.to_string());
        let rate = std::env::var("SCANSPEAK_RATE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RATE);
        let speech_command = std::env::var("SCANSPEAK_SPEECH_CMD").ok();

        Ok(Self {
            socket_path,
            data_dir,
            vision_api_key,
            language,
            rate,
            speech_command,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.socket_path.to_string_lossy().contains("scanspeak"));
        assert!(config.rate > 0.0);
        assert!(!config.language.is_empty());
    }
}
