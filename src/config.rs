use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the batch audio converter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Output audio settings
    pub audio: AudioConfig,

    /// Worker pacing settings
    pub pacing: PacingConfig,

    /// Failure handling settings
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Output file extension
    pub extension: String,

    /// Codec passed to the media backend
    pub codec: String,

    /// Output bitrate
    pub bitrate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Length of one simulated second of conversion work, in milliseconds.
    /// The worker checks the cancel flag once per tick.
    pub tick_millis: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Automatic retries of a batch attempt after a transient backend
    /// conflict. Bounded so a flapping backend cannot loop forever.
    pub max_transient_retries: u32,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig {
                extension: "mp3".to_string(),
                codec: "libmp3lame".to_string(),
                bitrate: "192k".to_string(),
            },
            pacing: PacingConfig { tick_millis: 1000 },
            retry: RetryConfig {
                max_transient_retries: 1,
            },
        }
    }
}

impl ConverterConfig {
    /// Load configuration from file, falling back through known locations.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "batch-audio-converter.toml",
            "config/batch-audio-converter.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load configuration from environment variables on top of defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(extension) = std::env::var("BATCH_CONVERTER_EXTENSION") {
            config.audio.extension = extension;
        }

        if let Ok(bitrate) = std::env::var("BATCH_CONVERTER_BITRATE") {
            config.audio.bitrate = bitrate;
        }

        if let Ok(tick) = std::env::var("BATCH_CONVERTER_TICK_MILLIS") {
            config.pacing.tick_millis = tick.parse().unwrap_or(1000);
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.audio.extension.trim().is_empty() {
            return Err(anyhow!("audio.extension must not be empty"));
        }

        if self.pacing.tick_millis == 0 {
            return Err(anyhow!("pacing.tick_millis must be greater than 0"));
        }

        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.pacing.tick_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ConverterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio.extension, "mp3");
        assert_eq!(config.tick(), Duration::from_secs(1));
        assert_eq!(config.retry.max_transient_retries, 1);
    }

    #[test]
    fn test_zero_tick_rejected() {
        let mut config = ConverterConfig::default();
        config.pacing.tick_millis = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_extension_rejected() {
        let mut config = ConverterConfig::default();
        config.audio.extension = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
