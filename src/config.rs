//! Application configuration
//!
//! Loaded from a TOML file. When no path is given the platform config
//! directory is searched, and defaults are used if nothing is found.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub stream: StreamConfig,
    pub ui: UiConfig,
    /// Interval between scheduling ticks
    pub tick_interval_ms: u64,
}

/// Remote endpoint and socket options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub address: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    /// Kernel receive buffer size (0 keeps the OS default)
    pub recv_buffer_size: usize,
    pub read_chunk_size: usize,
    /// Connect as soon as the receiver starts
    pub auto_connect: bool,
}

/// Stream defaults and limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    pub max_payload_len: usize,
    pub default_width: u32,
    pub default_height: u32,
    pub default_sample_rate: u32,
    /// Capacity of the emitted audio channel
    pub audio_queue_capacity: usize,
    /// Audio frames held back waiting for video before the oldest is dropped
    pub max_pending_audio: usize,
}

/// Control API settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            stream: StreamConfig::default(),
            ui: UiConfig::default(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 3000,
            recv_buffer_size: 4 * 1024 * 1024,
            read_chunk_size: READ_CHUNK_SIZE,
            auto_connect: false,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            default_width: DEFAULT_WIDTH,
            default_height: DEFAULT_HEIGHT,
            default_sample_rate: DEFAULT_SAMPLE_RATE,
            audio_queue_capacity: 256,
            max_pending_audio: DEFAULT_MAX_PENDING_AUDIO,
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl AppConfig {
    /// Platform-specific default config file location
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "mrc", "mrc-receiver")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => {
                    tracing::info!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&text)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Reject values the receiver cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.network.port == 0 {
            return Err(Error::Config("network.port must be non-zero".into()));
        }
        if self.network.read_chunk_size == 0 {
            return Err(Error::Config("network.read_chunk_size must be non-zero".into()));
        }
        if self.stream.max_payload_len == 0 {
            return Err(Error::Config("stream.max_payload_len must be non-zero".into()));
        }
        if self.stream.max_pending_audio == 0 {
            return Err(Error::Config("stream.max_pending_audio must be non-zero".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(Error::Config("tick_interval_ms must be non-zero".into()));
        }
        Ok(())
    }

    /// Tick interval as a `Duration`
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms)
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.connect_timeout_ms)
    }
}
