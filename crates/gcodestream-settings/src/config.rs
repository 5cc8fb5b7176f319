//! Configuration model for gcodestream
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML files; the default location is the platform config directory.
//!
//! Configuration is organized into sections:
//! - Serial link (port, baud rate, read timeout)
//! - Streaming (pacing delay, acknowledgment token and timeout)
//! - Jobs (upload directory)
//! - Observer server (listen address, per-observer queue, console replay)
//! - Machine pass-through commands (jog feed rate, laser commands)

use crate::error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application directory name under the platform config directory
pub const APP_DIR: &str = "gcodestream";

/// Config file name inside [`APP_DIR`]
pub const CONFIG_FILE: &str = "config.toml";

/// Serial link settings
///
/// Framing is fixed at 8 data bits, 1 stop bit, no parity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Device path (`/dev/ttyUSB0`, `COM3`)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Per-read timeout in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            read_timeout_ms: 10,
        }
    }
}

impl SerialSettings {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Streaming engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Pause after each transmitted line, in milliseconds
    pub pacing_delay_ms: u64,
    /// Substring the controller sends to acknowledge a line
    pub ack_token: String,
    /// Upper bound on each acknowledgment wait, in milliseconds
    pub ack_timeout_ms: u64,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            pacing_delay_ms: 50,
            ack_token: "ok".to_string(),
            ack_timeout_ms: 60_000,
        }
    }
}

impl StreamingSettings {
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Job storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Directory uploaded jobs are read from
    pub upload_dir: PathBuf,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

/// Observer server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverSettings {
    /// Address the WebSocket listener binds to
    pub listen_addr: String,
    /// Outbound messages buffered per observer before it is dropped
    pub queue_capacity: usize,
    /// Recent `log`/`serial` messages replayed on `queryStatus`
    pub recent_log_lines: usize,
}

impl Default for ObserverSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:4567".to_string(),
            queue_capacity: 256,
            recent_log_lines: 20,
        }
    }
}

impl ObserverSettings {
    /// Parsed listen address
    pub fn socket_addr(&self) -> ConfigResult<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|_| ConfigError::out_of_range("observer.listen_addr", &self.listen_addr))
    }
}

/// Machine pass-through settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineSettings {
    /// Jog feed rate in mm/min
    pub jog_feed_rate: f64,
    /// Command sent for `laser on`
    pub laser_on_command: String,
    /// Command sent for `laser off`
    pub laser_off_command: String,
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            jog_feed_rate: 1000.0,
            laser_on_command: "M3 S1000".to_string(),
            laser_off_command: "M5".to_string(),
        }
    }
}

/// Complete application configuration
///
/// Aggregates all settings sections and provides file I/O operations.
/// Sections missing from a file keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub serial: SerialSettings,
    pub streaming: StreamingSettings,
    pub jobs: JobSettings,
    pub observer: ObserverSettings,
    pub machine: MachineSettings,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> ConfigResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file path: `<config dir>/gcodestream/config.toml`
    pub fn default_path() -> ConfigResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .ok_or_else(|| ConfigError::UnsupportedPlatform(std::env::consts::OS.to_string()))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content =
            std::fs::read_to_string(path).map_err(|e| SettingsError::LoadError {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load the file at `path` if given, else the default file when it
    /// exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> SettingsResult<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }

        match Self::default_path() {
            Ok(default) if default.is_file() => Self::load_from_file(&default),
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)
                .map_err(|e| SettingsError::SaveError(e.to_string()))?,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.port.trim().is_empty() {
            return Err(ConfigError::Empty("serial.port".to_string()));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::out_of_range("serial.baud_rate", 0));
        }
        if self.serial.read_timeout_ms == 0 {
            return Err(ConfigError::out_of_range("serial.read_timeout_ms", 0));
        }

        if self.streaming.ack_token.is_empty() {
            return Err(ConfigError::Empty("streaming.ack_token".to_string()));
        }
        if self.streaming.ack_timeout_ms == 0 {
            return Err(ConfigError::out_of_range("streaming.ack_timeout_ms", 0));
        }

        if self.jobs.upload_dir.as_os_str().is_empty() {
            return Err(ConfigError::Empty("jobs.upload_dir".to_string()));
        }

        self.observer.socket_addr()?;
        if self.observer.queue_capacity == 0 {
            return Err(ConfigError::out_of_range("observer.queue_capacity", 0));
        }

        let feed = self.machine.jog_feed_rate;
        if !feed.is_finite() || feed <= 0.0 {
            return Err(ConfigError::out_of_range("machine.jog_feed_rate", feed));
        }
        if self.machine.laser_on_command.trim().is_empty() {
            return Err(ConfigError::Empty("machine.laser_on_command".to_string()));
        }
        if self.machine.laser_off_command.trim().is_empty() {
            return Err(ConfigError::Empty("machine.laser_off_command".to_string()));
        }

        Ok(())
    }
}
