//! gcodestream settings
//!
//! Configuration model, file loading and validation.

pub mod config;
pub mod error;

pub use config::{
    Config, JobSettings, MachineSettings, ObserverSettings, SerialSettings, StreamingSettings,
};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
