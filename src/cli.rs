//! Command-line interface

use clap::Parser;
use gcodestream_settings::Config;
use std::path::PathBuf;

/// Stream G-code jobs to a motion controller and serve live status to
/// WebSocket observers.
#[derive(Parser, Debug, Default)]
#[command(name = "gcodestream", version)]
pub struct Cli {
    /// Config file (.toml or .json); defaults to the platform config dir
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Serial device path
    #[arg(long, value_name = "DEVICE")]
    pub port: Option<String>,
    /// Serial baud rate
    #[arg(long)]
    pub baud: Option<u32>,
    /// Observer listen address (host:port)
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,
    /// Directory uploaded jobs are read from
    #[arg(long, value_name = "DIR")]
    pub upload_dir: Option<PathBuf>,
    /// Acknowledgment timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub ack_timeout_ms: Option<u64>,
    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,
    /// List candidate controller ports and exit
    #[arg(long)]
    pub list_ports: bool,
}

impl Cli {
    /// Overlay command-line values on a loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = &self.port {
            config.serial.port = port.clone();
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(listen) = &self.listen {
            config.observer.listen_addr = listen.clone();
        }
        if let Some(dir) = &self.upload_dir {
            config.jobs.upload_dir = dir.clone();
        }
        if let Some(timeout) = self.ack_timeout_ms {
            config.streaming.ack_timeout_ms = timeout;
        }
    }
}
