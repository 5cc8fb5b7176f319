//! # gcodestream
//!
//! Streams G-code jobs to a serial motion controller, pacing each line to
//! the controller's `ok` acknowledgments, and broadcasts live job status to
//! any number of WebSocket observers.
//!
//! ## Architecture
//!
//! gcodestream is organized as a workspace with multiple crates:
//!
//! 1. **gcodestream-core** - Errors, job state, engine events, job store
//! 2. **gcodestream-communication** - Serial link, acknowledgment reader, streaming engine
//! 3. **gcodestream-settings** - Configuration files and validation
//! 4. **gcodestream-observer** - Observer protocol, registry and WebSocket server
//! 5. **gcodestream** - Main binary that wires the crates together

pub mod app;
pub mod cli;

pub use app::{serial_params, streamer_config, Service};
pub use cli::Cli;

pub use gcodestream_communication::{list_ports, SerialPortInfo, StreamerConfig, StreamingEngine};
pub use gcodestream_core::{EngineEvent, Error, JobError, JobState, JobStatus, LinkError, Result};
pub use gcodestream_observer::{ControlMessage, ObserverMessage, ObserverRegistry};
pub use gcodestream_settings::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging
///
/// Sets up structured logging with:
/// - RUST_LOG environment variable support (INFO by default)
/// - Pretty console output, or JSON lines when `json` is set
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_thread_names(true)
            .json();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_line_number(true)
            .pretty();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}
