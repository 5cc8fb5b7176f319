//! Error handling for gcodestream
//!
//! Provides error types for each layer of the streamer:
//! - Job errors (job store lookups, lifecycle violations)
//! - Link errors (serial device, acknowledgment handshake)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Job error type
///
/// Represents errors related to loading a job from the store and to
/// job lifecycle requests that are not legal in the current state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The named job file is not present in the job store
    #[error("Job not found: {filename}")]
    NotFound {
        /// The requested job filename.
        filename: String,
    },

    /// The job filename is not a plain file name
    #[error("Invalid job name: {filename}")]
    InvalidName {
        /// The rejected job filename.
        filename: String,
    },

    /// A job is already streaming
    #[error("Job already running: {filename}")]
    AlreadyRunning {
        /// The filename of the job that is currently running.
        filename: String,
    },

    /// No job is streaming
    #[error("No job is running")]
    NotRunning,

    /// The job file could not be read
    #[error("Failed to read job {filename}: {reason}")]
    Read {
        /// The job filename.
        filename: String,
        /// The underlying read failure.
        reason: String,
    },
}

/// Serial link error type
///
/// Represents failures of the serial device and of the acknowledgment
/// handshake with the motion controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// Failed to open the serial port
    #[error("Failed to open port {port}: {reason}")]
    Open {
        /// The port path.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Device-level I/O failure (disconnect, driver error)
    #[error("Serial I/O error: {reason}")]
    Io {
        /// The reason for the I/O failure.
        reason: String,
    },

    /// The controller did not acknowledge within the configured bound
    #[error("Acknowledgment timed out after {timeout_ms}ms")]
    AckTimeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// The link is owned by a running job
    #[error("Serial link is busy streaming a job")]
    Busy,

    /// A pass-through command could not be built
    #[error("Invalid command: {reason}")]
    InvalidCommand {
        /// Why the command was rejected.
        reason: String,
    },
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io {
            reason: err.to_string(),
        }
    }
}

/// Main error type for gcodestream
///
/// A unified error type that can represent any error from the engine layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Job error
    #[error(transparent)]
    Job(#[from] JobError),

    /// Serial link error
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is an acknowledgment timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Link(LinkError::AckTimeout { .. }))
    }

    /// Check if this is a serial link error
    pub fn is_link_error(&self) -> bool {
        matches!(self, Error::Link(_) | Error::Io(_))
    }

    /// Check if this is a job error
    pub fn is_job_error(&self) -> bool {
        matches!(self, Error::Job(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
