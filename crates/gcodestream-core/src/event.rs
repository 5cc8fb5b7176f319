//! Engine events
//!
//! Provides:
//! - Event types emitted by the streaming engine
//! - An event channel decoupling the engine from whatever fans events out

use crate::data::{JobState, JobStatus};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Events emitted by the streaming engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A line of text received from the device
    Serial(String),
    /// Free-form diagnostic text
    Log(String),
    /// Job state transition
    Status {
        /// New job state.
        state: JobState,
        /// When the job entered `Running`.
        started_at: Option<DateTime<Utc>>,
        /// Job filename, if one was loaded.
        filename: Option<String>,
        /// Acknowledged lines at the transition.
        sent_count: usize,
        /// Non-empty lines in the job.
        total_count: usize,
    },
    /// A non-empty line was transmitted and acknowledged
    Progress {
        /// Acknowledged lines so far.
        sent_count: usize,
        /// Non-empty lines in the job.
        total_count: usize,
        /// Text of the transmitted line.
        line: String,
    },
    /// The job streamed every line
    JobComplete,
}

impl EngineEvent {
    /// Status event for the given job snapshot
    pub fn status(status: &JobStatus) -> Self {
        EngineEvent::Status {
            state: status.state,
            started_at: status.started_at,
            filename: status.filename.clone(),
            sent_count: status.sent_count,
            total_count: status.total_count,
        }
    }

    /// Whether this event belongs in the console history (serial or log text)
    pub fn is_console(&self) -> bool {
        matches!(self, EngineEvent::Serial(_) | EngineEvent::Log(_))
    }
}

impl std::fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineEvent::Serial(text) => write!(f, "Serial: {}", text),
            EngineEvent::Log(text) => write!(f, "Log: {}", text),
            EngineEvent::Status { state, .. } => write!(f, "Status: {}", state),
            EngineEvent::Progress {
                sent_count,
                total_count,
                line,
            } => write!(f, "Progress {}/{}: {}", sent_count, total_count, line),
            EngineEvent::JobComplete => write!(f, "Job complete"),
        }
    }
}

/// Receiving half of the engine event channel
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Create a connected event sender/receiver pair
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}

/// Sending half of the engine event channel
///
/// Never blocks, so it is safe to emit from the blocking streaming context.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSender {
    /// Emit an event, returning false when nothing is listening anymore
    pub fn emit(&self, event: EngineEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(mpsc::error::SendError(event)) => {
                tracing::trace!("No event consumer, dropping {}", event);
                false
            }
        }
    }

    /// Emit a `Log` event
    pub fn log(&self, text: impl Into<String>) -> bool {
        self.emit(EngineEvent::Log(text.into()))
    }

    /// Emit a `Serial` event
    pub fn serial(&self, text: impl Into<String>) -> bool {
        self.emit(EngineEvent::Serial(text.into()))
    }

    /// Check if the receiver has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
