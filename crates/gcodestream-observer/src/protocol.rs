//! Observer session protocol
//!
//! JSON messages exchanged with observers, discriminated by a `type` field.
//! Engine events map onto [`ObserverMessage`]; observers send
//! [`ControlMessage`]s back.

use gcodestream_core::{EngineEvent, JobState, JobStatus, JogDirection, LaserState};
use serde::{Deserialize, Serialize};

/// Jog distance used when a `jog` message omits it (mm)
pub const DEFAULT_JOG_DISTANCE: f64 = 1.0;

/// Messages sent from the engine to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObserverMessage {
    /// Text received from the device
    Serial { text: String },
    /// Free-form diagnostic text
    Log { text: String },
    /// Job state, with `startedAt` in milliseconds since the Unix epoch
    #[serde(rename_all = "camelCase")]
    Status {
        state: JobState,
        started_at: Option<i64>,
        filename: Option<String>,
    },
    /// Lines sent so far; `line` is absent in snapshots
    Progress {
        sent: usize,
        total: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line: Option<String>,
    },
    /// The job streamed every line
    JobComplete,
}

impl ObserverMessage {
    /// The resync reply for `queryStatus`: state then counters
    pub fn snapshot(status: &JobStatus) -> [ObserverMessage; 2] {
        [
            ObserverMessage::Status {
                state: status.state,
                started_at: status.started_at.map(|t| t.timestamp_millis()),
                filename: status.filename.clone(),
            },
            ObserverMessage::Progress {
                sent: status.sent_count,
                total: status.total_count,
                line: None,
            },
        ]
    }

    pub fn log(text: impl Into<String>) -> Self {
        ObserverMessage::Log { text: text.into() }
    }

    /// Encode as a JSON text frame
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl From<&EngineEvent> for ObserverMessage {
    fn from(event: &EngineEvent) -> Self {
        match event {
            EngineEvent::Serial(text) => ObserverMessage::Serial { text: text.clone() },
            EngineEvent::Log(text) => ObserverMessage::Log { text: text.clone() },
            EngineEvent::Status {
                state,
                started_at,
                filename,
                ..
            } => ObserverMessage::Status {
                state: *state,
                started_at: started_at.map(|t| t.timestamp_millis()),
                filename: filename.clone(),
            },
            EngineEvent::Progress {
                sent_count,
                total_count,
                line,
            } => ObserverMessage::Progress {
                sent: *sent_count,
                total: *total_count,
                line: Some(line.clone()),
            },
            EngineEvent::JobComplete => ObserverMessage::JobComplete,
        }
    }
}

fn default_jog_distance() -> f64 {
    DEFAULT_JOG_DISTANCE
}

/// Messages sent from observers to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlMessage {
    /// Start streaming a stored job
    Start { filename: String },
    /// Stop the running job at the next line boundary
    Stop,
    /// Incremental jog outside of a job
    Jog {
        axis: String,
        dir: JogDirection,
        #[serde(default = "default_jog_distance")]
        distance: f64,
    },
    /// Switch the laser on or off
    Laser { state: LaserState },
    /// An upload finished; report its line count
    Uploaded { filename: String },
    /// Ask for a status snapshot
    QueryStatus,
}

impl ControlMessage {
    /// Parse a text frame
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Message type as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Start { .. } => "start",
            ControlMessage::Stop => "stop",
            ControlMessage::Jog { .. } => "jog",
            ControlMessage::Laser { .. } => "laser",
            ControlMessage::Uploaded { .. } => "uploaded",
            ControlMessage::QueryStatus => "queryStatus",
        }
    }
}
