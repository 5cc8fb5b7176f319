//! Job data model
//!
//! The single active job's lifecycle state and the counters observers see.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JobError;

mod motion;

pub use motion::{JogDirection, LaserState};

/// Lifecycle state of the current job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Nothing streaming; ready for a start request.
    #[default]
    Idle,
    /// Lines are being streamed to the controller.
    Running,
    /// Every line was streamed and acknowledged.
    Completed,
    /// Streaming ended on a device failure or acknowledgment timeout.
    Error,
}

impl JobState {
    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Idle, JobState::Running)
                | (JobState::Running, JobState::Completed)
                | (JobState::Running, JobState::Idle)
                | (JobState::Running, JobState::Error)
                | (JobState::Completed, JobState::Idle)
                | (JobState::Error, JobState::Idle)
        )
    }

    /// Check if a job is streaming
    pub fn is_running(self) -> bool {
        self == JobState::Running
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Idle => write!(f, "Idle"),
            JobState::Running => write!(f, "Running"),
            JobState::Completed => write!(f, "Completed"),
            JobState::Error => write!(f, "Error"),
        }
    }
}

/// In-memory state of the current (or most recent) job
///
/// `sent_count` only moves forward while the job runs and never exceeds
/// `total_count`. `started_at` is stamped once per start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    /// Filename of the job in the store
    pub filename: Option<String>,
    /// Lifecycle state
    pub state: JobState,
    /// Non-empty lines transmitted and acknowledged
    pub sent_count: usize,
    /// Non-empty lines in the job file
    pub total_count: usize,
    /// When the job entered `Running`
    pub started_at: Option<DateTime<Utc>>,
}

impl JobStatus {
    /// Create an idle status with no job loaded
    pub fn new() -> Self {
        Self::default()
    }

    /// Move into `Running` for a freshly loaded job.
    ///
    /// `Completed` and `Error` pass through `Idle` implicitly.
    pub fn begin(&mut self, filename: &str, total_count: usize) -> Result<(), JobError> {
        if self.state.is_running() {
            return Err(JobError::AlreadyRunning {
                filename: self.filename.clone().unwrap_or_default(),
            });
        }
        if self.state != JobState::Idle {
            self.state = JobState::Idle;
        }

        self.filename = Some(filename.to_string());
        self.sent_count = 0;
        self.total_count = total_count;
        self.started_at = Some(Utc::now());
        self.state = JobState::Running;
        Ok(())
    }

    /// Count one more acknowledged line, returning the new `sent_count`.
    pub fn record_sent(&mut self) -> usize {
        if self.sent_count < self.total_count {
            self.sent_count += 1;
        } else {
            tracing::warn!(
                "sent count already at total ({}), not advancing",
                self.total_count
            );
        }
        self.sent_count
    }

    /// Leave `Running` for `next` (`Completed`, `Idle` or `Error`).
    pub fn finish(&mut self, next: JobState) -> Result<(), JobError> {
        if !self.state.can_transition_to(next) || !self.state.is_running() {
            return Err(JobError::NotRunning);
        }
        self.state = next;
        Ok(())
    }
}
