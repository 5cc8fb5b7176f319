//! G-code streaming engine
//!
//! Owns the single active job. A job streams on a dedicated blocking task:
//! each non-empty line is written to the serial link, followed by the pacing
//! delay and the acknowledgment handshake, and only then counted and reported.
//!
//! Cancellation is cooperative. `stop` sets a token that the streaming task
//! checks at line boundaries; an in-flight write or acknowledgment wait is
//! never interrupted, but the wait itself is bounded by the ack timeout.

pub mod commands;

use crate::communication::ack::{AckOutcome, AckReader};
use crate::communication::serial::SerialLink;
use commands::jog_command;
use gcodestream_core::{
    EngineEvent, Error, EventSender, JobError, JobLines, JobState, JobStatus, JobStore,
    JogDirection, LaserState, LinkError, Result,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Streaming engine tuning
#[derive(Debug, Clone)]
pub struct StreamerConfig {
    /// Pause after each transmitted line
    pub pacing_delay: Duration,
    /// Substring that acknowledges a line
    pub ack_token: String,
    /// Upper bound on a single acknowledgment wait
    pub ack_timeout: Duration,
    /// Feed rate for jog commands (mm/min)
    pub jog_feed_rate: f64,
    /// Command sent for `laser on`
    pub laser_on_command: String,
    /// Command sent for `laser off`
    pub laser_off_command: String,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            pacing_delay: Duration::from_millis(50),
            ack_token: "ok".to_string(),
            ack_timeout: Duration::from_secs(60),
            jog_feed_rate: 1000.0,
            laser_on_command: "M3 S1000".to_string(),
            laser_off_command: "M5".to_string(),
        }
    }
}

impl StreamerConfig {
    fn ack_reader(&self) -> AckReader {
        AckReader::new(self.ack_token.clone(), self.ack_timeout)
    }
}

/// The streaming engine service
///
/// Created once at startup and shared (behind an `Arc`) with the control
/// message handlers.
pub struct StreamingEngine {
    store: Arc<dyn JobStore>,
    link: Arc<Mutex<SerialLink>>,
    config: StreamerConfig,
    status: Arc<RwLock<JobStatus>>,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
    events: EventSender,
}

impl StreamingEngine {
    /// Create an engine owning `link` and reading jobs from `store`
    pub fn new(
        store: Arc<dyn JobStore>,
        link: SerialLink,
        config: StreamerConfig,
        events: EventSender,
    ) -> Self {
        Self {
            store,
            link: Arc::new(Mutex::new(link)),
            config,
            status: Arc::new(RwLock::new(JobStatus::new())),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
            events,
        }
    }

    /// Snapshot of the current job
    pub fn status(&self) -> JobStatus {
        self.status.read().clone()
    }

    /// Check if a job is streaming
    pub fn is_running(&self) -> bool {
        self.status.read().state.is_running()
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    /// Start streaming `filename` from the job store.
    ///
    /// Must be called from within a tokio runtime. Fails with `NotFound`
    /// when the job is absent and `AlreadyRunning` while another job streams;
    /// neither failure changes the current job.
    pub fn start(&self, filename: &str) -> std::result::Result<(), JobError> {
        if let Some(running) = self.running_filename() {
            tracing::warn!("Rejecting start of {}: {} is running", filename, running);
            return Err(JobError::AlreadyRunning { filename: running });
        }

        let (total_count, lines) = self.store.open_counted(filename)?;
        let token = CancellationToken::new();

        {
            let mut status = self.status.write();
            status.begin(filename, total_count)?;
            *self.cancel.lock() = Some(token.clone());
            self.events.emit(EngineEvent::status(&status));
        }

        tracing::info!("Streaming {} ({} lines)", filename, total_count);
        self.events
            .log(format!("Starting {} ({} lines)", filename, total_count));

        let run = JobRun {
            filename: filename.to_string(),
            total_count,
            link: self.link.clone(),
            status: self.status.clone(),
            events: self.events.clone(),
            config: self.config.clone(),
            cancel: token,
        };
        let handle = tokio::task::spawn_blocking(move || run.run(lines));
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Ask the running job to stop at the next line boundary
    pub fn stop(&self) -> std::result::Result<(), JobError> {
        let status = self.status.read();
        if !status.state.is_running() {
            return Err(JobError::NotRunning);
        }
        if let Some(token) = self.cancel.lock().as_ref() {
            token.cancel();
        }
        tracing::info!(
            "Stop requested for {} at {}/{}",
            status.filename.as_deref().unwrap_or("?"),
            status.sent_count,
            status.total_count
        );
        Ok(())
    }

    /// Wait for the current streaming task, if any, to finish
    pub async fn wait(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Streaming task ended abnormally: {}", e);
            }
        }
    }

    /// Stop any running job and wait for it to wind down
    pub async fn shutdown(&self) {
        if self.stop().is_ok() {
            tracing::info!("Stopping active job for shutdown");
        }
        self.wait().await;
    }

    /// Count the lines of a freshly uploaded job and announce it
    pub fn inspect_upload(&self, filename: &str) -> std::result::Result<usize, JobError> {
        let count = self.store.count_lines(filename)?;
        tracing::info!("Upload {} has {} lines", filename, count);
        self.events
            .log(format!("Uploaded {} ({} lines)", filename, count));
        Ok(count)
    }

    /// Jog one axis by `distance` in `direction`
    pub async fn jog(&self, axis: &str, direction: JogDirection, distance: f64) -> Result<()> {
        let command = jog_command(axis, direction, distance, self.config.jog_feed_rate)?;
        self.send_direct(command).await
    }

    /// Switch the laser on or off
    pub async fn laser(&self, state: LaserState) -> Result<()> {
        let command = match state {
            LaserState::On => self.config.laser_on_command.clone(),
            LaserState::Off => self.config.laser_off_command.clone(),
        };
        self.send_direct(command).await
    }

    /// Send one command outside of a job and wait for its acknowledgment
    async fn send_direct(&self, command: String) -> Result<()> {
        if self.is_running() {
            return Err(LinkError::Busy.into());
        }

        let link = self.link.clone();
        let status = self.status.clone();
        let events = self.events.clone();
        let mut reader = self.config.ack_reader();

        let result = tokio::task::spawn_blocking(move || -> std::result::Result<(), LinkError> {
            let mut link = link.try_lock().ok_or(LinkError::Busy)?;
            if status.read().state.is_running() {
                return Err(LinkError::Busy);
            }

            reader.resync(&mut link, |rx| {
                events.serial(rx);
            })?;

            tracing::debug!("> {}", command);
            events.log(format!("> {}", command));
            link.write_line(&command)?;

            match reader.wait(&mut link, |rx| {
                events.serial(rx);
            }) {
                AckOutcome::Ack => Ok(()),
                AckOutcome::Rejected(response) => {
                    events.log(format!("Controller rejected '{}': {}", command, response));
                    Ok(())
                }
                AckOutcome::Timeout => Err(LinkError::AckTimeout {
                    timeout_ms: reader.timeout().as_millis() as u64,
                }),
                AckOutcome::IoError(e) => Err(e),
            }
        })
        .await
        .map_err(|e| Error::other(format!("Pass-through task failed: {}", e)))?;

        result.map_err(Error::from)
    }

    fn running_filename(&self) -> Option<String> {
        let status = self.status.read();
        status
            .state
            .is_running()
            .then(|| status.filename.clone().unwrap_or_default())
    }
}

impl std::fmt::Debug for StreamingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingEngine")
            .field("status", &*self.status.read())
            .field("config", &self.config)
            .finish()
    }
}

/// How a streaming run ended
#[derive(Debug)]
enum RunOutcome {
    Completed,
    Stopped,
    Failed(Error),
}

/// Everything the blocking streaming task needs
struct JobRun {
    filename: String,
    total_count: usize,
    link: Arc<Mutex<SerialLink>>,
    status: Arc<RwLock<JobStatus>>,
    events: EventSender,
    config: StreamerConfig,
    cancel: CancellationToken,
}

impl JobRun {
    fn run(self, lines: JobLines) {
        let outcome = {
            let mut link = self.link.lock();
            self.stream(lines, &mut link)
        };
        self.finish(outcome);
    }

    fn stream(&self, lines: JobLines, link: &mut SerialLink) -> RunOutcome {
        let mut reader = self.config.ack_reader();
        if let Err(e) = reader.resync(link, |rx| {
            self.events.serial(rx);
        }) {
            return RunOutcome::Failed(e.into());
        }

        let mut streamed = 0;
        for line in lines {
            if self.cancel.is_cancelled() {
                return RunOutcome::Stopped;
            }

            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    return RunOutcome::Failed(
                        JobError::Read {
                            filename: self.filename.clone(),
                            reason: e.to_string(),
                        }
                        .into(),
                    )
                }
            };
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if streamed == self.total_count {
                return RunOutcome::Failed(self.changed_on_disk());
            }
            streamed += 1;

            tracing::debug!("> {}", text);
            if let Err(e) = link.write_line(text) {
                return RunOutcome::Failed(e.into());
            }
            if !self.config.pacing_delay.is_zero() {
                std::thread::sleep(self.config.pacing_delay);
            }

            match reader.wait(link, |rx| {
                self.events.serial(rx);
            }) {
                AckOutcome::Ack => {}
                AckOutcome::Rejected(response) => {
                    tracing::warn!("Controller rejected '{}': {}", text, response);
                    self.events
                        .log(format!("Controller rejected '{}': {}", text, response));
                }
                AckOutcome::Timeout => {
                    return RunOutcome::Failed(
                        LinkError::AckTimeout {
                            timeout_ms: self.config.ack_timeout.as_millis() as u64,
                        }
                        .into(),
                    )
                }
                AckOutcome::IoError(e) => return RunOutcome::Failed(e.into()),
            }

            // A stop that landed during the handshake suppresses this line's report
            if self.cancel.is_cancelled() {
                return RunOutcome::Stopped;
            }

            let (sent_count, total_count) = {
                let mut status = self.status.write();
                (status.record_sent(), status.total_count)
            };
            self.events.emit(EngineEvent::Progress {
                sent_count,
                total_count,
                line: text.to_string(),
            });
        }

        if self.cancel.is_cancelled() {
            RunOutcome::Stopped
        } else if streamed < self.total_count {
            RunOutcome::Failed(self.changed_on_disk())
        } else {
            RunOutcome::Completed
        }
    }

    fn changed_on_disk(&self) -> Error {
        JobError::Read {
            filename: self.filename.clone(),
            reason: format!("job no longer has {} lines", self.total_count),
        }
        .into()
    }

    fn finish(&self, outcome: RunOutcome) {
        let mut status = self.status.write();
        let next = match &outcome {
            RunOutcome::Completed => JobState::Completed,
            RunOutcome::Stopped => JobState::Idle,
            RunOutcome::Failed(_) => JobState::Error,
        };

        match outcome {
            RunOutcome::Completed => {
                tracing::info!("Job {} complete ({} lines)", self.filename, status.sent_count);
                self.events.emit(EngineEvent::JobComplete);
            }
            RunOutcome::Stopped => {
                tracing::info!(
                    "Job {} stopped at {}/{}",
                    self.filename,
                    status.sent_count,
                    status.total_count
                );
                self.events.log(format!(
                    "Job {} stopped at {}/{}",
                    self.filename, status.sent_count, status.total_count
                ));
            }
            RunOutcome::Failed(e) => {
                tracing::error!("Job {} failed: {}", self.filename, e);
                self.events
                    .log(format!("Job {} failed: {}", self.filename, e));
            }
        }

        if let Err(e) = status.finish(next) {
            tracing::warn!("Job {} could not move to {}: {}", self.filename, next, e);
        }
        self.events.emit(EngineEvent::status(&status));
    }
}
