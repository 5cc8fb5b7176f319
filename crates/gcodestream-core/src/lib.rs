//! # gcodestream Core
//!
//! Core types shared by the streaming engine and the observer server:
//! errors, the job data model, engine events, the job store and the
//! bounded console history.

pub mod data;
pub mod error;
pub mod event;
pub mod history;
pub mod store;

pub use data::{JogDirection, JobState, JobStatus, LaserState};
pub use error::{Error, JobError, LinkError, Result};
pub use event::{event_channel, EngineEvent, EventReceiver, EventSender};
pub use history::ConsoleHistory;
pub use store::{is_blank, validate_job_name, DirectoryJobStore, JobLines, JobStore, MemoryJobStore};
