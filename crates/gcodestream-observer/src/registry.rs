//! Observer registry
//!
//! Tracks connected observers and fans messages out to them. Each observer
//! owns a bounded outbound queue drained by its session's writer task;
//! broadcasting only ever `try_send`s into those queues, so a slow or dead
//! observer can never stall the broadcaster or the other observers. An
//! observer whose queue is full or closed is removed.
//!
//! The registry also keeps the job status as last published, so a resync
//! reply agrees with the broadcasts already queued ahead of it.

use crate::protocol::ObserverMessage;
use gcodestream_core::{ConsoleHistory, EngineEvent, JobStatus};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// Identifier of a connected observer
pub type ObserverId = Uuid;

/// Receiving end of an observer's outbound queue (encoded JSON frames)
pub type Outbox = mpsc::Receiver<String>;

/// What observers have been told so far
#[derive(Debug)]
struct Published {
    status: JobStatus,
    console: ConsoleHistory,
}

impl Published {
    fn apply(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::Status {
                state,
                started_at,
                filename,
                sent_count,
                total_count,
            } => {
                self.status.state = *state;
                self.status.started_at = *started_at;
                self.status.filename = filename.clone();
                self.status.sent_count = *sent_count;
                self.status.total_count = *total_count;
            }
            EngineEvent::Progress {
                sent_count,
                total_count,
                ..
            } => {
                self.status.sent_count = *sent_count;
                self.status.total_count = *total_count;
            }
            _ => self.console.record(event),
        }
    }
}

/// Set of connected observers
#[derive(Debug)]
pub struct ObserverRegistry {
    observers: RwLock<HashMap<ObserverId, mpsc::Sender<String>>>,
    published: Mutex<Published>,
    queue_capacity: usize,
}

impl ObserverRegistry {
    /// Create a registry with `queue_capacity` buffered messages per
    /// observer, remembering the last `recent_log_lines` console messages
    pub fn new(queue_capacity: usize, recent_log_lines: usize) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            published: Mutex::new(Published {
                status: JobStatus::new(),
                console: ConsoleHistory::new(recent_log_lines),
            }),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Add an observer, returning its id and outbound queue
    pub fn register(&self) -> (ObserverId, Outbox) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let count = {
            let mut observers = self.observers.write();
            observers.insert(id, tx);
            observers.len()
        };
        tracing::info!("Observer {} connected ({} total)", id, count);
        (id, rx)
    }

    /// Remove an observer; returns false if it was already gone
    pub fn unregister(&self, id: ObserverId) -> bool {
        let removed = self.observers.write().remove(&id).is_some();
        if removed {
            tracing::info!("Observer {} disconnected", id);
        }
        removed
    }

    pub fn contains(&self, id: ObserverId) -> bool {
        self.observers.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Deliver `message` to every observer, returning how many accepted it
    pub fn broadcast(&self, message: &ObserverMessage) -> usize {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Failed to encode {:?}: {}", message, e);
                return 0;
            }
        };

        let targets: Vec<(ObserverId, mpsc::Sender<String>)> = self
            .observers
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, tx) in targets {
            match tx.try_send(text.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("Observer {} is not keeping up, dropping it", id);
                    failed.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Observer {} channel closed", id);
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut observers = self.observers.write();
            for id in failed {
                observers.remove(&id);
            }
        }
        delivered
    }

    /// Deliver `message` to one observer only
    pub fn send_to(&self, id: ObserverId, message: &ObserverMessage) -> bool {
        let tx = match self.observers.read().get(&id) {
            Some(tx) => tx.clone(),
            None => return false,
        };
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Failed to encode {:?}: {}", message, e);
                return false;
            }
        };

        match tx.try_send(text) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropping observer {}: {}", id, e);
                self.observers.write().remove(&id);
                false
            }
        }
    }

    /// Fold an engine event into the published view and broadcast it
    pub fn publish(&self, event: &EngineEvent) -> usize {
        let mut published = self.published.lock();
        published.apply(event);
        self.broadcast(&ObserverMessage::from(event))
    }

    /// Send observer `id` the published status snapshot followed by the
    /// recent `serial`/`log` messages, oldest first.
    ///
    /// Runs under the publish lock: no broadcast can slip in between the
    /// snapshot and the replay.
    pub fn resync(&self, id: ObserverId) -> bool {
        let published = self.published.lock();
        for message in ObserverMessage::snapshot(&published.status) {
            if !self.send_to(id, &message) {
                return false;
            }
        }
        for event in published.console.snapshot() {
            if !self.send_to(id, &ObserverMessage::from(&event)) {
                return false;
            }
        }
        true
    }
}
