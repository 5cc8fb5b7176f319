//! Bounded console history
//!
//! Keeps the most recent `serial` and `log` events so a reconnecting
//! observer can catch up on what it missed.

use crate::event::EngineEvent;
use std::collections::VecDeque;

/// Ring of the most recent console events
#[derive(Debug, Clone)]
pub struct ConsoleHistory {
    entries: VecDeque<EngineEvent>,
    capacity: usize,
}

impl ConsoleHistory {
    /// Create a history holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record an event; anything but serial/log text is ignored
    pub fn record(&mut self, event: &EngineEvent) {
        if self.capacity == 0 || !event.is_console() {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(event.clone());
    }

    /// Recorded events, oldest first
    pub fn snapshot(&self) -> Vec<EngineEvent> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
