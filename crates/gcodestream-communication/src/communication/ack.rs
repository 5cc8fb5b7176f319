//! Acknowledgment handshake
//!
//! After each transmitted line the controller answers with an acknowledgment
//! token (`ok` for GRBL-style firmware). [`AckReader`] accumulates bytes from
//! the link until the token shows up and frames everything else it sees into
//! lines, so device chatter can be echoed to observers.
//!
//! The wait is bounded: once the configured timeout elapses the reader gives
//! up with [`AckOutcome::Timeout`] instead of blocking forever.

use crate::communication::serial::SerialLink;
use gcodestream_core::LinkError;
use std::time::{Duration, Instant};

/// Prefix of a controller line rejecting the last command
pub const REJECTION_PREFIX: &str = "error:";

/// Result of waiting for an acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// The acknowledgment token was received
    Ack,
    /// The controller rejected the line (e.g. `error:20`)
    Rejected(String),
    /// The token did not arrive within the configured bound
    Timeout,
    /// The device failed while waiting
    IoError(LinkError),
}

impl AckOutcome {
    /// Whether the line was consumed by the controller (acked or rejected)
    pub fn is_consumed(&self) -> bool {
        matches!(self, AckOutcome::Ack | AckOutcome::Rejected(_))
    }
}

/// Framed reader for the acknowledgment handshake
#[derive(Debug, Clone)]
pub struct AckReader {
    token: String,
    timeout: Duration,
    buffer: Vec<u8>,
}

impl AckReader {
    /// Create a reader waiting for `token` for at most `timeout` per line
    pub fn new(token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            token: token.into(),
            timeout,
            buffer: Vec::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Discard any partially received data
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Block until the token arrives, the controller rejects the line, the
    /// timeout expires or the device fails.
    ///
    /// Every complete non-empty line read along the way is passed to
    /// `on_line`, including the one carrying the token. On timeout the link
    /// remembers that a reply is still owed, see [`AckReader::resync`].
    pub fn wait<F>(&mut self, link: &mut SerialLink, mut on_line: F) -> AckOutcome
    where
        F: FnMut(&str),
    {
        let outcome = self.next_reply(link, &mut on_line);
        if outcome == AckOutcome::Timeout {
            tracing::warn!(
                "No '{}' from {} within {}ms",
                self.token,
                link.name(),
                self.timeout.as_millis()
            );
            link.note_unanswered();
        }
        outcome
    }

    /// Bring the conversation back in step before a new command.
    ///
    /// Replies still owed for lines that timed out are awaited (each bounded
    /// by the timeout) and swallowed, so a late `ok` is never taken as the
    /// acknowledgment of the next line. Whatever else is pending on the
    /// device is then discarded.
    pub fn resync<F>(&mut self, link: &mut SerialLink, mut on_line: F) -> Result<(), LinkError>
    where
        F: FnMut(&str),
    {
        let owed = link.take_unanswered();
        for _ in 0..owed {
            match self.next_reply(link, &mut on_line) {
                AckOutcome::Ack | AckOutcome::Rejected(_) => {
                    tracing::debug!("Discarded late reply on {}", link.name());
                }
                AckOutcome::Timeout => {
                    tracing::warn!("Late reply on {} never arrived", link.name());
                    break;
                }
                AckOutcome::IoError(e) => return Err(e),
            }
        }

        self.reset();
        link.discard_input()
    }

    fn next_reply<F>(&mut self, link: &mut SerialLink, on_line: &mut F) -> AckOutcome
    where
        F: FnMut(&str),
    {
        let deadline = Instant::now() + self.timeout;
        let mut chunk = [0u8; 256];

        loop {
            if let Some(outcome) = self.scan(on_line) {
                return outcome;
            }

            if Instant::now() >= deadline {
                return AckOutcome::Timeout;
            }

            match link.read_available(&mut chunk) {
                Ok(0) => std::thread::sleep(Duration::from_millis(1)),
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    tracing::error!("Serial read failed on {}: {}", link.name(), e);
                    return AckOutcome::IoError(e);
                }
            }
        }
    }

    /// Consume complete lines from the buffer, stopping at the first one
    /// that settles the wait.
    fn scan<F>(&mut self, on_line: &mut F) -> Option<AckOutcome>
    where
        F: FnMut(&str),
    {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let decoded = String::from_utf8_lossy(&raw);
            let line = decoded.trim();
            if line.is_empty() {
                continue;
            }

            on_line(line);
            if line.contains(self.token.as_str()) {
                return Some(AckOutcome::Ack);
            }
            if line.starts_with(REJECTION_PREFIX) {
                return Some(AckOutcome::Rejected(line.to_string()));
            }
        }

        // The token may arrive without its line terminator
        let token = self.token.as_bytes();
        if !token.is_empty() && self.buffer.windows(token.len()).any(|w| w == token) {
            let partial = std::mem::take(&mut self.buffer);
            on_line(String::from_utf8_lossy(&partial).trim());
            return Some(AckOutcome::Ack);
        }

        None
    }
}
