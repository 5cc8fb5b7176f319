//! Scripted motion controller for engine tests

#![allow(dead_code)]

use gcodestream_communication::{SerialLink, SerialPort};
use gcodestream_core::{EngineEvent, EventReceiver};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    written: Mutex<Vec<String>>,
    partial: Mutex<Vec<u8>>,
    unacked: Mutex<VecDeque<String>>,
    auto_ack: AtomicBool,
    credits: AtomicUsize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    reject: Mutex<Option<String>>,
    tag_acks: AtomicBool,
}

/// Port side of the mock, owned by the link
struct MockPort {
    state: Arc<MockState>,
}

/// Test side of the mock
#[derive(Clone)]
pub struct MockController {
    state: Arc<MockState>,
}

impl MockController {
    /// Lines the device has received, in order
    pub fn written(&self) -> Vec<String> {
        self.state.written.lock().unwrap().clone()
    }

    /// Allow `n` more acknowledgments when auto-ack is off
    pub fn grant(&self, n: usize) {
        self.state.credits.fetch_add(n, Ordering::SeqCst);
    }

    pub fn set_auto_ack(&self, on: bool) {
        self.state.auto_ack.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.state.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_reads(&self) {
        self.state.fail_reads.store(true, Ordering::SeqCst);
    }

    /// Answer `ok <line>` so each acknowledgment names its line
    pub fn tag_acks(&self) {
        self.state.tag_acks.store(true, Ordering::SeqCst);
    }

    /// Answer `error:20` instead of `ok` for this exact line
    pub fn reject(&self, line: &str) {
        *self.state.reject.lock().unwrap() = Some(line.to_string());
    }
}

impl SerialPort for MockPort {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }

        let mut partial = self.state.partial.lock().unwrap();
        for &byte in data {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&partial).to_string();
                partial.clear();
                self.state.written.lock().unwrap().push(line.clone());
                self.state.unacked.lock().unwrap().push_back(line);
            } else {
                partial.push(byte);
            }
        }
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.state.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }

        let may_ack = self.state.auto_ack.load(Ordering::SeqCst)
            || self
                .state
                .credits
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_sub(1))
                .is_ok();

        if may_ack {
            let next = self.state.unacked.lock().unwrap().pop_front();
            match next {
                Some(line) => {
                    let rejected = self.state.reject.lock().unwrap().as_deref() == Some(line.as_str());
                    let reply = if rejected {
                        "error:20\r\n".to_string()
                    } else if self.state.tag_acks.load(Ordering::SeqCst) {
                        format!("ok {}\r\n", line)
                    } else {
                        "ok\r\n".to_string()
                    };
                    buf[..reply.len()].copy_from_slice(reply.as_bytes());
                    return Ok(reply.len());
                }
                None if !self.state.auto_ack.load(Ordering::SeqCst) => {
                    // Nothing to acknowledge yet; keep the credit
                    self.state.credits.fetch_add(1, Ordering::SeqCst);
                }
                None => {}
            }
        }

        std::thread::sleep(Duration::from_millis(2));
        Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
    }

    fn name(&self) -> String {
        "mock".to_string()
    }
}

/// A link to a mock controller that acknowledges every line when `auto_ack`
pub fn mock_link(auto_ack: bool) -> (SerialLink, MockController) {
    let state = Arc::new(MockState::default());
    state.auto_ack.store(auto_ack, Ordering::SeqCst);
    let link = SerialLink::new(Box::new(MockPort {
        state: state.clone(),
    }));
    (link, MockController { state })
}

/// Receive events until `done` matches one, with an overall deadline
pub async fn collect_until<F>(rx: &mut EventReceiver, mut done: F) -> Vec<EngineEvent>
where
    F: FnMut(&EngineEvent) -> bool,
{
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(event)) => {
                let finished = done(&event);
                events.push(event);
                if finished {
                    return events;
                }
            }
            Ok(None) => panic!("event channel closed; got {events:?}"),
            Err(_) => panic!("timed out waiting for events; got {events:?}"),
        }
    }
}

/// Everything currently queued on the channel
pub fn drain(rx: &mut EventReceiver) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Poll `cond` until it holds, panicking after two seconds
pub async fn wait_for<F>(mut cond: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
