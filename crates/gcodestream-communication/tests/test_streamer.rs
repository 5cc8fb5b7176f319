//! Streaming engine behaviour against a scripted controller

mod common;

use common::{collect_until, drain, mock_link, wait_for, MockController};
use gcodestream_communication::{StreamerConfig, StreamingEngine};
use gcodestream_core::{
    event_channel, EngineEvent, Error, EventReceiver, JobError, JobLines, JobState, JobStatus,
    JobStore, JogDirection, LaserState, LinkError, MemoryJobStore,
};
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> StreamerConfig {
    StreamerConfig {
        pacing_delay: Duration::ZERO,
        ack_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

fn engine_with(
    lines: &[&str],
    auto_ack: bool,
    config: StreamerConfig,
) -> (Arc<StreamingEngine>, MockController, EventReceiver) {
    let store = Arc::new(MemoryJobStore::new());
    store.insert("job.gcode", lines.iter().copied());
    let (link, controller) = mock_link(auto_ack);
    let (events, rx) = event_channel();
    let engine = Arc::new(StreamingEngine::new(store, link, config, events));
    (engine, controller, rx)
}

fn engine_with_jobs(
    jobs: &[(&str, &[&str])],
    auto_ack: bool,
    config: StreamerConfig,
) -> (Arc<StreamingEngine>, MockController, EventReceiver) {
    let store = Arc::new(MemoryJobStore::new());
    for (name, lines) in jobs {
        store.insert(*name, lines.iter().copied());
    }
    let (link, controller) = mock_link(auto_ack);
    let (events, rx) = event_channel();
    let engine = Arc::new(StreamingEngine::new(store, link, config, events));
    (engine, controller, rx)
}

/// Serial replies and progress reports, in emission order
fn exchange(events: &[EngineEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Serial(text) => Some(format!("serial:{}", text)),
            EngineEvent::Progress {
                sent_count, line, ..
            } => Some(format!("progress:{}:{}", sent_count, line)),
            _ => None,
        })
        .collect()
}

fn is_state(event: &EngineEvent, wanted: JobState) -> bool {
    matches!(event, EngineEvent::Status { state, .. } if *state == wanted)
}

fn progress(events: &[EngineEvent]) -> Vec<(usize, usize, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Progress {
                sent_count,
                total_count,
                line,
            } => Some((*sent_count, *total_count, line.clone())),
            _ => None,
        })
        .collect()
}

fn logs(events: &[EngineEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Log(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_blank_lines_produce_no_write_and_no_event() {
    let (engine, controller, mut rx) = engine_with(&["G1 X10", "", "G1 Y10"], true, fast_config());

    engine.start("job.gcode").unwrap();
    let events = collect_until(&mut rx, |e| is_state(e, JobState::Completed)).await;
    engine.wait().await;

    assert_eq!(
        progress(&events),
        vec![
            (1, 2, "G1 X10".to_string()),
            (2, 2, "G1 Y10".to_string())
        ]
    );
    assert_eq!(controller.written(), vec!["G1 X10", "G1 Y10"]);

    let completions: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| **e == EngineEvent::JobComplete)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(completions.len(), 1);
    let last_progress = events
        .iter()
        .rposition(|e| matches!(e, EngineEvent::Progress { .. }))
        .unwrap();
    assert!(last_progress < completions[0]);
}

#[tokio::test]
async fn test_uninterrupted_run_reports_every_line_in_order() {
    let lines: Vec<String> = (1..=20).map(|i| format!("G1 X{}", i)).collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let (engine, _controller, mut rx) = engine_with(&refs, true, fast_config());

    engine.start("job.gcode").unwrap();
    let events = collect_until(&mut rx, |e| is_state(e, JobState::Completed)).await;
    engine.wait().await;

    let reported = progress(&events);
    assert_eq!(reported.len(), 20);
    for (i, (sent, total, line)) in reported.iter().enumerate() {
        assert_eq!(*sent, i + 1);
        assert_eq!(*total, 20);
        assert_eq!(line, &lines[i]);
    }

    let status = engine.status();
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.sent_count, 20);
    assert_eq!(status.total_count, 20);
}

#[tokio::test]
async fn test_state_sequence_and_started_at() {
    let (engine, _controller, mut rx) = engine_with(&["G0 X0"], true, fast_config());

    engine.start("job.gcode").unwrap();
    let events = collect_until(&mut rx, |e| is_state(e, JobState::Completed)).await;
    engine.wait().await;

    let statuses: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Status {
                state, started_at, ..
            } => Some((*state, *started_at)),
            _ => None,
        })
        .collect();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].0, JobState::Running);
    assert_eq!(statuses[1].0, JobState::Completed);
    assert!(statuses[0].1.is_some());
    assert_eq!(statuses[0].1, statuses[1].1);
    assert_eq!(engine.status().started_at, statuses[0].1);
}

#[tokio::test]
async fn test_restart_after_completion() {
    let (engine, _controller, mut rx) = engine_with(&["G0 X0", "G0 X1"], true, fast_config());

    engine.start("job.gcode").unwrap();
    collect_until(&mut rx, |e| is_state(e, JobState::Completed)).await;
    engine.wait().await;

    engine.start("job.gcode").unwrap();
    let events = collect_until(&mut rx, |e| is_state(e, JobState::Completed)).await;
    engine.wait().await;

    assert!(is_state(&events[0], JobState::Running));
    assert_eq!(progress(&events)[0].0, 1);
    assert_eq!(engine.status().sent_count, 2);
}

#[tokio::test]
async fn test_start_missing_job_changes_nothing() {
    let (engine, controller, mut rx) = engine_with(&["G0 X0"], true, fast_config());

    let err = engine.start("missing.gcode").unwrap_err();
    assert_eq!(
        err,
        JobError::NotFound {
            filename: "missing.gcode".to_string()
        }
    );
    assert_eq!(engine.status(), JobStatus::default());
    assert!(drain(&mut rx).is_empty());
    assert!(controller.written().is_empty());
}

#[tokio::test]
async fn test_start_while_running_is_rejected() {
    let (engine, controller, mut rx) = engine_with(&["G1 X1", "G1 X2"], false, fast_config());

    engine.start("job.gcode").unwrap();
    wait_for(|| controller.written().len() == 1).await;
    let before = engine.status();

    let err = engine.start("other.gcode").unwrap_err();
    assert_eq!(
        err,
        JobError::AlreadyRunning {
            filename: "job.gcode".to_string()
        }
    );
    assert_eq!(engine.status(), before);
    assert_eq!(before.state, JobState::Running);

    engine.stop().unwrap();
    controller.grant(1);
    collect_until(&mut rx, |e| is_state(e, JobState::Idle)).await;
    engine.wait().await;
}

#[tokio::test]
async fn test_stop_suppresses_unacknowledged_line() {
    let (engine, controller, mut rx) =
        engine_with(&["G1 X1", "G1 X2", "G1 X3"], false, fast_config());
    controller.grant(1);

    engine.start("job.gcode").unwrap();
    collect_until(&mut rx, |e| matches!(e, EngineEvent::Progress { sent_count: 1, .. })).await;
    wait_for(|| controller.written().len() == 2).await;

    engine.stop().unwrap();
    controller.grant(1);
    let events = collect_until(&mut rx, |e| is_state(e, JobState::Idle)).await;
    engine.wait().await;

    assert!(progress(&events).is_empty());
    assert!(!events.contains(&EngineEvent::JobComplete));
    assert_eq!(controller.written(), vec!["G1 X1", "G1 X2"]);

    let status = engine.status();
    assert_eq!(status.state, JobState::Idle);
    assert_eq!(status.sent_count, 1);
    assert_eq!(status.total_count, 3);
}

#[tokio::test]
async fn test_stop_when_idle() {
    let (engine, _controller, _rx) = engine_with(&["G0 X0"], true, fast_config());
    assert_eq!(engine.stop(), Err(JobError::NotRunning));
}

#[tokio::test]
async fn test_ack_timeout_moves_job_to_error() {
    let config = StreamerConfig {
        ack_timeout: Duration::from_millis(50),
        ..fast_config()
    };
    let (engine, _controller, mut rx) = engine_with(&["G1 X1", "G1 X2"], false, config);

    engine.start("job.gcode").unwrap();
    let events = collect_until(&mut rx, |e| is_state(e, JobState::Error)).await;
    engine.wait().await;

    assert!(progress(&events).is_empty());
    assert!(logs(&events)
        .iter()
        .any(|l| l.contains("Acknowledgment timed out after 50ms")));
    let status = engine.status();
    assert_eq!(status.state, JobState::Error);
    assert_eq!(status.sent_count, 0);
}

#[tokio::test]
async fn test_device_failure_moves_job_to_error() {
    let (engine, controller, mut rx) = engine_with(&["G1 X1"], true, fast_config());
    controller.fail_writes();

    engine.start("job.gcode").unwrap();
    let events = collect_until(&mut rx, |e| is_state(e, JobState::Error)).await;
    engine.wait().await;

    assert!(logs(&events).iter().any(|l| l.contains("device unplugged")));
    assert_eq!(engine.status().state, JobState::Error);
    assert!(controller.written().is_empty());
}

#[tokio::test]
async fn test_read_failure_moves_job_to_error() {
    let (engine, controller, mut rx) = engine_with(&["G1 X1"], false, fast_config());
    controller.fail_reads();

    engine.start("job.gcode").unwrap();
    collect_until(&mut rx, |e| is_state(e, JobState::Error)).await;
    engine.wait().await;

    assert_eq!(controller.written(), vec!["G1 X1"]);

    // An errored job may be restarted
    engine.start("job.gcode").unwrap();
    let events = collect_until(&mut rx, |e| is_state(e, JobState::Error)).await;
    engine.wait().await;
    assert!(is_state(&events[0], JobState::Running));
}

#[tokio::test]
async fn test_rejected_line_is_logged_and_streaming_continues() {
    let (engine, controller, mut rx) =
        engine_with(&["G1 X1", "G1 Q9", "G1 X2"], true, fast_config());
    controller.reject("G1 Q9");

    engine.start("job.gcode").unwrap();
    let events = collect_until(&mut rx, |e| is_state(e, JobState::Completed)).await;
    engine.wait().await;

    assert_eq!(progress(&events).len(), 3);
    assert!(logs(&events)
        .iter()
        .any(|l| l == "Controller rejected 'G1 Q9': error:20"));
    assert!(events.contains(&EngineEvent::Serial("error:20".to_string())));
}

#[tokio::test]
async fn test_jog_and_laser_when_idle() {
    let (engine, controller, _rx) = engine_with(&[], true, fast_config());

    engine.jog("x", JogDirection::Positive, 1.0).await.unwrap();
    engine.laser(LaserState::On).await.unwrap();
    engine.laser(LaserState::Off).await.unwrap();

    assert_eq!(
        controller.written(),
        vec!["$J=G91 G21 X1.000 F1000", "M3 S1000", "M5"]
    );
}

#[tokio::test]
async fn test_pass_through_rejected_while_running() {
    let (engine, controller, mut rx) = engine_with(&["G1 X1"], false, fast_config());

    engine.start("job.gcode").unwrap();
    wait_for(|| controller.written().len() == 1).await;

    let err = engine
        .jog("Y", JogDirection::Negative, 2.0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Link(LinkError::Busy)));
    let err = engine.laser(LaserState::On).await.unwrap_err();
    assert!(matches!(err, Error::Link(LinkError::Busy)));

    controller.grant(1);
    collect_until(&mut rx, |e| is_state(e, JobState::Completed)).await;
    engine.wait().await;
    assert_eq!(controller.written(), vec!["G1 X1"]);
}

#[tokio::test]
async fn test_pass_through_validation_and_timeout() {
    let config = StreamerConfig {
        ack_timeout: Duration::from_millis(30),
        ..fast_config()
    };
    let (engine, controller, _rx) = engine_with(&[], false, config);

    let err = engine
        .jog("W", JogDirection::Positive, 1.0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Link(LinkError::InvalidCommand { .. })));
    assert!(controller.written().is_empty());

    let err = engine.laser(LaserState::Off).await.unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_inspect_upload() {
    let (engine, _controller, mut rx) = engine_with(&["G0 X0", " ", "G0 X1"], true, fast_config());

    assert_eq!(engine.inspect_upload("job.gcode").unwrap(), 2);
    assert_eq!(
        drain(&mut rx),
        vec![EngineEvent::Log("Uploaded job.gcode (2 lines)".to_string())]
    );
    assert!(matches!(
        engine.inspect_upload("nope.gcode"),
        Err(JobError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_late_ack_is_not_credited_to_the_next_job() {
    let config = StreamerConfig {
        ack_timeout: Duration::from_millis(100),
        ..fast_config()
    };
    let (engine, controller, mut rx) = engine_with_jobs(
        &[("a.gcode", &["A1"]), ("b.gcode", &["B1", "B2", "B3"])],
        false,
        config,
    );
    controller.tag_acks();

    engine.start("a.gcode").unwrap();
    collect_until(&mut rx, |e| is_state(e, JobState::Error)).await;
    engine.wait().await;

    // The controller catches up and answers A1 late
    controller.set_auto_ack(true);
    engine.start("b.gcode").unwrap();
    let events = collect_until(&mut rx, |e| is_state(e, JobState::Completed)).await;
    engine.wait().await;

    assert_eq!(
        exchange(&events),
        vec![
            "serial:ok A1",
            "serial:ok B1",
            "progress:1:B1",
            "serial:ok B2",
            "progress:2:B2",
            "serial:ok B3",
            "progress:3:B3",
        ]
    );
    assert_eq!(controller.written(), vec!["A1", "B1", "B2", "B3"]);
}

#[tokio::test]
async fn test_late_ack_is_not_credited_to_the_next_command() {
    let config = StreamerConfig {
        ack_timeout: Duration::from_millis(50),
        ..fast_config()
    };
    let (engine, controller, mut rx) = engine_with(&[], false, config);
    controller.tag_acks();

    let err = engine
        .jog("X", JogDirection::Positive, 1.0)
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    controller.set_auto_ack(true);
    engine.laser(LaserState::On).await.unwrap();

    assert_eq!(
        exchange(&drain(&mut rx)),
        vec!["serial:ok $J=G91 G21 X1.000 F1000", "serial:ok M3 S1000"]
    );
}

/// Store whose job grew after it was counted
struct GrownJobStore;

impl JobStore for GrownJobStore {
    fn open(&self, _filename: &str) -> Result<JobLines, JobError> {
        let lines = vec!["G1 X1".to_string(), "G1 X2".to_string()];
        Ok(Box::new(lines.into_iter().map(Ok::<String, std::io::Error>)))
    }

    fn open_counted(&self, filename: &str) -> Result<(usize, JobLines), JobError> {
        Ok((1, self.open(filename)?))
    }
}

#[tokio::test]
async fn test_job_longer_than_counted_fails_without_overrun() {
    let (link, controller) = mock_link(true);
    let (events, mut rx) = event_channel();
    let engine = StreamingEngine::new(Arc::new(GrownJobStore), link, fast_config(), events);

    engine.start("grown.gcode").unwrap();
    let events = collect_until(&mut rx, |e| is_state(e, JobState::Error)).await;
    engine.wait().await;

    assert_eq!(progress(&events), vec![(1, 1, "G1 X1".to_string())]);
    assert_eq!(controller.written(), vec!["G1 X1"]);
    assert!(logs(&events)
        .iter()
        .any(|l| l.contains("job no longer has 1 lines")));
}
