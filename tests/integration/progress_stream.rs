// Progress and log streaming from engine output

use crate::common::assertions::{assert_log_contains, assert_non_decreasing};
use crate::common::helpers::{progress_line, runner_with, wait_terminal};
use crate::common::mocks::{FixedProbe, MockEngine, MockFileSystem, Script, write_output_to};
use restorer::engine::{EngineStatus, JobPhase, RunEvent};
use std::sync::Arc;

fn script_from(lines: Vec<String>) -> Script {
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    Script::new(&refs, EngineStatus::Ok)
}

#[test]
fn test_progress_never_moves_backwards() {
    let fs = Arc::new(MockFileSystem::new());
    let lines = vec![
        "  Duration: 00:00:10.00, start: 0.000000, bitrate: 1000 kb/s".to_string(),
        progress_line(48, 2),
        progress_line(120, 5),
        // Out-of-order report after a seek
        progress_line(72, 3),
        progress_line(192, 8),
    ];
    let engine = Arc::new(MockEngine::new(script_from(lines)).on_finish(write_output_to(&fs, 1_000)));
    let runner = runner_with(&engine, &fs, FixedProbe::failing());
    let events = runner.subscribe();

    runner.run().unwrap();
    assert_eq!(wait_terminal(&runner), JobPhase::Completed);

    let progress: Vec<f64> = events
        .try_iter()
        .filter_map(|e| match e {
            RunEvent::Progress { progress, .. } => Some(progress),
            _ => None,
        })
        .collect();
    assert!(progress.len() >= 4, "expected progress events, got {:?}", progress);
    assert_non_decreasing(&progress);
    assert!((progress[0] - 0.2).abs() < 1e-9);
    assert!((progress[2] - 0.5).abs() < 1e-9);
    assert_eq!(*progress.last().unwrap(), 1.0);
}

#[test]
fn test_probed_duration_drives_progress() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = Arc::new(MockEngine::new(
        script_from(vec![progress_line(240, 10)]).hold_for(std::time::Duration::from_secs(3)),
    ));
    let runner = runner_with(&engine, &fs, FixedProbe::seconds(40.0));

    runner.run().unwrap();
    assert!(crate::common::helpers::wait_until(|| runner.progress() > 0.0));

    let state = runner.state();
    assert_eq!(state.known_duration, 40.0);
    assert!((state.progress - 0.25).abs() < 1e-9);
    assert_eq!(state.fps, "24.0");
    assert_eq!(state.time_string, "00:00:10.00");
    assert_ne!(state.eta, "--:--");

    runner.cancel();
    wait_terminal(&runner);
}

#[test]
fn test_unknown_duration_keeps_placeholder_eta() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = Arc::new(MockEngine::new(
        script_from(vec![progress_line(24, 1)]).hold_for(std::time::Duration::from_secs(3)),
    ));
    let runner = runner_with(&engine, &fs, FixedProbe::failing());

    runner.run().unwrap();
    assert!(crate::common::helpers::wait_until(|| runner.state().time_string != "0:00"));

    let state = runner.state();
    assert_eq!(state.progress, 0.0);
    assert_eq!(state.eta, "--:--");

    runner.cancel();
    wait_terminal(&runner);
}

#[test]
fn test_malformed_lines_are_logged_not_fatal() {
    let fs = Arc::new(MockFileSystem::new());
    let long = "x".repeat(100_000);
    let lines = vec![
        "frame= fps= time=".to_string(),
        "frame=12 fps=24 time=N/A speed=N/A".to_string(),
        "Duration: N/A, bitrate: N/A".to_string(),
        "frame=1 fps=1 time=99:99:99:99".to_string(),
        "ファイル名: 映像.mp4 — ✓".to_string(),
        long.clone(),
        "\u{0}\u{7f}garbage\u{fffd}".to_string(),
    ];
    let engine = Arc::new(MockEngine::new(script_from(lines)).on_finish(write_output_to(&fs, 10)));
    let runner = runner_with(&engine, &fs, FixedProbe::failing());

    runner.run().unwrap();
    assert_eq!(wait_terminal(&runner), JobPhase::Completed);

    let log = runner.log();
    assert_log_contains(&log, "映像.mp4");
    assert!(log.iter().any(|l| l.len() == long.len()));
}

#[test]
fn test_carriage_return_chunks_split_into_lines() {
    let fs = Arc::new(MockFileSystem::new());
    let chunk = format!("{}\r{}\r\n", progress_line(24, 1), progress_line(48, 2));
    let engine = Arc::new(
        MockEngine::new(script_from(vec![chunk])).on_finish(write_output_to(&fs, 10)),
    );
    let runner = runner_with(&engine, &fs, FixedProbe::seconds(4.0));

    runner.run().unwrap();
    assert_eq!(wait_terminal(&runner), JobPhase::Completed);

    let frames: Vec<String> = runner
        .log()
        .into_iter()
        .filter(|l| l.starts_with("frame="))
        .collect();
    assert_eq!(frames.len(), 2);
}

#[test]
fn test_log_events_arrive_in_order() {
    let fs = Arc::new(MockFileSystem::new());
    let lines: Vec<String> = (0..50).map(|i| format!("line {i:02}")).collect();
    let engine = Arc::new(MockEngine::new(script_from(lines)).on_finish(write_output_to(&fs, 10)));
    let runner = runner_with(&engine, &fs, FixedProbe::failing());
    let events = runner.subscribe();

    runner.run().unwrap();
    wait_terminal(&runner);

    let logged: Vec<String> = events
        .try_iter()
        .filter_map(|e| match e {
            RunEvent::Log(line) if line.starts_with("line ") => Some(line),
            _ => None,
        })
        .collect();
    let expected: Vec<String> = (0..50).map(|i| format!("line {i:02}")).collect();
    assert_eq!(logged, expected);
}
