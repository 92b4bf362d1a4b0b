// User cancellation and stale-run fencing

use crate::common::assertions::{assert_log_contains, assert_log_not_contains};
use crate::common::helpers::{progress_line, runner_with, wait_terminal, wait_until};
use crate::common::mocks::{FixedProbe, MockEngine, MockFileSystem, Script, write_output_to};
use restorer::engine::runner::CANCELLED_MESSAGE;
use restorer::engine::{EngineStatus, JobPhase, RunError};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn slow_script(tag: &str, count: usize) -> Script {
    let lines: Vec<String> = (0..count).map(|i| format!("{tag} line {i}")).collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    Script::new(&refs, EngineStatus::Ok).with_line_delay(Duration::from_millis(5))
}

#[test]
fn test_cancel_stops_the_run() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = Arc::new(MockEngine::new(slow_script("job", 400)));
    let runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));

    runner.run().unwrap();
    assert!(wait_until(|| runner.log().iter().any(|l| l == "job line 3")));
    assert!(runner.cancel());
    assert_eq!(wait_terminal(&runner), JobPhase::Cancelled);

    let state = runner.state();
    assert!(!state.is_running());
    assert_eq!(state.last_error, Some(RunError::Cancelled));
    assert_eq!(engine.cancel_calls(), 1);

    // Nothing is appended once the cancel is acknowledged
    std::thread::sleep(Duration::from_millis(50));
    let log = runner.log();
    assert_eq!(log.last().map(String::as_str), Some(CANCELLED_MESSAGE));
    assert_log_not_contains(&log, "job line 399");
}

#[test]
fn test_cancel_is_idempotent() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = Arc::new(MockEngine::new(
        Script::new(&["busy"], EngineStatus::Ok).hold_for(Duration::from_secs(3)),
    ));
    let runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));

    assert!(!runner.cancel(), "nothing to cancel before the first run");

    runner.run().unwrap();
    assert!(runner.cancel());
    assert!(!runner.cancel());
    assert_eq!(wait_terminal(&runner), JobPhase::Cancelled);

    let cancels = runner
        .log()
        .iter()
        .filter(|l| l.as_str() == CANCELLED_MESSAGE)
        .count();
    assert_eq!(cancels, 1);
    assert_eq!(engine.cancel_calls(), 1);
}

#[test]
fn test_cancel_during_completion_check() {
    let fs = Arc::new(MockFileSystem::new());
    // Output never appears, so the runner sits in the completion poll
    let engine = Arc::new(MockEngine::new(Script::new(&["Done."], EngineStatus::Ok)));
    let mut runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));
    runner = runner.with_policy(restorer::engine::CompletionPolicy {
        poll_interval: Duration::from_millis(20),
        max_attempts: 200,
        stable_checks: 1,
    });

    runner.run().unwrap();
    assert!(wait_until(|| runner.phase() == JobPhase::CompletionChecking));
    assert!(runner.cancel());
    assert_eq!(wait_terminal(&runner), JobPhase::Cancelled);

    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(runner.phase(), JobPhase::Cancelled);
    assert_eq!(runner.state().completed_output_path, None);
}

#[test]
fn test_stale_run_cannot_touch_the_next_one() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = Arc::new(
        MockEngine::with_scripts(vec![
            slow_script("old", 200),
            Script::new(&[], EngineStatus::Ok).with_line_delay(Duration::from_millis(1)),
        ])
        .on_finish(write_output_to(&fs, 64)),
    );
    let runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));

    runner.run().unwrap();
    assert!(wait_until(|| runner.log().iter().any(|l| l == "old line 2")));
    assert!(runner.cancel());

    // The old script's remaining lines belong to the cancelled run
    runner.run().unwrap();
    assert_eq!(wait_terminal(&runner), JobPhase::Completed);
    std::thread::sleep(Duration::from_millis(50));

    let log = runner.log();
    assert_log_not_contains(&log, "old line");
    assert_log_not_contains(&log, CANCELLED_MESSAGE);
    assert_eq!(runner.phase(), JobPhase::Completed);
}

#[test]
fn test_engine_reported_cancel_without_user_request() {
    let fs = Arc::new(MockFileSystem::new());
    let status_line = progress_line(24, 1);
    let engine = Arc::new(MockEngine::new(Script::new(
        &[status_line.as_str(), "Exiting normally, received signal 15."],
        EngineStatus::Cancelled,
    )));
    let runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));

    runner.run().unwrap();
    assert_eq!(wait_terminal(&runner), JobPhase::Cancelled);
    assert_log_contains(&runner.log(), "--- Process Cancelled ---");
    assert_eq!(engine.cancel_calls(), 0);
}

#[test]
fn test_rerun_waits_for_the_cancelled_engine_to_exit() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = Arc::new(MockEngine::with_scripts(vec![
        Script::new(&["first"], EngineStatus::Ok)
            .hold_for(Duration::from_secs(5))
            .slow_shutdown(Duration::from_millis(200)),
        Script::new(&["second"], EngineStatus::Ok)
            .hold_for(Duration::from_secs(5))
            .slow_shutdown(Duration::from_millis(20)),
    ]));
    let runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));

    runner.run().unwrap();
    assert!(wait_until(|| runner.log().iter().any(|l| l == "first")));
    assert!(runner.cancel());
    assert_eq!(runner.phase(), JobPhase::Cancelled);
    assert!(runner.is_engine_active());

    let restarted = Instant::now();
    runner.run().unwrap();
    assert!(restarted.elapsed() >= Duration::from_millis(150));
    assert!(wait_until(|| runner.log().iter().any(|l| l == "second")));
    assert_eq!(engine.peak_active(), 1);

    // The second engine call must still be reachable by cancel
    assert!(runner.cancel());
    assert_eq!(wait_terminal(&runner), JobPhase::Cancelled);
    assert!(wait_until(|| !runner.is_engine_active()));
    assert_eq!(engine.active(), 0);
    assert_eq!(engine.cancel_calls(), 2);
}
