// Launch validation, failure classification, and re-runs

use crate::common::assertions::{assert_log_contains, assert_log_order};
use crate::common::helpers::{EXPECTED_OUTPUT, INPUT, runner_with, wait_terminal};
use crate::common::mocks::{FixedProbe, MockEngine, MockFileSystem, Script, write_output_to};
use restorer::engine::runner::{FINISHED_MESSAGE, NO_INPUT_MESSAGE};
use restorer::engine::{EngineStatus, JobPhase, OutputMode, RunError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn ok_engine(fs: &Arc<MockFileSystem>) -> Arc<MockEngine> {
    Arc::new(
        MockEngine::new(Script::new(&["Duration: 00:00:10.00, start: 0.000000"], EngineStatus::Ok))
            .on_finish(write_output_to(fs, 2_048)),
    )
}

#[test]
fn test_empty_input_is_rejected_without_phase_change() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = ok_engine(&fs);
    let mut runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));
    runner.input_path = PathBuf::new();

    let result = runner.run();
    assert!(matches!(result, Err(RunError::InvalidInput(_))));
    assert_eq!(runner.phase(), JobPhase::Idle);
    assert_eq!(runner.log(), vec![NO_INPUT_MESSAGE.to_string()]);
    assert!(engine.records().is_empty());
}

#[test]
fn test_missing_input_fails_the_run() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = ok_engine(&fs);
    let mut runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));
    runner.input_path = PathBuf::from("/media/tapes/gone.mp4");

    let result = runner.run();
    assert!(matches!(result, Err(RunError::InvalidInput(ref msg)) if msg.contains("gone.mp4")));

    let state = runner.state();
    assert_eq!(state.phase, JobPhase::Failed);
    assert!(matches!(state.last_error, Some(RunError::InvalidInput(_))));
    assert_log_contains(&state.log, "--- ERROR:");
    assert!(engine.records().is_empty());
}

#[test]
fn test_unwritable_output_folder_is_an_io_failure() {
    let fs = Arc::new(MockFileSystem::new());
    fs.fail_create_dir();
    let engine = ok_engine(&fs);
    let runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));

    assert_eq!(runner.run(), Err(RunError::IoFailure));
    assert_eq!(runner.phase(), JobPhase::Failed);
    assert_log_contains(&runner.log(), "read-only volume");
}

#[test]
fn test_successful_run_reports_output() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = ok_engine(&fs);
    let runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));

    let run_id = runner.run().unwrap();
    assert_eq!(wait_terminal(&runner), JobPhase::Completed);

    let state = runner.state();
    assert_eq!(state.run_id, Some(run_id));
    assert_eq!(state.progress, 1.0);
    assert_eq!(state.eta, "0:00");
    assert_eq!(state.completed_output_path, Some(PathBuf::from(EXPECTED_OUTPUT)));
    assert_log_order(&state.log, &format!("Input: {}", INPUT), "Expected output file:");
    assert_log_order(&state.log, "Duration: 00:00:10.00", FINISHED_MESSAGE);
    assert_log_contains(&state.log, "Video Duration: 0:10");
    assert_eq!(fs.created_dirs(), vec![PathBuf::from("/media/tapes")]);
}

#[test]
fn test_custom_output_folder_reaches_the_engine() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = ok_engine(&fs);
    let mut runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));
    runner.output_mode = OutputMode::Custom;
    runner.custom_output_dir = Some(PathBuf::from("/exports"));

    runner.run().unwrap();
    assert_eq!(wait_terminal(&runner), JobPhase::Completed);

    let records = engine.records();
    assert_eq!(records[0].outdir.as_str(), "/exports");
    assert_eq!(
        runner.state().completed_output_path,
        Some(PathBuf::from("/exports/clip_[restored].mp4"))
    );
}

#[test]
fn test_engine_failure_logs_context() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = Arc::new(MockEngine::new(Script::new(
        &[
            "frame=    1 fps=0.0 q=0.0 size=       0kB time=00:00:00.04 bitrate=N/A speed=N/A",
            "Error while filtering: Invalid argument",
            "Conversion stopped",
        ],
        EngineStatus::Internal,
    )));
    let runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));

    runner.run().unwrap();
    assert_eq!(wait_terminal(&runner), JobPhase::Failed);

    let state = runner.state();
    assert_eq!(state.last_error, Some(RunError::InternalFailure));
    assert_log_order(&state.log, "--- ERROR:", "Context: Error while filtering");
    assert_log_contains(&state.log, &format!("Input: {}", INPUT));
}

#[test]
fn test_engine_status_codes_map_to_errors() {
    let cases = [
        (EngineStatus::InvalidOptions, RunError::InvalidOptions),
        (EngineStatus::Io, RunError::IoFailure),
        (EngineStatus::Unknown(42), RunError::UnknownStatus(42)),
    ];
    for (status, expected) in cases {
        let fs = Arc::new(MockFileSystem::new());
        let engine = Arc::new(MockEngine::new(Script::new(&[], status)));
        let runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));

        runner.run().unwrap();
        assert_eq!(wait_terminal(&runner), JobPhase::Failed);
        assert_eq!(runner.state().last_error, Some(expected));
    }
}

#[test]
fn test_engine_init_failure() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = Arc::new(
        MockEngine::new(Script::new(&[], EngineStatus::Ok))
            .with_init_status(EngineStatus::EngineNotFound),
    );
    let runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));

    runner.run().unwrap();
    assert_eq!(wait_terminal(&runner), JobPhase::Failed);
    assert_eq!(runner.state().last_error, Some(RunError::EngineNotAvailable));
    assert!(engine.records().is_empty());
}

#[test]
fn test_second_run_while_running_is_refused() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = Arc::new(MockEngine::new(
        Script::new(&["warming up"], EngineStatus::Ok).hold_for(Duration::from_secs(3)),
    ));
    let runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));

    runner.run().unwrap();
    assert!(runner.is_running());
    assert_eq!(runner.run(), Err(RunError::AlreadyRunning));

    assert!(runner.cancel());
    assert_eq!(wait_terminal(&runner), JobPhase::Cancelled);
}

#[test]
fn test_rerun_resets_state() {
    let fs = Arc::new(MockFileSystem::new());
    let engine = Arc::new(
        MockEngine::with_scripts(vec![
            Script::new(&["first pass"], EngineStatus::Internal),
            Script::new(&["second pass"], EngineStatus::Ok),
        ])
        .on_finish(write_output_to(&fs, 512)),
    );
    let runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));

    let first = runner.run().unwrap();
    assert_eq!(wait_terminal(&runner), JobPhase::Failed);

    let second = runner.run().unwrap();
    assert_ne!(first, second);
    assert_eq!(wait_terminal(&runner), JobPhase::Completed);

    let state = runner.state();
    assert_eq!(state.last_error, None);
    assert!(!state.log.iter().any(|l| l.contains("first pass")));
    assert_log_contains(&state.log, "second pass");
}
