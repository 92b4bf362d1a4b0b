// Independent runners share no state

use crate::common::helpers::{progress_line, runner_with, wait_terminal};
use crate::common::mocks::{FixedProbe, MockEngine, MockFileSystem, Script, write_output_to};
use restorer::engine::{EngineStatus, JobPhase};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_parallel_runners_do_not_interfere() {
    let handles: Vec<_> = (0..4u64)
        .map(|i| {
            thread::spawn(move || {
                let fs = Arc::new(MockFileSystem::new());
                let lines = [progress_line(24, i + 1), format!("runner {i} done")];
                let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
                let engine = Arc::new(
                    MockEngine::new(
                        Script::new(&refs, EngineStatus::Ok).with_line_delay(Duration::from_millis(2)),
                    )
                    .on_finish(write_output_to(&fs, 100 + i)),
                );
                let mut runner = runner_with(&engine, &fs, FixedProbe::seconds(10.0));
                runner.input_path = PathBuf::from(format!("/media/tapes/clip{i}.mp4"));
                fs.add_file(runner.input_path.clone(), 1);

                runner.run().unwrap();
                assert_eq!(wait_terminal(&runner), JobPhase::Completed);
                (i, runner.state())
            })
        })
        .collect();

    for handle in handles {
        let (i, state) = handle.join().unwrap();
        assert_eq!(
            state.completed_output_path,
            Some(PathBuf::from(format!("/media/tapes/clip{i}_[restored].mp4")))
        );
        for other in (0..4).filter(|o| *o != i) {
            assert!(!state.log.iter().any(|l| l == &format!("runner {other} done")));
        }
        assert!(state.log.iter().any(|l| l == &format!("runner {i} done")));
    }
}

#[test]
fn test_cancelling_one_runner_leaves_the_other_running() {
    let fs_a = Arc::new(MockFileSystem::new());
    let fs_b = Arc::new(MockFileSystem::new());
    let hold = || Script::new(&["working"], EngineStatus::Ok).hold_for(Duration::from_secs(2));
    let engine_a = Arc::new(MockEngine::new(hold()));
    let engine_b = Arc::new(MockEngine::new(hold()));
    let a = runner_with(&engine_a, &fs_a, FixedProbe::seconds(10.0));
    let b = runner_with(&engine_b, &fs_b, FixedProbe::seconds(10.0));

    a.run().unwrap();
    b.run().unwrap();
    assert!(a.cancel());

    assert_eq!(wait_terminal(&a), JobPhase::Cancelled);
    assert!(b.is_running());
    assert_eq!(engine_b.cancel_calls(), 0);

    assert!(b.cancel());
    wait_terminal(&b);
}
