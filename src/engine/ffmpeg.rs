// Engine implementation that runs the restoration as an ffmpeg subprocess

use std::collections::{HashSet, VecDeque};
use std::io::{self, Read};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Mutex, PoisonError};

use super::backend::Engine;
use super::core::{
    EngineStatus, ParameterRecord, build_ffmpeg_cmd, format_ffmpeg_cmd, tool_version,
    was_user_cancelled,
};

const STDERR_TAIL_LINES: usize = 10;

/// Split a byte stream into lines on `\n` or `\r`.
///
/// ffmpeg rewrites its `-stats` line in place with `\r`, so both count as
/// terminators. Empty lines are skipped; invalid UTF-8 is replaced.
pub fn for_each_line<R: Read>(mut reader: R, mut on_line: impl FnMut(&str)) -> io::Result<()> {
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for &byte in &chunk[..n] {
            if byte == b'\n' || byte == b'\r' {
                if !pending.is_empty() {
                    on_line(&String::from_utf8_lossy(&pending));
                    pending.clear();
                }
            } else {
                pending.push(byte);
            }
        }
    }
    if !pending.is_empty() {
        on_line(&String::from_utf8_lossy(&pending));
    }
    Ok(())
}

/// Runs each job through `ffmpeg`
#[derive(Debug)]
pub struct FfmpegEngine {
    ffmpeg: String,
    /// Live child PIDs; each `process` call removes only its own
    pids: Mutex<HashSet<u32>>,
    cancelled: AtomicBool,
}

impl FfmpegEngine {
    pub fn new(ffmpeg: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            pids: Mutex::new(HashSet::new()),
            cancelled: AtomicBool::new(false),
        }
    }

    fn pids(&self) -> std::sync::MutexGuard<'_, HashSet<u32>> {
        self.pids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of ffmpeg children currently registered
    pub fn active_children(&self) -> usize {
        self.pids().len()
    }

    fn signal_children(&self) {
        let pids: Vec<u32> = self.pids().iter().copied().collect();
        for pid in pids {
            terminate(pid);
        }
    }
}

/// SIGTERM lets ffmpeg finalize the container before exiting
#[cfg(unix)]
fn terminate(pid: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        tracing::debug!(pid, error = %e, "SIGTERM failed, process likely already gone");
    }
}

// Without signals the stderr loop kills the child once the cancel flag is set
#[cfg(not(unix))]
fn terminate(_pid: u32) {}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Engine for FfmpegEngine {
    fn init(&self) -> EngineStatus {
        self.cancelled.store(false, Ordering::SeqCst);
        match tool_version(&self.ffmpeg) {
            Ok(version) => {
                tracing::debug!(%version, "ffmpeg available");
                EngineStatus::Ok
            }
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "ffmpeg not available");
                EngineStatus::EngineNotFound
            }
        }
    }

    fn process(
        &self,
        input: &Path,
        record: ParameterRecord,
        lines: Sender<String>,
    ) -> EngineStatus {
        let mut cmd = build_ffmpeg_cmd(&self.ffmpeg, input, &record);
        let _ = lines.send(format!("CMD: {}", format_ffmpeg_cmd(&cmd)));
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let _ = lines.send(format!("Error: {} not found", self.ffmpeg));
                return EngineStatus::EngineNotFound;
            }
            Err(e) => {
                let _ = lines.send(format!("Error: failed to spawn {}: {}", self.ffmpeg, e));
                return EngineStatus::Io;
            }
        };
        let pid = child.id();
        self.pids().insert(pid);
        tracing::info!(pid, input = %input.display(), "ffmpeg started");

        // Cancelled between init and the spawn
        if self.cancelled.load(Ordering::SeqCst) {
            terminate(pid);
        }

        let Some(stderr) = child.stderr.take() else {
            let _ = child.kill();
            let _ = child.wait();
            self.pids().remove(&pid);
            return EngineStatus::Internal;
        };

        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let read_result = for_each_line(stderr, |line| {
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
            let _ = lines.send(line.to_string());
            #[cfg(not(unix))]
            if self.cancelled.load(Ordering::SeqCst) {
                let _ = child.kill();
            }
        });
        if let Err(e) = read_result {
            tracing::warn!(error = %e, "failed reading ffmpeg stderr");
        }

        let status = child.wait();
        self.pids().remove(&pid);
        let tail_text = Vec::from(tail).join("\n");

        match status {
            Ok(_) if self.cancelled.load(Ordering::SeqCst) => EngineStatus::Cancelled,
            Ok(status) if was_user_cancelled(&status, &tail_text) => EngineStatus::Cancelled,
            Ok(status) if status.success() => EngineStatus::Ok,
            Ok(status) => {
                let _ = lines.send(format!("Error: ffmpeg failed with {}", status));
                EngineStatus::Internal
            }
            Err(e) => {
                let _ = lines.send(format!("Error: failed to wait for ffmpeg: {}", e));
                EngineStatus::Internal
            }
        }
    }

    fn request_cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.signal_children();
    }
}
