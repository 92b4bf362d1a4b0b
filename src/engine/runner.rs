// Single-job state machine: launch, stream, cancel, detect completion

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::backend::{DurationProbe, Engine, FileSystem};
use super::core::{
    EngineStatus, JobPhase, OutputMode, ParameterRecord, RunError, RunEvent, RunState, Settings,
    default_custom_dir, format_time, output_folder, parse_with_clock, predicted_output_name,
};

pub const NO_INPUT_MESSAGE: &str = "ERROR: No input file selected.";
pub const CANCELLED_MESSAGE: &str = "--- User Cancelled Process ---";
pub const FINISHED_MESSAGE: &str = "--- Process Finished Successfully ---";
pub const FINISHED_UNCONFIRMED_MESSAGE: &str =
    "--- Process Finished (output file not confirmed) ---";

/// How long `run()` waits for the previous engine call to return
pub const ENGINE_RELEASE_TIMEOUT: Duration = Duration::from_secs(10);

/// How the predicted output file is polled once the engine reports done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionPolicy {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    /// Consecutive polls that must see an unchanged non-zero size
    pub stable_checks: u32,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_attempts: 20,
            stable_checks: 1,
        }
    }
}

/// A line that signals the engine believes it is done
pub fn is_completion_sentinel(line: &str) -> bool {
    line.to_ascii_lowercase().contains("elapsed=") || line.trim() == "Done."
}

fn looks_like_error(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.contains("error") || lower.contains("fail")
}

/// Per-run identity; threads holding a stale context leave the state alone
struct RunContext {
    id: Uuid,
    cancelled: AtomicBool,
    started: Instant,
    input: PathBuf,
    expected_output: PathBuf,
}

struct Inner {
    run: RunState,
    context: Option<Arc<RunContext>>,
    subscribers: Vec<Sender<RunEvent>>,
    poll_generation: u64,
    last_error_line: Option<String>,
    last_line: Option<String>,
    /// An `Engine` call is in flight, possibly for a run already terminal
    engine_active: bool,
}

impl Inner {
    fn is_current(&self, ctx: &Arc<RunContext>) -> bool {
        self.context.as_ref().is_some_and(|c| Arc::ptr_eq(c, ctx))
    }

    fn emit(&mut self, event: RunEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn push_log(&mut self, line: impl Into<String>) {
        let line = line.into();
        self.run.log.push(line.clone());
        self.emit(RunEvent::Log(line));
    }

    fn set_phase(&mut self, phase: JobPhase) {
        if self.run.phase != phase {
            self.run.phase = phase;
            self.emit(RunEvent::Phase(phase));
        }
    }
}

struct Shared {
    inner: Mutex<Inner>,
    changed: Condvar,
    engine: Arc<dyn Engine>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fail(&self, ctx: &Arc<RunContext>, error: RunError) {
        let mut inner = self.lock();
        if !inner.is_current(ctx) || inner.run.phase.is_terminal() {
            return;
        }
        tracing::warn!(run_id = %ctx.id, error = %error, "run failed");
        let context = inner
            .last_error_line
            .clone()
            .or_else(|| inner.last_line.clone())
            .unwrap_or_default();
        inner.push_log(format!("--- ERROR: {} ---", error));
        if !context.is_empty() {
            inner.push_log(format!("Context: {}", context));
        }
        inner.push_log(format!("Input: {}", ctx.input.display()));
        inner.run.last_error = Some(error);
        inner.set_phase(JobPhase::Failed);
        self.changed.notify_all();
    }

    fn complete(&self, ctx: &Arc<RunContext>, generation: u64, output: Option<PathBuf>) {
        let mut inner = self.lock();
        if !inner.is_current(ctx)
            || inner.poll_generation != generation
            || inner.run.phase.is_terminal()
        {
            return;
        }
        tracing::info!(run_id = %ctx.id, confirmed = output.is_some(), "run completed");
        inner.run.progress = 1.0;
        inner.run.eta = format_time(0.0);
        inner.push_log(if output.is_some() {
            FINISHED_MESSAGE
        } else {
            FINISHED_UNCONFIRMED_MESSAGE
        });
        inner.run.completed_output_path = output;
        let event = RunEvent::Progress {
            progress: 1.0,
            eta: inner.run.eta.clone(),
        };
        inner.emit(event);
        inner.set_phase(JobPhase::Completed);
        self.changed.notify_all();

        let stop_engine = inner.engine_active;
        drop(inner);
        if stop_engine {
            tracing::info!(run_id = %ctx.id, "stopping engine that outlived its completion check");
            self.engine.request_cancel();
        }
    }

    fn release_engine(&self) {
        self.lock().engine_active = false;
        self.changed.notify_all();
    }

    /// Log one output line and fold its progress into the run state.
    ///
    /// Returns true when the line is a completion sentinel.
    fn handle_line(&self, ctx: &Arc<RunContext>, line: &str) -> bool {
        let mut inner = self.lock();
        if !inner.is_current(ctx) || inner.run.phase.is_terminal() {
            return false;
        }
        inner.push_log(line);
        if looks_like_error(line) {
            inner.last_error_line = Some(line.to_string());
        }
        inner.last_line = Some(line.to_string());

        let wall = ctx.started.elapsed().as_secs_f64();
        let update = parse_with_clock(line, inner.run.known_duration, Some(wall));
        if let Some(duration) = update.new_duration {
            if inner.run.known_duration <= 0.0 && duration > 0.0 {
                inner.run.known_duration = duration;
            }
        }
        if let Some(fps) = update.fps {
            inner.run.fps = fps;
        }
        if let Some(time) = update.time_string {
            inner.run.time_string = time;
        }
        if let Some(eta) = update.eta {
            inner.run.eta = eta;
        }
        if let Some(progress) = update.progress {
            inner.run.progress = inner.run.progress.max(progress);
            let event = RunEvent::Progress {
                progress: inner.run.progress,
                eta: inner.run.eta.clone(),
            };
            inner.emit(event);
        }
        is_completion_sentinel(line)
    }
}

/// Start (or restart) the bounded output poll for `ctx`
fn arm_completion(
    shared: &Arc<Shared>,
    ctx: &Arc<RunContext>,
    fs: &Arc<dyn FileSystem>,
    policy: CompletionPolicy,
) {
    let generation = {
        let mut inner = shared.lock();
        if !inner.is_current(ctx) || inner.run.phase.is_terminal() {
            return;
        }
        inner.poll_generation += 1;
        inner.set_phase(JobPhase::CompletionChecking);
        inner.poll_generation
    };
    tracing::debug!(run_id = %ctx.id, generation, "completion check armed");

    let shared = Arc::clone(shared);
    let ctx = Arc::clone(ctx);
    let fs = Arc::clone(fs);
    thread::spawn(move || {
        let path = ctx.expected_output.clone();
        let mut previous: Option<u64> = None;
        let mut stable = 0;

        for attempt in 1..=policy.max_attempts {
            thread::sleep(policy.poll_interval);
            let engine_active = {
                let inner = shared.lock();
                if !inner.is_current(&ctx)
                    || inner.poll_generation != generation
                    || inner.run.phase.is_terminal()
                {
                    return;
                }
                inner.engine_active
            };

            let size = if fs.exists(&path) {
                fs.file_size(&path)
            } else {
                None
            };
            tracing::debug!(attempt, ?size, path = %path.display(), "polling output");

            match size {
                Some(size) if size > 0 => {
                    if previous == Some(size) {
                        stable += 1;
                        // A stalled engine can look finished; wait for it to return
                        if stable >= policy.stable_checks && !engine_active {
                            shared.complete(&ctx, generation, Some(path));
                            return;
                        }
                    } else {
                        stable = 0;
                    }
                    previous = Some(size);
                }
                _ => {
                    previous = None;
                    stable = 0;
                }
            }
        }

        let confirmed = stable >= policy.stable_checks;
        if !confirmed {
            tracing::warn!(path = %path.display(), "output not confirmed before poll limit");
        }
        shared.complete(&ctx, generation, confirmed.then_some(path));
    });
}

/// Map the engine's final status onto the run
fn finish(
    shared: &Arc<Shared>,
    ctx: &Arc<RunContext>,
    fs: &Arc<dyn FileSystem>,
    policy: CompletionPolicy,
    status: EngineStatus,
) {
    if ctx.cancelled.load(Ordering::SeqCst) {
        return;
    }
    match status.into_error() {
        None => arm_completion(shared, ctx, fs, policy),
        Some(RunError::Cancelled) => {
            let mut inner = shared.lock();
            if inner.is_current(ctx) && !inner.run.phase.is_terminal() {
                inner.push_log("--- Process Cancelled ---");
                inner.run.last_error = Some(RunError::Cancelled);
                inner.set_phase(JobPhase::Cancelled);
                shared.changed.notify_all();
            }
        }
        Some(error) => shared.fail(ctx, error),
    }
}

/// Drives one restoration job at a time.
///
/// Independent runners share nothing; a host may run one per thread.
pub struct JobRunner {
    pub settings: Settings,
    pub input_path: PathBuf,
    pub output_mode: OutputMode,
    pub custom_output_dir: Option<PathBuf>,
    policy: CompletionPolicy,
    probe: Arc<dyn DurationProbe>,
    fs: Arc<dyn FileSystem>,
    shared: Arc<Shared>,
}

impl JobRunner {
    pub fn new(
        engine: Arc<dyn Engine>,
        probe: Arc<dyn DurationProbe>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            settings: Settings::default(),
            input_path: PathBuf::new(),
            output_mode: OutputMode::Same,
            custom_output_dir: None,
            policy: CompletionPolicy::default(),
            probe,
            fs,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    run: RunState::default(),
                    context: None,
                    subscribers: Vec::new(),
                    poll_generation: 0,
                    last_error_line: None,
                    last_line: None,
                    engine_active: false,
                }),
                changed: Condvar::new(),
                engine,
            }),
        }
    }

    pub fn with_policy(mut self, policy: CompletionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> CompletionPolicy {
        self.policy
    }

    /// Snapshot of the observable state
    pub fn state(&self) -> RunState {
        self.shared.lock().run.clone()
    }

    pub fn phase(&self) -> JobPhase {
        self.shared.lock().run.phase
    }

    pub fn progress(&self) -> f64 {
        self.shared.lock().run.progress
    }

    pub fn is_running(&self) -> bool {
        self.phase().is_running()
    }

    /// True while an engine call is in flight, even after a terminal phase
    pub fn is_engine_active(&self) -> bool {
        self.shared.lock().engine_active
    }

    pub fn log(&self) -> Vec<String> {
        self.shared.lock().run.log.clone()
    }

    /// Receive phase, progress and log events from now on
    pub fn subscribe(&self) -> Receiver<RunEvent> {
        let (tx, rx) = mpsc::channel();
        self.shared.lock().subscribers.push(tx);
        rx
    }

    pub fn output_folder(&self) -> PathBuf {
        let custom = match self.output_mode {
            OutputMode::Custom => self.custom_output_dir.clone().or_else(default_custom_dir),
            OutputMode::Same => None,
        };
        output_folder(&self.input_path, self.output_mode, custom.as_deref())
    }

    pub fn expected_output_path(&self) -> PathBuf {
        self.output_folder()
            .join(predicted_output_name(&self.input_path))
    }

    /// Record the engine would receive for the current settings
    pub fn compile(&self) -> ParameterRecord {
        self.settings
            .compile(&self.output_folder().to_string_lossy())
    }

    /// Launch the job on a background thread.
    ///
    /// An empty input path is rejected without touching the phase. After a
    /// cancel the previous engine call is given up to
    /// [`ENGINE_RELEASE_TIMEOUT`] to return before the new run starts.
    /// Returns the run id on launch.
    pub fn run(&self) -> Result<Uuid, RunError> {
        if self.input_path.as_os_str().is_empty() {
            self.shared.lock().push_log(NO_INPUT_MESSAGE);
            return Err(RunError::InvalidInput("No input file selected".to_string()));
        }

        let out_dir = self.output_folder();
        let expected_output = out_dir.join(predicted_output_name(&self.input_path));
        let ctx = Arc::new(RunContext {
            id: Uuid::new_v4(),
            cancelled: AtomicBool::new(false),
            started: Instant::now(),
            input: self.input_path.clone(),
            expected_output: expected_output.clone(),
        });

        {
            let inner = self.shared.lock();
            let (mut inner, _) = self
                .shared
                .changed
                .wait_timeout_while(inner, ENGINE_RELEASE_TIMEOUT, |inner| {
                    inner.run.phase.can_start() && inner.engine_active
                })
                .unwrap_or_else(PoisonError::into_inner);
            if !inner.run.phase.can_start() || inner.engine_active {
                return Err(RunError::AlreadyRunning);
            }
            inner.context = Some(Arc::clone(&ctx));
            inner.last_error_line = None;
            inner.last_line = None;
            inner.run.reset_for_run(ctx.id);
            inner.emit(RunEvent::Phase(JobPhase::Running));

            for line in self.settings.stacking_summary() {
                inner.push_log(line);
            }
            inner.push_log(format!("Input: {}", self.input_path.display()));
            inner.push_log(format!("Output: {}", out_dir.display()));
            inner.push_log(format!("Expected output file: {}", expected_output.display()));
        }
        tracing::info!(run_id = %ctx.id, input = %self.input_path.display(), "starting run");

        if !self.fs.exists(&self.input_path) {
            let error = RunError::InvalidInput(format!(
                "Input file not found: {}",
                self.input_path.display()
            ));
            self.shared.fail(&ctx, error.clone());
            return Err(error);
        }
        if let Err(e) = self.fs.create_dir_all(&out_dir) {
            self.shared.lock().push_log(format!(
                "Cannot create output folder {}: {}",
                out_dir.display(),
                e
            ));
            self.shared.fail(&ctx, RunError::IoFailure);
            return Err(RunError::IoFailure);
        }

        let record = self.settings.compile(&out_dir.to_string_lossy());
        self.launch(Arc::clone(&ctx), record);
        Ok(ctx.id)
    }

    fn launch(&self, ctx: Arc<RunContext>, record: ParameterRecord) {
        let shared = Arc::clone(&self.shared);
        let engine = Arc::clone(&self.shared.engine);
        let probe = Arc::clone(&self.probe);
        let fs = Arc::clone(&self.fs);
        let policy = self.policy;
        shared.lock().engine_active = true;

        thread::spawn(move || {
            let status = engine.init();
            if status != EngineStatus::Ok {
                shared.release_engine();
                finish(&shared, &ctx, &fs, policy, status);
                return;
            }
            // Cancelled before the engine was ready; its flag was reset by init
            if ctx.cancelled.load(Ordering::SeqCst) {
                shared.release_engine();
                return;
            }

            match probe.probe_duration(&ctx.input) {
                Ok(duration) if duration > 0.0 => {
                    let mut inner = shared.lock();
                    if inner.is_current(&ctx) && inner.run.known_duration <= 0.0 {
                        inner.run.known_duration = duration;
                        inner.push_log(format!("Video Duration: {}", format_time(duration)));
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %format!("{:#}", e), "duration probe failed"),
            }

            let (tx, rx) = mpsc::channel::<String>();
            let consumer = {
                let shared = Arc::clone(&shared);
                let ctx = Arc::clone(&ctx);
                let fs = Arc::clone(&fs);
                thread::spawn(move || consume_lines(&shared, &ctx, &fs, policy, rx))
            };

            let status = engine.process(&ctx.input, record, tx);
            if consumer.join().is_err() {
                tracing::warn!(run_id = %ctx.id, "line consumer panicked");
            }
            tracing::debug!(run_id = %ctx.id, code = status.code(), "engine returned");
            shared.release_engine();
            finish(&shared, &ctx, &fs, policy, status);
        });
    }

    /// Stop the current job. Returns false when nothing was running.
    pub fn cancel(&self) -> bool {
        {
            let mut inner = self.shared.lock();
            if !inner.run.phase.is_running() {
                return false;
            }
            if let Some(ctx) = &inner.context {
                ctx.cancelled.store(true, Ordering::SeqCst);
                tracing::info!(run_id = %ctx.id, "run cancelled");
            }
            inner.push_log(CANCELLED_MESSAGE);
            inner.run.last_error = Some(RunError::Cancelled);
            inner.set_phase(JobPhase::Cancelled);
            self.shared.changed.notify_all();
        }
        self.shared.engine.request_cancel();
        true
    }

    /// Block until the run reaches a terminal phase or `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> JobPhase {
        let inner = self.shared.lock();
        let (inner, _) = self
            .shared
            .changed
            .wait_timeout_while(inner, timeout, |inner| !inner.run.phase.is_terminal())
            .unwrap_or_else(PoisonError::into_inner);
        inner.run.phase
    }
}

fn consume_lines(
    shared: &Arc<Shared>,
    ctx: &Arc<RunContext>,
    fs: &Arc<dyn FileSystem>,
    policy: CompletionPolicy,
    rx: Receiver<String>,
) {
    for chunk in rx {
        for line in chunk.split(['\r', '\n']).filter(|l| !l.trim().is_empty()) {
            if ctx.cancelled.load(Ordering::SeqCst) {
                return;
            }
            if shared.handle_line(ctx, line) {
                arm_completion(shared, ctx, fs, policy);
            }
        }
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("input_path", &self.input_path)
            .field("output_mode", &self.output_mode)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}
