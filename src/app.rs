use crate::cli::{Cli, Commands, JobArgs};
use restorer::config::Config;
use restorer::engine::{
    self, FfmpegEngine, FfprobeDuration, JobPhase, JobRunner, OutputMode, RunEvent,
    StdFileSystem,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

pub fn run(cli: Cli) {
    let config_path = cli.config;
    match cli.command {
        Commands::Run(job) => handle_run(&load_config(config_path.as_deref()), job),
        Commands::DryRun(job) => handle_dry_run(&load_config(config_path.as_deref()), job),
        Commands::Probe { file } => handle_probe(&load_config(config_path.as_deref()), file),
        Commands::CheckFfmpeg => handle_check_ffmpeg(&load_config(config_path.as_deref())),
        Commands::InitConfig => handle_init_config(),
    }
}

fn load_config(path: Option<&Path>) -> Config {
    let loaded = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn build_runner(config: &Config, job: &JobArgs) -> JobRunner {
    let engine = Arc::new(FfmpegEngine::new(config.engine.ffmpeg_path.clone()));
    let probe = Arc::new(FfprobeDuration::new(config.engine.ffprobe_path.clone()));
    let mut runner = JobRunner::new(engine, probe, Arc::new(StdFileSystem))
        .with_policy(config.completion.policy());

    runner.settings = config.settings();
    for (key, value) in &job.overrides {
        if !runner.settings.set(key, value) {
            eprintln!("Error: unknown setting '{}'", key);
            process::exit(2);
        }
    }

    runner.input_path = job.input.clone();
    match &job.output_dir {
        Some(dir) => {
            runner.output_mode = OutputMode::Custom;
            runner.custom_output_dir = Some(dir.clone());
        }
        None => {
            runner.output_mode = config.output.mode;
            runner.custom_output_dir = config.output.custom_dir.clone();
        }
    }
    runner
}

fn handle_run(config: &Config, job: JobArgs) {
    let runner = build_runner(config, &job);
    let events = runner.subscribe();

    if let Err(e) = runner.run() {
        for line in runner.log() {
            eprintln!("{}", line);
        }
        eprintln!("Error: {}", e);
        dump_debug_log(&runner, &e.to_string());
        process::exit(1);
    }

    loop {
        match events.recv_timeout(Duration::from_millis(250)) {
            Ok(RunEvent::Log(line)) => {
                // Progress lines are rendered by the status line below
                if !line.starts_with("frame=") {
                    eprintln!("\r{}", line);
                }
            }
            Ok(RunEvent::Progress { progress, eta }) => {
                eprint!("\r{:>5.1}%  ETA {:<10}", progress * 100.0, eta);
                let _ = std::io::stderr().flush();
            }
            Ok(RunEvent::Phase(phase)) if phase.is_terminal() => break,
            Ok(RunEvent::Phase(_)) => {}
            Err(RecvTimeoutError::Timeout) => {
                if runner.phase().is_terminal() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    eprintln!();

    let state = runner.state();
    match state.phase {
        JobPhase::Completed => {
            match &state.completed_output_path {
                Some(path) => println!("Restored: {}", path.display()),
                None => println!(
                    "Finished, but the output was not confirmed: {}",
                    runner.expected_output_path().display()
                ),
            }
            process::exit(0);
        }
        JobPhase::Cancelled => {
            eprintln!("Cancelled");
            process::exit(130);
        }
        _ => {
            let reason = state
                .last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| format!("run ended in phase {:?}", state.phase));
            eprintln!("Error: {}", reason);
            dump_debug_log(&runner, &reason);
            process::exit(1);
        }
    }
}

fn dump_debug_log(runner: &JobRunner, header: &str) {
    let dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if let Err(e) = engine::write_debug_log(&dir, header, &runner.log()) {
        tracing::warn!(error = %format!("{:#}", e), "could not write debug log");
    } else {
        eprintln!(
            "Run log appended to {}",
            dir.join(engine::DEBUG_LOG_NAME).display()
        );
    }
}

fn handle_dry_run(config: &Config, job: JobArgs) {
    let runner = build_runner(config, &job);
    let record = runner.compile();

    println!("{}", record.canonical());
    println!();
    for line in runner.settings.stacking_summary() {
        println!("{}", line);
    }
    println!("Output: {}", runner.expected_output_path().display());
    println!(
        "Command: {}",
        engine::format_ffmpeg_cmd(&engine::build_ffmpeg_cmd(
            &config.engine.ffmpeg_path,
            &job.input,
            &record
        ))
    );
}

fn handle_check_ffmpeg(config: &Config) {
    for binary in [&config.engine.ffmpeg_path, &config.engine.ffprobe_path] {
        match engine::tool_version(binary) {
            Ok(version) => println!("{} found: {}", binary, version),
            Err(e) => {
                eprintln!("Error: {:#}", e);
                process::exit(1);
            }
        }
    }
}

fn handle_probe(config: &Config, file: PathBuf) {
    match engine::probe_duration(&config.engine.ffprobe_path, &file) {
        Ok(duration) => {
            println!(
                "Duration: {:.2} seconds ({})",
                duration,
                engine::format_time(duration)
            );
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_init_config() {
    let path = match Config::config_path() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    if Config::exists() {
        println!("Config file exists: {}", path.display());
        return;
    }
    match Config::ensure_default() {
        Ok(()) => println!("Created default config: {}", path.display()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}
