use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::error::RunError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobPhase {
    Idle,
    Running,
    CompletionChecking, // Polling the predicted output after a done signal
    Completed,
    Cancelled,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// A new run may start from here
    pub fn can_start(self) -> bool {
        self == Self::Idle || self.is_terminal()
    }

    pub fn is_running(self) -> bool {
        matches!(self, Self::Running | Self::CompletionChecking)
    }
}

/// Where the restored file is written
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Same,
    Custom,
}

/// Raw status codes returned by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Ok,
    InvalidOptions,
    EngineNotFound,
    Io,
    Internal,
    Cancelled,
    Unknown(i32),
}

impl EngineStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::InvalidOptions,
            2 => Self::EngineNotFound,
            3 => Self::Io,
            4 => Self::Internal,
            5 => Self::Cancelled,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::InvalidOptions => 1,
            Self::EngineNotFound => 2,
            Self::Io => 3,
            Self::Internal => 4,
            Self::Cancelled => 5,
            Self::Unknown(code) => code,
        }
    }

    /// `None` on success
    pub fn into_error(self) -> Option<RunError> {
        match self {
            Self::Ok => None,
            Self::InvalidOptions => Some(RunError::InvalidOptions),
            Self::EngineNotFound => Some(RunError::EngineNotAvailable),
            Self::Io => Some(RunError::IoFailure),
            Self::Internal => Some(RunError::InternalFailure),
            Self::Cancelled => Some(RunError::Cancelled),
            Self::Unknown(code) => Some(RunError::UnknownStatus(code)),
        }
    }
}

/// Observable state of one runner
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: Option<Uuid>,
    pub phase: JobPhase,
    pub progress: f64,
    pub fps: String,
    pub time_string: String,
    pub eta: String,
    pub known_duration: f64,
    pub log: Vec<String>,
    pub completed_output_path: Option<PathBuf>,
    pub last_error: Option<RunError>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            run_id: None,
            phase: JobPhase::Idle,
            progress: 0.0,
            fps: "0".to_string(),
            time_string: "0:00".to_string(),
            eta: "--:--".to_string(),
            known_duration: 0.0,
            log: Vec::new(),
            completed_output_path: None,
            last_error: None,
        }
    }
}

impl RunState {
    pub fn is_running(&self) -> bool {
        self.phase.is_running()
    }

    pub fn log_text(&self) -> String {
        self.log.join("\n")
    }

    pub(crate) fn reset_for_run(&mut self, run_id: Uuid) {
        *self = Self {
            run_id: Some(run_id),
            phase: JobPhase::Running,
            ..Self::default()
        };
    }
}

/// Notifications pushed to subscribers while a job runs
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Phase(JobPhase),
    Progress { progress: f64, eta: String },
    Log(String),
}
