// Outbound seams of the job runner and their production implementations

use anyhow::Result;
use std::io;
use std::path::Path;
use std::sync::mpsc::Sender;

use super::core::{EngineStatus, ParameterRecord, probe_duration};

/// External restoration engine.
///
/// `process` blocks until the job ends and reports every output line on
/// `lines`; `request_cancel` may be called from any thread meanwhile.
pub trait Engine: Send + Sync {
    fn init(&self) -> EngineStatus;

    fn process(&self, input: &Path, record: ParameterRecord, lines: Sender<String>)
    -> EngineStatus;

    fn request_cancel(&self);
}

pub trait DurationProbe: Send + Sync {
    fn probe_duration(&self, path: &Path) -> Result<f64>;
}

pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// `None` when the file does not exist or cannot be stat'ed
    fn file_size(&self, path: &Path) -> Option<u64>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// Filesystem backed by `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn file_size(&self, path: &Path) -> Option<u64> {
        std::fs::metadata(path)
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }
}

/// Duration probe that shells out to ffprobe
#[derive(Debug, Clone)]
pub struct FfprobeDuration {
    ffprobe: String,
}

impl FfprobeDuration {
    pub fn new(ffprobe: impl Into<String>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

impl Default for FfprobeDuration {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl DurationProbe for FfprobeDuration {
    fn probe_duration(&self, path: &Path) -> Result<f64> {
        probe_duration(&self.ffprobe, path)
    }
}
