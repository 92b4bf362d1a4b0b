// Restoration engine - independent of any front end

pub mod backend;
pub mod core;
pub mod ffmpeg;
pub mod runner;

pub use backend::{DurationProbe, Engine, FfprobeDuration, FileSystem, StdFileSystem};
pub use core::*;
pub use ffmpeg::FfmpegEngine;
pub use runner::{CompletionPolicy, JobRunner};
