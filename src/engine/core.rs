mod error;
mod ffmpeg_cmd;
mod ffmpeg_info;
mod filters;
mod log;
mod output;
mod progress;
mod record;
mod settings;
mod types;

pub use error::RunError;
pub use ffmpeg_cmd::{
    build_ffmpeg_cmd, build_restore_filter, format_ffmpeg_cmd, output_path_for,
    was_user_cancelled, x265_params_for_cli,
};
pub use ffmpeg_info::{parse_ffprobe_duration, probe_duration, tool_version};
pub use filters::{
    DEBAND_DEFAULT, DEBAND_RANGE, denoise_default, denoise_range, format_fixed, sharpen_default,
    sharpen_range, validate_deband_strength, validate_denoise_strength, validate_sharpen_strength,
};
pub use log::{DEBUG_LOG_NAME, write_debug_log};
pub use output::{
    OUTPUT_SUFFIX, default_custom_dir, is_image_file, output_folder, predicted_output_name,
    predicted_output_path,
};
pub use progress::{
    ETA_UNKNOWN, ProgressUpdate, format_time, parse as parse_progress, parse_time,
    parse_with_clock,
};
pub use record::{CStrField, PATH_MAX, ParameterRecord, compile, compile_with_output_dir};
pub use settings::{Settings, Stacking, is_zero, is_zero_or_empty};
pub use types::{EngineStatus, JobPhase, OutputMode, RunEvent, RunState};
