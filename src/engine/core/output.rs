// Output location prediction for a restoration job

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use super::types::OutputMode;

pub const OUTPUT_SUFFIX: &str = "_[restored]";

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "bmp", "webp"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// `<stem>_[restored].mp4`, or `.png` for still images
pub fn predicted_output_name(input_path: &Path) -> String {
    let stem = input_path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or(Cow::Borrowed("output"));
    let container = if is_image_file(input_path) { "png" } else { "mp4" };
    format!("{}{}.{}", stem, OUTPUT_SUFFIX, container)
}

/// Directory the engine writes into.
///
/// Custom mode without a usable directory falls back to the input's own
/// directory.
pub fn output_folder(input_path: &Path, mode: OutputMode, custom_dir: Option<&Path>) -> PathBuf {
    let same = || {
        input_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    };
    match (mode, custom_dir) {
        (OutputMode::Custom, Some(dir)) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => same(),
    }
}

pub fn predicted_output_path(
    input_path: &Path,
    mode: OutputMode,
    custom_dir: Option<&Path>,
) -> PathBuf {
    output_folder(input_path, mode, custom_dir).join(predicted_output_name(input_path))
}

/// The user's Downloads folder, the default custom destination
pub fn default_custom_dir() -> Option<PathBuf> {
    dirs::download_dir()
}
