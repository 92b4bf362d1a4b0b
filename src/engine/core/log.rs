use anyhow::{Context, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub const DEBUG_LOG_NAME: &str = "restorer.log";

/// Append a timestamped block to `restorer.log` in `dir`
pub fn write_debug_log(dir: &Path, header: &str, lines: &[String]) -> Result<()> {
    let log_path = dir.join(DEBUG_LOG_NAME);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open {}", log_path.display()))?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(file, "[{}] {}", timestamp, header)?;
    for line in lines {
        writeln!(file, "    {}", line)?;
    }
    Ok(())
}
