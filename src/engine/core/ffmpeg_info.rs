use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

/// First line of `<binary> -version`
pub fn tool_version(binary: &str) -> Result<String> {
    let output = Command::new(binary)
        .arg("-version")
        .output()
        .with_context(|| format!("Failed to execute {binary}. Is it installed and in PATH?"))?;

    if !output.status.success() {
        anyhow::bail!("{} -version failed with status: {}", binary, output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    Ok(version_output
        .lines()
        .next()
        .unwrap_or("Unknown version")
        .to_string())
}

/// Media duration in seconds as reported by ffprobe
pub fn probe_duration(ffprobe: &str, path: &Path) -> Result<f64> {
    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(path)
        .output()
        .with_context(|| format!("Failed to execute {ffprobe}"))?;

    if !output.status.success() {
        anyhow::bail!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    parse_ffprobe_duration(&String::from_utf8_lossy(&output.stdout))
}

pub fn parse_ffprobe_duration(json: &str) -> Result<f64> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).context("Failed to parse ffprobe JSON output")?;

    let duration = probe
        .format
        .duration
        .context("No duration found in ffprobe output")?
        .trim()
        .parse::<f64>()
        .context("Failed to parse duration as float")?;

    if !duration.is_finite() || duration < 0.0 {
        anyhow::bail!("ffprobe reported an invalid duration: {duration}");
    }
    Ok(duration)
}
