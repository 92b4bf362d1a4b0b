// Per-method strength ranges and defaults for the restoration filters

use std::ops::RangeInclusive;

pub fn format_fixed(value: f64, places: usize) -> String {
    format!("{:.*}", places, value)
}

/// Valid strength range for a denoiser
pub fn denoise_range(denoiser: &str) -> RangeInclusive<f64> {
    match denoiser {
        "hqdn3d" => 1.0..=10.0,
        "nlmeans" => 1.0..=30.0,
        "atadenoise" => 1.0..=20.0,
        _ => 0.0..=20.0, // bm3d
    }
}

pub fn denoise_default(denoiser: &str) -> f64 {
    match denoiser {
        "hqdn3d" => 4.0,
        "nlmeans" => 1.0,
        "atadenoise" => 9.0,
        _ => 2.5,
    }
}

pub fn sharpen_range(method: &str) -> RangeInclusive<f64> {
    match method {
        "unsharp" => -2.0..=5.0,
        _ => 0.0..=1.0,
    }
}

pub fn sharpen_default(method: &str) -> f64 {
    match method {
        "unsharp" => 1.0,
        _ => 0.25,
    }
}

pub const DEBAND_RANGE: RangeInclusive<f64> = 0.0..=0.1;
pub const DEBAND_DEFAULT: f64 = 0.015;

fn clamp_to(value: f64, range: &RangeInclusive<f64>) -> f64 {
    value.clamp(*range.start(), *range.end())
}

/// Normalize a denoise strength for `denoiser`.
///
/// bm3d accepts the literal "auto". Unparsable text falls back to the
/// denoiser default.
pub fn validate_denoise_strength(value: &str, denoiser: &str) -> String {
    if denoiser == "bm3d" && value.trim().eq_ignore_ascii_case("auto") {
        return value.to_string();
    }
    let strength = value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or_else(|| denoise_default(denoiser));
    format_fixed(clamp_to(strength, &denoise_range(denoiser)), 2)
}

pub fn validate_sharpen_strength(value: &str, method: &str) -> String {
    let strength = value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or_else(|| sharpen_default(method));
    format_fixed(clamp_to(strength, &sharpen_range(method)), 2)
}

pub fn validate_deband_strength(value: &str) -> String {
    let strength = value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(DEBAND_DEFAULT);
    format_fixed(clamp_to(strength, &DEBAND_RANGE), 3)
}
