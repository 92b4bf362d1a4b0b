// User-editable restoration settings with paired-field invariants

mod stacking;
mod x265;

pub use stacking::Stacking;

use super::filters;
use super::record::{ParameterRecord, compile_with_output_dir};

// Reseed values used when a feature is switched on with a degenerate configuration
const DEFAULT_DERING_STRENGTH: &str = "0.5";
const DEFAULT_DEBLOCK_THRESH: &str = "0.5";
const DEFAULT_SHARPEN_STRENGTH_2: &str = "0.25";
const DEFAULT_USM_RADIUS_2: &str = "5";
const DEFAULT_USM_AMOUNT_2: &str = "1.0";
const DEFAULT_USM_THRESHOLD_2: &str = "0.03";
const DEFAULT_DEBAND_STRENGTH_2: &str = "0.015";
const DEFAULT_F3KDB_RANGE_2: &str = "15";
const DEFAULT_F3KDB_Y_2: &str = "64";
const DEFAULT_F3KDB_CBCR_2: &str = "64";
const DEFAULT_GRAIN_STRENGTH_2: &str = "1.0";

/// True iff `text` parses as a number equal to zero ("0", "0.0", " 0.00 ").
///
/// Empty and unparsable text is not zero: free-text the engine might still
/// interpret counts as an active value.
pub fn is_zero(text: &str) -> bool {
    text.trim().parse::<f64>().is_ok_and(|v| v == 0.0)
}

pub fn is_zero_or_empty(text: &str) -> bool {
    text.trim().is_empty() || is_zero(text)
}

fn all_degenerate(values: &[&str]) -> bool {
    values.iter().all(|v| is_zero_or_empty(v))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn default_hw_accel() -> &'static str {
    if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        "videotoolbox"
    } else {
        "none"
    }
}

/// Settings for one restoration job.
///
/// Fields without cross-field rules are public. Fields that take part in an
/// enabled/strength pair are private and mutated through setters, which keep
/// the pair consistent synchronously: driving every strength of a feature to
/// zero (or empty) switches the feature off, and switching a feature on while
/// its strengths are degenerate reseeds them with non-zero defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    // Codec & rate
    pub use_hevc: bool,
    pub crf: f64,
    pub preset: String,
    pub use_10bit: bool,

    // x265 sub-parameters, joined by `x265_params()`
    pub x265_aq_mode: String,
    pub x265_psy_rd: String,
    pub x265_deblock_1: String,
    pub x265_deblock_2: String,

    // Hardware
    pub hw_accel: String,
    pub encoder: String,
    pub threads: String, // "0" = auto

    // Frame & scale
    pub fps: String,
    pub scale_factor: f64,
    pub interpolation: String,

    // Scaler / AI
    pub scaler: String,
    pub ai_backend: String,
    pub ai_model_path: String,
    pub ai_model_type: String,
    pub dnn_backend: String,

    // First filter set
    denoiser: String,
    pub denoise_strength: String,
    pub deblock_mode: String,
    pub deblock_thresh: String,
    dering_active: bool,
    dering_strength: String,
    sharpen_method: String,
    sharpen_strength: String,
    pub usm_radius: String,
    pub usm_amount: String,
    pub usm_threshold: String,
    deband_method: String,
    deband_strength: String,
    pub f3kdb_range: String,
    pub f3kdb_y: String,
    pub f3kdb_cbcr: String,
    pub grain_strength: String,

    // Second filter set
    denoiser_2: String,
    denoise_strength_2: String,
    use_denoise_2: bool,
    pub deblock_mode_2: String,
    deblock_thresh_2: String,
    use_deblock_2: bool,
    dering_active_2: bool,
    dering_strength_2: String,
    use_dering_2: bool,
    sharpen_method_2: String,
    sharpen_strength_2: String,
    use_sharpen_2: bool,
    usm_radius_2: String,
    usm_amount_2: String,
    usm_threshold_2: String,
    deband_method_2: String,
    deband_strength_2: String,
    use_deband_2: bool,
    f3kdb_range_2: String,
    f3kdb_y_2: String,
    f3kdb_cbcr_2: String,
    grain_strength_2: String,
    use_grain_2: bool,

    // Colour / equalization
    pub eq_contrast: String,
    pub eq_brightness: String,
    pub eq_saturation: String,
    pub lut_path: String,

    // I/O
    pub audio_bitrate: String,
    pub movflags: String,
    pub preview: bool,

    // Stage toggles
    pub no_deblock: bool,
    pub no_denoise: bool,
    pub no_decimate: bool,
    pub no_interpolate: bool,
    pub no_sharpen: bool,
    pub no_deband: bool,
    pub no_eq: bool,
    pub no_grain: bool,
    pub pci_safe: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            use_hevc: false,
            crf: 16.0,
            preset: "slow".to_string(),
            use_10bit: false,

            x265_aq_mode: x265::DEFAULT_AQ_MODE.to_string(),
            x265_psy_rd: x265::DEFAULT_PSY_RD.to_string(),
            x265_deblock_1: x265::DEFAULT_DEBLOCK.to_string(),
            x265_deblock_2: x265::DEFAULT_DEBLOCK.to_string(),

            hw_accel: default_hw_accel().to_string(),
            encoder: "auto".to_string(),
            threads: "0".to_string(),

            fps: "60".to_string(),
            scale_factor: 2.0,
            interpolation: "mci".to_string(),

            scaler: "lanczos".to_string(),
            ai_backend: "sr".to_string(),
            ai_model_path: String::new(),
            ai_model_type: "espcn".to_string(),
            dnn_backend: "native".to_string(),

            denoiser: "bm3d".to_string(),
            denoise_strength: "2.5".to_string(),
            deblock_mode: "strong".to_string(),
            deblock_thresh: String::new(),
            dering_active: false,
            dering_strength: DEFAULT_DERING_STRENGTH.to_string(),
            sharpen_method: "cas".to_string(),
            sharpen_strength: "0.25".to_string(),
            usm_radius: "5".to_string(),
            usm_amount: "1.0".to_string(),
            usm_threshold: "0.03".to_string(),
            deband_method: "deband".to_string(),
            deband_strength: "0.015".to_string(),
            f3kdb_range: "15".to_string(),
            f3kdb_y: "64".to_string(),
            f3kdb_cbcr: "64".to_string(),
            grain_strength: "1.0".to_string(),

            denoiser_2: "bm3d".to_string(),
            denoise_strength_2: "2.5".to_string(),
            use_denoise_2: false,
            deblock_mode_2: "strong".to_string(),
            deblock_thresh_2: String::new(),
            use_deblock_2: false,
            dering_active_2: false,
            dering_strength_2: DEFAULT_DERING_STRENGTH.to_string(),
            use_dering_2: false,
            sharpen_method_2: "cas".to_string(),
            sharpen_strength_2: DEFAULT_SHARPEN_STRENGTH_2.to_string(),
            use_sharpen_2: false,
            usm_radius_2: DEFAULT_USM_RADIUS_2.to_string(),
            usm_amount_2: DEFAULT_USM_AMOUNT_2.to_string(),
            usm_threshold_2: DEFAULT_USM_THRESHOLD_2.to_string(),
            deband_method_2: "deband".to_string(),
            deband_strength_2: DEFAULT_DEBAND_STRENGTH_2.to_string(),
            use_deband_2: false,
            f3kdb_range_2: DEFAULT_F3KDB_RANGE_2.to_string(),
            f3kdb_y_2: DEFAULT_F3KDB_Y_2.to_string(),
            f3kdb_cbcr_2: DEFAULT_F3KDB_CBCR_2.to_string(),
            grain_strength_2: DEFAULT_GRAIN_STRENGTH_2.to_string(),
            use_grain_2: false,

            eq_contrast: "1.03".to_string(),
            eq_brightness: "0.005".to_string(),
            eq_saturation: "1.06".to_string(),
            lut_path: String::new(),

            audio_bitrate: "192k".to_string(),
            movflags: "+faststart".to_string(),
            preview: false,

            no_deblock: false,
            no_denoise: false,
            no_decimate: false,
            no_interpolate: false,
            no_sharpen: false,
            no_deband: false,
            no_eq: false,
            no_grain: false,
            pci_safe: false,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore every field to its default value
    pub fn reset_to_defaults(&mut self) {
        *self = Self::default();
    }

    /// Compile into the fixed-layout record handed to the engine
    pub fn compile(&self, output_dir: &str) -> ParameterRecord {
        compile_with_output_dir(self, output_dir)
    }

    /// Assign a field by its parameter-record key.
    ///
    /// Numeric fields that do not parse keep their previous value. Returns
    /// false when the key is not a settings field.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        match key {
            "codec" => self.use_hevc = value.trim().eq_ignore_ascii_case("hevc"),
            "crf" => match value.trim().parse::<f64>() {
                Ok(crf) => self.crf = crf,
                Err(_) => tracing::warn!(key, value, "ignoring non-numeric value"),
            },
            "preset" => self.preset = value.to_string(),
            "use10" => self.use_10bit = parse_flag(value),
            "x265_params" => self.parse_derived_parameter_string(value),
            "hwaccel" => self.hw_accel = value.to_string(),
            "encoder" => self.encoder = value.to_string(),
            "threads" => self.threads = value.to_string(),
            "fps" => self.fps = value.to_string(),
            "scale_factor" => match value.trim().parse::<f64>() {
                Ok(scale) => self.scale_factor = scale,
                Err(_) => tracing::warn!(key, value, "ignoring non-numeric value"),
            },
            "mi_mode" => self.interpolation = value.to_string(),
            "scaler" => self.scaler = value.to_string(),
            "ai_backend" => self.ai_backend = value.to_string(),
            "ai_model" => self.ai_model_path = value.to_string(),
            "ai_model_type" => self.ai_model_type = value.to_string(),
            "dnn_backend" => self.dnn_backend = value.to_string(),

            "denoiser" => self.set_denoiser(value),
            "denoise_strength" => self.denoise_strength = value.to_string(),
            "deblock_mode" => self.deblock_mode = value.to_string(),
            "deblock_thresh" => self.deblock_thresh = value.to_string(),
            "dering_active" => self.set_dering_active(parse_flag(value)),
            "dering_strength" => self.set_dering_strength(value),
            "sharpen_method" => self.set_sharpen_method(value),
            "sharpen_strength" => self.sharpen_strength = value.to_string(),
            "usm_radius" => self.usm_radius = value.to_string(),
            "usm_amount" => self.usm_amount = value.to_string(),
            "usm_threshold" => self.usm_threshold = value.to_string(),
            "deband_method" => self.set_deband_method(value),
            "deband_strength" => self.deband_strength = value.to_string(),
            "f3kdb_range" => self.f3kdb_range = value.to_string(),
            "f3kdb_y" => self.f3kdb_y = value.to_string(),
            "f3kdb_cbcr" => self.f3kdb_cbcr = value.to_string(),
            "grain_strength" => self.grain_strength = value.to_string(),

            "denoiser_2" => self.set_denoiser_2(value),
            "denoise_strength_2" => self.set_denoise_strength_2(value),
            "use_denoise_2" => self.set_use_denoise_2(parse_flag(value)),
            "deblock_mode_2" => self.deblock_mode_2 = value.to_string(),
            "deblock_thresh_2" => self.set_deblock_thresh_2(value),
            "use_deblock_2" => self.set_use_deblock_2(parse_flag(value)),
            "dering_active_2" => self.set_dering_active_2(parse_flag(value)),
            "dering_strength_2" => self.set_dering_strength_2(value),
            "use_dering_2" => self.set_use_dering_2(parse_flag(value)),
            "sharpen_method_2" => self.set_sharpen_method_2(value),
            "sharpen_strength_2" => self.set_sharpen_strength_2(value),
            "use_sharpen_2" => self.set_use_sharpen_2(parse_flag(value)),
            "usm_radius_2" => self.set_usm_radius_2(value),
            "usm_amount_2" => self.set_usm_amount_2(value),
            "usm_threshold_2" => self.set_usm_threshold_2(value),
            "deband_method_2" => self.set_deband_method_2(value),
            "deband_strength_2" => self.set_deband_strength_2(value),
            "use_deband_2" => self.set_use_deband_2(parse_flag(value)),
            "f3kdb_range_2" => self.set_f3kdb_range_2(value),
            "f3kdb_y_2" => self.set_f3kdb_y_2(value),
            "f3kdb_cbcr_2" => self.set_f3kdb_cbcr_2(value),
            "grain_strength_2" => self.set_grain_strength_2(value),
            "use_grain_2" => self.set_use_grain_2(parse_flag(value)),

            "eq_contrast" => self.eq_contrast = value.to_string(),
            "eq_brightness" => self.eq_brightness = value.to_string(),
            "eq_saturation" => self.eq_saturation = value.to_string(),
            "lut3d_file" => self.lut_path = value.to_string(),
            "audio_bitrate" => self.audio_bitrate = value.to_string(),
            "movflags" => self.movflags = value.to_string(),
            "preview" => self.preview = parse_flag(value),

            "no_deblock" => self.no_deblock = parse_flag(value),
            "no_denoise" => self.no_denoise = parse_flag(value),
            "no_decimate" => self.no_decimate = parse_flag(value),
            "no_interpolate" => self.no_interpolate = parse_flag(value),
            "no_sharpen" => self.no_sharpen = parse_flag(value),
            "no_deband" => self.no_deband = parse_flag(value),
            "no_eq" => self.no_eq = parse_flag(value),
            "no_grain" => self.no_grain = parse_flag(value),
            "pci_safe_mode" => self.pci_safe = parse_flag(value),
            _ => return false,
        }
        true
    }

    // ------------------------------------------------------------------
    // First set

    pub fn denoiser(&self) -> &str {
        &self.denoiser
    }

    /// Changing the denoiser re-validates the strength against its range
    pub fn set_denoiser(&mut self, denoiser: &str) {
        self.denoiser = denoiser.to_string();
        self.denoise_strength = filters::validate_denoise_strength(&self.denoise_strength, denoiser);
    }

    pub fn dering_active(&self) -> bool {
        self.dering_active
    }

    pub fn dering_strength(&self) -> &str {
        &self.dering_strength
    }

    pub fn set_dering_active(&mut self, on: bool) {
        self.dering_active = on;
        if on && is_zero_or_empty(&self.dering_strength) {
            self.dering_strength = DEFAULT_DERING_STRENGTH.to_string();
        }
    }

    pub fn set_dering_strength(&mut self, value: &str) {
        self.dering_strength = value.to_string();
        if is_zero_or_empty(value) {
            self.dering_active = false;
        }
    }

    pub fn sharpen_method(&self) -> &str {
        &self.sharpen_method
    }

    pub fn sharpen_strength(&self) -> &str {
        &self.sharpen_strength
    }

    pub fn set_sharpen_method(&mut self, method: &str) {
        self.sharpen_method = method.to_string();
        self.sharpen_strength = filters::validate_sharpen_strength(&self.sharpen_strength, method);
    }

    pub fn set_sharpen_strength(&mut self, value: &str) {
        self.sharpen_strength = value.to_string();
    }

    pub fn deband_method(&self) -> &str {
        &self.deband_method
    }

    pub fn deband_strength(&self) -> &str {
        &self.deband_strength
    }

    pub fn set_deband_method(&mut self, method: &str) {
        self.deband_method = method.to_string();
        self.deband_strength = filters::validate_deband_strength(&self.deband_strength);
    }

    pub fn set_deband_strength(&mut self, value: &str) {
        self.deband_strength = value.to_string();
    }

    // ------------------------------------------------------------------
    // Second set: denoise

    pub fn denoiser_2(&self) -> &str {
        &self.denoiser_2
    }

    pub fn denoise_strength_2(&self) -> &str {
        &self.denoise_strength_2
    }

    pub fn use_denoise_2(&self) -> bool {
        self.use_denoise_2
    }

    pub fn set_denoiser_2(&mut self, denoiser: &str) {
        self.denoiser_2 = denoiser.to_string();
        let validated = filters::validate_denoise_strength(&self.denoise_strength_2, denoiser);
        self.set_denoise_strength_2(&validated);
    }

    pub fn set_denoise_strength_2(&mut self, value: &str) {
        self.denoise_strength_2 = value.to_string();
        if is_zero_or_empty(value) {
            self.use_denoise_2 = false;
        }
    }

    pub fn set_use_denoise_2(&mut self, on: bool) {
        self.use_denoise_2 = on;
        if on && is_zero_or_empty(&self.denoise_strength_2) {
            self.denoise_strength_2 =
                filters::format_fixed(filters::denoise_default(&self.denoiser_2), 2);
        }
    }

    // ------------------------------------------------------------------
    // Second set: deblock

    pub fn deblock_thresh_2(&self) -> &str {
        &self.deblock_thresh_2
    }

    pub fn use_deblock_2(&self) -> bool {
        self.use_deblock_2
    }

    pub fn set_deblock_thresh_2(&mut self, value: &str) {
        self.deblock_thresh_2 = value.to_string();
        if is_zero_or_empty(value) {
            self.use_deblock_2 = false;
        }
    }

    pub fn set_use_deblock_2(&mut self, on: bool) {
        self.use_deblock_2 = on;
        if on && is_zero_or_empty(&self.deblock_thresh_2) {
            self.deblock_thresh_2 = DEFAULT_DEBLOCK_THRESH.to_string();
        }
    }

    // ------------------------------------------------------------------
    // Second set: dering (two flags share one strength)

    pub fn dering_strength_2(&self) -> &str {
        &self.dering_strength_2
    }

    pub fn use_dering_2(&self) -> bool {
        self.use_dering_2
    }

    pub fn dering_active_2(&self) -> bool {
        self.dering_active_2
    }

    pub fn set_dering_strength_2(&mut self, value: &str) {
        self.dering_strength_2 = value.to_string();
        if is_zero_or_empty(value) {
            self.use_dering_2 = false;
            self.dering_active_2 = false;
        }
    }

    pub fn set_use_dering_2(&mut self, on: bool) {
        self.use_dering_2 = on;
        if on && is_zero_or_empty(&self.dering_strength_2) {
            self.dering_strength_2 = DEFAULT_DERING_STRENGTH.to_string();
        }
    }

    pub fn set_dering_active_2(&mut self, on: bool) {
        self.dering_active_2 = on;
        if on && is_zero_or_empty(&self.dering_strength_2) {
            self.dering_strength_2 = DEFAULT_DERING_STRENGTH.to_string();
        }
    }

    // ------------------------------------------------------------------
    // Second set: sharpen (cas strength, or the unsharp-mask triple)

    pub fn sharpen_method_2(&self) -> &str {
        &self.sharpen_method_2
    }

    pub fn sharpen_strength_2(&self) -> &str {
        &self.sharpen_strength_2
    }

    pub fn use_sharpen_2(&self) -> bool {
        self.use_sharpen_2
    }

    pub fn usm_radius_2(&self) -> &str {
        &self.usm_radius_2
    }

    pub fn usm_amount_2(&self) -> &str {
        &self.usm_amount_2
    }

    pub fn usm_threshold_2(&self) -> &str {
        &self.usm_threshold_2
    }

    fn sharpen_2_degenerate(&self) -> bool {
        if self.sharpen_method_2 == "unsharp" {
            all_degenerate(&[&self.usm_radius_2, &self.usm_amount_2, &self.usm_threshold_2])
        } else {
            is_zero_or_empty(&self.sharpen_strength_2)
        }
    }

    fn enforce_sharpen_2(&mut self) {
        if self.sharpen_2_degenerate() {
            self.use_sharpen_2 = false;
        }
    }

    pub fn set_sharpen_method_2(&mut self, method: &str) {
        self.sharpen_method_2 = method.to_string();
        self.sharpen_strength_2 =
            filters::validate_sharpen_strength(&self.sharpen_strength_2, method);
        self.enforce_sharpen_2();
    }

    pub fn set_sharpen_strength_2(&mut self, value: &str) {
        self.sharpen_strength_2 = value.to_string();
        self.enforce_sharpen_2();
    }

    pub fn set_usm_radius_2(&mut self, value: &str) {
        self.usm_radius_2 = value.to_string();
        self.enforce_sharpen_2();
    }

    pub fn set_usm_amount_2(&mut self, value: &str) {
        self.usm_amount_2 = value.to_string();
        self.enforce_sharpen_2();
    }

    pub fn set_usm_threshold_2(&mut self, value: &str) {
        self.usm_threshold_2 = value.to_string();
        self.enforce_sharpen_2();
    }

    pub fn set_use_sharpen_2(&mut self, on: bool) {
        self.use_sharpen_2 = on;
        if !on || !self.sharpen_2_degenerate() {
            return;
        }
        if self.sharpen_method_2 == "unsharp" {
            self.usm_radius_2 = DEFAULT_USM_RADIUS_2.to_string();
            self.usm_amount_2 = DEFAULT_USM_AMOUNT_2.to_string();
            self.usm_threshold_2 = DEFAULT_USM_THRESHOLD_2.to_string();
        } else {
            self.sharpen_strength_2 = DEFAULT_SHARPEN_STRENGTH_2.to_string();
        }
    }

    // ------------------------------------------------------------------
    // Second set: deband (f3kdb triple, or a single strength)

    pub fn deband_method_2(&self) -> &str {
        &self.deband_method_2
    }

    pub fn deband_strength_2(&self) -> &str {
        &self.deband_strength_2
    }

    pub fn use_deband_2(&self) -> bool {
        self.use_deband_2
    }

    pub fn f3kdb_range_2(&self) -> &str {
        &self.f3kdb_range_2
    }

    pub fn f3kdb_y_2(&self) -> &str {
        &self.f3kdb_y_2
    }

    pub fn f3kdb_cbcr_2(&self) -> &str {
        &self.f3kdb_cbcr_2
    }

    fn deband_2_degenerate(&self) -> bool {
        if self.deband_method_2 == "f3kdb" {
            all_degenerate(&[&self.f3kdb_range_2, &self.f3kdb_y_2, &self.f3kdb_cbcr_2])
        } else {
            is_zero_or_empty(&self.deband_strength_2)
        }
    }

    fn enforce_deband_2(&mut self) {
        if self.deband_2_degenerate() {
            self.use_deband_2 = false;
        }
    }

    pub fn set_deband_method_2(&mut self, method: &str) {
        self.deband_method_2 = method.to_string();
        self.deband_strength_2 = filters::validate_deband_strength(&self.deband_strength_2);
        self.enforce_deband_2();
    }

    pub fn set_deband_strength_2(&mut self, value: &str) {
        self.deband_strength_2 = value.to_string();
        self.enforce_deband_2();
    }

    pub fn set_f3kdb_range_2(&mut self, value: &str) {
        self.f3kdb_range_2 = value.to_string();
        self.enforce_deband_2();
    }

    pub fn set_f3kdb_y_2(&mut self, value: &str) {
        self.f3kdb_y_2 = value.to_string();
        self.enforce_deband_2();
    }

    pub fn set_f3kdb_cbcr_2(&mut self, value: &str) {
        self.f3kdb_cbcr_2 = value.to_string();
        self.enforce_deband_2();
    }

    pub fn set_use_deband_2(&mut self, on: bool) {
        self.use_deband_2 = on;
        if !on || !self.deband_2_degenerate() {
            return;
        }
        if self.deband_method_2 == "f3kdb" {
            self.f3kdb_range_2 = DEFAULT_F3KDB_RANGE_2.to_string();
            self.f3kdb_y_2 = DEFAULT_F3KDB_Y_2.to_string();
            self.f3kdb_cbcr_2 = DEFAULT_F3KDB_CBCR_2.to_string();
        } else {
            self.deband_strength_2 = DEFAULT_DEBAND_STRENGTH_2.to_string();
        }
    }

    // ------------------------------------------------------------------
    // Second set: grain

    pub fn grain_strength_2(&self) -> &str {
        &self.grain_strength_2
    }

    pub fn use_grain_2(&self) -> bool {
        self.use_grain_2
    }

    pub fn set_grain_strength_2(&mut self, value: &str) {
        self.grain_strength_2 = value.to_string();
        if is_zero_or_empty(value) {
            self.use_grain_2 = false;
        }
    }

    pub fn set_use_grain_2(&mut self, on: bool) {
        self.use_grain_2 = on;
        if on && is_zero_or_empty(&self.grain_strength_2) {
            self.grain_strength_2 = DEFAULT_GRAIN_STRENGTH_2.to_string();
        }
    }
}
