// Fixed-layout parameter record handed to the engine for one job

use std::fmt;

use super::settings::Settings;

pub const PATH_MAX: usize = 4096;

/// Fixed-capacity, NUL-terminated string slot.
///
/// Holds at most `N - 1` bytes of UTF-8, cut at a character boundary, with
/// every byte past the content zeroed.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct CStrField<const N: usize>([u8; N]);

impl<const N: usize> Default for CStrField<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> CStrField<N> {
    pub const CAPACITY: usize = N;

    pub fn new(text: &str) -> Self {
        let mut buf = [0u8; N];
        if N == 0 {
            return Self(buf);
        }
        // An embedded NUL terminates the value
        let text = text.split('\0').next().unwrap_or_default();
        let mut end = text.len().min(N - 1);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        buf[..end].copy_from_slice(&text.as_bytes()[..end]);
        Self(buf)
    }

    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(N);
        std::str::from_utf8(&self.0[..len]).unwrap_or_default()
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> fmt::Debug for CStrField<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[{}]", self.as_str(), N)
    }
}

/// Slot rendering for the canonical text form
trait Slot {
    fn render(&self) -> String;
}

impl<const N: usize> Slot for CStrField<N> {
    fn render(&self) -> String {
        self.as_str().to_string()
    }
}

impl Slot for i32 {
    fn render(&self) -> String {
        self.to_string()
    }
}

macro_rules! parameter_record {
    ($($field:ident: $ty:ty),* $(,)?) => {
        /// Immutable per-invocation snapshot of the settings, laid out like
        /// the native options block.
        #[repr(C)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct ParameterRecord {
            $(pub $field: $ty,)*
        }

        impl ParameterRecord {
            /// `(slot name, value)` in declaration order
            pub fn entries(&self) -> Vec<(&'static str, String)> {
                vec![$((stringify!($field), Slot::render(&self.$field)),)*]
            }
        }
    };
}

type PathSlot = CStrField<PATH_MAX>;

parameter_record! {
    // Core
    codec: CStrField<8>,
    crf: CStrField<16>,
    preset: CStrField<32>,
    fps: CStrField<16>,
    scale_factor: CStrField<16>,

    // Scaler / AI
    scaler: CStrField<16>,
    ai_backend: CStrField<16>,
    ai_model: PathSlot,
    ai_model_type: CStrField<16>,
    dnn_backend: CStrField<32>,

    // First filter set
    denoiser: CStrField<16>,
    denoise_strength: CStrField<16>,
    deblock_mode: CStrField<16>,
    deblock_thresh: CStrField<64>,
    dering_active: i32,
    dering_strength: CStrField<16>,
    sharpen_method: CStrField<16>,
    sharpen_strength: CStrField<32>,
    usm_radius: CStrField<16>,
    usm_amount: CStrField<16>,
    usm_threshold: CStrField<16>,
    deband_method: CStrField<16>,
    deband_strength: CStrField<32>,
    f3kdb_range: CStrField<16>,
    f3kdb_y: CStrField<16>,
    f3kdb_cbcr: CStrField<16>,
    grain_strength: CStrField<16>,

    // Second filter set
    denoiser_2: CStrField<16>,
    denoise_strength_2: CStrField<16>,
    deblock_mode_2: CStrField<16>,
    deblock_thresh_2: CStrField<64>,
    dering_active_2: i32,
    dering_strength_2: CStrField<16>,
    sharpen_method_2: CStrField<16>,
    sharpen_strength_2: CStrField<32>,
    usm_radius_2: CStrField<16>,
    usm_amount_2: CStrField<16>,
    usm_threshold_2: CStrField<16>,
    deband_method_2: CStrField<16>,
    deband_strength_2: CStrField<32>,
    f3kdb_range_2: CStrField<16>,
    f3kdb_y_2: CStrField<16>,
    f3kdb_cbcr_2: CStrField<16>,
    grain_strength_2: CStrField<16>,
    use_denoise_2: i32,
    use_deblock_2: i32,
    use_dering_2: i32,
    use_sharpen_2: i32,
    use_deband_2: i32,
    use_grain_2: i32,

    // Interpolation / EQ / LUT
    mi_mode: CStrField<16>,
    eq_contrast: CStrField<16>,
    eq_brightness: CStrField<16>,
    eq_saturation: CStrField<16>,
    lut3d_file: PathSlot,

    x265_params: CStrField<256>,

    // I/O
    outdir: PathSlot,
    audio_bitrate: CStrField<32>,
    threads: CStrField<16>,
    movflags: CStrField<32>,
    use10: i32,
    preview: i32,

    // Toggles
    no_deblock: i32,
    no_denoise: i32,
    no_decimate: i32,
    no_interpolate: i32,
    no_sharpen: i32,
    no_deband: i32,
    no_eq: i32,
    no_grain: i32,
    pci_safe_mode: i32,

    // Hardware
    hwaccel: CStrField<16>,
    encoder: CStrField<16>,
}

impl ParameterRecord {
    /// One `name=value` line per slot, in declaration order
    pub fn canonical(&self) -> String {
        self.entries()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn value(&self, name: &str) -> Option<String> {
        self.entries()
            .into_iter()
            .find(|(slot, _)| *slot == name)
            .map(|(_, value)| value)
    }
}

fn flag(on: bool) -> i32 {
    i32::from(on)
}

/// Compile with an empty output directory
pub fn compile(settings: &Settings) -> ParameterRecord {
    compile_with_output_dir(settings, "")
}

/// Compile `settings` into a record; the second filter set carries its
/// stacking-attenuated values.
pub fn compile_with_output_dir(s: &Settings, output_dir: &str) -> ParameterRecord {
    ParameterRecord {
        codec: CStrField::new(if s.use_hevc { "hevc" } else { "h264" }),
        crf: CStrField::new(&(s.crf as i64).to_string()),
        preset: CStrField::new(&s.preset),
        fps: CStrField::new(&s.fps),
        scale_factor: CStrField::new(&format!("{:.2}", s.scale_factor)),

        scaler: CStrField::new(&s.scaler),
        ai_backend: CStrField::new(&s.ai_backend),
        ai_model: CStrField::new(&s.ai_model_path),
        ai_model_type: CStrField::new(&s.ai_model_type),
        dnn_backend: CStrField::new(&s.dnn_backend),

        denoiser: CStrField::new(s.denoiser()),
        denoise_strength: CStrField::new(&s.denoise_strength),
        deblock_mode: CStrField::new(&s.deblock_mode),
        deblock_thresh: CStrField::new(&s.deblock_thresh),
        dering_active: flag(s.dering_active()),
        dering_strength: CStrField::new(s.dering_strength()),
        sharpen_method: CStrField::new(s.sharpen_method()),
        sharpen_strength: CStrField::new(s.sharpen_strength()),
        usm_radius: CStrField::new(&s.usm_radius),
        usm_amount: CStrField::new(&s.usm_amount),
        usm_threshold: CStrField::new(&s.usm_threshold),
        deband_method: CStrField::new(s.deband_method()),
        deband_strength: CStrField::new(s.deband_strength()),
        f3kdb_range: CStrField::new(&s.f3kdb_range),
        f3kdb_y: CStrField::new(&s.f3kdb_y),
        f3kdb_cbcr: CStrField::new(&s.f3kdb_cbcr),
        grain_strength: CStrField::new(&s.grain_strength),

        denoiser_2: CStrField::new(s.denoiser_2()),
        denoise_strength_2: CStrField::new(&s.effective_denoise_strength_2()),
        deblock_mode_2: CStrField::new(&s.deblock_mode_2),
        deblock_thresh_2: CStrField::new(s.deblock_thresh_2()),
        dering_active_2: flag(s.dering_active_2()),
        dering_strength_2: CStrField::new(s.dering_strength_2()),
        sharpen_method_2: CStrField::new(s.sharpen_method_2()),
        sharpen_strength_2: CStrField::new(&s.effective_sharpen_strength_2()),
        usm_radius_2: CStrField::new(&s.effective_usm_radius_2()),
        usm_amount_2: CStrField::new(&s.effective_usm_amount_2()),
        usm_threshold_2: CStrField::new(s.usm_threshold_2()),
        deband_method_2: CStrField::new(s.deband_method_2()),
        deband_strength_2: CStrField::new(&s.effective_deband_strength_2()),
        f3kdb_range_2: CStrField::new(s.f3kdb_range_2()),
        f3kdb_y_2: CStrField::new(&s.effective_f3kdb_y_2()),
        f3kdb_cbcr_2: CStrField::new(&s.effective_f3kdb_cbcr_2()),
        grain_strength_2: CStrField::new(s.grain_strength_2()),
        use_denoise_2: flag(s.use_denoise_2()),
        use_deblock_2: flag(s.use_deblock_2()),
        use_dering_2: flag(s.use_dering_2()),
        use_sharpen_2: flag(s.use_sharpen_2()),
        use_deband_2: flag(s.use_deband_2()),
        use_grain_2: flag(s.use_grain_2()),

        mi_mode: CStrField::new(&s.interpolation),
        eq_contrast: CStrField::new(&s.eq_contrast),
        eq_brightness: CStrField::new(&s.eq_brightness),
        eq_saturation: CStrField::new(&s.eq_saturation),
        lut3d_file: CStrField::new(&s.lut_path),

        x265_params: CStrField::new(&s.compile_derived_parameter_string()),

        outdir: CStrField::new(output_dir),
        audio_bitrate: CStrField::new(&s.audio_bitrate),
        threads: CStrField::new(&s.threads),
        movflags: CStrField::new(&s.movflags),
        use10: flag(s.use_10bit),
        preview: flag(s.preview),

        no_deblock: flag(s.no_deblock),
        no_denoise: flag(s.no_denoise),
        no_decimate: flag(s.no_decimate),
        no_interpolate: flag(s.no_interpolate),
        no_sharpen: flag(s.no_sharpen),
        no_deband: flag(s.no_deband),
        no_eq: flag(s.no_eq),
        no_grain: flag(s.no_grain),
        pci_safe_mode: flag(s.pci_safe),

        hwaccel: CStrField::new(&s.hw_accel),
        encoder: CStrField::new(&s.encoder),
    }
}
