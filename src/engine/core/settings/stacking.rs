// Second-set attenuation when a filter runs in both filter sets

use super::Settings;
use crate::engine::core::filters::format_fixed;

/// Which filters run in both sets, and by how much the second set is scaled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stacking {
    pub sharpen: Option<f64>,
    pub denoise: Option<f64>,
    pub deband: Option<f64>,
}

impl Stacking {
    pub fn any(&self) -> bool {
        self.sharpen.is_some() || self.denoise.is_some() || self.deband.is_some()
    }
}

fn reduction_percent(factor: f64) -> i64 {
    ((1.0 - factor) * 100.0).round() as i64
}

/// Scale `value` when it parses, otherwise hand the text back unchanged
fn attenuate(value: &str, factor: f64, places: usize, min: f64, max: f64) -> String {
    match value.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => format_fixed((v * factor).clamp(min, max), places),
        _ => value.to_string(),
    }
}

impl Settings {
    pub fn is_sharpen_stacked(&self) -> bool {
        !self.no_sharpen && self.use_sharpen_2
    }

    pub fn is_denoise_stacked(&self) -> bool {
        !self.no_denoise && self.use_denoise_2
    }

    pub fn is_deband_stacked(&self) -> bool {
        !self.no_deband && self.use_deband_2
    }

    pub fn stacking(&self) -> Stacking {
        let sharpen = self.is_sharpen_stacked().then(|| {
            match (self.sharpen_method == "unsharp", self.sharpen_method_2 == "unsharp") {
                (true, true) => 0.35,
                (true, false) | (false, true) => 0.5,
                (false, false) => 0.6,
            }
        });
        Stacking {
            sharpen,
            denoise: self.is_denoise_stacked().then_some(0.55),
            deband: self.is_deband_stacked().then_some(0.6),
        }
    }

    pub fn effective_sharpen_strength_2(&self) -> String {
        match self.stacking().sharpen {
            Some(f) if self.sharpen_method_2 == "cas" => {
                attenuate(&self.sharpen_strength_2, f, 3, 0.0, 1.0)
            }
            _ => self.sharpen_strength_2.clone(),
        }
    }

    pub fn effective_usm_amount_2(&self) -> String {
        match self.stacking().sharpen {
            Some(f) if self.sharpen_method_2 == "unsharp" => {
                attenuate(&self.usm_amount_2, f, 2, -2.0, 5.0)
            }
            _ => self.usm_amount_2.clone(),
        }
    }

    /// Radius is reduced less than amount to limit halos
    pub fn effective_usm_radius_2(&self) -> String {
        match self.stacking().sharpen {
            Some(f) if self.sharpen_method_2 == "unsharp" => {
                attenuate(&self.usm_radius_2, f + 0.2, 0, 3.0, 23.0)
            }
            _ => self.usm_radius_2.clone(),
        }
    }

    pub fn effective_denoise_strength_2(&self) -> String {
        match self.stacking().denoise {
            Some(_) if self.denoise_strength_2.trim().eq_ignore_ascii_case("auto") => {
                "auto".to_string()
            }
            Some(f) => attenuate(&self.denoise_strength_2, f, 2, 0.0, f64::MAX),
            None => self.denoise_strength_2.clone(),
        }
    }

    pub fn effective_deband_strength_2(&self) -> String {
        match self.stacking().deband {
            Some(f) => attenuate(&self.deband_strength_2, f, 4, 0.0, f64::MAX),
            None => self.deband_strength_2.clone(),
        }
    }

    pub fn effective_f3kdb_y_2(&self) -> String {
        match self.stacking().deband {
            Some(f) if self.deband_method_2 == "f3kdb" => {
                attenuate(&self.f3kdb_y_2, f, 0, 16.0, 512.0)
            }
            _ => self.f3kdb_y_2.clone(),
        }
    }

    pub fn effective_f3kdb_cbcr_2(&self) -> String {
        match self.stacking().deband {
            Some(f) if self.deband_method_2 == "f3kdb" => {
                attenuate(&self.f3kdb_cbcr_2, f, 0, 16.0, 512.0)
            }
            _ => self.f3kdb_cbcr_2.clone(),
        }
    }

    /// Log lines describing the second-set adjustments, empty when nothing stacks
    pub fn stacking_summary(&self) -> Vec<String> {
        let stacking = self.stacking();
        if !stacking.any() {
            return Vec::new();
        }
        let mut lines = vec!["Filter stacking detected, second set values adjusted:".to_string()];
        if let Some(f) = stacking.sharpen {
            let detail = if self.sharpen_method_2 == "unsharp" {
                format!(
                    "unsharp amount {} -> {}",
                    self.usm_amount_2,
                    self.effective_usm_amount_2()
                )
            } else {
                format!(
                    "cas {} -> {}",
                    self.sharpen_strength_2,
                    self.effective_sharpen_strength_2()
                )
            };
            lines.push(format!(
                "  sharpen 2nd set: -{}% ({detail})",
                reduction_percent(f)
            ));
        }
        if let Some(f) = stacking.denoise {
            lines.push(format!(
                "  denoise 2nd set: -{}% ({} -> {})",
                reduction_percent(f),
                self.denoise_strength_2,
                self.effective_denoise_strength_2()
            ));
        }
        if let Some(f) = stacking.deband {
            lines.push(format!(
                "  deband 2nd set: -{}% ({} -> {})",
                reduction_percent(f),
                self.deband_strength_2,
                self.effective_deband_strength_2()
            ));
        }
        lines
    }
}
