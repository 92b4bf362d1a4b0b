// Derived x265 parameter string: `aq-mode=3,psy-rd=2.0,deblock=-2,-2`

use super::Settings;

pub(super) const DEFAULT_AQ_MODE: &str = "3";
pub(super) const DEFAULT_PSY_RD: &str = "2.0";
pub(super) const DEFAULT_DEBLOCK: &str = "-2";

impl Settings {
    /// Join the non-empty x265 sub-parameters with `,`.
    ///
    /// The deblock fragment carries its own comma (`deblock=a,b`) and is
    /// emitted when either half is non-empty.
    pub fn compile_derived_parameter_string(&self) -> String {
        let mut parts = Vec::new();
        let aq = self.x265_aq_mode.trim();
        if !aq.is_empty() {
            parts.push(format!("aq-mode={aq}"));
        }
        let psy = self.x265_psy_rd.trim();
        if !psy.is_empty() {
            parts.push(format!("psy-rd={psy}"));
        }
        let d1 = self.x265_deblock_1.trim();
        let d2 = self.x265_deblock_2.trim();
        if !d1.is_empty() || !d2.is_empty() {
            parts.push(format!("deblock={d1},{d2}"));
        }
        parts.join(",")
    }

    /// Load the x265 sub-parameters from a derived string.
    ///
    /// Accepts `,` or `:` between fragments. Keys missing from `text` fall
    /// back to their defaults; unrecognized keys are ignored.
    pub fn parse_derived_parameter_string(&mut self, text: &str) {
        let mut aq_mode = None;
        let mut psy_rd = None;
        let mut deblock: Option<(String, String)> = None;
        // Set after `deblock=a` when the second coordinate arrives as its own fragment
        let mut awaiting_deblock_2 = false;

        for fragment in text.split([',', ':']) {
            let fragment = fragment.trim();
            // An empty fragment here is an explicitly empty second coordinate
            if awaiting_deblock_2 && !fragment.contains('=') {
                if let Some((_, second)) = deblock.as_mut() {
                    *second = fragment.to_string();
                }
                awaiting_deblock_2 = false;
                continue;
            }
            awaiting_deblock_2 = false;
            let Some((key, value)) = fragment.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "aq-mode" => aq_mode = Some(value.to_string()),
                "psy-rd" => psy_rd = Some(value.to_string()),
                "deblock" => {
                    deblock = Some((value.to_string(), DEFAULT_DEBLOCK.to_string()));
                    awaiting_deblock_2 = true;
                }
                other => tracing::debug!(key = other, "ignoring unknown x265 parameter"),
            }
        }

        self.x265_aq_mode = aq_mode.unwrap_or_else(|| DEFAULT_AQ_MODE.to_string());
        self.x265_psy_rd = psy_rd.unwrap_or_else(|| DEFAULT_PSY_RD.to_string());
        let (d1, d2) =
            deblock.unwrap_or_else(|| (DEFAULT_DEBLOCK.to_string(), DEFAULT_DEBLOCK.to_string()));
        self.x265_deblock_1 = d1;
        self.x265_deblock_2 = d2;
    }
}
