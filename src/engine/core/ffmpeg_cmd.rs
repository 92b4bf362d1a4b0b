use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use super::output::{is_image_file, predicted_output_name};
use super::record::ParameterRecord;

/// Check if ffmpeg stopped because of a user signal (SIGTERM, SIGINT, SIGQUIT).
///
/// ffmpeg usually catches the signal and exits with "received signal X", so
/// both the exit status and the captured stderr are checked.
#[cfg(unix)]
pub fn was_user_cancelled(status: &ExitStatus, stderr: &str) -> bool {
    use std::os::unix::process::ExitStatusExt;

    const USER_SIGNALS: [libc::c_int; 3] = [libc::SIGINT, libc::SIGQUIT, libc::SIGTERM];

    if status.signal().is_some_and(|signal| USER_SIGNALS.contains(&signal)) {
        return true;
    }

    USER_SIGNALS
        .iter()
        .any(|signal| stderr.contains(&format!("received signal {signal}")))
}

#[cfg(not(unix))]
pub fn was_user_cancelled(_status: &ExitStatus, stderr: &str) -> bool {
    stderr.contains("received signal")
}

/// Numeric strength, 0 for "auto", negative or unparsable text
fn parse_strength(text: &str) -> f64 {
    match text.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v,
        _ => 0.0,
    }
}

fn parse_or_zero(text: &str) -> f64 {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn or_default(value: f64, default: f64) -> f64 {
    if value <= 0.0 { default } else { value }
}

fn denoise_filter(denoiser: &str, strength: &str) -> Option<String> {
    let filter = match denoiser {
        "bm3d" if strength.trim() == "auto" => "bm3d=estim=final:planes=1".to_string(),
        "bm3d" => {
            let sigma = or_default(parse_strength(strength), 2.5).min(20.0);
            format!("bm3d=sigma={:.2}:estim=basic:planes=1", sigma)
        }
        "hqdn3d" => {
            let luma = or_default(parse_strength(strength), 4.0).clamp(1.0, 10.0);
            let luma_tmp = luma * 1.5;
            format!(
                "hqdn3d={:.2}:{:.2}:{:.2}:{:.2}",
                luma,
                luma * 0.75,
                luma_tmp,
                luma_tmp * 0.75
            )
        }
        "nlmeans" => {
            let s = or_default(parse_strength(strength), 1.0).clamp(1.0, 30.0);
            // Larger patch and research windows for heavier noise
            let steps = [5.0, 10.0, 15.0, 20.0]
                .iter()
                .filter(|&&t| s > t)
                .count() as u32;
            let patch = 7 + 2 * steps;
            let research = 15 + 2 * steps + u32::from(s > 25.0) * 2;
            format!("nlmeans=s={:.2}:p={}:r={}", s, patch, research)
        }
        "atadenoise" => {
            let threshold = or_default(parse_strength(strength), 9.0).clamp(1.0, 20.0);
            format!(
                "atadenoise=s={:.2}:0a={:.3}:0b={:.3}",
                threshold,
                0.01 + (threshold / 20.0) * 0.03,
                0.02 + (threshold / 20.0) * 0.06
            )
        }
        _ => return None,
    };
    Some(filter)
}

fn deblock_filter(mode: &str, thresh: &str) -> String {
    if thresh.is_empty() {
        format!("deblock=filter={}:block=8", mode)
    } else {
        format!("deblock=filter={}:block=8:{}", mode, thresh)
    }
}

/// Deringing is a light temporal hqdn3d pass
fn dering_filter(strength: &str) -> String {
    let luma = or_default(parse_strength(strength), 0.5) * 8.0;
    let chroma = luma * 0.75;
    let luma_tmp = luma * 1.5;
    format!(
        "hqdn3d={:.2}:{:.2}:{:.2}:{:.2}",
        luma.min(15.0),
        chroma,
        luma_tmp,
        luma_tmp * 0.75
    )
}

fn sharpen_filter(method: &str, strength: &str, radius: &str, amount: &str) -> String {
    if method == "unsharp" {
        format!("unsharp={}:{}:{}", radius, radius, amount)
    } else {
        format!("cas=strength={}", strength)
    }
}

fn deband_filter(method: &str, strength: &str, range: &str, y: &str, cbcr: &str) -> String {
    match method {
        "gradfun" => format!("gradfun={}", strength),
        "f3kdb" => {
            // f3kdb thresholds are on a 0..2000 scale; ffmpeg's deband wants 0..0.5
            let y = parse_or_zero(y);
            let cbcr = parse_or_zero(cbcr);
            let thr_y = (if y > 0.0 { y / 2000.0 } else { 0.03 }).clamp(0.001, 0.5);
            let thr_c = (if cbcr > 0.0 { cbcr / 2000.0 } else { 0.015 }).min(0.5);
            let range = match parse_or_zero(range) as i64 {
                r if r < 1 => 16,
                r => r,
            };
            format!(
                "deband=1thr={:.5}:2thr={:.5}:3thr={:.5}:range={}:blur=0",
                thr_y, thr_c, thr_c, range
            )
        }
        _ => format!("deband=1thr={}:b=1", strength),
    }
}

fn scale_filter(r: &ParameterRecord) -> String {
    let scale = r.scale_factor.as_str();
    match r.scaler.as_str() {
        "zscale" => format!(
            "zscale=w=trunc(iw*{scale}/2)*2:h=trunc(ih*{scale}/2)*2:filter=lanczos:dither=error_diffusion"
        ),
        "ai" if r.ai_backend.as_str() == "sr" => {
            let mut filter = format!(
                "sr=dnn_backend={}:model='{}'",
                r.dnn_backend.as_str(),
                r.ai_model.as_str()
            );
            if r.ai_model_type.as_str() == "srcnn" {
                filter.push_str(&format!(":scale_factor={scale}"));
            }
            filter
        }
        "ai" => format!(
            "dnn_processing=dnn_backend={}:model='{}':input=x:output=y",
            r.dnn_backend.as_str(),
            r.ai_model.as_str()
        ),
        "hw" if r.hwaccel.as_str() == "cuda" => {
            format!("scale_npp=trunc(iw*{scale}/2)*2:trunc(ih*{scale}/2)*2")
        }
        "hw" => format!("scale=trunc(iw*{scale}/2)*2:trunc(ih*{scale}/2)*2:flags=lanczos"),
        _ => format!("scale=trunc(iw*{scale}/2)*2:trunc(ih*{scale}/2)*2:flags=lanczos+accurate_rnd"),
    }
}

fn pixel_format(r: &ParameterRecord) -> &'static str {
    if r.pci_safe_mode != 0 {
        "yuv420p"
    } else if r.use10 != 0 && matches!(r.encoder.as_str(), "nvenc" | "hevc_nvenc") {
        "p010le"
    } else if r.use10 != 0 {
        "yuv420p10le"
    } else {
        "yuv420p"
    }
}

/// Build the `-vf` restoration chain for one input
pub fn build_restore_filter(r: &ParameterRecord, image: bool) -> String {
    let mut vf: Vec<String> = Vec::new();

    if !image {
        let working = if r.pci_safe_mode != 0 { "yuv420p" } else { "yuv444p16le" };
        vf.push(format!("format={working}"));
        if r.no_decimate == 0 {
            vf.push("mpdecimate=hi=64*12,setpts=PTS".into());
        }
    }

    // First filter set
    if r.no_deblock == 0 {
        vf.push(deblock_filter(r.deblock_mode.as_str(), r.deblock_thresh.as_str()));
    }
    if r.dering_active != 0 {
        vf.push(dering_filter(r.dering_strength.as_str()));
    }
    if r.no_denoise == 0 {
        vf.extend(denoise_filter(r.denoiser.as_str(), r.denoise_strength.as_str()));
    }

    if !image && r.no_interpolate == 0 {
        let mi_mode = r.mi_mode.as_str();
        match r.fps.as_str() {
            "source" | "lock" => vf.push(format!(
                "minterpolate=mi_mode={mi_mode}:mc_mode=aobmc:me_mode=bidir:vsbmc=1"
            )),
            fps => vf.push(format!(
                "minterpolate=fps={fps}:mi_mode={mi_mode}:mc_mode=aobmc:me_mode=bidir:vsbmc=1"
            )),
        }
    }

    vf.push(scale_filter(r));

    if r.no_sharpen == 0 {
        vf.push(sharpen_filter(
            r.sharpen_method.as_str(),
            r.sharpen_strength.as_str(),
            r.usm_radius.as_str(),
            r.usm_amount.as_str(),
        ));
    }
    if r.no_deband == 0 {
        vf.push(deband_filter(
            r.deband_method.as_str(),
            r.deband_strength.as_str(),
            r.f3kdb_range.as_str(),
            r.f3kdb_y.as_str(),
            r.f3kdb_cbcr.as_str(),
        ));
    }
    if r.no_eq == 0 {
        vf.push(format!(
            "eq=contrast={}:brightness={}:saturation={}",
            r.eq_contrast.as_str(),
            r.eq_brightness.as_str(),
            r.eq_saturation.as_str()
        ));
        if !r.lut3d_file.as_str().is_empty() {
            vf.push(format!("lut3d=file='{}'", r.lut3d_file.as_str()));
        }
    }

    // Second filter set
    if r.use_deblock_2 != 0 && r.no_deblock == 0 {
        vf.push(deblock_filter(r.deblock_mode_2.as_str(), r.deblock_thresh_2.as_str()));
    }
    if r.use_dering_2 != 0 && r.dering_active_2 != 0 {
        vf.push(dering_filter(r.dering_strength_2.as_str()));
    }
    if r.use_denoise_2 != 0 && r.no_denoise == 0 {
        vf.extend(denoise_filter(r.denoiser_2.as_str(), r.denoise_strength_2.as_str()));
    }
    if r.use_sharpen_2 != 0 && r.no_sharpen == 0 {
        vf.push(sharpen_filter(
            r.sharpen_method_2.as_str(),
            r.sharpen_strength_2.as_str(),
            r.usm_radius_2.as_str(),
            r.usm_amount_2.as_str(),
        ));
    }
    if r.use_deband_2 != 0 && r.no_deband == 0 {
        vf.push(deband_filter(
            r.deband_method_2.as_str(),
            r.deband_strength_2.as_str(),
            r.f3kdb_range_2.as_str(),
            r.f3kdb_y_2.as_str(),
            r.f3kdb_cbcr_2.as_str(),
        ));
    }

    if r.no_grain == 0 {
        let grain = if r.use_grain_2 != 0 {
            r.grain_strength_2.as_str()
        } else {
            r.grain_strength.as_str()
        };
        vf.push(format!("noise=alls={}:allf=t", grain));
    }

    if !image {
        vf.push(format!("format={}", pixel_format(r)));
        if r.use10 != 0 && r.pci_safe_mode == 0 {
            vf.push("limiter=min=64:max=940:planes=15".into());
        } else {
            vf.push("limiter=min=16:max=235:planes=15".into());
        }
        vf.push("setsar=1".into());
    }

    vf.join(",")
}

fn video_encoder(r: &ParameterRecord) -> &'static str {
    let hevc = r.codec.as_str() == "hevc";
    match (hevc, r.encoder.as_str()) {
        (true, "nvenc") => "hevc_nvenc",
        (true, "qsv") => "hevc_qsv",
        (true, "vaapi") => "hevc_vaapi",
        (true, _) => "libx265",
        (false, "nvenc") => "h264_nvenc",
        (false, "qsv") => "h264_qsv",
        (false, "vaapi") => "h264_vaapi",
        (false, _) => "libx264",
    }
}

/// x265 wants `:` between parameters; commas inside a value (`deblock=-2,-2`) stay
pub fn x265_params_for_cli(params: &str) -> String {
    let fragments: Vec<&str> = params.split(',').collect();
    let mut out = String::with_capacity(params.len());
    for (i, fragment) in fragments.iter().enumerate() {
        if i > 0 {
            let next_is_param = fragment
                .split(':')
                .next()
                .is_some_and(|head| head.contains('='));
            out.push(if next_is_param { ':' } else { ',' });
        }
        out.push_str(fragment);
    }
    out
}

/// Where the engine writes its result for `input`
pub fn output_path_for(input: &Path, record: &ParameterRecord) -> PathBuf {
    let outdir = record.outdir.as_str();
    let dir = if outdir.is_empty() {
        input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        PathBuf::from(outdir)
    };
    dir.join(predicted_output_name(input))
}

/// Full ffmpeg invocation for one restoration job
pub fn build_ffmpeg_cmd(ffmpeg: &str, input: &Path, r: &ParameterRecord) -> Command {
    let image = is_image_file(input);
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-loglevel", "error", "-stats", "-y"]);

    let hwaccel = r.hwaccel.as_str();
    if !hwaccel.is_empty() && hwaccel != "none" {
        cmd.arg("-hwaccel").arg(hwaccel);
    }

    cmd.arg("-i").arg(input);
    cmd.arg("-vf").arg(build_restore_filter(r, image));
    cmd.args(["-map", "0:v:0", "-map", "0:a?"]);

    if image {
        cmd.args(["-frames:v", "1"]);
    } else {
        let encoder = video_encoder(r);
        cmd.arg("-c:v").arg(encoder);
        if encoder.contains("hevc") || encoder.contains("265") {
            cmd.args(["-tag:v", "hvc1"]);
        }
        cmd.arg("-pix_fmt").arg(pixel_format(r));

        let threads = r.threads.as_str();
        if !threads.is_empty() {
            cmd.arg("-threads").arg(threads);
        }
        if !encoder.contains("vaapi") {
            cmd.arg("-preset").arg(r.preset.as_str());
            cmd.arg("-crf").arg(r.crf.as_str());
        }
        let x265 = r.x265_params.as_str();
        if encoder == "libx265" && !x265.is_empty() {
            cmd.arg("-x265-params").arg(x265_params_for_cli(x265));
        }

        cmd.args(["-c:a", "aac"]);
        cmd.arg("-b:a").arg(r.audio_bitrate.as_str());
        let movflags = r.movflags.as_str();
        if !movflags.is_empty() {
            cmd.arg("-movflags").arg(movflags);
        }
    }

    cmd.arg(output_path_for(input, r));
    cmd
}

/// Format a command as a shell-safe string for display
pub fn format_ffmpeg_cmd(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|arg| {
            let s = arg.to_string_lossy();
            shlex::try_quote(&s)
                .map(|q| q.into_owned())
                .unwrap_or_else(|_| format!("\"{}\"", s))
        })
        .collect::<Vec<_>>()
        .join(" ")
}
