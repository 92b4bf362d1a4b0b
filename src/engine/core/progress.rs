// Stateless parser for ffmpeg-style status lines

/// Fields extracted from one output line; everything is `None` for lines
/// that carry neither a duration nor a progress report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub new_duration: Option<f64>,
    pub frame: Option<u64>,
    pub fps: Option<String>,
    pub time_string: Option<String>,
    pub elapsed_seconds: Option<f64>,
    pub speed: Option<f64>,
    pub progress: Option<f64>,
    pub eta: Option<String>,
}

impl ProgressUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub const ETA_UNKNOWN: &str = "--:--";

fn is_token_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '-' | '.' | ':')
}

/// Value token following `key` (e.g. `time=`), with leading spaces skipped.
///
/// `key` only matches at the start of a word, so `time=` does not match
/// inside `out_time=`.
fn field_token<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let mut search = 0;
    while let Some(pos) = line[search..].find(key) {
        let start = search + pos;
        let at_word_start = line[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !(c.is_alphanumeric() || c == '_'));
        if at_word_start {
            let rest = line[start + key.len()..].trim_start_matches(' ');
            let end = rest.find(|c| !is_token_char(c)).unwrap_or(rest.len());
            return Some(&rest[..end]);
        }
        search = start + key.len();
    }
    None
}

/// Parse `SS.cc`, `M:SS.cc`, or `H:MM:SS.cc` (hours unbounded) into seconds.
///
/// A leading `-` negates the whole value.
pub fn parse_time(text: &str) -> Option<f64> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if body.is_empty() {
        return None;
    }

    let mut parts = Vec::with_capacity(3);
    for part in body.split(':') {
        if part.is_empty() || part.starts_with('-') {
            return None;
        }
        parts.push(part.parse::<f64>().ok().filter(|v| v.is_finite())?);
    }

    let seconds = match parts.as_slice() {
        [s] => *s,
        [m, s] => m * 60.0 + s,
        [h, m, s] => h * 3600.0 + m * 60.0 + s,
        _ => return None,
    };
    Some(if negative { -seconds } else { seconds })
}

/// `M:SS` under an hour, `H:MM:SS` otherwise; fractional seconds truncate.
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() {
        return ETA_UNKNOWN.to_string();
    }
    let truncated = seconds.trunc();
    if truncated < 0.0 {
        return format!("-{}", format_time(-truncated));
    }
    let total = truncated as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// Parse one line against the currently known media duration
pub fn parse(line: &str, current_duration: f64) -> ProgressUpdate {
    parse_with_clock(line, current_duration, None)
}

/// Like [`parse`], with the wall-clock seconds since launch as a rate source.
///
/// ETA rate priority: wall clock, then the line's `speed=`, then real time
/// when the encoder reports a positive fps.
pub fn parse_with_clock(line: &str, current_duration: f64, wall_elapsed: Option<f64>) -> ProgressUpdate {
    let mut update = ProgressUpdate {
        new_duration: field_token(line, "Duration:").and_then(parse_time),
        ..Default::default()
    };

    let (Some(frame), Some(fps), Some(time)) = (
        field_token(line, "frame="),
        field_token(line, "fps="),
        field_token(line, "time="),
    ) else {
        return update;
    };
    let Some(elapsed) = parse_time(time) else {
        // time=N/A and friends
        return update;
    };
    if fps.is_empty() {
        return update;
    }

    update.frame = frame.parse().ok();
    update.fps = Some(fps.to_string());
    update.time_string = Some(time.to_string());
    update.elapsed_seconds = Some(elapsed);
    update.speed = field_token(line, "speed=")
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s > 0.0);

    let duration = if current_duration > 0.0 {
        current_duration
    } else {
        update.new_duration.unwrap_or(0.0)
    };
    if duration <= 0.0 {
        update.eta = Some(ETA_UNKNOWN.to_string());
        return update;
    }

    update.progress = Some((elapsed / duration).clamp(0.0, 1.0));
    let remaining = duration - elapsed;
    if remaining <= 0.0 {
        update.progress = Some(1.0);
        update.eta = Some(format_time(0.0));
        return update;
    }

    let wall_rate = wall_elapsed
        .filter(|w| w.is_finite() && *w > 0.0 && elapsed > 0.0)
        .map(|w| w / elapsed);
    let realtime = fps.parse::<f64>().is_ok_and(|f| f > 0.0).then_some(1.0);
    let rate = wall_rate.or(update.speed.map(|s| 1.0 / s)).or(realtime);

    update.eta = Some(match rate {
        Some(rate) => format_time(remaining * rate),
        None => ETA_UNKNOWN.to_string(),
    });
    update
}
