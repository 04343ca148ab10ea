//! Stderr progress-line parsing (§4.5 "Progress parsing"). Kept separate
//! from the driver so the regex and unit conversion are testable against
//! recorded downloader output without spawning anything.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::Stage;

fn progress_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\[download\]\s+([\d.]+)% of ~?([\d.]+)(B|KiB|MiB|GiB)(?:\s+at\s+([\d.]+(?:B|KiB|MiB|GiB))/s)?",
        )
        .expect("progress regex is a fixed valid pattern")
    })
}

fn unit_multiplier(unit: &str) -> f64 {
    match unit {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub percent: f32,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub speed: String,
}

/// A line's classification: a download-progress sample, a marker that the
/// subprocess has moved into transcoding, or neither (ignored).
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    Progress(ProgressUpdate),
    StageChange(Stage),
}

const ENCODING_MARKERS: [&str; 3] = ["[ffmpeg]", "[ExtractAudio]", "[VideoConvertor]"];

pub fn classify_line(line: &str) -> Option<LineEvent> {
    let trimmed = line.trim();
    if ENCODING_MARKERS.iter().any(|marker| trimmed.starts_with(marker)) {
        return Some(LineEvent::StageChange(Stage::Encoding));
    }

    let captures = progress_regex().captures(trimmed)?;
    let percent: f32 = captures.get(1)?.as_str().parse().ok()?;
    let total_value: f64 = captures.get(2)?.as_str().parse().ok()?;
    let total_unit = captures.get(3)?.as_str();
    let total_bytes = (total_value * unit_multiplier(total_unit)) as u64;
    let downloaded_bytes = ((percent as f64 / 100.0) * total_bytes as f64) as u64;
    let speed = captures
        .get(4)
        .map(|m| format!("{}/s", m.as_str()))
        .unwrap_or_default();

    Some(LineEvent::Progress(ProgressUpdate {
        percent,
        downloaded_bytes,
        total_bytes,
        speed,
    }))
}

/// `HTTP Error 429` anywhere in a line of subprocess output marks rate
/// limiting (§4.5 error translation).
pub fn is_rate_limited(line: &str) -> bool {
    line.contains("HTTP Error 429")
}
