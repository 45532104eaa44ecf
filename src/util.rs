/// Utility helpers shared by the engine, the presenter and the host.
///
/// This module contains:
/// - Time helpers (epoch milliseconds, upstream timestamp rendering)
/// - The asset-list file reader
///
/// IMPORTANT:
/// - No source-specific logic should live here.
/// - This module must remain lightweight and deterministic.
use std::fs;
use std::path::Path;

use chrono::DateTime;

/// Returns the current Unix timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Renders an upstream Unix-seconds timestamp as `YYYY-MM-DD HH:MM:SS` (UTC).
///
/// Upstream values are text; anything that is not an integer number of
/// seconds is returned unchanged rather than rejected.
pub fn timestamp_to_string(raw: &str) -> String {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Compact, filename-safe form of an upstream timestamp: `YYYYMMDDTHHMMSS`.
pub fn timestamp_to_file_stamp(raw: &str) -> String {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y%m%dT%H%M%S").to_string())
        .unwrap_or_else(|| {
            raw.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect()
        })
}

/// Reads one asset symbol per line.
///
/// Blank lines are skipped; surrounding whitespace is trimmed.
pub fn read_asset_lines(path: impl AsRef<Path>) -> std::io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
