use std::time::Duration;

use crate::error::{PingwatchError, Result};

/// Suffix to milliseconds multiplier (order matters: longer suffixes first)
const UNITS: &[(&str, f64)] = &[
    ("ms", 1.0),
    ("s", 1_000.0),
    ("m", 60_000.0),
    ("h", 3_600_000.0),
];

/// Parse duration strings like "10m", "10s", "500ms", "1.5h"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    for (suffix, multiplier) in UNITS {
        if let Some(val_str) = s.strip_suffix(suffix) {
            let val: f64 = val_str
                .trim()
                .parse()
                .map_err(|_| PingwatchError::InvalidDuration(s.to_string()))?;
            if !val.is_finite() || val < 0.0 {
                return Err(PingwatchError::InvalidDuration(s.to_string()));
            }
            return Ok(Duration::from_millis((val * multiplier) as u64));
        }
    }

    Err(PingwatchError::InvalidDuration(s.to_string()))
}
