use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimecodeError {
    #[error("Malformed timestamp '{0}' (expected seconds or M:SS)")]
    Malformed(String),
    #[error("Negative timestamp: {0}")]
    Negative(f64),
}

// Minutes unbounded, seconds one or two digits: "1:30", "12:05", "0:7"
static MMSS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(\d+):(\d{1,2})\s*$").unwrap());

/// Convert "M:SS" into whole seconds: `"1:30"` → 90.
pub fn mins_to_secs(time_str: &str) -> Result<u64, TimecodeError> {
    let caps = MMSS_RE
        .captures(time_str)
        .ok_or_else(|| TimecodeError::Malformed(time_str.to_string()))?;
    let mins: u64 = caps[1]
        .parse()
        .map_err(|_| TimecodeError::Malformed(time_str.to_string()))?;
    let secs: u64 = caps[2]
        .parse()
        .map_err(|_| TimecodeError::Malformed(time_str.to_string()))?;
    mins.checked_mul(60)
        .and_then(|m| m.checked_add(secs))
        .ok_or_else(|| TimecodeError::Malformed(time_str.to_string()))
}

/// Convert whole seconds into "M:SS": 90 → `"1:30"`.
pub fn secs_to_mins(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// A time given on the command line or in a request: plain seconds or "M:SS".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeArg(pub f64);

impl TimeArg {
    pub fn seconds(self) -> f64 {
        self.0
    }
}

impl From<f64> for TimeArg {
    fn from(secs: f64) -> Self {
        TimeArg(secs)
    }
}

impl FromStr for TimeArg {
    type Err = TimecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let secs = if s.contains(':') {
            mins_to_secs(s)? as f64
        } else {
            s.trim()
                .parse::<f64>()
                .map_err(|_| TimecodeError::Malformed(s.to_string()))?
        };
        if !secs.is_finite() {
            return Err(TimecodeError::Malformed(s.to_string()));
        }
        if secs < 0.0 {
            return Err(TimecodeError::Negative(secs));
        }
        Ok(TimeArg(secs))
    }
}

impl fmt::Display for TimeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.fract() == 0.0 {
            write!(f, "{}", secs_to_mins(self.0 as u64))
        } else {
            write!(f, "{:.3}s", self.0)
        }
    }
}
