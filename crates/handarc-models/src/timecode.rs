//! Timecode parsing and formatting helpers.
//!
//! The archive displays hand timestamps as `HH:MM:SS` strings and ranges as
//! `HH:MM:SS ~ HH:MM:SS`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TimecodeError {
    #[error("invalid timecode format: {0}")]
    InvalidFormat(String),
}

/// Parse a `HH:MM:SS`, `MM:SS` or plain-seconds string into seconds.
pub fn parse_timecode(s: &str) -> Result<u64, TimecodeError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(TimecodeError::InvalidFormat(s.to_string()));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() > 3 {
        return Err(TimecodeError::InvalidFormat(s.to_string()));
    }

    let mut seconds: u64 = 0;
    for part in &parts {
        let value: u64 = part
            .parse()
            .map_err(|_| TimecodeError::InvalidFormat(s.to_string()))?;
        seconds = seconds * 60 + value;
    }

    Ok(seconds)
}

/// Format seconds as `HH:MM:SS`.
pub fn format_timecode(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

/// Format a start/end pair as a display range, falling back to the start
/// alone when no end is known.
pub fn format_timecode_range(start: u64, end: Option<u64>) -> String {
    match end {
        Some(end) => format!("{} ~ {}", format_timecode(start), format_timecode(end)),
        None => format_timecode(start),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_timecode() {
        assert_eq!(parse_timecode("01:23:45").unwrap(), 5025);
        assert_eq!(parse_timecode("1:23:45").unwrap(), 5025);
    }

    #[test]
    fn test_parse_minutes_seconds() {
        assert_eq!(parse_timecode("23:45").unwrap(), 1425);
    }

    #[test]
    fn test_parse_plain_seconds() {
        assert_eq!(parse_timecode("90").unwrap(), 90);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timecode("").is_err());
        assert!(parse_timecode("1:2:3:4").is_err());
        assert!(parse_timecode("ab:cd").is_err());
    }

    #[test]
    fn test_format_roundtrip() {
        assert_eq!(format_timecode(5025), "01:23:45");
        assert_eq!(parse_timecode(&format_timecode(86399)).unwrap(), 86399);
    }

    #[test]
    fn test_format_range() {
        assert_eq!(format_timecode_range(60, Some(180)), "00:01:00 ~ 00:03:00");
        assert_eq!(format_timecode_range(60, None), "00:01:00");
    }
}
