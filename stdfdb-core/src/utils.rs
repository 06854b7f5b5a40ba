//! # Common Utilities

use chrono::{TimeZone, Utc};

/// Format bytes in human readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exp = (bytes_f64.log2() / 10.0).floor() as usize;
    let unit_index = exp.min(UNITS.len() - 1);
    let size = bytes_f64 / (1024_f64).powi(unit_index as i32);

    if size >= 100.0 {
        format!("{:.0} {}", size, UNITS[unit_index])
    } else if size >= 10.0 {
        format!("{:.1} {}", size, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// SI prefix implied by a RES_SCAL / LLM_SCAL / HLM_SCAL exponent
pub fn unit_prefix(scale: i8) -> &'static str {
    match scale {
        15 => "f",
        12 => "p",
        9 => "n",
        6 => "u",
        3 => "m",
        2 => "%",
        -3 => "K",
        -6 => "M",
        -9 => "G",
        -12 => "T",
        _ => "",
    }
}

/// Unit string with the scale prefix applied, e.g. `("V", 3)` -> `"mV"`
pub fn scaled_unit(unit: &str, scale: i8) -> String {
    format!("{}{}", unit_prefix(scale), unit)
}

/// Multiplier for a scale exponent
pub fn scale_factor(scale: i8) -> f64 {
    10f64.powi(scale as i32)
}

/// Render an STDF U4 timestamp (seconds since the Unix epoch) in UTC
pub fn format_timestamp(seconds: u32) -> String {
    match Utc.timestamp_opt(seconds as i64, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => seconds.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_prefix() {
        assert_eq!(scaled_unit("V", 3), "mV");
        assert_eq!(scaled_unit("A", 6), "uA");
        assert_eq!(scaled_unit("Hz", -6), "MHz");
        assert_eq!(scaled_unit("V", 0), "V");
        assert_eq!(scaled_unit("V", 1), "V");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00");
        assert_eq!(format_timestamp(1_000_000_000), "2001-09-09 01:46:40");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
    }
}
