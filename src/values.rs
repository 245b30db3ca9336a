//! Scalar coercions used while resolving migration rows.

use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

/// Day-first and ISO formats tried before the generic fallback, in order.
const PRIMARY_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const FALLBACK_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const FALLBACK_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];

/// Parses a date-time, reading zone-less input as UTC.
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Empty date value"));
    }
    for fmt in PRIMARY_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(parsed.and_utc());
        }
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for fmt in FALLBACK_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(parsed.and_utc());
        }
    }
    for fmt in FALLBACK_DATE_FORMATS {
        let midnight = NaiveDate::parse_from_str(trimmed, fmt)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0));
        if let Some(parsed) = midnight {
            return Ok(parsed.and_utc());
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Numeric form of a legacy id (`"007"` and `"7.0"` both give `"7"`), or
/// `None` when the value is not a whole number.
pub fn legacy_numeric_key(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = trimmed.parse::<i128>() {
        return Some(parsed.to_string());
    }
    match trimmed.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed.fract() == 0.0 && parsed.abs() < 1e18 => {
            Some((parsed as i128).to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_datetime_accepts_iso_day_first_and_rfc3339() {
        let expected = Utc.with_ymd_and_hms(2025, 4, 29, 10, 30, 0).unwrap();
        assert_eq!(parse_datetime("2025-04-29 10:30:00").unwrap(), expected);
        assert_eq!(parse_datetime("29/04/2025 10:30:00").unwrap(), expected);
        assert_eq!(parse_datetime("2025-04-29T10:30:00Z").unwrap(), expected);
        assert_eq!(parse_datetime(" 2025-04-29 10:30 ").unwrap(), expected);
        assert_eq!(parse_datetime("29/04/2025 10:30").unwrap(), expected);
    }

    #[test]
    fn parse_datetime_converts_offsets_to_utc() {
        let expected = Utc.with_ymd_and_hms(2025, 4, 29, 8, 30, 0).unwrap();
        assert_eq!(parse_datetime("2025-04-29T10:30:00+02:00").unwrap(), expected);
    }

    #[test]
    fn parse_datetime_falls_back_to_date_only() {
        let expected = Utc.with_ymd_and_hms(2025, 4, 29, 0, 0, 0).unwrap();
        assert_eq!(parse_datetime("2025-04-29").unwrap(), expected);
    }

    #[test]
    fn parse_datetime_rejects_out_of_range_values() {
        assert!(parse_datetime("32/13/2025 99:99").is_err());
        assert!(parse_datetime("tomorrow").is_err());
        assert!(parse_datetime("").is_err());
    }

    #[test]
    fn format_datetime_uses_utc_suffix() {
        let value = Utc.with_ymd_and_hms(2025, 4, 29, 10, 30, 0).unwrap();
        assert_eq!(format_datetime(&value), "2025-04-29T10:30:00Z");
    }

    #[test]
    fn legacy_numeric_key_strips_padding() {
        assert_eq!(legacy_numeric_key("007").as_deref(), Some("7"));
        assert_eq!(legacy_numeric_key(" 7 ").as_deref(), Some("7"));
        assert_eq!(legacy_numeric_key("7.0").as_deref(), Some("7"));
        assert_eq!(legacy_numeric_key("7.5"), None);
        assert_eq!(legacy_numeric_key("A7"), None);
    }
}
