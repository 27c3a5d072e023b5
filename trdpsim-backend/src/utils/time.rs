//! UTC timestamp formatting.

use chrono::{DateTime, Utc};

/// `2024-05-01T12:30:00Z`
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// `20240501T123000Z`, used in run directory names
pub fn compact_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Current time as an ISO timestamp
pub fn now_iso() -> String {
    iso_timestamp(Utc::now())
}

/// `2024-05-01 12:30:00`, prefix of session telemetry lines
pub fn telemetry_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_formats() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(iso_timestamp(at), "2024-05-01T12:30:00Z");
        assert_eq!(compact_timestamp(at), "20240501T123000Z");
    }
}
