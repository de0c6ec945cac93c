//! Recency weighting
//!
//! Age buckets used to discount older memories during reranking. The table
//! is monotonically non-increasing: an item never gains weight by aging.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// `(exclusive upper bound in days, weight)`, checked in order
const AGE_BUCKETS: [(f64, f32); 4] = [(7.0, 1.0), (30.0, 0.9), (90.0, 0.7), (365.0, 0.5)];

/// Weight for anything at least a year old
const OLDEST_WEIGHT: f32 = 0.3;

/// Age of `timestamp` relative to `now`, in fractional days.
///
/// Timestamps in the future count as age zero.
pub fn age_in_days(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - timestamp).num_milliseconds().max(0);
    millis as f64 / 86_400_000.0
}

/// Recency multiplier for an item of the given age
pub fn time_weight(age_days: f64) -> f32 {
    AGE_BUCKETS
        .iter()
        .find(|(limit, _)| age_days < *limit)
        .map(|(_, weight)| *weight)
        .unwrap_or(OLDEST_WEIGHT)
}

/// Recency multiplier for an optional timestamp; unknown age is not penalized.
pub fn weight_at(timestamp: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f32 {
    timestamp
        .map(|ts| time_weight(age_in_days(ts, now)))
        .unwrap_or(1.0)
}

/// Parse the timestamp formats found in journals, transcripts and CLI input.
///
/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM:SS[.f]` (read as UTC) and bare
/// dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(time_weight(0.0), 1.0);
        assert_eq!(time_weight(6.99), 1.0);
        assert_eq!(time_weight(7.0), 0.9);
        assert_eq!(time_weight(29.9), 0.9);
        assert_eq!(time_weight(30.0), 0.7);
        assert_eq!(time_weight(89.0), 0.7);
        assert_eq!(time_weight(90.0), 0.5);
        assert_eq!(time_weight(200.0), 0.5);
        assert_eq!(time_weight(365.0), 0.3);
        assert_eq!(time_weight(5000.0), 0.3);
    }

    #[test]
    fn test_weight_is_non_increasing() {
        let mut previous = f32::MAX;
        for day in 0..800 {
            let weight = time_weight(day as f64);
            assert!(weight <= previous, "weight rose at day {}", day);
            previous = weight;
        }
    }

    #[test]
    fn test_future_timestamp_is_age_zero() {
        let now = Utc::now();
        assert_eq!(age_in_days(now + Duration::days(3), now), 0.0);
    }

    #[test]
    fn test_age_in_days() {
        let now = Utc::now();
        let age = age_in_days(now - Duration::hours(36), now);
        assert!((age - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_missing_timestamp_is_neutral() {
        assert_eq!(weight_at(None, Utc::now()), 1.0);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let rfc = parse_timestamp("2026-10-01T08:30:00Z").unwrap();
        let offset = parse_timestamp("2026-10-01T10:30:00+02:00").unwrap();
        assert_eq!(rfc, offset);

        let naive = parse_timestamp("2026-10-01T08:30:00").unwrap();
        assert_eq!(naive, rfc);

        let date = parse_timestamp("2026-10-01").unwrap();
        assert_eq!(date.to_rfc3339(), "2026-10-01T00:00:00+00:00");

        assert!(parse_timestamp("yesterday").is_none());
    }
}
