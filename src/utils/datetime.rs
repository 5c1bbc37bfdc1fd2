//! Conversions between in-memory timestamps and the Unix-seconds integers
//! stored in SQLite. All sync comparisons happen at second precision.

use chrono::{DateTime, Utc};

/// Converts an optional timestamp to Unix seconds.
pub fn to_unix(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp())
}

/// Converts Unix seconds back to a timestamp. Invalid values map to `None`.
pub fn from_unix(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

/// Truncates a timestamp to whole seconds.
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).expect("timestamp in valid range")
}

/// The current time, truncated to whole seconds.
pub fn now_seconds() -> DateTime<Utc> {
    truncate_to_seconds(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_round_trip_is_second_precise() {
        let ts = Utc::now();
        let back = from_unix(to_unix(Some(ts))).unwrap();
        assert_eq!(back.timestamp(), ts.timestamp());
        assert_eq!(back.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn none_maps_to_none() {
        assert_eq!(to_unix(None), None);
        assert_eq!(from_unix(None), None);
    }

    #[test]
    fn truncation_drops_subsecond_precision() {
        let ts = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        let truncated = truncate_to_seconds(ts);
        assert_eq!(truncated.timestamp(), 1_700_000_000);
        assert_eq!(truncated.timestamp_subsec_nanos(), 0);
    }
}
