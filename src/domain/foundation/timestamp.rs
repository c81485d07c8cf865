//! Timestamp value object for immutable points in time.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Immutable point in time, always UTC.
///
/// Serializes as an RFC 3339 string, which is how every instant inside the
/// stored `premium` record is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Converts Stripe epoch seconds into a timestamp.
    ///
    /// Stripe omits period bounds on some objects and sends `0` on others, so
    /// missing, non-positive and out-of-range values all become `None`.
    pub fn from_unix(secs: Option<i64>) -> Option<Self> {
        match secs {
            Some(secs) if secs > 0 => Utc.timestamp_opt(secs, 0).single().map(Self),
            _ => None,
        }
    }

    /// Parses an RFC 3339 string, returning `None` for anything malformed.
    pub fn parse_rfc3339(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(value)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the timestamp as Unix seconds.
    pub fn as_unix(&self) -> i64 {
        self.0.timestamp()
    }

    /// Formats the timestamp as RFC 3339.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Checks if this timestamp is after another.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Creates a new timestamp by adding the specified number of days.
    ///
    /// Negative values subtract days.
    pub fn add_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    /// Creates a new timestamp by subtracting the specified number of days.
    pub fn minus_days(&self, days: i64) -> Self {
        Self(self.0 - Duration::days(days))
    }

    /// Creates a new timestamp by adding the specified number of seconds.
    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0 + Duration::seconds(secs))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn timestamp_now_creates_current_time() {
        let before = Utc::now();
        let ts = Timestamp::now();
        let after = Utc::now();

        assert!(ts.as_datetime() >= &before);
        assert!(ts.as_datetime() <= &after);
    }

    #[test]
    fn from_unix_converts_epoch_seconds() {
        // 2024-01-15T00:00:00Z
        let ts = Timestamp::from_unix(Some(1705276800)).unwrap();
        assert_eq!(ts.as_datetime().year(), 2024);
        assert_eq!(ts.as_datetime().month(), 1);
        assert_eq!(ts.as_datetime().day(), 15);
        assert_eq!(ts.as_unix(), 1705276800);
    }

    #[test]
    fn from_unix_clamps_missing_and_invalid_values() {
        assert!(Timestamp::from_unix(None).is_none());
        assert!(Timestamp::from_unix(Some(0)).is_none());
        assert!(Timestamp::from_unix(Some(-5)).is_none());
        assert!(Timestamp::from_unix(Some(i64::MAX)).is_none());
    }

    #[test]
    fn timestamp_serializes_as_rfc3339() {
        let ts = Timestamp::from_unix(Some(1705276800)).unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2024-01-15T00:00:00Z\"");
    }

    #[test]
    fn timestamp_deserializes_from_json() {
        let json = "\"2024-01-15T10:30:00Z\"";
        let ts: Timestamp = serde_json::from_str(json).unwrap();

        assert_eq!(ts.as_datetime().year(), 2024);
    }

    #[test]
    fn parse_rfc3339_rejects_garbage() {
        assert!(Timestamp::parse_rfc3339("2024-01-15T10:30:00+09:00").is_some());
        assert!(Timestamp::parse_rfc3339("yesterday").is_none());
    }

    #[test]
    fn ordering_helpers_agree() {
        let earlier = Timestamp::from_unix(Some(1000)).unwrap();
        let later = earlier.plus_secs(60);

        assert!(earlier.is_before(&later));
        assert!(later.is_after(&earlier));
        assert!(earlier < later);
        assert_eq!(later.as_unix(), 1060);
        assert_eq!(earlier.add_days(1).minus_days(1), earlier);
    }
}
