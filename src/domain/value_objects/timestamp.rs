//! # Timestamp Value Object
//!
//! UTC instant used for message ordering, deadlines and strategy staleness.
//!
//! # Examples
//!
//! ```
//! use dealdesk::domain::value_objects::timestamp::Timestamp;
//!
//! let now = Timestamp::now();
//! let deadline = now.add_secs(3600);
//!
//! assert!(deadline.is_after(&now));
//! assert!(!deadline.has_passed());
//! ```

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Sub;

/// A UTC timestamp.
///
/// Serialises as RFC 3339 so rows stored through the data store stay
/// readable by the hosted backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from Unix milliseconds.
    ///
    /// Returns `None` if the value is out of range.
    ///
    /// # Examples
    ///
    /// ```
    /// use dealdesk::domain::value_objects::timestamp::Timestamp;
    ///
    /// let ts = Timestamp::from_millis(1704067200000).unwrap();
    /// assert_eq!(ts.timestamp_millis(), 1704067200000);
    /// ```
    #[must_use]
    pub fn from_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    /// Creates a timestamp from Unix seconds.
    #[must_use]
    pub fn from_secs(secs: i64) -> Option<Self> {
        Utc.timestamp_opt(secs, 0).single().map(Self)
    }

    /// Parses an RFC 3339 string.
    ///
    /// # Examples
    ///
    /// ```
    /// use dealdesk::domain::value_objects::timestamp::Timestamp;
    ///
    /// let ts = Timestamp::parse_rfc3339("2024-01-01T00:00:00Z").unwrap();
    /// assert_eq!(ts.timestamp_secs(), 1704067200);
    /// assert!(Timestamp::parse_rfc3339("yesterday").is_none());
    /// ```
    #[must_use]
    pub fn parse_rfc3339(s: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Returns the Unix timestamp in milliseconds.
    #[inline]
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Returns the Unix timestamp in seconds.
    #[inline]
    #[must_use]
    pub fn timestamp_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Adds seconds (may be negative).
    #[must_use]
    pub fn add_secs(&self, secs: i64) -> Self {
        Self(self.0 + Duration::seconds(secs))
    }

    /// Subtracts seconds.
    #[must_use]
    pub fn sub_secs(&self, secs: i64) -> Self {
        Self(self.0 - Duration::seconds(secs))
    }

    /// Adds milliseconds (may be negative).
    #[must_use]
    pub fn add_millis(&self, millis: i64) -> Self {
        Self(self.0 + Duration::milliseconds(millis))
    }

    /// Returns true if this instant is strictly in the past.
    #[must_use]
    pub fn has_passed(&self) -> bool {
        self.has_passed_at(Timestamp::now())
    }

    /// Returns true if this instant lies at or before `now`.
    ///
    /// A deadline equal to the observation time counts as passed.
    #[inline]
    #[must_use]
    pub fn has_passed_at(&self, now: Timestamp) -> bool {
        self.0 <= now.0
    }

    /// Returns true if this timestamp is before another.
    #[inline]
    #[must_use]
    pub fn is_before(&self, other: &Self) -> bool {
        self.0 < other.0
    }

    /// Returns true if this timestamp is after another.
    #[inline]
    #[must_use]
    pub fn is_after(&self, other: &Self) -> bool {
        self.0 > other.0
    }

    /// Time elapsed from this timestamp until `now`, zero if `now` is earlier.
    #[must_use]
    pub fn elapsed_until(&self, now: Timestamp) -> std::time::Duration {
        now - *self
    }

    /// Formats the timestamp as RFC 3339.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Returns the underlying `DateTime`.
    #[inline]
    #[must_use]
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = std::time::Duration;

    fn sub(self, rhs: Timestamp) -> Self::Output {
        (self.0 - rhs.0)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn deadline_equal_to_now_has_passed() {
        let ts = Timestamp::from_secs(1_000).unwrap();
        assert!(ts.has_passed_at(ts));
        assert!(!ts.add_secs(1).has_passed_at(ts));
    }

    #[test]
    fn past_and_future() {
        assert!(Timestamp::from_secs(0).unwrap().has_passed());
        assert!(!Timestamp::now().add_secs(3600).has_passed());
    }

    #[test]
    fn elapsed_saturates_at_zero() {
        let earlier = Timestamp::from_secs(100).unwrap();
        let later = earlier.add_secs(30);
        assert_eq!(
            earlier.elapsed_until(later),
            std::time::Duration::from_secs(30)
        );
        assert_eq!(later.elapsed_until(earlier), std::time::Duration::ZERO);
    }

    #[test]
    fn rfc3339_roundtrip() {
        let ts = Timestamp::from_millis(1_704_067_200_123).unwrap();
        let parsed = Timestamp::parse_rfc3339(&ts.to_rfc3339()).unwrap();
        assert_eq!(ts, parsed);
    }

    #[test]
    fn ordering_follows_time() {
        let a = Timestamp::from_secs(10).unwrap();
        let b = a.add_millis(1);
        assert!(a < b);
        assert!(a.is_before(&b));
        assert!(b.is_after(&a));
    }
}
