//! Wall-clock timestamps used throughout the protocol exchange.
//!
//! The wire format and the delay/offset formulas in spec.md §4.3 work in
//! fractional seconds since the Unix epoch, so [`Timestamp`] is a thin
//! newtype over `f64` rather than the nanosecond-resolution split-field
//! format a real PTP header would use. Arithmetic stays in `f64` seconds
//! end to end: the simulator's own scheduling noise is already on the
//! order of microseconds, so there is nothing to gain from a wider
//! internal representation.

use std::time::{SystemTime, UNIX_EPOCH};

/// A point in wall-clock time, in fractional seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Timestamp(f64);

impl Timestamp {
    /// Zero timestamp (epoch).
    pub const ZERO: Self = Self(0.0);

    /// Capture the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let d = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(d.as_secs_f64())
    }

    /// Wrap a raw seconds-since-epoch value (as parsed off the wire).
    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(secs)
    }

    /// The raw seconds-since-epoch value, as written to the wire.
    #[must_use]
    pub fn as_secs_f64(self) -> f64 {
        self.0
    }

    /// `self - other`, in seconds. Positive means `self` is later.
    #[must_use]
    pub fn diff_secs(self, other: Self) -> f64 {
        self.0 - other.0
    }

    /// `self + drift`, both in seconds.
    #[must_use]
    pub fn plus_secs(self, drift: f64) -> Self {
        Self(self.0 + drift)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_secs_is_later_minus_earlier() {
        let a = Timestamp::from_secs_f64(10.0);
        let b = Timestamp::from_secs_f64(12.5);
        assert!((b.diff_secs(a) - 2.5).abs() < f64::EPSILON);
        assert!((a.diff_secs(b) + 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn plus_secs_applies_drift() {
        let t = Timestamp::from_secs_f64(100.0);
        let drifted = t.plus_secs(-0.5);
        assert!((drifted.as_secs_f64() - 99.5).abs() < f64::EPSILON);
    }

    #[test]
    fn now_is_strictly_increasing_on_reads() {
        let a = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let b = Timestamp::now();
        assert!(b.as_secs_f64() >= a.as_secs_f64());
    }
}
