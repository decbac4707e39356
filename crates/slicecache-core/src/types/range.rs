use crate::types::Date;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

///
/// RangeError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum RangeError {
    #[error("date range start {start} is after end {end}")]
    Inverted { start: Date, end: Date },
}

///
/// DateRange
///
/// Inclusive, non-empty span of whole days.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange", into = "RawDateRange")]
pub struct DateRange {
    start: Date,
    end: Date,
}

impl DateRange {
    pub const fn new(start: Date, end: Date) -> Result<Self, RangeError> {
        if start.days() > end.days() {
            return Err(RangeError::Inverted { start, end });
        }

        Ok(Self { start, end })
    }

    #[must_use]
    pub const fn single(day: Date) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    #[must_use]
    pub const fn start(&self) -> Date {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> Date {
        self.end
    }

    /// Number of days in the range (always at least 1).
    #[must_use]
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn len_days(&self) -> u32 {
        (self.start.days_until(self.end) + 1) as u32
    }

    #[must_use]
    pub fn contains(&self, day: Date) -> bool {
        self.start <= day && day <= self.end
    }

    #[must_use]
    pub fn contains_range(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);

        Self::new(start, end).ok()
    }

    /// Iterate every day in the range in ascending order.
    pub fn days(&self) -> impl Iterator<Item = Date> + use<> {
        (self.start.days()..=self.end.days()).map(Date::from_days)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

#[derive(Deserialize, Serialize)]
struct RawDateRange {
    start: Date,
    end: Date,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = RangeError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl From<DateRange> for RawDateRange {
    fn from(range: DateRange) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: i32) -> Date {
        Date::from_days(day)
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert_eq!(
            DateRange::new(d(5), d(4)),
            Err(RangeError::Inverted {
                start: d(5),
                end: d(4)
            })
        );
    }

    #[test]
    fn length_and_iteration_are_inclusive() {
        let range = DateRange::new(d(1), d(7)).unwrap();
        assert_eq!(range.len_days(), 7);
        assert_eq!(range.days().count(), 7);
        assert_eq!(DateRange::single(d(3)).len_days(), 1);
    }

    #[test]
    fn intersect_returns_overlap_or_none() {
        let a = DateRange::new(d(1), d(7)).unwrap();
        let b = DateRange::new(d(5), d(10)).unwrap();
        let c = DateRange::new(d(8), d(9)).unwrap();

        assert_eq!(a.intersect(&b), Some(DateRange::new(d(5), d(7)).unwrap()));
        assert_eq!(a.intersect(&c), None);
        assert!(b.contains_range(&c));
        assert!(!a.contains_range(&b));
    }

    #[test]
    fn deserialize_rejects_inverted_range() {
        let json = r#"{"start":"2025-01-07","end":"2025-01-01"}"#;
        assert!(serde_json::from_str::<DateRange>(json).is_err());
    }
}
