use crate::types::{Date, DateRange, DayCount};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// SeriesError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SeriesError {
    #[error("duplicate date {0} in time series")]
    DuplicateDate(Date),

    #[error("time series dates not increasing: {prev} followed by {next}")]
    NotIncreasing { prev: Date, next: Date },
}

///
/// DailyPoint
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct DailyPoint {
    pub date: Date,
    #[serde(flatten)]
    pub counts: DayCount,
}

impl DailyPoint {
    #[must_use]
    pub const fn new(date: Date, n: u64, k: u64) -> Self {
        Self {
            date,
            counts: DayCount::new(n, k),
        }
    }
}

///
/// MergeReport
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MergeReport {
    /// Days newly added by the merge.
    pub added: usize,
    /// Days already present and left untouched.
    pub skipped: usize,
}

///
/// TimeSeries
///
/// Day-indexed `(date, n, k)` triples with strictly increasing dates.
///

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DailyPoint>", into = "Vec<DailyPoint>")]
pub struct TimeSeries {
    points: Vec<DailyPoint>,
}

impl TimeSeries {
    /// Validate strictly increasing dates.
    pub fn from_points(points: Vec<DailyPoint>) -> Result<Self, SeriesError> {
        for pair in points.windows(2) {
            let (prev, next) = (pair[0].date, pair[1].date);
            if prev == next {
                return Err(SeriesError::DuplicateDate(next));
            }
            if prev > next {
                return Err(SeriesError::NotIncreasing { prev, next });
            }
        }

        Ok(Self { points })
    }

    #[must_use]
    pub fn points(&self) -> &[DailyPoint] {
        &self.points
    }

    pub fn dates(&self) -> impl Iterator<Item = Date> + '_ {
        self.points.iter().map(|p| p.date)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn get(&self, date: Date) -> Option<DayCount> {
        self.points
            .binary_search_by(|p| p.date.cmp(&date))
            .ok()
            .map(|i| self.points[i].counts)
    }

    #[must_use]
    pub fn contains(&self, date: Date) -> bool {
        self.get(date).is_some()
    }

    #[must_use]
    pub fn total(&self) -> DayCount {
        self.points.iter().map(|p| p.counts).sum()
    }

    /// Points falling inside `range`.
    #[must_use]
    pub fn clip(&self, range: &DateRange) -> Self {
        let points = self
            .points
            .iter()
            .filter(|p| range.contains(p.date))
            .copied()
            .collect();

        Self { points }
    }

    /// True when both series carry exactly the same dates.
    #[must_use]
    pub fn same_dates(&self, other: &Self) -> bool {
        self.points.len() == other.points.len() && self.dates().eq(other.dates())
    }

    /// Maximal runs of consecutive present days.
    #[must_use]
    pub fn covered_ranges(&self) -> Vec<DateRange> {
        let mut out = Vec::new();
        let mut run: Option<(Date, Date)> = None;

        for date in self.dates() {
            run = match run {
                Some((start, end)) if end.next() == date => Some((start, date)),
                Some((start, end)) => {
                    out.extend(DateRange::new(start, end).ok());
                    Some((date, date))
                }
                None => Some((date, date)),
            };
        }
        if let Some((start, end)) = run {
            out.extend(DateRange::new(start, end).ok());
        }

        out
    }

    /// Merge `patch` into this series. Dates already present are never
    /// overwritten, so replaying the same patch is a no-op.
    pub fn merge(&mut self, patch: &Self) -> MergeReport {
        let mut report = MergeReport::default();
        let mut merged = Vec::with_capacity(self.points.len() + patch.points.len());
        let (mut i, mut j) = (0, 0);

        while i < self.points.len() && j < patch.points.len() {
            let (ours, theirs) = (self.points[i], patch.points[j]);
            if ours.date < theirs.date {
                merged.push(ours);
                i += 1;
            } else if theirs.date < ours.date {
                merged.push(theirs);
                report.added += 1;
                j += 1;
            } else {
                merged.push(ours);
                report.skipped += 1;
                i += 1;
                j += 1;
            }
        }
        merged.extend_from_slice(&self.points[i..]);
        report.added += patch.points.len() - j;
        merged.extend_from_slice(&patch.points[j..]);

        self.points = merged;
        report
    }

    /// Add `other` day by day. Returns `false`, leaving `self` untouched,
    /// unless both series carry identical dates.
    pub(crate) fn accumulate(&mut self, other: &Self) -> bool {
        if !self.same_dates(other) {
            return false;
        }
        for (into, from) in self.points.iter_mut().zip(&other.points) {
            into.counts += from.counts;
        }

        true
    }
}

impl TryFrom<Vec<DailyPoint>> for TimeSeries {
    type Error = SeriesError;

    fn try_from(points: Vec<DailyPoint>) -> Result<Self, Self::Error> {
        Self::from_points(points)
    }
}

impl From<TimeSeries> for Vec<DailyPoint> {
    fn from(series: TimeSeries) -> Self {
        series.points
    }
}
