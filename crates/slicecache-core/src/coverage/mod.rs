//! Module: coverage
//! Responsibility: day-granular reconciliation of what a series holds against
//! a requested window, as maximal contiguous gaps.
//! Does not own: deciding which slices contribute (plan) or summing (reduce).
//! Boundary: gap lists feed fetch planning directly, one request per gap.


use crate::{
    slice::{AggregateWindow, TimeSeries},
    types::{Date, DateRange, DayCount},
};

///
/// Coverage
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Coverage {
    FullyCovered,
    /// Maximal contiguous missing sub-ranges, ascending and disjoint.
    Gaps(Vec<DateRange>),
}

impl Coverage {
    #[must_use]
    pub const fn is_covered(&self) -> bool {
        matches!(self, Self::FullyCovered)
    }

    #[must_use]
    pub fn gaps(&self) -> &[DateRange] {
        match self {
            Self::FullyCovered => &[],
            Self::Gaps(gaps) => gaps,
        }
    }

    fn from_gaps(gaps: Vec<DateRange>) -> Self {
        if gaps.is_empty() {
            Self::FullyCovered
        } else {
            Self::Gaps(gaps)
        }
    }
}

/// Coverage of one daily series over `requested`.
#[must_use]
pub fn coverage(available: &TimeSeries, requested: &DateRange) -> Coverage {
    Coverage::from_gaps(gaps_where(requested, |day| available.contains(day)))
}

/// Combined coverage of several series: a day counts as covered only when
/// every series holds it.
#[must_use]
pub fn intersect_coverage<'a>(
    available: impl IntoIterator<Item = &'a TimeSeries>,
    requested: &DateRange,
) -> Coverage {
    let series: Vec<&TimeSeries> = available.into_iter().collect();
    if series.is_empty() {
        return Coverage::Gaps(vec![*requested]);
    }

    Coverage::from_gaps(gaps_where(requested, |day| {
        series.iter().all(|s| s.contains(day))
    }))
}

// Coalesce consecutive uncovered days of `requested` into ranges.
fn gaps_where(requested: &DateRange, covered: impl Fn(Date) -> bool) -> Vec<DateRange> {
    let mut gaps = Vec::new();
    let mut open: Option<Date> = None;

    for day in requested.days() {
        if covered(day) {
            if let Some(start) = open.take() {
                gaps.extend(DateRange::new(start, day.prev()).ok());
            }
        } else if open.is_none() {
            open = Some(day);
        }
    }
    if let Some(start) = open {
        gaps.extend(DateRange::new(start, requested.end()).ok());
    }

    gaps
}

///
/// AggregateCoverage
///
/// Coverage of an aggregate-only window. Only an identical window is exact.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AggregateCoverage {
    Exact(DayCount),
    /// Linear share of a coarser cached window by elapsed days, rounded half up.
    Prorated { counts: DayCount, cached: DateRange },
    /// The cached window cannot answer `requested`.
    Uncovered,
}

#[must_use]
pub fn aggregate_coverage(
    window: &AggregateWindow,
    requested: &DateRange,
    allow_prorate: bool,
) -> AggregateCoverage {
    if window.range == *requested {
        return AggregateCoverage::Exact(window.counts);
    }
    if allow_prorate && window.range.contains_range(requested) {
        return AggregateCoverage::Prorated {
            counts: window
                .counts
                .prorate(requested.len_days(), window.range.len_days()),
            cached: window.range,
        };
    }

    AggregateCoverage::Uncovered
}
