//! Module: slice
//! Responsibility: the immutable cached unit (assignment + payload + signature)
//! and the exact-match isolation of candidate slices for a query.
//! Does not own: MECE judgement (reduce) or date coverage (coverage).
//! Boundary: planning reads slices as snapshots and never mutates them.

mod assignment;
mod isolate;
mod series;

pub use assignment::{DimensionAssignment, normalize_key};
pub use isolate::{
    IsolationError, Isolated, SliceFamily, exact_matches, isolate, partition_families,
};
pub use series::{DailyPoint, MergeReport, SeriesError, TimeSeries};

use crate::{
    signature::Signature,
    types::{DateRange, DayCount},
};
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// MetricId
///
/// Owner key for a set of slices (one edge/metric of the surrounding graph).
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct MetricId(String);

impl MetricId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MetricId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

///
/// AggregateWindow
///
/// Window total from a source that cannot report per-day counts.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct AggregateWindow {
    pub range: DateRange,
    pub counts: DayCount,
}

///
/// SliceData
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum SliceData {
    Daily(TimeSeries),
    Aggregate(AggregateWindow),
}

impl SliceData {
    #[must_use]
    pub const fn as_daily(&self) -> Option<&TimeSeries> {
        match self {
            Self::Daily(series) => Some(series),
            Self::Aggregate(_) => None,
        }
    }
}

///
/// Slice
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Slice {
    pub assignment: DimensionAssignment,
    pub data: SliceData,
    pub signature: Signature,
}

impl Slice {
    #[must_use]
    pub const fn daily(
        assignment: DimensionAssignment,
        series: TimeSeries,
        signature: Signature,
    ) -> Self {
        Self {
            assignment,
            data: SliceData::Daily(series),
            signature,
        }
    }

    #[must_use]
    pub const fn aggregate(
        assignment: DimensionAssignment,
        window: AggregateWindow,
        signature: Signature,
    ) -> Self {
        Self {
            assignment,
            data: SliceData::Aggregate(window),
            signature,
        }
    }

    #[must_use]
    pub fn is_dimensionless(&self) -> bool {
        self.assignment.is_empty()
    }
}
