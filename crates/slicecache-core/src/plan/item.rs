use crate::{
    error::InternalError,
    hash::IdHasher,
    signature::Signature,
    slice::{DimensionAssignment, MetricId},
    types::DateRange,
};
use std::fmt;

///
/// FetchStatus
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchStatus {
    Needed,
    InFlight,
    Failed { retryable: bool },
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Needed => f.write_str("needed"),
            Self::InFlight => f.write_str("in_flight"),
            Self::Failed { retryable: true } => f.write_str("failed(retryable)"),
            Self::Failed { retryable: false } => f.write_str("failed(terminal)"),
        }
    }
}

///
/// FetchItemId
///
/// Deterministic identity over metric, canonical assignment and range, so the
/// same missing work planned twice collapses to one item.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FetchItemId(u64);

impl FetchItemId {
    #[must_use]
    pub fn derive(metric: &MetricId, assignment: &DimensionAssignment, range: &DateRange) -> Self {
        let id = IdHasher::new("fetch-item:v1")
            .str(metric.as_str())
            .str(&assignment.canonical())
            .i32(range.start().days())
            .i32(range.end().days())
            .finish();

        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FetchItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

///
/// FetchPlanItem
///
/// One contiguous range of missing data for one dimension combination.
/// `signature` is what the merged slice is stored under.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FetchPlanItem {
    id: FetchItemId,
    pub metric: MetricId,
    pub assignment: DimensionAssignment,
    pub range: DateRange,
    pub signature: Signature,
    status: FetchStatus,
}

impl FetchPlanItem {
    #[must_use]
    pub fn new(
        metric: MetricId,
        assignment: DimensionAssignment,
        range: DateRange,
        signature: Signature,
    ) -> Self {
        Self {
            id: FetchItemId::derive(&metric, &assignment, &range),
            metric,
            assignment,
            range,
            signature,
            status: FetchStatus::Needed,
        }
    }

    #[must_use]
    pub const fn id(&self) -> FetchItemId {
        self.id
    }

    #[must_use]
    pub const fn status(&self) -> FetchStatus {
        self.status
    }

    /// `Needed -> InFlight`.
    pub fn mark_in_flight(&mut self) -> Result<(), InternalError> {
        self.transition(FetchStatus::Needed, FetchStatus::InFlight)
    }

    /// `InFlight -> Failed`.
    pub fn mark_failed(&mut self, retryable: bool) -> Result<(), InternalError> {
        self.transition(FetchStatus::InFlight, FetchStatus::Failed { retryable })
    }

    /// `Failed{retryable} -> Needed`; terminal failures stay failed.
    pub fn reset(&mut self) -> Result<(), InternalError> {
        self.transition(FetchStatus::Failed { retryable: true }, FetchStatus::Needed)
    }

    fn transition(&mut self, from: FetchStatus, to: FetchStatus) -> Result<(), InternalError> {
        if self.status != from {
            return Err(InternalError::planner_invariant(format!(
                "fetch item {} cannot move from {} to {to}",
                self.id, self.status
            )));
        }
        self.status = to;

        Ok(())
    }
}

impl fmt::Display for FetchPlanItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} [{}]",
            self.metric, self.assignment, self.range, self.status
        )
    }
}
