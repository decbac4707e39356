//! Module: plan
//! Responsibility: compose signature filtering, isolation, reduction and
//! coverage into one answer or one fetch plan per request.
//! Does not own: executing fetches or retrying them.
//! Boundary: planning is synchronous over an immutable slice snapshot.

mod item;
mod planner;
mod trace;

pub use item::{FetchItemId, FetchPlanItem, FetchStatus};
pub use planner::Planner;
pub use trace::{PlanStage, PlanTrace, TraceRecord, TraceVerdict};

use crate::{
    dsl::Constraints,
    reduce::{AggregationFailure, ReduceError},
    signature::{CoreSignatureInputs, compute_core_hash},
    slice::{DimensionAssignment, IsolationError, MetricId, TimeSeries},
    types::{DateRange, DayCount},
};
use std::{collections::BTreeMap, fmt};

///
/// PlanRequest
///
/// One metric, one dimension assignment, one window. `core_hash` fingerprints
/// the question itself; dimension hashes come from the registry at plan time.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlanRequest {
    pub metric: MetricId,
    pub assignment: DimensionAssignment,
    pub range: DateRange,
    pub core_hash: String,
}

impl PlanRequest {
    pub fn new(
        metric: impl Into<MetricId>,
        assignment: DimensionAssignment,
        range: DateRange,
        core_hash: impl Into<String>,
    ) -> Self {
        Self {
            metric: metric.into(),
            assignment,
            range,
            core_hash: core_hash.into(),
        }
    }

    /// Build a request from parsed constraints; the temporal mode is folded
    /// into the core hash.
    #[must_use]
    pub fn from_constraints(
        metric: MetricId,
        constraints: Constraints,
        mut inputs: CoreSignatureInputs,
    ) -> Self {
        inputs.shape.mode = constraints.mode;

        Self {
            metric,
            assignment: constraints.assignment,
            range: constraints.range,
            core_hash: compute_core_hash(&inputs),
        }
    }
}

///
/// Answer
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Answer {
    pub range: DateRange,
    /// Day-level counts; `None` when the answer came from aggregate-only data.
    pub daily: Option<TimeSeries>,
    pub total: DayCount,
}

///
/// Disclosure
///
/// How an answer was obtained. Anything short of `Exact` or `MeceComplete`
/// must be shown to the user.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Disclosure {
    Exact,
    /// Summed across `dims`; `alternatives` lists other complete key sets
    /// that would have produced the same total.
    MeceComplete {
        dims: Vec<String>,
        alternatives: Vec<Vec<String>>,
    },
    /// Summed across `dims`, but the partition is incomplete.
    PartialAggregation {
        dims: Vec<String>,
        missing: BTreeMap<String, Vec<String>>,
    },
    /// Linear share of a coarser cached aggregate.
    Prorated { cached: DateRange, requested: DateRange },
}

impl fmt::Display for Disclosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => f.write_str("exact"),
            Self::MeceComplete { dims, .. } => write!(f, "mece_complete({})", dims.join(",")),
            Self::PartialAggregation { dims, .. } => {
                write!(f, "partial_aggregation({})", dims.join(","))
            }
            Self::Prorated { cached, requested } => write!(f, "prorated({cached} -> {requested})"),
        }
    }
}

///
/// PlanFault
///
/// Data-integrity faults. Planning refuses rather than guessing.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PlanFault {
    AmbiguousSlice { cell: DimensionAssignment },
    UnspecifiedMismatch(IsolationError),
    AggregationFailed(AggregationFailure),
}

impl fmt::Display for PlanFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmbiguousSlice { cell } => write!(f, "ambiguous slice at {cell}"),
            Self::UnspecifiedMismatch(err) => write!(f, "{err}"),
            Self::AggregationFailed(failure) => write!(f, "aggregation failed: {failure}"),
        }
    }
}

impl From<ReduceError> for PlanFault {
    fn from(err: ReduceError) -> Self {
        match err {
            ReduceError::AmbiguousSlice { cell } => Self::AmbiguousSlice { cell },
            ReduceError::AggregationFailed(failure) => Self::AggregationFailed(failure),
        }
    }
}

impl From<IsolationError> for PlanFault {
    fn from(err: IsolationError) -> Self {
        Self::UnspecifiedMismatch(err)
    }
}

///
/// PlanResult
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PlanResult {
    Satisfied {
        answer: Answer,
        disclosures: Vec<Disclosure>,
        trace: PlanTrace,
    },
    NeedsFetch {
        items: Vec<FetchPlanItem>,
        trace: PlanTrace,
    },
    Refused {
        fault: PlanFault,
        trace: PlanTrace,
    },
}

impl PlanResult {
    #[must_use]
    pub const fn trace(&self) -> &PlanTrace {
        match self {
            Self::Satisfied { trace, .. }
            | Self::NeedsFetch { trace, .. }
            | Self::Refused { trace, .. } => trace,
        }
    }

    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    /// Fetch items, empty unless `NeedsFetch`.
    #[must_use]
    pub fn items(&self) -> &[FetchPlanItem] {
        match self {
            Self::NeedsFetch { items, .. } => items,
            _ => &[],
        }
    }
}
