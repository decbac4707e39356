//! Module: reduce
//! Responsibility: decide whether unspecified dimensions can be summed away
//! (jointly, across the full grid) and perform the day-by-day sum.
//! Does not own: date coverage; callers clip slices to the window first.
//! Boundary: integrity faults are `ReduceError`; policy outcomes are values.

mod grid;
#[cfg(test)]
mod tests;

pub use grid::{DimensionFailure, DimensionStatus, GridAssessment, assess_grid};

use crate::{
    context::ContextRegistry,
    slice::{DimensionAssignment, Slice, SliceData},
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// ReduceError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ReduceError {
    #[error("ambiguous slice: cell {cell} is populated more than once")]
    AmbiguousSlice { cell: DimensionAssignment },

    #[error("aggregation failed: {0}")]
    AggregationFailed(AggregationFailure),
}

///
/// AggregationFailure
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AggregationFailure {
    NothingToSum,
    /// A slice's dates differ from the first slice's.
    DateMismatch { slice: DimensionAssignment },
    /// Daily and aggregate-only payloads in one reduction.
    MixedPayloads,
    /// Aggregate-only payloads over different windows.
    WindowMismatch { slice: DimensionAssignment },
}

impl fmt::Display for AggregationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NothingToSum => f.write_str("no slices to sum"),
            Self::DateMismatch { slice } => write!(f, "date array of {slice} does not align"),
            Self::MixedPayloads => f.write_str("daily and aggregate payloads mixed"),
            Self::WindowMismatch { slice } => {
                write!(f, "aggregate window of {slice} does not align")
            }
        }
    }
}

///
/// NotReducibleReason
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NotReducibleReason {
    Dimension(DimensionFailure),
    /// Two or more unspecified dimensions with unpopulated cells.
    IncompleteGrid { missing_cells: Vec<DimensionAssignment> },
}

impl fmt::Display for NotReducibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dimension(dim) => write!(f, "{}: {}", dim.key, dim.failure),
            Self::IncompleteGrid { missing_cells } => {
                write!(f, "incomplete grid, {} cell(s) missing", missing_cells.len())
            }
        }
    }
}

///
/// Reduction
///
/// Summed payload plus the per-dimension partition status, which callers
/// must surface as a disclosure when any dimension is partial.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reduction {
    pub data: SliceData,
    pub dimensions: Vec<DimensionStatus>,
}

impl Reduction {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.dimensions.iter().all(|dim| dim.status.is_complete())
    }

    /// Dimensions whose partition is not complete.
    pub fn partial_dimensions(&self) -> impl Iterator<Item = &DimensionStatus> {
        self.dimensions.iter().filter(|dim| !dim.status.is_complete())
    }
}

///
/// ReductionOutcome
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReductionOutcome {
    Reduced(Reduction),
    NotReducible(Vec<NotReducibleReason>),
}

/// Sum `matched` across `unspecified`, gated on the joint grid check.
///
/// A single dimension with missing values yields a partial reduction; two or
/// more dimensions with any missing cell fail closed.
pub fn reduce(
    matched: &[&Slice],
    unspecified: &[String],
    registry: &dyn ContextRegistry,
) -> Result<ReductionOutcome, ReduceError> {
    let grid = assess_grid(matched, unspecified, registry)?;

    if !grid.failures.is_empty() {
        return Ok(ReductionOutcome::NotReducible(
            grid.failures
                .into_iter()
                .map(NotReducibleReason::Dimension)
                .collect(),
        ));
    }
    if grid.dimensions.len() > 1 && !grid.missing_cells.is_empty() {
        return Ok(ReductionOutcome::NotReducible(vec![
            NotReducibleReason::IncompleteGrid {
                missing_cells: grid.missing_cells,
            },
        ]));
    }

    let data = sum_payloads(matched)?;

    Ok(ReductionOutcome::Reduced(Reduction {
        data,
        dimensions: grid.dimensions,
    }))
}

/// Day-by-day sum of daily payloads, or window sum of aggregate payloads.
pub fn sum_payloads(matched: &[&Slice]) -> Result<SliceData, ReduceError> {
    let Some((first, rest)) = matched.split_first() else {
        return Err(ReduceError::AggregationFailed(AggregationFailure::NothingToSum));
    };

    match &first.data {
        SliceData::Daily(series) => {
            let mut acc = series.clone();
            for slice in rest {
                let SliceData::Daily(next) = &slice.data else {
                    return Err(ReduceError::AggregationFailed(AggregationFailure::MixedPayloads));
                };
                if !acc.accumulate(next) {
                    return Err(ReduceError::AggregationFailed(
                        AggregationFailure::DateMismatch {
                            slice: slice.assignment.clone(),
                        },
                    ));
                }
            }

            Ok(SliceData::Daily(acc))
        }
        SliceData::Aggregate(window) => {
            let mut acc = *window;
            for slice in rest {
                let SliceData::Aggregate(next) = &slice.data else {
                    return Err(ReduceError::AggregationFailed(AggregationFailure::MixedPayloads));
                };
                if next.range != acc.range {
                    return Err(ReduceError::AggregationFailed(
                        AggregationFailure::WindowMismatch {
                            slice: slice.assignment.clone(),
                        },
                    ));
                }
                acc.counts += next.counts;
            }

            Ok(SliceData::Aggregate(acc))
        }
    }
}
