use crate::{
    context::{
        AggregationPolicy, ContextRegistry, PartitionStatus, PolicyFailure, evaluate_partition,
    },
    reduce::ReduceError,
    slice::{DimensionAssignment, Slice},
};
use std::collections::BTreeSet;

///
/// DimensionStatus
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DimensionStatus {
    pub key: String,
    pub policy: AggregationPolicy,
    pub status: PartitionStatus,
}

///
/// DimensionFailure
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DimensionFailure {
    pub key: String,
    pub failure: PolicyFailure,
}

///
/// GridAssessment
///
/// Joint view of the unspecified dimensions of one slice family.
/// `missing_cells` is only computed when no dimension failed; each cell is
/// an assignment over the unspecified keys alone.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct GridAssessment {
    pub dimensions: Vec<DimensionStatus>,
    pub failures: Vec<DimensionFailure>,
    pub missing_cells: Vec<DimensionAssignment>,
}

impl GridAssessment {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
            && self.missing_cells.is_empty()
            && self.dimensions.iter().all(|dim| dim.status.is_complete())
    }
}

/// Evaluate each unspecified dimension against its policy and check that the
/// cross product of expected values is populated at most once per cell.
///
/// Closed-family axes are the expected value sets; `Open` axes are the
/// observed values, since their enumeration is known to be incomplete.
pub fn assess_grid(
    matched: &[&Slice],
    unspecified: &[String],
    registry: &dyn ContextRegistry,
) -> Result<GridAssessment, ReduceError> {
    let mut seen = BTreeSet::new();
    for slice in matched {
        let cell = slice.assignment.project(unspecified.iter().map(String::as_str));
        if !seen.insert(cell.clone()) {
            return Err(ReduceError::AmbiguousSlice { cell });
        }
    }

    let mut grid = GridAssessment::default();
    let mut axes: Vec<(&str, Vec<String>)> = Vec::with_capacity(unspecified.len());

    for key in unspecified {
        let mut present = BTreeSet::new();
        let mut lacking = false;
        for slice in matched {
            match slice.assignment.get(key) {
                Some(value) => {
                    present.insert(value.to_string());
                }
                None => lacking = true,
            }
        }

        let failure = if lacking {
            PolicyFailure::MissingOnSlice
        } else if let Some(def) = registry.get_definition(key) {
            match evaluate_partition(&def, &present) {
                Ok(status) => {
                    let axis = if def.policy().is_closed_family() {
                        def.expected_values()
                    } else {
                        present
                    };
                    axes.push((key, axis.into_iter().collect()));
                    grid.dimensions.push(DimensionStatus {
                        key: key.clone(),
                        policy: def.policy(),
                        status,
                    });
                    continue;
                }
                Err(failure) => failure,
            }
        } else {
            PolicyFailure::UnknownDimension
        };

        grid.failures.push(DimensionFailure {
            key: key.clone(),
            failure,
        });
    }

    if grid.failures.is_empty() && !axes.is_empty() {
        grid.missing_cells = cross_product(&axes)
            .into_iter()
            .filter(|cell| !seen.contains(cell))
            .collect();
    }

    Ok(grid)
}

// Every combination of one value per axis, in axis then value order.
fn cross_product(axes: &[(&str, Vec<String>)]) -> Vec<DimensionAssignment> {
    let mut cells = vec![DimensionAssignment::empty()];
    for (key, values) in axes {
        cells = cells
            .iter()
            .flat_map(|cell| values.iter().map(|value| cell.clone().with(key, value)))
            .collect();
    }

    cells
}
