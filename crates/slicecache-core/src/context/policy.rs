use crate::context::ContextDefinition;
use std::{collections::BTreeSet, fmt};

///
/// PartitionStatus
///
/// How well the observed values of one dimension cover its definition.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PartitionStatus {
    Complete,
    /// Summable, but the sum is not a complete total. `missing` is empty for
    /// an `Open` dimension whose enumeration is fully observed.
    PartialButAggregable { missing: Vec<String> },
}

impl PartitionStatus {
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

///
/// PolicyFailure
///
/// Per-dimension reason a reduction cannot proceed at all.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PolicyFailure {
    /// The registry has no definition for the key.
    UnknownDimension,
    /// Values outside a closed-family enumeration.
    UnrecognisedValues(Vec<String>),
    /// Some matched slice does not carry the key.
    MissingOnSlice,
}

impl fmt::Display for PolicyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownDimension => f.write_str("unknown dimension"),
            Self::UnrecognisedValues(values) => {
                write!(f, "unrecognised values [{}]", values.join(", "))
            }
            Self::MissingOnSlice => f.write_str("a matched slice lacks the dimension"),
        }
    }
}

/// Judge the distinct observed values of one dimension against its definition.
pub fn evaluate_partition(
    def: &ContextDefinition,
    present: &BTreeSet<String>,
) -> Result<PartitionStatus, PolicyFailure> {
    let expected = def.expected_values();

    if def.policy().is_closed_family() {
        let unrecognised: Vec<String> = present.difference(&expected).cloned().collect();
        if !unrecognised.is_empty() {
            return Err(PolicyFailure::UnrecognisedValues(unrecognised));
        }
    }

    let missing: Vec<String> = expected.difference(present).cloned().collect();

    match (def.policy().is_closed_family(), missing.is_empty()) {
        (true, true) => Ok(PartitionStatus::Complete),
        _ => Ok(PartitionStatus::PartialButAggregable { missing }),
    }
}
