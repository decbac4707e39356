//! Exact-match isolation on specified dimensions. No date reasoning happens here.

use crate::slice::{DimensionAssignment, Slice};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error as ThisError;

///
/// IsolationError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum IsolationError {
    /// Matched slices disagree on which dimensions are left unspecified.
    #[error(
        "slice {slice} leaves dimensions [{}] unspecified, expected [{}]",
        found.join(", "),
        expected.join(", ")
    )]
    UnspecifiedMismatch {
        slice: DimensionAssignment,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

///
/// Isolated
///
/// Slices matching a query's specified dimensions, plus the dimensions those
/// slices carry that the query leaves open.
///

#[derive(Clone, Debug)]
pub struct Isolated<'a> {
    pub matched: Vec<&'a Slice>,
    pub unspecified: Vec<String>,
}

impl Isolated<'_> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }
}

/// Narrow `slices` to those whose assignment carries every `(key, value)` of `query`.
///
/// With a non-empty query, the extra keys of the first match define
/// `unspecified` and every other match must agree. With an empty query, every
/// dimensioned slice is a candidate and the union of their keys is unspecified.
pub fn isolate<'a>(
    slices: impl IntoIterator<Item = &'a Slice>,
    query: &DimensionAssignment,
) -> Result<Isolated<'a>, IsolationError> {
    if query.is_empty() {
        let matched: Vec<&Slice> = slices
            .into_iter()
            .filter(|slice| !slice.is_dimensionless())
            .collect();
        let unspecified: BTreeSet<String> = matched
            .iter()
            .flat_map(|slice| slice.assignment.keys().map(str::to_string))
            .collect();

        return Ok(Isolated {
            matched,
            unspecified: unspecified.into_iter().collect(),
        });
    }

    let matched: Vec<&Slice> = slices
        .into_iter()
        .filter(|slice| slice.assignment.satisfies(query))
        .collect();
    let Some(first) = matched.first() else {
        return Ok(Isolated {
            matched,
            unspecified: Vec::new(),
        });
    };

    let unspecified = first.assignment.extra_keys(query);
    for slice in &matched[1..] {
        let found = slice.assignment.extra_keys(query);
        if found != unspecified {
            return Err(IsolationError::UnspecifiedMismatch {
                slice: slice.assignment.clone(),
                expected: unspecified,
                found,
            });
        }
    }

    Ok(Isolated {
        matched,
        unspecified,
    })
}

/// Slices whose assignment equals `query` exactly.
pub fn exact_matches<'a>(
    slices: impl IntoIterator<Item = &'a Slice>,
    query: &DimensionAssignment,
) -> Vec<&'a Slice> {
    slices
        .into_iter()
        .filter(|slice| &slice.assignment == query)
        .collect()
}

///
/// SliceFamily
///
/// Superset slices that share one set of unspecified dimensions.
///

#[derive(Clone, Debug)]
pub struct SliceFamily<'a> {
    pub unspecified: Vec<String>,
    pub slices: Vec<&'a Slice>,
}

/// Group superset matches by their unspecified key set, ordered
/// lexicographically by that key set. Exact matches are excluded.
pub fn partition_families<'a>(
    slices: impl IntoIterator<Item = &'a Slice>,
    query: &DimensionAssignment,
) -> Vec<SliceFamily<'a>> {
    let mut families: BTreeMap<Vec<String>, Vec<&'a Slice>> = BTreeMap::new();

    for slice in slices {
        if !slice.assignment.satisfies(query) {
            continue;
        }
        let extra = slice.assignment.extra_keys(query);
        if extra.is_empty() {
            continue;
        }
        families.entry(extra).or_default().push(slice);
    }

    families
        .into_iter()
        .map(|(unspecified, slices)| SliceFamily {
            unspecified,
            slices,
        })
        .collect()
}
