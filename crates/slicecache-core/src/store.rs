//! Slice arena keyed by metric id.
//!
//! Planning reads owned snapshots via `load_slices`; writes go through
//! `merge`, which is append-only and idempotent per (assignment, signature).
//! The one exception: a daily patch replaces an aggregate-only slice, since
//! per-day data answers every window the aggregate did not.

use crate::{
    error::{ErrorOrigin, InternalError},
    signature::Signature,
    slice::{DimensionAssignment, MergeReport, MetricId, Slice, SliceData, TimeSeries},
};
use std::{collections::BTreeMap, sync::RwLock};
use tracing::debug;

///
/// SlicePatch
///
/// Freshly fetched data for one slice identity.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SlicePatch {
    pub assignment: DimensionAssignment,
    pub signature: Signature,
    pub data: SliceData,
}

impl SlicePatch {
    #[must_use]
    pub const fn daily(
        assignment: DimensionAssignment,
        signature: Signature,
        series: TimeSeries,
    ) -> Self {
        Self {
            assignment,
            signature,
            data: SliceData::Daily(series),
        }
    }
}

///
/// SliceStore
///

pub trait SliceStore: Send + Sync {
    /// Every slice cached for `metric`; an unknown metric has none.
    fn load_slices(&self, metric: &MetricId) -> Result<Vec<Slice>, InternalError>;

    /// Merge `patch` into the slice with the same assignment and signature,
    /// creating it on first merge. Days already present are never overwritten.
    /// A daily patch for an aggregate-only slice replaces the aggregate.
    fn merge(&self, metric: &MetricId, patch: SlicePatch) -> Result<MergeReport, InternalError>;
}

///
/// MemorySliceStore
///

#[derive(Debug, Default)]
pub struct MemorySliceStore {
    slices: RwLock<BTreeMap<MetricId, Vec<Slice>>>,
}

impl MemorySliceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a slice directly, bypassing merge semantics.
    pub fn insert(&self, metric: &MetricId, slice: Slice) -> Result<(), InternalError> {
        let mut slices = self
            .slices
            .write()
            .map_err(|_| InternalError::poisoned(ErrorOrigin::Store, "slice store"))?;
        slices.entry(metric.clone()).or_default().push(slice);

        Ok(())
    }

    pub fn slice_count(&self, metric: &MetricId) -> Result<usize, InternalError> {
        let slices = self
            .slices
            .read()
            .map_err(|_| InternalError::poisoned(ErrorOrigin::Store, "slice store"))?;

        Ok(slices.get(metric).map_or(0, Vec::len))
    }
}

impl SliceStore for MemorySliceStore {
    fn load_slices(&self, metric: &MetricId) -> Result<Vec<Slice>, InternalError> {
        let slices = self
            .slices
            .read()
            .map_err(|_| InternalError::poisoned(ErrorOrigin::Store, "slice store"))?;

        Ok(slices.get(metric).cloned().unwrap_or_default())
    }

    fn merge(&self, metric: &MetricId, patch: SlicePatch) -> Result<MergeReport, InternalError> {
        let mut slices = self
            .slices
            .write()
            .map_err(|_| InternalError::poisoned(ErrorOrigin::Store, "slice store"))?;
        let owned = slices.entry(metric.clone()).or_default();

        let existing = owned
            .iter_mut()
            .find(|s| s.assignment == patch.assignment && s.signature == patch.signature);

        let report = match existing {
            None => {
                let added = match &patch.data {
                    SliceData::Daily(series) => series.len(),
                    SliceData::Aggregate(_) => 1,
                };
                owned.push(Slice {
                    assignment: patch.assignment,
                    data: patch.data,
                    signature: patch.signature,
                });

                MergeReport { added, skipped: 0 }
            }
            Some(slice) => merge_into(slice, &patch.data)?,
        };

        debug!(
            metric = %metric,
            added = report.added,
            skipped = report.skipped,
            "slice merge"
        );

        Ok(report)
    }
}

fn merge_into(slice: &mut Slice, data: &SliceData) -> Result<MergeReport, InternalError> {
    match (&mut slice.data, data) {
        (SliceData::Daily(series), SliceData::Daily(patch)) => Ok(series.merge(patch)),
        (SliceData::Aggregate(window), SliceData::Daily(patch)) => {
            debug!(
                assignment = %slice.assignment,
                aggregate = %window.range,
                days = patch.len(),
                "daily series replaces aggregate slice"
            );
            slice.data = SliceData::Daily(patch.clone());

            Ok(MergeReport {
                added: patch.len(),
                skipped: 0,
            })
        }
        (SliceData::Aggregate(window), SliceData::Aggregate(patch))
            if window.range == patch.range =>
        {
            Ok(MergeReport {
                added: 0,
                skipped: 1,
            })
        }
        (SliceData::Aggregate(window), SliceData::Aggregate(patch)) => {
            Err(InternalError::store_invariant(format!(
                "aggregate slice {} covers {}, patch covers {}",
                slice.assignment, window.range, patch.range
            )))
        }
        _ => Err(InternalError::store_invariant(format!(
            "payload kind mismatch merging into slice {}",
            slice.assignment
        ))),
    }
}

///
/// TESTS
///
