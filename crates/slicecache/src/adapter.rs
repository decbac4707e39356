//! Source-side boundary: one async call per fetch item.

use async_trait::async_trait;
use slicecache_core::{
    slice::{DimensionAssignment, MetricId, TimeSeries},
    types::DateRange,
};
use thiserror::Error as ThisError;

///
/// AdapterError
///
/// Opaque source failure. Only the retry class is interpreted; the message
/// is carried through to the dispatch report untouched.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum AdapterError {
    #[error("retryable source failure: {0}")]
    Retryable(String),

    #[error("source failure: {0}")]
    Terminal(String),
}

impl AdapterError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable(message.into())
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal(message.into())
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

///
/// FetchAdapter
///
/// Implementations must return only days inside `range`; the dispatcher
/// rejects the whole response otherwise. Missing days are allowed and simply
/// stay uncovered.
///

#[async_trait]
pub trait FetchAdapter: Send + Sync {
    async fn fetch(
        &self,
        metric: &MetricId,
        assignment: &DimensionAssignment,
        range: DateRange,
    ) -> Result<TimeSeries, AdapterError>;
}
