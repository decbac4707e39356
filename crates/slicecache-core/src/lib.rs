//! Planning core for slicecache: signatures, dimension policies, slice
//! isolation, MECE reduction, date coverage and fetch planning over cached
//! daily count slices.
//!
//! Everything here is synchronous and I/O free apart from `config::load`;
//! the async fetch runtime lives in the `slicecache` crate.
#![warn(unreachable_pub)]

pub(crate) mod hash;

pub mod config;
pub mod context;
pub mod coverage;
pub mod dsl;
pub mod error;
pub mod obs;
pub mod plan;
pub mod reduce;
pub mod signature;
pub mod slice;
pub mod store;
pub mod types;

///
/// Prelude
///
/// Domain vocabulary only. Errors, stores and sinks are imported from their
/// modules.
///

pub mod prelude {
    pub use crate::{
        context::{AggregationPolicy, ContextDefinition, ContextRegistry},
        plan::{Answer, Disclosure, PlanRequest, PlanResult, Planner},
        signature::Signature,
        slice::{DailyPoint, DimensionAssignment, MetricId, Slice, SliceData, TimeSeries},
        types::{Date, DateRange, DayCount},
    };
}
