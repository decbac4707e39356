//! Async runtime for slicecache: fetch adapters, the bounded dispatcher that
//! merges fetched days into the slice store, and the plan/fetch resolver.
//!
//! ## Crate layout
//! - `core`: the synchronous planning core (`slicecache-core`).
//! - `adapter`: the `FetchAdapter` boundary to the data source.
//! - `dispatch`: concurrent fetch execution and all-or-nothing merges.
//! - `resolver`: plan → dispatch → re-plan, bounded by `max_rounds`.

pub use slicecache_core as core;

pub mod adapter;
pub mod dispatch;
pub mod resolver;

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        adapter::{AdapterError, FetchAdapter},
        dispatch::{DispatchReport, Dispatcher},
        resolver::{Resolution, Resolver},
    };
    pub use slicecache_core::prelude::*;
}
