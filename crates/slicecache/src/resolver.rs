//! Plan, fetch, re-plan: the loop that turns a request into an answer.

use crate::{
    adapter::FetchAdapter,
    dispatch::{DispatchError, DispatchReport, Dispatcher},
};
use slicecache_core::{
    config::SliceCacheConfig,
    context::ContextRegistry,
    plan::{PlanRequest, PlanResult, Planner},
    store::SliceStore,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

///
/// Resolution
///
/// Final plan plus one dispatch report per fetch round that ran.
///

#[derive(Clone, Debug)]
pub struct Resolution {
    pub result: PlanResult,
    pub rounds: Vec<DispatchReport>,
}

impl Resolution {
    #[must_use]
    pub fn days_fetched(&self) -> usize {
        self.rounds.iter().map(DispatchReport::days_added).sum()
    }
}

///
/// Resolver
///

#[derive(Clone)]
pub struct Resolver {
    planner: Planner,
    dispatcher: Dispatcher,
    store: Arc<dyn SliceStore>,
    max_rounds: usize,
}

impl Resolver {
    #[must_use]
    pub fn new(
        config: &SliceCacheConfig,
        registry: Arc<dyn ContextRegistry>,
        store: Arc<dyn SliceStore>,
        adapter: Arc<dyn FetchAdapter>,
    ) -> Self {
        Self {
            planner: Planner::new(config.planner.clone(), registry),
            dispatcher: Dispatcher::new(Arc::clone(&store), adapter, config.dispatch.clone()),
            store,
            max_rounds: config.dispatch.max_rounds,
        }
    }

    #[must_use]
    pub const fn planner(&self) -> &Planner {
        &self.planner
    }

    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run up to `max_rounds` plan/fetch rounds and return the last plan.
    ///
    /// Stops early once the plan no longer needs data, when `cancel` fires,
    /// when a round reports an internal fault, or when a round merges nothing
    /// and leaves nothing worth retrying. A `NeedsFetch` result is returned
    /// as-is if the rounds run out.
    pub async fn resolve(
        &self,
        request: &PlanRequest,
        cancel: &CancellationToken,
    ) -> Result<Resolution, DispatchError> {
        let mut rounds = Vec::new();

        loop {
            let result = self.planner.plan(self.store.as_ref(), request)?;
            let PlanResult::NeedsFetch { items, .. } = &result else {
                return Ok(self.finish(request, result, rounds));
            };
            if rounds.len() >= self.max_rounds || cancel.is_cancelled() {
                return Ok(self.finish(request, result, rounds));
            }

            debug!(
                metric = %request.metric,
                round = rounds.len() + 1,
                items = items.len(),
                "fetch round"
            );
            let report = self
                .dispatcher
                .execute(&request.metric, items.clone(), cancel)
                .await?;
            let stalled = report.has_internal_failure()
                || (report.days_added() == 0 && report.retryable_failures().next().is_none());
            rounds.push(report);

            if stalled {
                let result = self.planner.plan(self.store.as_ref(), request)?;
                return Ok(self.finish(request, result, rounds));
            }
        }
    }

    fn finish(
        &self,
        request: &PlanRequest,
        result: PlanResult,
        rounds: Vec<DispatchReport>,
    ) -> Resolution {
        let resolution = Resolution { result, rounds };
        info!(
            metric = %request.metric,
            satisfied = resolution.result.is_satisfied(),
            rounds = resolution.rounds.len(),
            days_fetched = resolution.days_fetched(),
            max_rounds = self.max_rounds,
            "resolve finished"
        );

        resolution
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("planner", &self.planner)
            .field("dispatcher", &self.dispatcher)
            .field("max_rounds", &self.max_rounds)
            .finish_non_exhaustive()
    }
}
