//! Module: dispatch
//! Responsibility: run planned fetch items against a `FetchAdapter` and merge
//! the results into the slice store.
//! Does not own: deciding what to fetch (planner) or when to stop (resolver).
//! Boundary: concurrency is bounded by a semaphore, merges are serialized per
//! (metric, assignment), and each item merges all of its days or none.

use crate::adapter::{AdapterError, FetchAdapter};
use slicecache_core::{
    config::DispatchConfig,
    error::InternalError,
    obs::{FetchOutcome, MetricsEvent, record},
    plan::{FetchItemId, FetchPlanItem},
    slice::{DimensionAssignment, MetricId, TimeSeries},
    store::{SlicePatch, SliceStore},
};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error as ThisError;
use tokio::{
    sync::{Mutex, Semaphore},
    task::{self, JoinSet},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

///
/// DispatchError
///
/// Failures of the dispatcher itself. Source failures are not errors here;
/// they are reported per item in `DispatchReport::failed`.
///

#[derive(Debug, ThisError)]
pub enum DispatchError {
    #[error("fetch item {id} belongs to metric '{found}', not '{expected}'")]
    ForeignItem {
        id: FetchItemId,
        expected: MetricId,
        found: MetricId,
    },

    #[error(transparent)]
    Internal(#[from] InternalError),
}

///
/// MergedItem
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MergedItem {
    pub id: FetchItemId,
    pub days_added: usize,
}

///
/// FailedItem
///
/// `item.status()` is `Failed` with the retry class of `error`.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FailedItem {
    pub item: FetchPlanItem,
    pub error: AdapterError,
}

///
/// InternalFailure
///
/// An item stopped by a store or runtime fault rather than by the source.
/// Nothing of it was merged.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InternalFailure {
    pub id: FetchItemId,
    pub error: InternalError,
}

///
/// DispatchReport
///
/// Every submitted item lands in exactly one bucket. Buckets are ordered by
/// item id.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DispatchReport {
    pub merged: Vec<MergedItem>,
    pub failed: Vec<FailedItem>,
    pub internal: Vec<InternalFailure>,
    pub cancelled: Vec<FetchPlanItem>,
    pub over_budget: Vec<FetchPlanItem>,
}

impl DispatchReport {
    /// True when every item was fetched and merged.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
            && self.internal.is_empty()
            && self.cancelled.is_empty()
            && self.over_budget.is_empty()
    }

    #[must_use]
    pub fn days_added(&self) -> usize {
        self.merged.iter().map(|m| m.days_added).sum()
    }

    pub fn retryable_failures(&self) -> impl Iterator<Item = &FailedItem> {
        self.failed.iter().filter(|f| f.error.is_retryable())
    }

    #[must_use]
    pub fn has_terminal_failure(&self) -> bool {
        self.failed.iter().any(|f| !f.error.is_retryable())
    }

    #[must_use]
    pub fn has_internal_failure(&self) -> bool {
        !self.internal.is_empty()
    }

    fn absorb(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Merged(merged) => self.merged.push(merged),
            ItemOutcome::Failed(failed) => self.failed.push(failed),
            ItemOutcome::Internal(internal) => self.internal.push(internal),
            ItemOutcome::Cancelled(item) => self.cancelled.push(item),
        }
    }

    fn sort(&mut self) {
        self.merged.sort_by_key(|m| m.id);
        self.failed.sort_by_key(|f| f.item.id());
        self.internal.sort_by_key(|i| i.id);
        self.cancelled.sort_by_key(FetchPlanItem::id);
        self.over_budget.sort_by_key(FetchPlanItem::id);
    }
}

enum ItemOutcome {
    Merged(MergedItem),
    Failed(FailedItem),
    Internal(InternalFailure),
    Cancelled(FetchPlanItem),
}

type MergeKey = (MetricId, DimensionAssignment);

///
/// Dispatcher
///
/// Cheap to clone; clones share the semaphore and the merge locks.
///

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn SliceStore>,
    adapter: Arc<dyn FetchAdapter>,
    config: DispatchConfig,
    permits: Arc<Semaphore>,
    merge_locks: Mutex<HashMap<MergeKey, Arc<Mutex<()>>>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        store: Arc<dyn SliceStore>,
        adapter: Arc<dyn FetchAdapter>,
        config: DispatchConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1)));

        Self {
            inner: Arc::new(Inner {
                store,
                adapter,
                config,
                permits,
                merge_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.inner.config
    }

    /// Merge locks currently held or awaited.
    pub async fn merge_lock_count(&self) -> usize {
        self.inner.merge_locks.lock().await.len()
    }

    /// Fetch and merge `items` for `metric`.
    ///
    /// At most `request_budget` items reach the adapter; the rest come back
    /// in `over_budget` untouched. Cancelling `cancel` stops items that have
    /// not merged yet; nothing is partially merged. Every spawned item runs
    /// to completion, and a fault in one lands in `internal` without
    /// hiding what its siblings merged.
    pub async fn execute(
        &self,
        metric: &MetricId,
        items: Vec<FetchPlanItem>,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport, DispatchError> {
        if let Some(item) = items.iter().find(|item| &item.metric != metric) {
            return Err(DispatchError::ForeignItem {
                id: item.id(),
                expected: metric.clone(),
                found: item.metric.clone(),
            });
        }

        let mut report = DispatchReport::default();
        let mut items = items;
        let budget = self.inner.config.request_budget;
        if items.len() > budget {
            report.over_budget = items.split_off(budget);
            for item in &report.over_budget {
                record(MetricsEvent::FetchFinish {
                    metric: metric.as_str(),
                    outcome: FetchOutcome::OverBudget,
                    days_added: 0,
                });
                warn!(metric = %metric, item = %item.id(), "fetch item over request budget");
            }
        }

        let mut tasks = JoinSet::new();
        let mut spawned: HashMap<task::Id, FetchItemId> = HashMap::new();
        for item in items {
            let id = item.id();
            let inner = Arc::clone(&self.inner);
            let cancel = cancel.clone();
            let handle = tasks.spawn(async move { inner.run_item(item, cancel).await });
            spawned.insert(handle.id(), id);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let outcome = match joined {
                Ok((_, outcome)) => outcome,
                Err(err) => match spawned.get(&err.id()) {
                    Some(&id) => {
                        let error = InternalError::dispatch_internal(format!(
                            "fetch task failed: {err}"
                        ));
                        internal_failure(metric, id, error)
                    }
                    None => {
                        return Err(InternalError::dispatch_internal(format!(
                            "untracked fetch task failed: {err}"
                        ))
                        .into());
                    }
                },
            };
            report.absorb(outcome);
        }
        report.sort();

        info!(
            metric = %metric,
            merged = report.merged.len(),
            failed = report.failed.len(),
            internal = report.internal.len(),
            cancelled = report.cancelled.len(),
            over_budget = report.over_budget.len(),
            days_added = report.days_added(),
            "dispatch finished"
        );

        Ok(report)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn run_item(&self, item: FetchPlanItem, cancel: CancellationToken) -> ItemOutcome {
        let id = item.id();
        let metric = item.metric.clone();

        match self.attempt(item, &cancel).await {
            Ok(outcome) => outcome,
            Err(error) => internal_failure(&metric, id, error),
        }
    }

    async fn attempt(
        &self,
        mut item: FetchPlanItem,
        cancel: &CancellationToken,
    ) -> Result<ItemOutcome, InternalError> {
        let metric = item.metric.clone();

        let permit = tokio::select! {
            () = cancel.cancelled() => return Ok(cancelled(item)),
            permit = Arc::clone(&self.permits).acquire_owned() => permit.map_err(|err| {
                InternalError::dispatch_internal(format!("fetch permits closed: {err}"))
            })?,
        };

        item.mark_in_flight()?;
        record(MetricsEvent::FetchStart {
            metric: metric.as_str(),
        });

        let fetched = tokio::select! {
            () = cancel.cancelled() => {
                item.mark_failed(true)?;
                return Ok(cancelled(item));
            }
            fetched = self.adapter.fetch(&item.metric, &item.assignment, item.range) => fetched,
        };
        drop(permit);

        let series = match fetched.and_then(|series| within_range(&item, series)) {
            Ok(series) => series,
            Err(error) => {
                item.mark_failed(error.is_retryable())?;
                record(MetricsEvent::FetchFinish {
                    metric: metric.as_str(),
                    outcome: FetchOutcome::Failed,
                    days_added: 0,
                });
                warn!(
                    metric = %metric,
                    item = %item.id(),
                    retryable = error.is_retryable(),
                    error = %error,
                    "fetch failed"
                );

                return Ok(ItemOutcome::Failed(FailedItem { item, error }));
            }
        };

        let key = (item.metric.clone(), item.assignment.clone());
        let lock = self.merge_lock(&key).await;
        let merged = {
            let _guard = lock.lock().await;
            self.merge_locked(&mut item, series, cancel)
        };
        self.release_merge_lock(&key, lock).await;

        let Some(days_added) = merged? else {
            return Ok(cancelled(item));
        };

        record(MetricsEvent::FetchFinish {
            metric: metric.as_str(),
            outcome: FetchOutcome::Merged,
            days_added: u64::try_from(days_added).unwrap_or(u64::MAX),
        });
        info!(
            metric = %metric,
            item = %item.id(),
            assignment = %item.assignment,
            range = %item.range,
            days_added,
            "fetch merged"
        );

        Ok(ItemOutcome::Merged(MergedItem {
            id: item.id(),
            days_added,
        }))
    }

    // Caller holds the merge lock for the item's (metric, assignment).
    // `None` means cancellation won before anything was written.
    fn merge_locked(
        &self,
        item: &mut FetchPlanItem,
        series: TimeSeries,
        cancel: &CancellationToken,
    ) -> Result<Option<usize>, InternalError> {
        if cancel.is_cancelled() {
            item.mark_failed(true)?;
            return Ok(None);
        }
        if series.is_empty() {
            return Ok(Some(0));
        }

        let patch = SlicePatch::daily(item.assignment.clone(), item.signature.clone(), series);

        Ok(Some(self.store.merge(&item.metric, patch)?.added))
    }

    async fn merge_lock(&self, key: &MergeKey) -> Arc<Mutex<()>> {
        let mut locks = self.merge_locks.lock().await;

        Arc::clone(
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    // Handles are only cloned under the map lock, so a count of one there
    // means nobody else holds or waits on this key.
    async fn release_merge_lock(&self, key: &MergeKey, lock: Arc<Mutex<()>>) {
        drop(lock);
        let mut locks = self.merge_locks.lock().await;
        if locks.get(key).is_some_and(|held| Arc::strong_count(held) == 1) {
            locks.remove(key);
        }
    }
}

fn cancelled(item: FetchPlanItem) -> ItemOutcome {
    record(MetricsEvent::FetchFinish {
        metric: item.metric.as_str(),
        outcome: FetchOutcome::Cancelled,
        days_added: 0,
    });

    ItemOutcome::Cancelled(item)
}

fn internal_failure(metric: &MetricId, id: FetchItemId, error: InternalError) -> ItemOutcome {
    record(MetricsEvent::FetchFinish {
        metric: metric.as_str(),
        outcome: FetchOutcome::Failed,
        days_added: 0,
    });
    warn!(
        metric = %metric,
        item = %id,
        error = %error.display_with_class(),
        "fetch item hit an internal fault"
    );

    ItemOutcome::Internal(InternalFailure { id, error })
}

// A response that strays outside the requested range is rejected whole.
fn within_range(item: &FetchPlanItem, series: TimeSeries) -> Result<TimeSeries, AdapterError> {
    let stray = series.dates().find(|day| !item.range.contains(*day));

    match stray {
        Some(day) => Err(AdapterError::terminal(format!(
            "source returned {day} outside requested {}",
            item.range
        ))),
        None => Ok(series),
    }
}
