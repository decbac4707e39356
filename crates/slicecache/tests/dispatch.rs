mod common;

use common::*;
use slicecache::{
    adapter::AdapterError,
    core::{
        config::{DispatchConfig, PlannerConfig},
        error::ErrorOrigin,
        plan::{FetchPlanItem, FetchStatus, Planner},
        slice::{DimensionAssignment, MetricId},
        store::{MemorySliceStore, SliceStore},
    },
    dispatch::{DispatchError, Dispatcher},
};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

fn metric() -> MetricId {
    MetricId::new(METRIC)
}

fn planner() -> Planner {
    Planner::new(PlannerConfig::default(), registry())
}

fn item(pairs: &[(&str, &str)], start: i32, end: i32) -> FetchPlanItem {
    let assignment = assignment(pairs);
    let signature = planner().signature_for(CORE, &assignment);

    FetchPlanItem::new(metric(), assignment, range(start, end), signature)
}

fn dispatcher(
    store: &Arc<MemorySliceStore>,
    adapter: &Arc<ReferenceAdapter>,
    config: DispatchConfig,
) -> Dispatcher {
    init_tracing();
    Dispatcher::new(store.clone(), adapter.clone(), config)
}

#[tokio::test]
async fn fetched_days_are_merged_under_the_item_signature() {
    let store = Arc::new(MemorySliceStore::new());
    let adapter = Arc::new(ReferenceAdapter::new());
    let dispatcher = dispatcher(&store, &adapter, DispatchConfig::default());
    let google = item(&[("channel", "google")], 1, 7);

    let report = dispatcher
        .execute(&metric(), vec![google.clone()], &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_complete());
    assert_eq!(report.days_added(), 7);
    let slices = store.load_slices(&metric()).unwrap();
    assert_eq!(slices.len(), 1);
    assert_eq!(slices[0].signature, google.signature);
    assert_eq!(slices[0].assignment, google.assignment);
    assert_eq!(dispatcher.merge_lock_count().await, 0);
}

#[tokio::test]
async fn replaying_the_same_items_adds_nothing() {
    let store = Arc::new(MemorySliceStore::new());
    let adapter = Arc::new(ReferenceAdapter::new());
    let dispatcher = dispatcher(&store, &adapter, DispatchConfig::default());
    let items = vec![item(&[("channel", "google")], 1, 7), item(&[("channel", "meta")], 1, 7)];

    let first = dispatcher
        .execute(&metric(), items.clone(), &CancellationToken::new())
        .await
        .unwrap();
    let replay = dispatcher
        .execute(&metric(), items, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.days_added(), 14);
    assert_eq!(replay.days_added(), 0);
    assert_eq!(replay.merged.len(), 2);
    assert_eq!(store.slice_count(&metric()).unwrap(), 2);
}

#[tokio::test]
async fn items_past_the_budget_are_returned_untouched() {
    let store = Arc::new(MemorySliceStore::new());
    let adapter = Arc::new(ReferenceAdapter::new());
    let config = DispatchConfig {
        request_budget: 2,
        ..DispatchConfig::default()
    };
    let dispatcher = dispatcher(&store, &adapter, config);
    let items: Vec<FetchPlanItem> = CHANNELS
        .iter()
        .map(|&channel| item(&[("channel", channel)], 1, 3))
        .collect();

    let report = dispatcher
        .execute(&metric(), items, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(adapter.calls(), 2);
    assert_eq!(report.merged.len(), 2);
    assert_eq!(report.over_budget.len(), 1);
    assert_eq!(report.over_budget[0].status(), FetchStatus::Needed);
    assert!(!report.is_complete());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn adapter_concurrency_is_bounded() {
    let store = Arc::new(MemorySliceStore::new());
    let adapter = Arc::new(ReferenceAdapter::with_delay(Duration::from_millis(20)));
    let config = DispatchConfig {
        max_concurrent_fetches: 2,
        ..DispatchConfig::default()
    };
    let dispatcher = dispatcher(&store, &adapter, config);
    let items: Vec<FetchPlanItem> = (0..6).map(|i| item(&[], i * 10, i * 10 + 2)).collect();

    let report = dispatcher
        .execute(&metric(), items, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.merged.len(), 6);
    assert_eq!(adapter.calls(), 6);
    assert!(adapter.max_in_flight() <= 2);
}

#[tokio::test]
async fn cancelled_items_merge_nothing() {
    let store = Arc::new(MemorySliceStore::new());
    let adapter = Arc::new(ReferenceAdapter::stalled());
    let dispatcher = dispatcher(&store, &adapter, DispatchConfig::default());
    let cancel = CancellationToken::new();
    let items = vec![item(&[("device", "desktop")], 1, 7), item(&[("device", "mobile")], 1, 7)];

    let task = {
        let dispatcher = dispatcher.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { dispatcher.execute(&metric(), items, &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();

    let report = task.await.unwrap().unwrap();

    assert_eq!(report.cancelled.len(), 2);
    assert!(report.merged.is_empty());
    assert!(store.load_slices(&metric()).unwrap().is_empty());
}

#[tokio::test]
async fn source_failures_are_reported_with_their_retry_class() {
    let store = Arc::new(MemorySliceStore::new());
    let adapter = Arc::new(ReferenceAdapter::new());
    adapter.fail_next(
        assignment(&[("channel", "google")]),
        AdapterError::retryable("rate limited"),
    );
    adapter.fail_next(assignment(&[("channel", "meta")]), AdapterError::terminal("bad query"));
    let dispatcher = dispatcher(&store, &adapter, DispatchConfig::default());
    let items = vec![
        item(&[("channel", "google")], 1, 3),
        item(&[("channel", "meta")], 1, 3),
        item(&[("channel", "other")], 1, 3),
    ];

    let report = dispatcher
        .execute(&metric(), items, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.merged.len(), 1);
    assert_eq!(report.failed.len(), 2);
    assert_eq!(report.retryable_failures().count(), 1);
    assert!(report.has_terminal_failure());

    let mut retryable = report
        .retryable_failures()
        .next()
        .map(|failed| failed.item.clone())
        .unwrap();
    assert_eq!(retryable.status(), FetchStatus::Failed { retryable: true });
    retryable.reset().unwrap();
    assert_eq!(retryable.status(), FetchStatus::Needed);
}

#[tokio::test]
async fn response_outside_the_item_range_is_rejected_whole() {
    let store = Arc::new(MemorySliceStore::new());
    let adapter = Arc::new(ReferenceAdapter::straying());
    let dispatcher = dispatcher(&store, &adapter, DispatchConfig::default());

    let report = dispatcher
        .execute(&metric(), vec![item(&[], 1, 3)], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert!(!report.failed[0].error.is_retryable());
    assert!(report.failed[0].error.to_string().contains("outside requested"));
    assert!(store.load_slices(&metric()).unwrap().is_empty());
}

#[tokio::test]
async fn items_for_another_metric_are_refused() {
    let store = Arc::new(MemorySliceStore::new());
    let adapter = Arc::new(ReferenceAdapter::new());
    let dispatcher = dispatcher(&store, &adapter, DispatchConfig::default());
    let foreign = FetchPlanItem::new(
        MetricId::new("revenue"),
        DimensionAssignment::empty(),
        range(1, 2),
        planner().signature_for(CORE, &DimensionAssignment::empty()),
    );

    let err = dispatcher
        .execute(&metric(), vec![foreign], &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::ForeignItem { .. }));
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn store_fault_is_reported_without_hiding_sibling_merges() {
    init_tracing();
    let store = Arc::new(RefusingStore::new(assignment(&[("channel", "meta")])));
    let adapter = Arc::new(ReferenceAdapter::new());
    let dispatcher = Dispatcher::new(store.clone(), adapter.clone(), DispatchConfig::default());
    let meta = item(&[("channel", "meta")], 1, 3);
    let items = vec![
        item(&[("channel", "google")], 1, 3),
        meta.clone(),
        item(&[("channel", "other")], 1, 3),
    ];

    let report = dispatcher
        .execute(&metric(), items, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(adapter.calls(), 3);
    assert_eq!(report.merged.len(), 2);
    assert_eq!(report.days_added(), 6);
    assert_eq!(report.internal.len(), 1);
    assert_eq!(report.internal[0].id, meta.id());
    assert_eq!(report.internal[0].error.origin, ErrorOrigin::Store);
    assert!(report.has_internal_failure());
    assert!(!report.is_complete());
    assert_eq!(store.inner.slice_count(&metric()).unwrap(), 2);
    assert_eq!(dispatcher.merge_lock_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_merges_for_one_assignment_are_serialized() {
    let store = Arc::new(MemorySliceStore::new());
    let adapter = Arc::new(ReferenceAdapter::with_delay(Duration::from_millis(5)));
    let dispatcher = dispatcher(&store, &adapter, DispatchConfig::default());
    let windows = [(1, 7), (4, 10), (6, 12), (1, 12)];

    let mut tasks = tokio::task::JoinSet::new();
    for (start, end) in windows {
        let dispatcher = dispatcher.clone();
        let items = vec![item(&[("channel", "google")], start, end)];
        tasks.spawn(async move {
            dispatcher
                .execute(&metric(), items, &CancellationToken::new())
                .await
        });
    }
    let mut days_added = 0;
    while let Some(joined) = tasks.join_next().await {
        let report = joined.unwrap().unwrap();
        assert!(report.is_complete());
        days_added += report.days_added();
    }

    assert_eq!(days_added, 12);
    let slices = store.load_slices(&metric()).unwrap();
    assert_eq!(slices.len(), 1);
    let series = slices[0].data.as_daily().unwrap();
    assert_eq!(series.len(), 12);
    assert!(series.dates().eq(range(1, 12).days()));
    assert_eq!(
        series.total(),
        truth_series(&assignment(&[("channel", "google")]), range(1, 12).days()).total()
    );
    assert_eq!(dispatcher.merge_lock_count().await, 0);
}
