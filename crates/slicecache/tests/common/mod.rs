//! Deterministic reference source shared by the runtime integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use slicecache::{
    adapter::{AdapterError, FetchAdapter},
    core::{
        config::SliceCacheConfig,
        context::{AggregationPolicy, ContextDefinition, ContextRegistry, MemoryContextRegistry},
        error::InternalError,
        plan::{PlanRequest, Planner},
        slice::{
            AggregateWindow, DailyPoint, DimensionAssignment, MergeReport, MetricId, Slice,
            TimeSeries,
        },
        store::{MemorySliceStore, SlicePatch, SliceStore},
        types::{Date, DateRange, DayCount},
    },
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

pub const METRIC: &str = "signup";
pub const CORE: &str = "core-signup";

pub const CHANNELS: [&str; 3] = ["google", "meta", "other"];
pub const DEVICES: [&str; 2] = ["desktop", "mobile"];

/// Route `tracing` output through the test harness; `RUST_LOG` filters it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn d(day: i32) -> Date {
    Date::from_days(20_000 + day)
}

pub fn range(start: i32, end: i32) -> DateRange {
    DateRange::new(d(start), d(end)).unwrap()
}

pub fn assignment(pairs: &[(&str, &str)]) -> DimensionAssignment {
    DimensionAssignment::from_pairs(pairs.iter().copied())
}

pub fn registry() -> Arc<dyn ContextRegistry> {
    Arc::new(
        [
            ContextDefinition::new("channel", ["google", "meta"], AggregationPolicy::ComputedOther),
            ContextDefinition::new("device", DEVICES, AggregationPolicy::Closed),
        ]
        .into_iter()
        .collect::<MemoryContextRegistry>(),
    )
}

pub fn request(pairs: &[(&str, &str)], start: i32, end: i32) -> PlanRequest {
    PlanRequest::new(METRIC, assignment(pairs), range(start, end), CORE)
}

pub fn config() -> SliceCacheConfig {
    SliceCacheConfig::default()
}

/// Ground truth for one fully specified (channel, device) cell on one day.
pub fn cell_truth(channel: &str, device: &str, day: Date) -> DayCount {
    let seed: u64 = channel.bytes().chain(device.bytes()).map(u64::from).sum();
    let n = 10 + seed % 37 + u64::from(day.days().unsigned_abs() % 5);

    DayCount::new(n, n / 3)
}

/// Ground truth for any assignment: the sum over every cell it covers.
pub fn truth(assignment: &DimensionAssignment, day: Date) -> DayCount {
    let mut total = DayCount::ZERO;
    for channel in CHANNELS {
        if assignment.get("channel").is_some_and(|c| c != channel) {
            continue;
        }
        for device in DEVICES {
            if assignment.get("device").is_some_and(|v| v != device) {
                continue;
            }
            total += cell_truth(channel, device, day);
        }
    }

    total
}

pub fn truth_total(assignment: &DimensionAssignment, window: DateRange) -> DayCount {
    window.days().map(|day| truth(assignment, day)).sum()
}

pub fn truth_series(
    assignment: &DimensionAssignment,
    days: impl IntoIterator<Item = Date>,
) -> TimeSeries {
    TimeSeries::from_points(
        days.into_iter()
            .map(|day| {
                let c = truth(assignment, day);
                DailyPoint::new(day, c.n, c.k)
            })
            .collect(),
    )
    .unwrap()
}

/// Seed `store` with a slice exactly as a previous fetch would have written it.
pub fn seed(
    store: &MemorySliceStore,
    planner: &Planner,
    pairs: &[(&str, &str)],
    days: impl IntoIterator<Item = Date>,
) {
    let assignment = assignment(pairs);
    let signature = planner.signature_for(CORE, &assignment);
    let series = truth_series(&assignment, days);

    store
        .insert(&MetricId::new(METRIC), Slice::daily(assignment, series, signature))
        .unwrap();
}

/// Seed an aggregate-only slice holding the true total over `window`.
pub fn seed_aggregate(
    store: &MemorySliceStore,
    planner: &Planner,
    pairs: &[(&str, &str)],
    window: DateRange,
) {
    let assignment = assignment(pairs);
    let signature = planner.signature_for(CORE, &assignment);
    let counts = truth_total(&assignment, window);

    store
        .insert(
            &MetricId::new(METRIC),
            Slice::aggregate(assignment, AggregateWindow { range: window, counts }, signature),
        )
        .unwrap();
}

///
/// RefusingStore
///
/// Memory store that fails every merge for one assignment.
///

pub struct RefusingStore {
    pub inner: MemorySliceStore,
    refused: DimensionAssignment,
}

impl RefusingStore {
    pub fn new(refused: DimensionAssignment) -> Self {
        Self {
            inner: MemorySliceStore::new(),
            refused,
        }
    }
}

impl SliceStore for RefusingStore {
    fn load_slices(&self, metric: &MetricId) -> Result<Vec<Slice>, InternalError> {
        self.inner.load_slices(metric)
    }

    fn merge(&self, metric: &MetricId, patch: SlicePatch) -> Result<MergeReport, InternalError> {
        if patch.assignment == self.refused {
            return Err(InternalError::store_invariant("slice arena is read-only"));
        }

        self.inner.merge(metric, patch)
    }
}

///
/// ReferenceAdapter
///

#[derive(Default)]
pub struct ReferenceAdapter {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
    stall: bool,
    stray_day: bool,
    scripted: Mutex<HashMap<DimensionAssignment, VecDeque<AdapterError>>>,
}

impl ReferenceAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Never completes; only cancellation ends a fetch.
    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::default()
        }
    }

    /// Adds one day past the requested range to every response.
    pub fn straying() -> Self {
        Self {
            stray_day: true,
            ..Self::default()
        }
    }

    /// Fail the next fetch for `assignment` with `error`.
    pub fn fail_next(&self, assignment: DimensionAssignment, error: AdapterError) {
        self.scripted
            .lock()
            .unwrap()
            .entry(assignment)
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FetchAdapter for ReferenceAdapter {
    async fn fetch(
        &self,
        _metric: &MetricId,
        assignment: &DimensionAssignment,
        range: DateRange,
    ) -> Result<TimeSeries, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.stall {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(assignment)
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(error);
        }

        let mut days: Vec<Date> = range.days().collect();
        if self.stray_day {
            days.push(range.end().next());
        }

        Ok(truth_series(assignment, days))
    }
}
