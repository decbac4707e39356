use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{Mutex, OnceLock, PoisonError},
};

///
/// EventState
/// Ephemeral, in-memory counters shared by every planner and dispatcher in
/// the process.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct EventState {
    pub ops: EventOps,
    pub metrics: BTreeMap<String, MetricCounters>,
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct EventOps {
    // Planning
    pub plan_calls: u64,
    pub plan_satisfied: u64,
    pub plan_needs_fetch: u64,
    pub plan_refused: u64,
    pub signature_rejections: u64,
    pub reductions_complete: u64,
    pub reductions_partial: u64,
    pub fetch_items_planned: u64,

    // Dispatch
    pub fetches_started: u64,
    pub fetches_merged: u64,
    pub fetches_failed: u64,
    pub fetches_cancelled: u64,
    pub fetches_over_budget: u64,
    pub days_merged: u64,
}

///
/// MetricCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(crate) struct MetricCounters {
    pub plan_calls: u64,
    pub plan_satisfied: u64,
    pub plan_needs_fetch: u64,
    pub plan_refused: u64,
    pub fetches_merged: u64,
    pub days_merged: u64,
}

static EVENT_STATE: OnceLock<Mutex<EventState>> = OnceLock::new();

fn state() -> &'static Mutex<EventState> {
    EVENT_STATE.get_or_init(|| Mutex::new(EventState::default()))
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    let guard = state().lock().unwrap_or_else(PoisonError::into_inner);
    f(&guard)
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    let mut guard = state().lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

/// Reset all counters (useful in tests).
pub(crate) fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    pub counters: EventOps,
    /// Per-metric counters, busiest first.
    pub metric_counters: Vec<MetricSummary>,
}

///
/// MetricSummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MetricSummary {
    pub metric: String,
    pub plan_calls: u64,
    pub plan_satisfied: u64,
    pub plan_needs_fetch: u64,
    pub plan_refused: u64,
    pub fetches_merged: u64,
    pub days_merged: u64,
    /// Share of plans answered from cache.
    pub hit_ratio: f64,
}

/// Build a report from in-memory counters only.
#[must_use]
#[expect(clippy::cast_precision_loss)]
pub(crate) fn report() -> EventReport {
    let snap = with_state(Clone::clone);

    let mut metric_counters: Vec<MetricSummary> = snap
        .metrics
        .iter()
        .map(|(metric, c)| MetricSummary {
            metric: metric.clone(),
            plan_calls: c.plan_calls,
            plan_satisfied: c.plan_satisfied,
            plan_needs_fetch: c.plan_needs_fetch,
            plan_refused: c.plan_refused,
            fetches_merged: c.fetches_merged,
            days_merged: c.days_merged,
            hit_ratio: if c.plan_calls > 0 {
                c.plan_satisfied as f64 / c.plan_calls as f64
            } else {
                0.0
            },
        })
        .collect();

    metric_counters.sort_by(|a, b| {
        b.plan_calls
            .cmp(&a.plan_calls)
            .then_with(|| a.metric.cmp(&b.metric))
    });

    EventReport {
        counters: snap.ops,
        metric_counters,
    }
}
