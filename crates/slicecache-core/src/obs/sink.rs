//! Metrics sink boundary.
//!
//! All instrumentation flows through `MetricsEvent` and `MetricsSink`. This
//! module is the only bridge between planning/dispatch and the global
//! metrics state.

use crate::obs::metrics::{self, EventReport};
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_OVERRIDE: RefCell<Option<Rc<dyn MetricsSink>>> = const { RefCell::new(None) };
}

///
/// PlanOutcome
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PlanOutcome {
    Satisfied,
    NeedsFetch,
    Refused,
}

///
/// FetchOutcome
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FetchOutcome {
    Merged,
    Failed,
    Cancelled,
    OverBudget,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent<'a> {
    PlanFinish {
        metric: &'a str,
        outcome: PlanOutcome,
        items: u64,
    },
    SignatureRejected {
        metric: &'a str,
    },
    Reduction {
        metric: &'a str,
        complete: bool,
    },
    FetchStart {
        metric: &'a str,
    },
    FetchFinish {
        metric: &'a str,
        outcome: FetchOutcome,
        days_added: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

/// GlobalMetricsSink
/// Default sink writing into the process-global counters.
/// Acts as the concrete sink when no scoped override is installed.

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::PlanFinish {
                metric,
                outcome,
                items,
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.plan_calls = m.ops.plan_calls.saturating_add(1);
                    m.ops.fetch_items_planned = m.ops.fetch_items_planned.saturating_add(items);
                    let entry = m.metrics.entry(metric.to_string()).or_default();
                    entry.plan_calls = entry.plan_calls.saturating_add(1);

                    match outcome {
                        PlanOutcome::Satisfied => {
                            m.ops.plan_satisfied = m.ops.plan_satisfied.saturating_add(1);
                            entry.plan_satisfied = entry.plan_satisfied.saturating_add(1);
                        }
                        PlanOutcome::NeedsFetch => {
                            m.ops.plan_needs_fetch = m.ops.plan_needs_fetch.saturating_add(1);
                            entry.plan_needs_fetch = entry.plan_needs_fetch.saturating_add(1);
                        }
                        PlanOutcome::Refused => {
                            m.ops.plan_refused = m.ops.plan_refused.saturating_add(1);
                            entry.plan_refused = entry.plan_refused.saturating_add(1);
                        }
                    }
                });
            }

            MetricsEvent::SignatureRejected { .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.signature_rejections = m.ops.signature_rejections.saturating_add(1);
                });
            }

            MetricsEvent::Reduction { complete, .. } => {
                metrics::with_state_mut(|m| {
                    if complete {
                        m.ops.reductions_complete = m.ops.reductions_complete.saturating_add(1);
                    } else {
                        m.ops.reductions_partial = m.ops.reductions_partial.saturating_add(1);
                    }
                });
            }

            MetricsEvent::FetchStart { .. } => {
                metrics::with_state_mut(|m| {
                    m.ops.fetches_started = m.ops.fetches_started.saturating_add(1);
                });
            }

            MetricsEvent::FetchFinish {
                metric,
                outcome,
                days_added,
            } => {
                metrics::with_state_mut(|m| match outcome {
                    FetchOutcome::Merged => {
                        m.ops.fetches_merged = m.ops.fetches_merged.saturating_add(1);
                        m.ops.days_merged = m.ops.days_merged.saturating_add(days_added);
                        let entry = m.metrics.entry(metric.to_string()).or_default();
                        entry.fetches_merged = entry.fetches_merged.saturating_add(1);
                        entry.days_merged = entry.days_merged.saturating_add(days_added);
                    }
                    FetchOutcome::Failed => {
                        m.ops.fetches_failed = m.ops.fetches_failed.saturating_add(1);
                    }
                    FetchOutcome::Cancelled => {
                        m.ops.fetches_cancelled = m.ops.fetches_cancelled.saturating_add(1);
                    }
                    FetchOutcome::OverBudget => {
                        m.ops.fetches_over_budget = m.ops.fetches_over_budget.saturating_add(1);
                    }
                });
            }
        }
    }
}

pub(crate) const GLOBAL_METRICS_SINK: GlobalMetricsSink = GlobalMetricsSink;

/// Route one event to the scoped override, or the global sink when none is installed.
pub fn record(event: MetricsEvent<'_>) {
    let override_sink = SINK_OVERRIDE.with(|cell| cell.borrow().clone());
    match override_sink {
        Some(sink) => sink.record(event),
        None => GLOBAL_METRICS_SINK.record(event),
    }
}

/// Snapshot the current metrics state.
#[must_use]
pub fn metrics_report() -> EventReport {
    metrics::report()
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run a closure with a temporary metrics sink override on this thread.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Guard(Option<Rc<dyn MetricsSink>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            let prev = self.0.take();
            SINK_OVERRIDE.with(|cell| {
                *cell.borrow_mut() = prev;
            });
        }
    }

    let prev = SINK_OVERRIDE.with(|cell| cell.borrow_mut().replace(sink));
    let _guard = Guard(prev);

    f()
}

///
/// TESTS
///
