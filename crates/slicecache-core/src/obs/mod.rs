//! Observability: runtime counters and the sink boundary they flow through.
//!
//! Planning and dispatch never touch `obs::metrics` directly; they emit
//! `MetricsEvent`s through `sink::record`.

pub(crate) mod metrics;
pub(crate) mod sink;

pub use metrics::{EventOps, EventReport, MetricSummary};
pub use sink::{
    FetchOutcome, MetricsEvent, MetricsSink, PlanOutcome, metrics_report, metrics_reset_all,
    record, with_metrics_sink,
};
