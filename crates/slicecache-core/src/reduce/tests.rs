use super::*;
use crate::{
    context::{
        AggregationPolicy, ContextDefinition, MemoryContextRegistry, PartitionStatus,
        PolicyFailure,
    },
    signature::Signature,
    slice::{AggregateWindow, DailyPoint, TimeSeries},
    types::{Date, DateRange, DayCount},
};

fn d(day: i32) -> Date {
    Date::from_days(20_000 + day)
}

fn daily(pairs: &[(&str, &str)], days: &[i32], n: u64) -> Slice {
    let series = TimeSeries::from_points(
        days.iter()
            .map(|&day| DailyPoint::new(d(day), n, 1))
            .collect(),
    )
    .unwrap();

    Slice::daily(
        DimensionAssignment::from_pairs(pairs.iter().copied()),
        series,
        Signature::structured("core", std::iter::empty::<(&str, &str)>()),
    )
}

fn registry() -> MemoryContextRegistry {
    [
        ContextDefinition::new("channel", ["google", "meta"], AggregationPolicy::Closed),
        ContextDefinition::new("device", ["desktop", "mobile"], AggregationPolicy::Closed),
        ContextDefinition::new("source", ["google", "meta"], AggregationPolicy::ComputedOther),
        ContextDefinition::new("campaign", ["spring"], AggregationPolicy::Open),
    ]
    .into_iter()
    .collect()
}

fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| (*k).to_string()).collect()
}

fn reduced(outcome: ReductionOutcome) -> Reduction {
    match outcome {
        ReductionOutcome::Reduced(reduction) => reduction,
        ReductionOutcome::NotReducible(reasons) => panic!("expected reduction, got {reasons:?}"),
    }
}

#[test]
fn closed_dimension_with_all_values_sums_day_by_day() {
    let slices = [
        daily(&[("channel", "google")], &[1, 2], 10),
        daily(&[("channel", "meta")], &[1, 2], 5),
    ];
    let refs: Vec<&Slice> = slices.iter().collect();

    let reduction = reduced(reduce(&refs, &keys(&["channel"]), &registry()).unwrap());

    assert!(reduction.is_complete());
    let series = reduction.data.as_daily().unwrap();
    assert_eq!(series.get(d(1)), Some(DayCount::new(15, 2)));
    assert_eq!(series.total(), DayCount::new(30, 4));
}

#[test]
fn missing_catch_all_is_partial_for_a_single_dimension() {
    let slices = [
        daily(&[("source", "google")], &[1], 10),
        daily(&[("source", "meta")], &[1], 5),
    ];
    let refs: Vec<&Slice> = slices.iter().collect();

    let reduction = reduced(reduce(&refs, &keys(&["source"]), &registry()).unwrap());

    assert!(!reduction.is_complete());
    assert_eq!(
        reduction.dimensions[0].status,
        PartitionStatus::PartialButAggregable {
            missing: vec!["other".to_string()]
        }
    );
}

#[test]
fn removing_a_value_flips_complete_to_partial() {
    let full = [
        daily(&[("channel", "google")], &[1], 10),
        daily(&[("channel", "meta")], &[1], 5),
    ];
    let full_refs: Vec<&Slice> = full.iter().collect();
    let partial_refs: Vec<&Slice> = full.iter().take(1).collect();

    let whole = reduced(reduce(&full_refs, &keys(&["channel"]), &registry()).unwrap());
    let part = reduced(reduce(&partial_refs, &keys(&["channel"]), &registry()).unwrap());

    assert!(whole.is_complete());
    assert!(!part.is_complete());
}

#[test]
fn open_dimension_is_never_complete_and_tolerates_new_values() {
    let slices = [
        daily(&[("campaign", "spring")], &[1], 10),
        daily(&[("campaign", "summer")], &[1], 5),
    ];
    let refs: Vec<&Slice> = slices.iter().collect();

    let reduction = reduced(reduce(&refs, &keys(&["campaign"]), &registry()).unwrap());

    assert!(!reduction.is_complete());
    assert_eq!(reduction.data.as_daily().unwrap().total(), DayCount::new(15, 2));
}

#[test]
fn unrecognised_and_unknown_dimensions_are_not_reducible() {
    let slices = [
        daily(&[("channel", "tiktok"), ("region", "eu")], &[1], 10),
        daily(&[("channel", "google"), ("region", "us")], &[1], 5),
    ];
    let refs: Vec<&Slice> = slices.iter().collect();

    let outcome = reduce(&refs, &keys(&["channel", "region"]), &registry()).unwrap();

    assert_eq!(
        outcome,
        ReductionOutcome::NotReducible(vec![
            NotReducibleReason::Dimension(DimensionFailure {
                key: "channel".to_string(),
                failure: PolicyFailure::UnrecognisedValues(vec!["tiktok".to_string()]),
            }),
            NotReducibleReason::Dimension(DimensionFailure {
                key: "region".to_string(),
                failure: PolicyFailure::UnknownDimension,
            }),
        ])
    );
}

#[test]
fn full_two_by_two_grid_reduces_jointly() {
    let slices = [
        daily(&[("channel", "google"), ("device", "mobile")], &[1], 1),
        daily(&[("channel", "google"), ("device", "desktop")], &[1], 2),
        daily(&[("channel", "meta"), ("device", "mobile")], &[1], 4),
        daily(&[("channel", "meta"), ("device", "desktop")], &[1], 8),
    ];
    let refs: Vec<&Slice> = slices.iter().collect();

    let reduction = reduced(reduce(&refs, &keys(&["channel", "device"]), &registry()).unwrap());

    assert!(reduction.is_complete());
    assert_eq!(reduction.data.as_daily().unwrap().total().n, 15);
}

#[test]
fn partial_grid_fails_closed() {
    let slices = [
        daily(&[("channel", "google"), ("device", "mobile")], &[1], 1),
        daily(&[("channel", "google"), ("device", "desktop")], &[1], 2),
        daily(&[("channel", "meta"), ("device", "mobile")], &[1], 4),
    ];
    let refs: Vec<&Slice> = slices.iter().collect();

    let outcome = reduce(&refs, &keys(&["channel", "device"]), &registry()).unwrap();

    assert_eq!(
        outcome,
        ReductionOutcome::NotReducible(vec![NotReducibleReason::IncompleteGrid {
            missing_cells: vec![DimensionAssignment::from_pairs([
                ("channel", "meta"),
                ("device", "desktop"),
            ])],
        }])
    );
}

#[test]
fn duplicate_cell_is_ambiguous() {
    let slices = [
        daily(&[("channel", "google")], &[1], 1),
        daily(&[("channel", "google")], &[1], 2),
    ];
    let refs: Vec<&Slice> = slices.iter().collect();

    let err = reduce(&refs, &keys(&["channel"]), &registry()).unwrap_err();

    assert_eq!(
        err,
        ReduceError::AmbiguousSlice {
            cell: DimensionAssignment::from_pairs([("channel", "google")]),
        }
    );
}

#[test]
fn misaligned_dates_abort_the_sum() {
    let slices = [
        daily(&[("channel", "google")], &[1, 2], 1),
        daily(&[("channel", "meta")], &[1, 3], 2),
    ];
    let refs: Vec<&Slice> = slices.iter().collect();

    let err = reduce(&refs, &keys(&["channel"]), &registry()).unwrap_err();

    assert_eq!(
        err,
        ReduceError::AggregationFailed(AggregationFailure::DateMismatch {
            slice: DimensionAssignment::from_pairs([("channel", "meta")]),
        })
    );
}

#[test]
fn aggregate_payloads_need_identical_windows() {
    let window = DateRange::new(d(1), d(7)).unwrap();
    let aggregate = |value: &str, range: DateRange, n: u64| {
        Slice::aggregate(
            DimensionAssignment::from_pairs([("channel", value)]),
            AggregateWindow {
                range,
                counts: DayCount::new(n, 0),
            },
            Signature::structured("core", std::iter::empty::<(&str, &str)>()),
        )
    };

    let aligned = [aggregate("google", window, 10), aggregate("meta", window, 5)];
    let refs: Vec<&Slice> = aligned.iter().collect();
    let data = sum_payloads(&refs).unwrap();
    assert_eq!(
        data,
        SliceData::Aggregate(AggregateWindow {
            range: window,
            counts: DayCount::new(15, 0),
        })
    );

    let shifted = [
        aggregate("google", window, 10),
        aggregate("meta", DateRange::new(d(2), d(8)).unwrap(), 5),
    ];
    let refs: Vec<&Slice> = shifted.iter().collect();
    assert!(matches!(
        sum_payloads(&refs),
        Err(ReduceError::AggregationFailed(AggregationFailure::WindowMismatch { .. }))
    ));

    let mixed = [aggregate("google", window, 10), daily(&[("channel", "meta")], &[1], 1)];
    let refs: Vec<&Slice> = mixed.iter().collect();
    assert_eq!(
        sum_payloads(&refs),
        Err(ReduceError::AggregationFailed(AggregationFailure::MixedPayloads))
    );
}
