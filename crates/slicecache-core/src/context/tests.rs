use super::*;

fn present(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn channel(policy: AggregationPolicy) -> ContextDefinition {
    ContextDefinition::new("channel", ["google", "meta"], policy)
}

#[test]
fn closed_policy_is_complete_with_every_value() {
    let status =
        evaluate_partition(&channel(AggregationPolicy::Closed), &present(&["google", "meta"]));

    assert_eq!(status, Ok(PartitionStatus::Complete));
}

#[test]
fn computed_other_requires_the_catch_all() {
    let def = channel(AggregationPolicy::ComputedOther);

    assert_eq!(
        evaluate_partition(&def, &present(&["google", "meta"])),
        Ok(PartitionStatus::PartialButAggregable {
            missing: vec!["other".to_string()]
        })
    );
    assert_eq!(
        evaluate_partition(&def, &present(&["google", "meta", "other"])),
        Ok(PartitionStatus::Complete)
    );
}

#[test]
fn explicit_other_uses_the_configured_catch_all_id() {
    let def = channel(AggregationPolicy::ExplicitOther).with_other_value("rest");

    assert!(def.recognises("rest"));
    assert!(!def.recognises("other"));
    assert_eq!(
        evaluate_partition(&def, &present(&["google", "meta", "rest"])),
        Ok(PartitionStatus::Complete)
    );
}

#[test]
fn open_policy_is_never_complete() {
    let def = channel(AggregationPolicy::Open);

    assert_eq!(
        evaluate_partition(&def, &present(&["google", "meta", "tiktok"])),
        Ok(PartitionStatus::PartialButAggregable { missing: vec![] })
    );
}

#[test]
fn closed_family_rejects_unrecognised_values() {
    let result =
        evaluate_partition(&channel(AggregationPolicy::Closed), &present(&["google", "tiktok"]));

    assert_eq!(
        result,
        Err(PolicyFailure::UnrecognisedValues(vec!["tiktok".to_string()]))
    );
}

#[test]
fn definition_hash_tracks_values_policy_and_catch_all() {
    let base = channel(AggregationPolicy::ComputedOther).definition_hash();

    assert_eq!(
        ContextDefinition::new(
            "Channel",
            ["meta", "google", "meta"],
            AggregationPolicy::ComputedOther
        )
        .definition_hash(),
        base
    );
    assert_ne!(channel(AggregationPolicy::Closed).definition_hash(), base);
    assert_ne!(
        channel(AggregationPolicy::ComputedOther)
            .with_other_value("rest")
            .definition_hash(),
        base
    );
    assert_ne!(
        ContextDefinition::new(
            "channel",
            ["google", "meta", "tiktok"],
            AggregationPolicy::ComputedOther
        )
        .definition_hash(),
        base
    );
}

#[test]
fn catch_all_id_is_ignored_without_a_catch_all() {
    let closed = channel(AggregationPolicy::Closed);

    assert_eq!(
        closed.clone().with_other_value("rest").definition_hash(),
        closed.definition_hash()
    );
}

#[test]
fn memory_registry_normalizes_lookup_keys() {
    let registry: MemoryContextRegistry =
        [channel(AggregationPolicy::Closed)].into_iter().collect();

    assert!(registry.get_definition(" Channel").is_some());
    assert!(registry.get_definition("device").is_none());
}

#[test]
fn definition_deserializes_with_defaults() {
    let def: ContextDefinition =
        serde_json::from_str(r#"{"key":"channel","values":["google","meta"]}"#).unwrap();

    assert_eq!(def.policy(), AggregationPolicy::Closed);
    assert_eq!(def.other_value(), "other");
}
