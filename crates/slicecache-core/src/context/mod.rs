//! Module: context
//! Responsibility: read-only view of dimension definitions and the per-policy
//! rules for when a set of observed values forms a complete partition.
//! Does not own: summing (reduce) or where definitions come from.
//! Boundary: planning reaches definitions only through `ContextRegistry`.

mod policy;
#[cfg(test)]
mod tests;

pub use policy::{PartitionStatus, PolicyFailure, evaluate_partition};

use crate::{
    hash::{finish_hex, write_str, write_str_list, write_tag},
    slice::normalize_key,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

pub const DEFAULT_OTHER_VALUE: &str = "other";

///
/// AggregationPolicy
///
/// Governs whether summing across a dimension yields a valid total.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    /// Enumerated values are complete; no catch-all.
    #[default]
    Closed,
    /// Enumerated values plus a synthesized catch-all.
    ComputedOther,
    /// Enumerated values plus a catch-all with its own definition.
    ExplicitOther,
    /// Enumeration known incomplete; sums are never a total.
    Open,
}

impl AggregationPolicy {
    /// True when the expected value set includes the catch-all.
    #[must_use]
    pub const fn has_catch_all(self) -> bool {
        matches!(self, Self::ComputedOther | Self::ExplicitOther)
    }

    /// True for policies that can ever yield a complete partition.
    #[must_use]
    pub const fn is_closed_family(self) -> bool {
        !matches!(self, Self::Open)
    }

    const fn hash_tag(self) -> u8 {
        match self {
            Self::Closed => 0x51,
            Self::ComputedOther => 0x52,
            Self::ExplicitOther => 0x53,
            Self::Open => 0x54,
        }
    }
}

impl fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Closed => "closed",
            Self::ComputedOther => "computed_other",
            Self::ExplicitOther => "explicit_other",
            Self::Open => "open",
        };
        f.write_str(label)
    }
}

///
/// ContextDefinition
///
/// Known values for one dimension key plus its aggregation policy.
/// Values are trimmed, sorted and de-duplicated on construction.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ContextDefinition {
    key: String,
    values: Vec<String>,
    #[serde(default)]
    policy: AggregationPolicy,
    #[serde(default = "default_other_value")]
    other_value: String,
}

fn default_other_value() -> String {
    DEFAULT_OTHER_VALUE.to_string()
}

impl ContextDefinition {
    pub fn new<V: AsRef<str>>(
        key: &str,
        values: impl IntoIterator<Item = V>,
        policy: AggregationPolicy,
    ) -> Self {
        let values: BTreeSet<String> = values
            .into_iter()
            .map(|value| value.as_ref().trim().to_string())
            .collect();

        Self {
            key: normalize_key(key),
            values: values.into_iter().collect(),
            policy,
            other_value: default_other_value(),
        }
    }

    #[must_use]
    pub fn with_other_value(mut self, other: &str) -> Self {
        self.other_value = other.trim().to_string();
        self
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    #[must_use]
    pub const fn policy(&self) -> AggregationPolicy {
        self.policy
    }

    #[must_use]
    pub fn other_value(&self) -> &str {
        &self.other_value
    }

    /// Every value a complete partition must contain. `Open` has no complete
    /// partition, so this is just its enumeration.
    #[must_use]
    pub fn expected_values(&self) -> BTreeSet<String> {
        let mut out: BTreeSet<String> = self.values.iter().cloned().collect();
        if self.policy.has_catch_all() {
            out.insert(self.other_value.clone());
        }

        out
    }

    #[must_use]
    pub fn recognises(&self, value: &str) -> bool {
        self.values.iter().any(|known| known == value)
            || (self.policy.has_catch_all() && self.other_value == value)
    }

    #[must_use]
    pub fn definition_hash(&self) -> String {
        dimension_definition_hash(self)
    }
}

/// Fingerprint of a dimension definition as stored in cache signatures.
///
/// Covers the key, the sorted value set, the policy, and the catch-all id.
#[must_use]
pub fn dimension_definition_hash(def: &ContextDefinition) -> String {
    let mut hasher = Sha256::new();
    write_str(&mut hasher, "dimdef:v1");

    write_tag(&mut hasher, 0x01);
    write_str(&mut hasher, &def.key);

    write_tag(&mut hasher, 0x02);
    write_str_list(&mut hasher, def.values.iter().map(String::as_str));

    write_tag(&mut hasher, def.policy.hash_tag());

    write_tag(&mut hasher, 0x03);
    if def.policy.has_catch_all() {
        write_str(&mut hasher, &def.other_value);
    } else {
        write_str(&mut hasher, "");
    }

    finish_hex(hasher)
}

///
/// ContextRegistry
///
/// External, read-only source of dimension definitions.
///

pub trait ContextRegistry: Send + Sync {
    fn get_definition(&self, key: &str) -> Option<ContextDefinition>;
}

///
/// MemoryContextRegistry
///

#[derive(Clone, Debug, Default)]
pub struct MemoryContextRegistry {
    definitions: BTreeMap<String, ContextDefinition>,
}

impl MemoryContextRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the definition for its key.
    pub fn insert(&mut self, def: ContextDefinition) -> Option<ContextDefinition> {
        self.definitions.insert(def.key.clone(), def)
    }

    #[must_use]
    pub fn with(mut self, def: ContextDefinition) -> Self {
        self.insert(def);
        self
    }
}

impl ContextRegistry for MemoryContextRegistry {
    fn get_definition(&self, key: &str) -> Option<ContextDefinition> {
        self.definitions.get(&normalize_key(key)).cloned()
    }
}

impl FromIterator<ContextDefinition> for MemoryContextRegistry {
    fn from_iter<I: IntoIterator<Item = ContextDefinition>>(iter: I) -> Self {
        let mut registry = Self::new();
        for def in iter {
            registry.insert(def);
        }

        registry
    }
}
