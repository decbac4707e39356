//! Core-hash derivation.
//!
//! Included: connection identity, event ids with their resolved definition
//! content, filter predicates (order-insensitive), structural query shape.
//! Excluded: event labels, dimension filters, date windows.

use crate::hash::{finish_hex, write_str, write_str_list, write_tag, write_u32};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use std::fmt;

///
/// TemporalMode
///
/// Window queries count events by event date; cohort queries count by the
/// date the cohort entered. Data from one never answers the other.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalMode {
    #[default]
    Window,
    Cohort,
}

impl TemporalMode {
    const fn hash_tag(self) -> u8 {
        match self {
            Self::Window => 0x41,
            Self::Cohort => 0x42,
        }
    }
}

impl fmt::Display for TemporalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Window => f.write_str("window"),
            Self::Cohort => f.write_str("cohort"),
        }
    }
}

///
/// EventIdentity
///
/// Stable id plus resolved definition. `label` is display-only and never hashed.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct EventIdentity {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub definition: JsonValue,
}

impl EventIdentity {
    pub fn new(id: impl Into<String>, definition: JsonValue) -> Self {
        Self {
            id: id.into(),
            label: None,
            definition,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

///
/// QueryShape
///
/// Structural funnel shape: the from/to events, required intermediate
/// events, excluded events, and temporal mode.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct QueryShape {
    pub mode: TemporalMode,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub visited: Vec<String>,
    #[serde(default)]
    pub excluded: Vec<String>,
}

///
/// CoreSignatureInputs
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct CoreSignatureInputs {
    pub connection: String,
    #[serde(default)]
    pub events: Vec<EventIdentity>,
    #[serde(default)]
    pub filters: Vec<String>,
    pub shape: QueryShape,
}

/// Compute the hex core hash for one set of query inputs.
#[must_use]
pub fn compute_core_hash(inputs: &CoreSignatureInputs) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"coresig:v1");

    write_tag(&mut hasher, 0x01);
    write_str(&mut hasher, inputs.connection.trim());

    let mut events: Vec<&EventIdentity> = inputs.events.iter().collect();
    events.sort_by(|a, b| a.id.cmp(&b.id));
    events.dedup_by(|a, b| a.id == b.id);
    write_tag(&mut hasher, 0x02);
    write_u32(&mut hasher, u32::try_from(events.len()).unwrap_or(u32::MAX));
    for event in events {
        write_str(&mut hasher, &event.id);
        write_str(&mut hasher, &canonical_json(&event.definition));
    }

    write_tag(&mut hasher, 0x03);
    let filters = sorted_unique(&inputs.filters);
    write_str_list(&mut hasher, filters.iter().map(String::as_str));

    let shape = &inputs.shape;
    write_tag(&mut hasher, 0x04);
    write_tag(&mut hasher, shape.mode.hash_tag());
    write_str(&mut hasher, &shape.from);
    write_str(&mut hasher, &shape.to);
    let visited = sorted_unique(&shape.visited);
    write_str_list(&mut hasher, visited.iter().map(String::as_str));
    let excluded = sorted_unique(&shape.excluded);
    write_str_list(&mut hasher, excluded.iter().map(String::as_str));

    finish_hex(hasher)
}

fn sorted_unique(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values.iter().map(|v| v.trim().to_string()).collect();
    out.sort();
    out.dedup();
    out
}

/// JSON text with object keys sorted at every depth.
pub(crate) fn canonical_json(value: &JsonValue) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, child)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&JsonValue::String(key.clone()).to_string());
                out.push(':');
                write_canonical(child, out);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, child) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(child, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
