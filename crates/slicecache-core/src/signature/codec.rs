//! Wire form: `{"c":"<core>","x":{"<key>":"<hash>"}}`.
//!
//! Decoding is total. Plain hash strings from older caches, truncated JSON,
//! and objects of the wrong shape all land on the legacy sentinel.

use super::{Signature, StructuredSignature};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize)]
struct WireOut<'a> {
    c: &'a str,
    x: &'a BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireIn {
    c: String,
    #[serde(default)]
    x: BTreeMap<String, String>,
}

pub(super) fn encode(sig: &StructuredSignature) -> Result<String, serde_json::Error> {
    serde_json::to_string(&WireOut {
        c: &sig.core_hash,
        x: &sig.dimension_hashes,
    })
}

pub(super) fn decode(raw: &str) -> Signature {
    let legacy = || Signature::Legacy {
        raw: raw.to_string(),
    };

    let trimmed = raw.trim();
    if !trimmed.starts_with('{') {
        return legacy();
    }

    match serde_json::from_str::<WireIn>(trimmed) {
        Ok(wire) if !wire.c.is_empty() => Signature::structured(wire.c, wire.x),
        _ => legacy(),
    }
}
