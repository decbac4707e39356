//! Module: signature
//! Responsibility: structured cache-validity fingerprints and the rules that decide
//! whether a cached slice answers the same kind of question as a query.
//! Does not own: which dimension *values* a slice carries (isolation does).
//! Boundary: `can_satisfy` is the only comparison planning performs on signatures.

mod builder;
mod codec;

pub use builder::{
    CoreSignatureInputs, EventIdentity, QueryShape, TemporalMode, compute_core_hash,
};

use crate::slice::normalize_key;
use std::{collections::BTreeMap, fmt};

///
/// StructuredSignature
///
/// `core_hash` covers everything that changes what is asked of the source,
/// minus dimension filters. `dimension_hashes` maps each dimension key to a
/// fingerprint of that dimension's definition at fetch time.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StructuredSignature {
    core_hash: String,
    dimension_hashes: BTreeMap<String, String>,
}

impl StructuredSignature {
    #[must_use]
    pub fn core_hash(&self) -> &str {
        &self.core_hash
    }

    #[must_use]
    pub const fn dimension_hashes(&self) -> &BTreeMap<String, String> {
        &self.dimension_hashes
    }
}

///
/// Signature
///
/// Legacy or malformed fingerprints parse to `Legacy`, which satisfies nothing
/// and is satisfied by nothing. Exactly one re-fetch replaces them.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Signature {
    Structured(StructuredSignature),
    Legacy { raw: String },
}

impl Signature {
    /// Build a structured signature; keys are normalized.
    pub fn structured<K, V>(
        core_hash: impl Into<String>,
        dimension_hashes: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let dimension_hashes = dimension_hashes
            .into_iter()
            .map(|(key, hash)| (normalize_key(key.as_ref()), hash.into()))
            .collect();

        Self::Structured(StructuredSignature {
            core_hash: core_hash.into(),
            dimension_hashes,
        })
    }

    /// Parse the wire form. Never fails: anything unrecognised is `Legacy`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        codec::decode(raw)
    }

    #[must_use]
    pub const fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy { .. })
    }

    /// Core hash, or `None` for the legacy sentinel.
    #[must_use]
    pub fn core_hash(&self) -> Option<&str> {
        match self {
            Self::Structured(sig) => Some(sig.core_hash()),
            Self::Legacy { .. } => None,
        }
    }

    #[must_use]
    pub fn dimension_hash(&self, key: &str) -> Option<&str> {
        match self {
            Self::Structured(sig) => sig.dimension_hashes.get(key).map(String::as_str),
            Self::Legacy { .. } => None,
        }
    }

    /// Keep only the listed dimension hashes (query-side projection).
    #[must_use]
    pub fn restricted_to<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Self {
        match self {
            Self::Structured(sig) => {
                let dimension_hashes = keys
                    .into_iter()
                    .filter_map(|key| {
                        sig.dimension_hashes
                            .get_key_value(key)
                            .map(|(k, v)| (k.clone(), v.clone()))
                    })
                    .collect();

                Self::Structured(StructuredSignature {
                    core_hash: sig.core_hash.clone(),
                    dimension_hashes,
                })
            }
            Self::Legacy { raw } => Self::Legacy { raw: raw.clone() },
        }
    }

    fn usable(&self) -> Option<&StructuredSignature> {
        match self {
            Self::Structured(sig) if !sig.core_hash.is_empty() => Some(sig),
            _ => None,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured(sig) => f.write_str(&codec::encode(sig).map_err(|_| fmt::Error)?),
            Self::Legacy { raw } => f.write_str(raw),
        }
    }
}

impl serde::Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

///
/// IncompatibleReason
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IncompatibleReason {
    /// One side is the legacy/unparseable sentinel (or carries an empty core).
    LegacySignature,
    CoreMismatch,
    MissingDimension(String),
    DimensionDefinitionChanged(String),
}

impl fmt::Display for IncompatibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LegacySignature => f.write_str("legacy or unstructured signature"),
            Self::CoreMismatch => f.write_str("core hash mismatch"),
            Self::MissingDimension(key) => write!(f, "cache lacks dimension '{key}'"),
            Self::DimensionDefinitionChanged(key) => {
                write!(f, "definition of dimension '{key}' changed")
            }
        }
    }
}

///
/// SignatureMatch
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SignatureMatch {
    Compatible,
    Incompatible(IncompatibleReason),
}

impl SignatureMatch {
    #[must_use]
    pub const fn is_compatible(&self) -> bool {
        matches!(self, Self::Compatible)
    }
}

/// Decide whether data cached under `cache` answers a query fingerprinted as `query`.
///
/// Rules, in order: core hashes must be equal; every query dimension must be
/// present in the cache with an equal hash; extra cache dimensions are allowed.
#[must_use]
pub fn can_satisfy(cache: &Signature, query: &Signature) -> SignatureMatch {
    let (Some(cache), Some(query)) = (cache.usable(), query.usable()) else {
        return SignatureMatch::Incompatible(IncompatibleReason::LegacySignature);
    };

    if cache.core_hash != query.core_hash {
        return SignatureMatch::Incompatible(IncompatibleReason::CoreMismatch);
    }

    for (key, query_hash) in &query.dimension_hashes {
        match cache.dimension_hashes.get(key) {
            None => {
                return SignatureMatch::Incompatible(IncompatibleReason::MissingDimension(
                    key.clone(),
                ));
            }
            Some(cache_hash) if cache_hash != query_hash => {
                return SignatureMatch::Incompatible(
                    IncompatibleReason::DimensionDefinitionChanged(key.clone()),
                );
            }
            Some(_) => {}
        }
    }

    SignatureMatch::Compatible
}
