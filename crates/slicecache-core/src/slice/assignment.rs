use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Canonical form of a dimension key: trimmed, lower-cased.
#[must_use]
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

///
/// DimensionAssignment
///
/// Dimension key → concrete value. At most one value per key by construction;
/// `BTreeMap` ordering is the canonical key order wherever an assignment is
/// used as an index.
///

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct DimensionAssignment(BTreeMap<String, String>);

impl DimensionAssignment {
    /// The empty (fully aggregated / dimensionless) assignment.
    #[must_use]
    pub const fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut out = Self::empty();
        for (key, value) in pairs {
            out.insert(key.as_ref(), value.as_ref());
        }

        out
    }

    /// Builder form of [`Self::insert`].
    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.insert(key, value);
        self
    }

    /// Set `key` to `value`, returning the previous value if any.
    pub fn insert(&mut self, key: &str, value: &str) -> Option<String> {
        self.0
            .insert(normalize_key(key), value.trim().to_string())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// True when every `(key, value)` of `query` is present here with an equal value.
    #[must_use]
    pub fn satisfies(&self, query: &Self) -> bool {
        query
            .0
            .iter()
            .all(|(key, value)| self.0.get(key) == Some(value))
    }

    /// Keys present here but absent from `query`, in canonical order.
    #[must_use]
    pub fn extra_keys(&self, query: &Self) -> Vec<String> {
        self.0
            .keys()
            .filter(|key| !query.0.contains_key(*key))
            .cloned()
            .collect()
    }

    /// Restrict to the listed keys.
    #[must_use]
    pub fn project<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Self {
        let mut out = Self::empty();
        for key in keys {
            if let Some((k, v)) = self.0.get_key_value(key) {
                out.0.insert(k.clone(), v.clone());
            }
        }

        out
    }

    /// Union with `other`; `other` wins on shared keys.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.0
            .extend(other.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }

    /// `context(k1:v1).context(k2:v2)` in key order; empty for no dimensions.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("context({k}:{v})"))
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for DimensionAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("(all)")
        } else {
            f.write_str(&self.canonical())
        }
    }
}

impl From<BTreeMap<String, String>> for DimensionAssignment {
    fn from(raw: BTreeMap<String, String>) -> Self {
        Self::from_pairs(raw)
    }
}

impl From<DimensionAssignment> for BTreeMap<String, String> {
    fn from(assignment: DimensionAssignment) -> Self {
        assignment.0
    }
}
