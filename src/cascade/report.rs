use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Which keys a report carries for the root entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportConvention {
    /// Reproduces the historical shapes: entities with dependents report only
    /// dependent keys, and the root's own count is folded in only when the
    /// root is also one of its own dependents and the operation mutates.
    #[default]
    Legacy,
    /// The root's own affected count is always recorded under its key.
    Normalized,
}

/// How far a cascade follows an entity's link to itself (Category parents)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfReferencePolicy {
    /// Direct children only; grandchildren are left untouched
    #[default]
    OneHop,
    /// The full subtree below the matched roots
    Transitive,
}

impl FromStr for ReportConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(ReportConvention::Legacy),
            "normalized" | "normalised" => Ok(ReportConvention::Normalized),
            other => Err(format!("unknown report convention: {}", other)),
        }
    }
}

impl FromStr for SelfReferencePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "one_hop" | "onehop" => Ok(SelfReferencePolicy::OneHop),
            "transitive" => Ok(SelfReferencePolicy::Transitive),
            other => Err(format!("unknown self-reference policy: {}", other)),
        }
    }
}

/// Per-entity outcome of a cascade, in the order entities were processed.
///
/// Serializes as a plain JSON object, e.g. `{"routeRole": 3, "userRole": 1}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    entries: Vec<(String, u64)>,
    root_count: u64,
    partial: bool,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` under `key`, merging with an existing entry
    pub fn add(&mut self, key: &str, count: u64) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing += count,
            None => self.entries.push((key.to_string(), count)),
        }
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, v)| v).sum()
    }

    pub fn is_all_zero(&self) -> bool {
        self.entries.iter().all(|(_, v)| *v == 0)
    }

    /// Records of the root entity matched or affected, whatever the key convention
    pub fn root_count(&self) -> u64 {
        self.root_count
    }

    pub(crate) fn set_root_count(&mut self, count: u64) {
        self.root_count = count;
    }

    /// True when the cascade stopped before acting on every entity
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub(crate) fn mark_partial(&mut self) {
        self.partial = true;
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, count) in &self.entries {
            map.serialize_entry(key, count)?;
        }
        map.end()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", parts.join(", "))?;
        if self.partial {
            write!(f, " (partial)")?;
        }
        Ok(())
    }
}
