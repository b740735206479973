use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Why a set of entries is not a bijection onto `0..len`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("index {index} for {id} outside 0..{len}")]
    IndexOutOfRange { id: String, index: usize, len: usize },
    #[error("index {index} assigned to both {first} and {second}")]
    DuplicateIndex {
        index: usize,
        first: String,
        second: String,
    },
}

/// Bijection between external identifiers and dense zero-based node indices
///
/// Immutable once built; persisted as a JSON object `{ "<external id>": index }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMapping {
    forward: HashMap<String, usize>,
    inverse: Vec<String>,
}

impl IdMapping {
    /// Assigns indices in iteration order; duplicates keep their first index
    pub fn from_ordered<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut forward = HashMap::new();
        let mut inverse = Vec::new();
        for id in ids {
            let id = id.into();
            if !forward.contains_key(&id) {
                forward.insert(id.clone(), inverse.len());
                inverse.push(id);
            }
        }
        Self { forward, inverse }
    }

    /// Rebuilds a mapping from `(id, index)` pairs, rejecting anything that is not a
    /// bijection onto `0..len`
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, usize)>,
    ) -> Result<Self, MappingError> {
        let forward: HashMap<String, usize> = entries.into_iter().collect();
        let len = forward.len();
        let mut slots: Vec<Option<String>> = vec![None; len];
        for (id, &idx) in &forward {
            let slot = slots.get_mut(idx).ok_or_else(|| MappingError::IndexOutOfRange {
                id: id.clone(),
                index: idx,
                len,
            })?;
            if let Some(other) = slot {
                return Err(MappingError::DuplicateIndex {
                    index: idx,
                    first: other.clone(),
                    second: id.clone(),
                });
            }
            *slot = Some(id.clone());
        }
        let inverse = slots.into_iter().flatten().collect();
        Ok(Self { forward, inverse })
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.forward.get(id).copied()
    }

    pub fn id_of(&self, index: usize) -> Option<&str> {
        self.inverse.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.inverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inverse.is_empty()
    }

    /// External ids in index order
    pub fn ids(&self) -> &[String] {
        &self.inverse
    }
}

impl Serialize for IdMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let ordered: BTreeMap<&str, usize> =
            self.forward.iter().map(|(k, &v)| (k.as_str(), v)).collect();
        ordered.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for IdMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = HashMap::<String, usize>::deserialize(deserializer)?;
        IdMapping::from_entries(entries).map_err(serde::de::Error::custom)
    }
}
