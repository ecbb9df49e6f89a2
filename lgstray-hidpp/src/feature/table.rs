//! The mapping from feature IDs to feature indices of a single device.

use std::collections::BTreeMap;

/// Maps the feature IDs a device supports to their index in its feature
/// table.
///
/// A table is built once per discovery. Rediscovering a device produces a new
/// table instead of patching the old one.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FeatureTable {
    indices: BTreeMap<u16, u8>,
}

impl FeatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that feature `id` lives at `index`, replacing an earlier entry
    /// for the same ID.
    pub fn insert(&mut self, id: u16, index: u8) {
        self.indices.insert(id, index);
    }

    /// Looks up the index of a feature.
    ///
    /// Returns [`None`] for features that were not discovered.
    pub fn index_of(&self, id: u16) -> Option<u8> {
        self.indices.get(&id).copied()
    }

    pub fn contains(&self, id: u16) -> bool {
        self.indices.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Iterates over all `(feature ID, feature index)` pairs, ordered by ID.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u8)> + '_ {
        self.indices.iter().map(|(&id, &index)| (id, index))
    }
}

impl FromIterator<(u16, u8)> for FeatureTable {
    fn from_iter<T: IntoIterator<Item = (u16, u8)>>(iter: T) -> Self {
        Self {
            indices: iter.into_iter().collect(),
        }
    }
}
