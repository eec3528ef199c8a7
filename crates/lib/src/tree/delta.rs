//! Recording the mutations applied to a tree.
//!
//! The server keeps its canonical mappings in a [`DeltaTrackingTree`] so that the
//! changes made since the last save (or debug dump) can be drained as a
//! [`MappingDelta`].

use std::ops::Deref;

use serde::Serialize;

use super::{EntryTree, MappingStore};
use crate::{entry::Entry, mapping::EntryMapping};

/// One recorded mutation: the mapping of `entry` went from `old` to `new`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingChange {
    #[serde(serialize_with = "serialize_entry")]
    pub entry: Entry,
    pub old: Option<EntryMapping>,
    pub new: Option<EntryMapping>,
}

fn serialize_entry<S: serde::Serializer>(entry: &Entry, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(entry)
}

/// The mutations recorded since the previous [`DeltaTrackingTree::take_delta`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MappingDelta {
    changes: Vec<MappingChange>,
}

impl MappingDelta {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &[MappingChange] {
        &self.changes
    }

    /// Whether any recorded mutation touched `entry`.
    pub fn touches(&self, entry: &Entry) -> bool {
        self.changes.iter().any(|change| &change.entry == entry)
    }
}

impl IntoIterator for MappingDelta {
    type Item = MappingChange;
    type IntoIter = std::vec::IntoIter<MappingChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

/// An [`EntryTree`] that remembers every mutation made through it.
///
/// Reads go through `Deref`; writes must use [`insert`](Self::insert) and
/// [`remove`](Self::remove) so that they are recorded.
#[derive(Debug, Clone, Default)]
pub struct DeltaTrackingTree {
    tree: EntryTree,
    changes: Vec<MappingChange>,
}

impl DeltaTrackingTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: Entry, mapping: EntryMapping) -> Option<EntryMapping> {
        let old = self.tree.insert(entry.clone(), mapping.clone());
        self.changes.push(MappingChange {
            entry,
            old: old.clone(),
            new: Some(mapping),
        });
        old
    }

    /// Remove the mapping of `entry`. Removing an absent mapping records nothing.
    pub fn remove(&mut self, entry: &Entry) -> Option<EntryMapping> {
        let old = self.tree.remove(entry)?;
        self.changes.push(MappingChange {
            entry: entry.clone(),
            old: Some(old.clone()),
            new: None,
        });
        Some(old)
    }

    /// Drain the recorded mutations.
    pub fn take_delta(&mut self) -> MappingDelta {
        MappingDelta {
            changes: std::mem::take(&mut self.changes),
        }
    }

    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn into_inner(self) -> EntryTree {
        self.tree
    }
}

impl From<EntryTree> for DeltaTrackingTree {
    fn from(tree: EntryTree) -> Self {
        Self {
            tree,
            changes: Vec::new(),
        }
    }
}

impl MappingStore for DeltaTrackingTree {
    fn tree(&self) -> &EntryTree {
        &self.tree
    }

    fn insert_mapping(&mut self, entry: Entry, mapping: EntryMapping) -> Option<EntryMapping> {
        self.insert(entry, mapping)
    }

    fn remove_mapping(&mut self, entry: &Entry) -> Option<EntryMapping> {
        self.remove(entry)
    }
}

impl Deref for DeltaTrackingTree {
    type Target = EntryTree;

    fn deref(&self) -> &EntryTree {
        &self.tree
    }
}
