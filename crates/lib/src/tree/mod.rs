//! Hierarchical storage of mappings.
//!
//! An [`EntryTree`] stores mappings in a tree following entry ancestry: top-level
//! classes are roots, and every entry sits below its parent. Intermediate nodes may
//! exist without a mapping of their own, but a node with neither a mapping nor
//! children is always pruned, so removing the last mapping of a subtree removes
//! the whole path.
//!
//! Children keep insertion order, which is also the order a snapshot of the tree
//! is written in.

use indexmap::IndexMap;

use crate::{entry::Entry, mapping::EntryMapping};

pub mod delta;

pub use delta::{DeltaTrackingTree, MappingChange, MappingDelta};

/// A single node of an [`EntryTree`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntryTreeNode {
    entry: Entry,
    mapping: Option<EntryMapping>,
    children: IndexMap<Entry, EntryTreeNode>,
}

impl EntryTreeNode {
    fn new(entry: Entry) -> Self {
        Self {
            entry,
            mapping: None,
            children: IndexMap::new(),
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn mapping(&self) -> Option<&EntryMapping> {
        self.mapping.as_ref()
    }

    pub fn has_mapping(&self) -> bool {
        self.mapping.is_some()
    }

    pub fn children(&self) -> impl ExactSizeIterator<Item = &EntryTreeNode> {
        self.children.values()
    }

    pub fn child(&self, entry: &Entry) -> Option<&EntryTreeNode> {
        self.children.get(entry)
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// A node with no mapping and no children carries nothing.
    fn is_prunable(&self) -> bool {
        self.mapping.is_none() && self.children.is_empty()
    }

    /// This node and all nodes below it, in pre-order.
    pub fn nodes(&self) -> Iter<'_> {
        Iter { stack: vec![self] }
    }
}

/// Mappings of entries, organised by ancestry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryTree {
    roots: IndexMap<Entry, EntryTreeNode>,
}

impl EntryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mapping of `entry`, creating intermediate nodes as needed.
    ///
    /// Returns the mapping previously stored for the entry.
    pub fn insert(&mut self, entry: Entry, mapping: EntryMapping) -> Option<EntryMapping> {
        let mut ancestry = entry.ancestry();
        ancestry.pop();

        let mut nodes = &mut self.roots;
        for ancestor in ancestry {
            nodes = &mut nodes
                .entry(ancestor.clone())
                .or_insert_with(|| EntryTreeNode::new(ancestor))
                .children;
        }

        nodes
            .entry(entry.clone())
            .or_insert_with(|| EntryTreeNode::new(entry))
            .mapping
            .replace(mapping)
    }

    /// Remove the mapping of `entry`, pruning any node left empty on its path.
    ///
    /// Children of the entry keep their mappings. Returns the removed mapping.
    pub fn remove(&mut self, entry: &Entry) -> Option<EntryMapping> {
        remove_in(&mut self.roots, &entry.ancestry())
    }

    pub fn get(&self, entry: &Entry) -> Option<&EntryMapping> {
        self.find_node(entry)?.mapping()
    }

    pub fn contains(&self, entry: &Entry) -> bool {
        self.get(entry).is_some()
    }

    pub fn find_node(&self, entry: &Entry) -> Option<&EntryTreeNode> {
        let ancestry = entry.ancestry();
        let (root, rest) = ancestry.split_first()?;
        let mut node = self.roots.get(root)?;
        for ancestor in rest {
            node = node.children.get(ancestor)?;
        }
        Some(node)
    }

    /// The entries directly below `entry`.
    pub fn children(&self, entry: &Entry) -> Vec<&Entry> {
        self.find_node(entry)
            .map(|node| node.children().map(EntryTreeNode::entry).collect())
            .unwrap_or_default()
    }

    /// Nodes sharing the parent of `entry`, excluding `entry` itself.
    ///
    /// For top-level classes these are the other root nodes.
    pub fn siblings(&self, entry: &Entry) -> Vec<&EntryTreeNode> {
        let candidates: Box<dyn Iterator<Item = &EntryTreeNode> + '_> = match entry.parent() {
            None => Box::new(self.roots.values()),
            Some(parent) => match self.find_node(&parent) {
                Some(node) => Box::new(node.children()),
                None => return Vec::new(),
            },
        };
        candidates.filter(|node| node.entry() != entry).collect()
    }

    pub fn root_nodes(&self) -> impl ExactSizeIterator<Item = &EntryTreeNode> {
        self.roots.values()
    }

    /// Every node of the tree, in pre-order.
    pub fn iter(&self) -> Iter<'_> {
        let mut stack: Vec<_> = self.roots.values().collect();
        stack.reverse();
        Iter { stack }
    }

    /// Visit every node of the tree, in pre-order.
    pub fn for_each(&self, mut visitor: impl FnMut(&EntryTreeNode)) {
        self.iter().for_each(|node| visitor(node));
    }

    /// Every entry that has a mapping, with that mapping.
    pub fn mappings(&self) -> impl Iterator<Item = (&Entry, &EntryMapping)> {
        self.iter()
            .filter_map(|node| node.mapping().map(|mapping| (node.entry(), mapping)))
    }

    pub fn all_entries(&self) -> impl Iterator<Item = &Entry> {
        self.mappings().map(|(entry, _)| entry)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Number of entries that have a mapping.
    pub fn len(&self) -> usize {
        self.mappings().count()
    }
}

fn remove_in(nodes: &mut IndexMap<Entry, EntryTreeNode>, path: &[Entry]) -> Option<EntryMapping> {
    let (head, rest) = path.split_first()?;
    let node = nodes.get_mut(head)?;
    let removed = if rest.is_empty() {
        node.mapping.take()
    } else {
        remove_in(&mut node.children, rest)
    };
    if node.is_prunable() {
        nodes.shift_remove(head);
    }
    removed
}

impl FromIterator<(Entry, EntryMapping)> for EntryTree {
    fn from_iter<I: IntoIterator<Item = (Entry, EntryMapping)>>(iter: I) -> Self {
        let mut tree = EntryTree::new();
        for (entry, mapping) in iter {
            tree.insert(entry, mapping);
        }
        tree
    }
}

/// Write access to a tree of mappings.
///
/// Implemented by [`EntryTree`] and by [`DeltaTrackingTree`], which records the writes.
pub trait MappingStore {
    fn tree(&self) -> &EntryTree;

    fn insert_mapping(&mut self, entry: Entry, mapping: EntryMapping) -> Option<EntryMapping>;

    fn remove_mapping(&mut self, entry: &Entry) -> Option<EntryMapping>;
}

impl MappingStore for EntryTree {
    fn tree(&self) -> &EntryTree {
        self
    }

    fn insert_mapping(&mut self, entry: Entry, mapping: EntryMapping) -> Option<EntryMapping> {
        self.insert(entry, mapping)
    }

    fn remove_mapping(&mut self, entry: &Entry) -> Option<EntryMapping> {
        self.remove(entry)
    }
}

/// Pre-order iterator over the nodes of a tree.
#[derive(Debug)]
pub struct Iter<'a> {
    stack: Vec<&'a EntryTreeNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a EntryTreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.values().rev());
        Some(node)
    }
}

impl<'a> IntoIterator for &'a EntryTree {
    type Item = &'a EntryTreeNode;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
