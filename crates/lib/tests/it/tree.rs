use rosetta::{
    ClassEntry, DeltaTrackingTree, Entry, EntryMapping, EntryTree, LocalVariableEntry, MethodEntry,
    tree::MappingStore,
};

use crate::helpers::{class, sample_tree};

fn parameter() -> (ClassEntry, MethodEntry, Entry) {
    let owner = ClassEntry::inner(ClassEntry::new("a"), "a$b");
    let method = MethodEntry::new(owner.clone(), "c", "(IJ)V");
    let parameter = LocalVariableEntry::new(method.clone(), 2, "d", true).into();
    (owner, method, parameter)
}

#[test]
fn test_nested_insert_materializes_every_ancestor() {
    let (owner, method, parameter) = parameter();
    let mut tree = EntryTree::new();
    tree.insert(parameter.clone(), EntryMapping::named("count"));

    for ancestor in parameter.ancestry() {
        let node = tree
            .find_node(&ancestor)
            .unwrap_or_else(|| panic!("Missing node for {ancestor}"));
        assert_eq!(node.has_mapping(), ancestor == parameter);
    }
    assert_eq!(tree.children(&owner.into()), vec![&Entry::from(method)]);
    assert_eq!(tree.root_nodes().count(), 1);
    assert_eq!(tree.len(), 1);
}

#[test]
fn test_removing_leaf_prunes_empty_ancestors() {
    let (_, _, parameter) = parameter();
    let mut tree = EntryTree::new();
    tree.insert(parameter.clone(), EntryMapping::named("count"));

    assert_eq!(tree.remove(&parameter), Some(EntryMapping::named("count")));
    assert!(tree.is_empty());
    assert_eq!(tree.root_nodes().count(), 0);
    assert!(tree.find_node(&class("a")).is_none());
}

#[test]
fn test_every_mapped_entry_is_reachable_from_a_root() {
    let mut tree = sample_tree();
    tree.insert(class("z"), EntryMapping::named("Zebra"));
    tree.remove(&class("b"));

    let mut reachable = Vec::new();
    tree.for_each(|node| {
        if node.has_mapping() {
            reachable.push(node.entry().clone());
        }
    });
    let mut mapped: Vec<Entry> = tree.mappings().map(|(entry, _)| entry.clone()).collect();
    reachable.sort_by_key(ToString::to_string);
    mapped.sort_by_key(ToString::to_string);
    assert_eq!(reachable, mapped);
    assert_eq!(mapped.len(), 3);

    let roots: Vec<String> = tree
        .root_nodes()
        .map(|node| node.entry().to_string())
        .collect();
    assert_eq!(roots, vec!["b", "z"], "Roots keep insertion order");
}

#[test]
fn test_take_delta_twice_returns_empty_second_time() {
    let mut tree = DeltaTrackingTree::from(sample_tree());
    assert!(tree.take_delta().is_empty(), "Initial contents are not a delta");

    tree.insert_mapping(class("a"), EntryMapping::named("Foo"));
    tree.remove_mapping(&class("b"));

    let delta = tree.take_delta();
    assert_eq!(delta.len(), 2);
    assert_eq!(delta.changes()[1].old, Some(EntryMapping::named("Player")));
    assert!(tree.take_delta().is_empty());
    assert!(!tree.is_dirty());
}
