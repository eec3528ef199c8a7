//! Rules a change must satisfy before it is applied to a tree.

use super::{EntryChange, EntryMapping, Message, TristateChange, ValidationContext};
use crate::{
    entry::{Entry, EntryKind},
    tree::{EntryTree, EntryTreeNode},
};

const RESERVED_WORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class",
    "const", "continue", "default", "do", "double", "else", "enum", "extends", "false",
    "final", "finally", "float", "for", "goto", "if", "implements", "import", "instanceof",
    "int", "interface", "long", "native", "new", "null", "package", "private", "protected",
    "public", "return", "short", "static", "strictfp", "super", "switch", "synchronized",
    "this", "throw", "throws", "transient", "true", "try", "void", "volatile", "while",
];

/// Checks changes against the mappings of a tree.
#[derive(Debug, Clone, Copy)]
pub struct MappingValidator<'a> {
    tree: &'a EntryTree,
}

impl<'a> MappingValidator<'a> {
    pub fn new(tree: &'a EntryTree) -> Self {
        Self { tree }
    }

    /// Raise every problem `change` would cause into `vc`.
    pub fn validate_change(&self, vc: &mut ValidationContext, change: &EntryChange) {
        if let TristateChange::Set(name) = change.deobf_name() {
            self.validate_rename(vc, change.target(), name);
        }
        if let TristateChange::Set(javadoc) = change.javadoc() {
            validate_javadoc(vc, javadoc);
        }
    }

    pub fn validate_rename(&self, vc: &mut ValidationContext, entry: &Entry, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            vc.raise(Message::EmptyName, Vec::new());
            return;
        }

        if entry.is_top_level_class() {
            name.split('/')
                .for_each(|segment| validate_identifier(vc, segment));
        } else {
            validate_identifier(vc, name);
        }

        self.validate_unique(vc, entry, name);
        if let Entry::LocalVariable(_) = entry {
            self.validate_not_shadowing(vc, entry, name);
        }
    }

    fn validate_unique(&self, vc: &mut ValidationContext, entry: &Entry, name: &str) {
        let conflict = self
            .tree
            .siblings(entry)
            .into_iter()
            .filter(|sibling| conflicts_with(entry, sibling.entry()))
            .any(|sibling| effective_name(sibling) == name);
        if !conflict {
            return;
        }
        match entry.parent() {
            Some(parent) => vc.raise(
                Message::NonUniqueNameClass,
                vec![name.to_string(), self.display_name(&parent)],
            ),
            None => vc.raise(Message::NonUniqueName, vec![name.to_string()]),
        }
    }

    /// A local variable named like a field of its class hides that field.
    fn validate_not_shadowing(&self, vc: &mut ValidationContext, entry: &Entry, name: &str) {
        let class = Entry::Class(entry.containing_class().clone());
        let Some(class_node) = self.tree.find_node(&class) else {
            return;
        };
        let shadows = class_node
            .children()
            .filter(|node| node.entry().kind() == EntryKind::Field)
            .any(|node| effective_name(node) == name);
        if shadows {
            vc.raise(
                Message::ShadowedName,
                vec![name.to_string(), self.display_name(&class)],
            );
        }
    }

    fn display_name(&self, entry: &Entry) -> String {
        self.tree
            .get(entry)
            .and_then(EntryMapping::target_name)
            .unwrap_or(entry.name())
            .to_string()
    }
}

pub fn validate_javadoc(vc: &mut ValidationContext, javadoc: &str) {
    if javadoc.contains("*/") {
        vc.raise(Message::IllegalDocCommentEnd, Vec::new());
    }
}

/// Check that `name` is a Java identifier and not a reserved word.
pub fn validate_identifier(vc: &mut ValidationContext, name: &str) {
    if name.is_empty() {
        vc.raise(Message::EmptyName, Vec::new());
        return;
    }

    for (index, ch) in name.chars().enumerate() {
        let valid = if index == 0 {
            is_identifier_start(ch)
        } else {
            is_identifier_part(ch)
        };
        if !valid {
            vc.raise(
                Message::IllegalIdentifier,
                vec![name.to_string(), ch.to_string(), (index + 1).to_string()],
            );
            return;
        }
    }

    if RESERVED_WORDS.contains(&name) {
        vc.raise(Message::ReservedIdentifier, vec![name.to_string()]);
    }
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// Whether a sibling could clash with `entry` if both had the same name.
fn conflicts_with(entry: &Entry, sibling: &Entry) -> bool {
    match (entry, sibling) {
        (Entry::Method(method), Entry::Method(other)) => method.desc() == other.desc(),
        _ => entry.kind() == sibling.kind(),
    }
}

/// The name a node currently shows: its target name, or its obfuscated name.
fn effective_name(node: &EntryTreeNode) -> &str {
    node.mapping()
        .and_then(EntryMapping::target_name)
        .unwrap_or(node.entry().name())
}
