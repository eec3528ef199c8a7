//! Mapping values attached to entries, and the changes users make to them.
//!
//! An [`EntryMapping`] is the deobfuscated name and documentation of one entry.
//! An [`EntryChange`] describes an edit to a mapping as independent tri-state
//! changes to its name and its documentation, which is the unit users propose
//! and the server broadcasts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{entry::Entry, tree::MappingStore};

pub mod validation;
pub mod validator;

pub use validation::{Message, ParameterizedMessage, Severity, ValidationContext, ValidationError};
pub use validator::MappingValidator;

/// Provenance of a mapping's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Named by a user.
    User,
    /// Proposed from information present in the binary.
    JarProposed,
    /// Proposed at runtime from other mappings.
    DynamicProposed,
    /// No name: the entry stays obfuscated.
    Obfuscated,
}

impl TokenType {
    pub fn is_proposed(self) -> bool {
        matches!(self, TokenType::JarProposed | TokenType::DynamicProposed)
    }
}

/// The deobfuscated name and documentation of an entry.
///
/// A mapping without a target name is an entry explicitly marked as obfuscated,
/// which is different from the entry having no mapping at all. The token type is
/// kept consistent with the name: `Obfuscated` if and only if there is no name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryMapping {
    target_name: Option<String>,
    javadoc: Option<String>,
    token_type: TokenType,
}

impl Default for EntryMapping {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl EntryMapping {
    /// No name, no documentation.
    pub const DEFAULT: EntryMapping = EntryMapping {
        target_name: None,
        javadoc: None,
        token_type: TokenType::Obfuscated,
    };

    /// Create a mapping, normalizing blank values to `None` and the token type to the name.
    pub fn new(
        target_name: Option<String>,
        javadoc: Option<String>,
        token_type: TokenType,
    ) -> Self {
        let target_name = normalize_name(target_name);
        let javadoc = javadoc.filter(|doc| !doc.is_empty());
        let token_type = match (&target_name, token_type) {
            (None, _) => TokenType::Obfuscated,
            (Some(_), TokenType::Obfuscated) => TokenType::User,
            (Some(_), token_type) => token_type,
        };
        Self {
            target_name,
            javadoc,
            token_type,
        }
    }

    /// A user-provided name without documentation.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(Some(name.into()), None, TokenType::User)
    }

    pub fn target_name(&self) -> Option<&str> {
        self.target_name.as_deref()
    }

    pub fn javadoc(&self) -> Option<&str> {
        self.javadoc.as_deref()
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }

    pub fn with_name(&self, name: Option<String>, token_type: TokenType) -> Self {
        Self::new(name, self.javadoc.clone(), token_type)
    }

    pub fn with_javadoc(&self, javadoc: Option<String>) -> Self {
        Self::new(self.target_name.clone(), javadoc, self.token_type)
    }
}

fn normalize_name(name: Option<String>) -> Option<String> {
    let name = name?;
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == name.len() {
        Some(name)
    } else {
        Some(trimmed.to_string())
    }
}

/// A change to a single optional value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TristateChange<T> {
    /// Keep the current value.
    #[default]
    Unchanged,
    /// Replace the value.
    Set(T),
    /// Remove the value.
    Reset,
}

impl<T> TristateChange<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, TristateChange::Unchanged)
    }

    pub fn is_set(&self) -> bool {
        matches!(self, TristateChange::Set(_))
    }

    pub fn is_reset(&self) -> bool {
        matches!(self, TristateChange::Reset)
    }

    /// The new value, if this change sets one.
    pub fn new_value(&self) -> Option<&T> {
        match self {
            TristateChange::Set(value) => Some(value),
            _ => None,
        }
    }

    /// Resolve the change against the current value.
    pub fn apply(&self, current: Option<T>) -> Option<T>
    where
        T: Clone,
    {
        match self {
            TristateChange::Unchanged => current,
            TristateChange::Set(value) => Some(value.clone()),
            TristateChange::Reset => None,
        }
    }
}

impl<T: fmt::Display> fmt::Display for TristateChange<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TristateChange::Unchanged => f.write_str("unchanged"),
            TristateChange::Set(value) => write!(f, "set({value})"),
            TristateChange::Reset => f.write_str("reset"),
        }
    }
}

/// An edit to the mapping of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryChange {
    target: Entry,
    deobf_name: TristateChange<String>,
    javadoc: TristateChange<String>,
}

impl EntryChange {
    /// A change to `target` that does not modify anything yet.
    pub fn modify(target: impl Into<Entry>) -> Self {
        Self {
            target: target.into(),
            deobf_name: TristateChange::Unchanged,
            javadoc: TristateChange::Unchanged,
        }
    }

    /// A change that turns any mapping of `target` into `mapping`.
    pub fn from_mapping(target: impl Into<Entry>, mapping: &EntryMapping) -> Self {
        let change = Self::modify(target);
        let change = match mapping.target_name() {
            Some(name) => change.with_deobf_name(name),
            None => change.clear_deobf_name(),
        };
        match mapping.javadoc() {
            Some(javadoc) => change.with_javadoc(javadoc),
            None => change.clear_javadoc(),
        }
    }

    pub fn with_deobf_name(self, name: impl Into<String>) -> Self {
        Self {
            deobf_name: TristateChange::Set(name.into()),
            ..self
        }
    }

    pub fn clear_deobf_name(self) -> Self {
        Self {
            deobf_name: TristateChange::Reset,
            ..self
        }
    }

    pub fn with_javadoc(self, javadoc: impl Into<String>) -> Self {
        Self {
            javadoc: TristateChange::Set(javadoc.into()),
            ..self
        }
    }

    pub fn clear_javadoc(self) -> Self {
        Self {
            javadoc: TristateChange::Reset,
            ..self
        }
    }

    pub(crate) fn with_fields(
        target: Entry,
        deobf_name: TristateChange<String>,
        javadoc: TristateChange<String>,
    ) -> Self {
        Self {
            target,
            deobf_name,
            javadoc,
        }
    }

    pub fn target(&self) -> &Entry {
        &self.target
    }

    pub fn deobf_name(&self) -> &TristateChange<String> {
        &self.deobf_name
    }

    pub fn javadoc(&self) -> &TristateChange<String> {
        &self.javadoc
    }

    /// Whether the change leaves every field untouched.
    pub fn is_empty(&self) -> bool {
        self.deobf_name.is_unchanged() && self.javadoc.is_unchanged()
    }

    /// Apply this change to `previous`, producing the resulting mapping.
    ///
    /// Setting a name makes it a user name; resetting it marks the entry obfuscated.
    pub fn apply_to(&self, previous: &EntryMapping) -> EntryMapping {
        let token_type = match self.deobf_name {
            TristateChange::Unchanged => previous.token_type(),
            TristateChange::Set(_) => TokenType::User,
            TristateChange::Reset => TokenType::Obfuscated,
        };
        let name = self
            .deobf_name
            .apply(previous.target_name().map(str::to_string));
        let javadoc = self.javadoc.apply(previous.javadoc().map(str::to_string));
        EntryMapping::new(name, javadoc, token_type)
    }
}

impl fmt::Display for EntryChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EntryChange {{ target: {}, deobf_name: {}, javadoc: {} }}",
            self.target, self.deobf_name, self.javadoc
        )
    }
}

/// The mapping `change` produces when applied to `previous`.
pub fn apply_change(previous: &EntryMapping, change: &EntryChange) -> EntryMapping {
    change.apply_to(previous)
}

/// Validate `change` against `store` and, if nothing blocks it, write the result.
///
/// A result equal to [`EntryMapping::DEFAULT`] removes the entry instead of storing it.
/// Returns the new mapping, or `None` if the change was rejected; the reasons are
/// left in `vc`.
pub fn put_change<S: MappingStore>(
    store: &mut S,
    change: &EntryChange,
    vc: &mut ValidationContext,
) -> Option<EntryMapping> {
    MappingValidator::new(store.tree()).validate_change(vc, change);
    if !vc.can_proceed() {
        return None;
    }

    let target = change.target();
    let previous = store.tree().get(target).cloned().unwrap_or_default();
    let mapping = apply_change(&previous, change);
    if mapping.is_default() {
        store.remove_mapping(target);
    } else {
        store.insert_mapping(target.clone(), mapping.clone());
    }
    Some(mapping)
}
