//!
//! Defines the identity of a nameable symbol (`Entry`) and its variants.
//!
//! An `Entry` names a class, field, method or local variable of the binary being
//! mapped. Entries are immutable values compared structurally: two entries are equal
//! when their kind, name, descriptor and whole parent chain are equal. Parents are
//! shared through `Arc`, so cloning an entry never copies its ancestry.

use std::{borrow::Cow, fmt, sync::Arc};

/// The kind of symbol an [`Entry`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKind {
    Class,
    Field,
    Method,
    LocalVariable,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryKind::Class => "class",
            EntryKind::Field => "field",
            EntryKind::Method => "method",
            EntryKind::LocalVariable => "local variable",
        };
        f.write_str(name)
    }
}

/// A class, either top-level or nested inside another class.
///
/// The name of a top-level class uses `/` as package separator (`net/example/a`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassEntry {
    parent: Option<Arc<ClassEntry>>,
    name: String,
}

impl ClassEntry {
    /// Create a top-level class.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            parent: None,
            name: name.into(),
        }
    }

    /// Create a class nested inside `parent`.
    pub fn inner(parent: ClassEntry, name: impl Into<String>) -> Self {
        Self {
            parent: Some(Arc::new(parent)),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&ClassEntry> {
        self.parent.as_deref()
    }

    pub fn is_inner(&self) -> bool {
        self.parent.is_some()
    }

    /// The name without its package (or outer class) prefix.
    pub fn simple_name(&self) -> &str {
        simple_name(&self.name)
    }

    /// The package of a top-level class, if it has one.
    pub fn package_name(&self) -> Option<&str> {
        if self.is_inner() {
            return None;
        }
        self.name.rfind('/').map(|idx| &self.name[..idx])
    }

    /// The type descriptor of this class, e.g. `Lnet/example/a;`.
    pub fn descriptor(&self) -> String {
        format!("L{};", self.name)
    }

    /// The outermost class enclosing this one (or this class itself).
    pub fn outermost(&self) -> &ClassEntry {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }
}

/// A field declared by a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldEntry {
    parent: Arc<ClassEntry>,
    name: String,
    desc: String,
}

impl FieldEntry {
    pub fn new(parent: ClassEntry, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            parent: Arc::new(parent),
            name: name.into(),
            desc: desc.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn parent(&self) -> &ClassEntry {
        &self.parent
    }
}

/// A method declared by a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodEntry {
    parent: Arc<ClassEntry>,
    name: String,
    desc: String,
}

impl MethodEntry {
    pub fn new(parent: ClassEntry, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            parent: Arc::new(parent),
            name: name.into(),
            desc: desc.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn parent(&self) -> &ClassEntry {
        &self.parent
    }
}

/// A local variable or parameter of a method, identified by its slot index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalVariableEntry {
    parent: Arc<MethodEntry>,
    index: u16,
    name: String,
    is_argument: bool,
}

impl LocalVariableEntry {
    pub fn new(parent: MethodEntry, index: u16, name: impl Into<String>, is_argument: bool) -> Self {
        Self {
            parent: Arc::new(parent),
            index,
            name: name.into(),
            is_argument,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn is_argument(&self) -> bool {
        self.is_argument
    }

    pub fn parent(&self) -> &MethodEntry {
        &self.parent
    }
}

/// Identity of a nameable symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Entry {
    Class(ClassEntry),
    Field(FieldEntry),
    Method(MethodEntry),
    LocalVariable(LocalVariableEntry),
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Class(_) => EntryKind::Class,
            Entry::Field(_) => EntryKind::Field,
            Entry::Method(_) => EntryKind::Method,
            Entry::LocalVariable(_) => EntryKind::LocalVariable,
        }
    }

    /// The obfuscated name of this entry.
    pub fn name(&self) -> &str {
        match self {
            Entry::Class(class) => class.name(),
            Entry::Field(field) => field.name(),
            Entry::Method(method) => method.name(),
            Entry::LocalVariable(local) => local.name(),
        }
    }

    pub fn simple_name(&self) -> &str {
        match self {
            Entry::Class(class) => class.simple_name(),
            other => other.name(),
        }
    }

    /// Type signature of this entry. Local variables carry none.
    pub fn descriptor(&self) -> Option<Cow<'_, str>> {
        match self {
            Entry::Class(class) => Some(Cow::Owned(class.descriptor())),
            Entry::Field(field) => Some(Cow::Borrowed(field.desc())),
            Entry::Method(method) => Some(Cow::Borrowed(method.desc())),
            Entry::LocalVariable(_) => None,
        }
    }

    /// The owning entry, or `None` for a top-level class.
    pub fn parent(&self) -> Option<Entry> {
        match self {
            Entry::Class(class) => class.parent().cloned().map(Entry::Class),
            Entry::Field(field) => Some(Entry::Class(field.parent().clone())),
            Entry::Method(method) => Some(Entry::Class(method.parent().clone())),
            Entry::LocalVariable(local) => Some(Entry::Method(local.parent().clone())),
        }
    }

    /// The chain of entries from the top-level class down to (and including) this entry.
    pub fn ancestry(&self) -> Vec<Entry> {
        let mut chain = vec![self.clone()];
        while let Some(parent) = chain.last().and_then(Entry::parent) {
            chain.push(parent);
        }
        chain.reverse();
        chain
    }

    /// The class an entry belongs to: itself for classes, the owner otherwise.
    pub fn containing_class(&self) -> &ClassEntry {
        match self {
            Entry::Class(class) => class,
            Entry::Field(field) => field.parent(),
            Entry::Method(method) => method.parent(),
            Entry::LocalVariable(local) => local.parent().parent(),
        }
    }

    pub fn top_level_class(&self) -> &ClassEntry {
        self.containing_class().outermost()
    }

    pub fn is_top_level_class(&self) -> bool {
        matches!(self, Entry::Class(class) if !class.is_inner())
    }
}

impl From<ClassEntry> for Entry {
    fn from(entry: ClassEntry) -> Self {
        Entry::Class(entry)
    }
}

impl From<FieldEntry> for Entry {
    fn from(entry: FieldEntry) -> Self {
        Entry::Field(entry)
    }
}

impl From<MethodEntry> for Entry {
    fn from(entry: MethodEntry) -> Self {
        Entry::Method(entry)
    }
}

impl From<LocalVariableEntry> for Entry {
    fn from(entry: LocalVariableEntry) -> Self {
        Entry::LocalVariable(entry)
    }
}

impl fmt::Display for ClassEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Class(class) => write!(f, "{class}"),
            Entry::Field(field) => write!(f, "{}.{}:{}", field.parent(), field.name(), field.desc()),
            Entry::Method(method) => {
                write!(f, "{}.{}{}", method.parent(), method.name(), method.desc())
            }
            Entry::LocalVariable(local) => {
                let method = local.parent();
                write!(
                    f,
                    "{}.{}{}#{}:{}",
                    method.parent(),
                    method.name(),
                    method.desc(),
                    local.index(),
                    local.name()
                )
            }
        }
    }
}

fn simple_name(name: &str) -> &str {
    name.rsplit(['/', '$']).next().unwrap_or(name)
}
