//!
//! Rosetta: collaborative editing of deobfuscation mappings.
//! This library provides the mapping model and the live sync protocol used to edit one
//! mapping set from several machines at once.
//!
//! ## Core Concepts
//!
//! * **Entries (`entry::Entry`)**: Structural identities of the symbols of a compiled binary: classes, fields, methods and local variables, each knowing its parent.
//! * **Mappings (`mapping::EntryMapping`)**: The deobfuscated name and documentation attached to an entry, edited through `mapping::EntryChange` values.
//! * **Trees (`tree::EntryTree`)**: A trie of entries holding their mappings. `tree::DeltaTrackingTree` additionally records every mutation until it is taken.
//! * **Validation (`mapping::ValidationContext`)**: Collects every problem with a proposed change instead of stopping at the first one.
//! * **Sync (`sync`)**: A server authoritative over one tree and clients keeping replicas of it, exchanging packets over TCP:
//!     * **Server (`sync::Server`)**: Validates, locks, applies and broadcasts changes.
//!     * **Client (`sync::Client`)**: Keeps a replica up to date and proposes changes.

pub mod constants;
pub mod entry;
pub mod mapping;
pub mod sync;
pub mod tree;

pub use entry::{ClassEntry, Entry, EntryKind, FieldEntry, LocalVariableEntry, MethodEntry};
pub use mapping::{EntryChange, EntryMapping, TokenType, TristateChange};
pub use tree::{DeltaTrackingTree, EntryTree, MappingDelta};

/// Result type used throughout the Rosetta library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Rosetta library.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured errors from the sync module
    #[error(transparent)]
    Sync(sync::SyncError),

    /// A change rejected by validation
    #[error(transparent)]
    Validation(mapping::ValidationError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Sync(_) => "sync",
            Error::Validation(_) => "mapping",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Sync(sync_err) => sync_err.is_network_error(),
            _ => false,
        }
    }

    /// Check if this error is validation-related.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Check if the peer sent something this version cannot understand.
    pub fn is_protocol_error(&self) -> bool {
        match self {
            Error::Sync(sync_err) => sync_err.is_protocol_error(),
            _ => false,
        }
    }

    /// Check if this error ended a login attempt.
    pub fn is_handshake_error(&self) -> bool {
        match self {
            Error::Sync(sync_err) => sync_err.is_handshake_error(),
            _ => false,
        }
    }

    /// Check if this error is sync-related.
    pub fn is_sync_error(&self) -> bool {
        matches!(self, Error::Sync(_))
    }
}

// Conversions from module-specific errors to the main Error type
impl From<sync::SyncError> for Error {
    fn from(err: sync::SyncError) -> Self {
        Error::Sync(err)
    }
}

impl From<mapping::ValidationError> for Error {
    fn from(err: mapping::ValidationError) -> Self {
        Error::Validation(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mapping::ValidationContext, sync::KickReason};

    #[test]
    fn test_error_classification() {
        let kicked: Error = sync::SyncError::Kicked {
            reason: KickReason::WrongPassword,
        }
        .into();
        assert_eq!(kicked.module(), "sync");
        assert!(kicked.is_handshake_error());
        assert!(!kicked.is_io_error());

        let closed: Error = sync::SyncError::ConnectionClosed.into();
        assert!(closed.is_io_error());

        let mut vc = ValidationContext::new();
        vc.raise(mapping::Message::EmptyName, Vec::new());
        let rejected: Error = vc.into_result().unwrap_err().into();
        assert_eq!(rejected.module(), "mapping");
        assert!(rejected.is_validation_error());
        assert!(!rejected.is_sync_error());
    }
}
