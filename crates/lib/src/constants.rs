//! Constants used throughout the Rosetta library.
//!
//! This module provides central definitions for protocol parameters and limits
//! shared by the server, the client and the packet codec.

/// Default TCP port for a mapping server.
pub const DEFAULT_PORT: u16 = 34712;

/// Protocol version a client must announce in its login packet.
///
/// Laid out as `0xMmVV`: major (4 bits), minor (4 bits), revision (8 bits).
/// There is no negotiation; any other value is rejected.
pub const PROTOCOL_VERSION: u16 = 0x1002;

/// Size in bytes of the checksum identifying the binary being mapped.
pub const CHECKSUM_SIZE: usize = 20;

/// Maximum password length, in UTF-16 units. The length travels as a single byte.
pub const MAX_PASSWORD_LENGTH: usize = 255;

/// Maximum encoded length of a string, in UTF-8 bytes. The length travels as a `u16`.
pub const MAX_STRING_LENGTH: usize = u16::MAX as usize;

/// Sync id meaning "no confirmation expected".
pub const DUMMY_SYNC_ID: u16 = 0;

/// Packets queued for one connection before the server gives up on it.
pub const OUTBOUND_QUEUE_SIZE: usize = 1024;

/// Maximum nesting accepted when decoding entries and mapping trees.
pub const MAX_TREE_DEPTH: usize = 64;

/// Maximum username length, in characters.
pub const MAX_USERNAME_LENGTH: usize = 32;
