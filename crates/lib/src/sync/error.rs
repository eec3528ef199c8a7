//! Error types for the synchronization module.

use thiserror::Error;

use super::protocol::KickReason;

/// Errors that can occur while serving or joining a mapping session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// Attempted to use a server that has been stopped.
    #[error("Server not running")]
    ServerNotRunning,

    /// Server bind error.
    #[error("Failed to bind server to {address}: {reason}")]
    ServerBind { address: String, reason: String },

    /// Client connection error.
    #[error("Failed to connect to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    /// Network communication error.
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// The connection was closed by the other side.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Command channel send error.
    #[error("Failed to send command to server: {0}")]
    CommandSendError(String),

    /// Protocol version mismatch.
    #[error("Protocol version mismatch: expected {expected:#06x}, received {received:#06x}")]
    ProtocolMismatch { expected: u16, received: u16 },

    /// A packet id that is not part of the protocol.
    #[error("Unknown packet id {id}")]
    UnknownPacket { id: u8 },

    /// A packet whose payload could not be decoded.
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// An entry that could not be decoded.
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// A string too long for its length prefix.
    #[error("String of {length} bytes exceeds the limit of {max}")]
    StringTooLong { length: usize, max: usize },

    /// A password too long for its length prefix.
    #[error("Password of {length} characters exceeds the limit of {max}")]
    PasswordTooLong { length: usize, max: usize },

    /// Entries or tree nodes nested deeper than the decoder accepts.
    #[error("Nesting deeper than {max} levels")]
    TreeTooDeep { max: usize },

    /// The server refused or ended the session.
    #[error("Kicked by server: {reason}")]
    Kicked { reason: KickReason },

    /// The server answered the login with something other than the snapshot.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Invalid server or client configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Check if this is a server lifecycle error.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            SyncError::ServerNotRunning | SyncError::ServerBind { .. }
        )
    }

    /// Check if this is a network/connection error.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::ConnectionFailed { .. } | SyncError::ConnectionClosed
        )
    }

    /// Check if this is a protocol error (malformed or unexpected data).
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SyncError::ProtocolMismatch { .. }
                | SyncError::UnknownPacket { .. }
                | SyncError::InvalidPacket(_)
                | SyncError::InvalidEntry(_)
                | SyncError::StringTooLong { .. }
                | SyncError::PasswordTooLong { .. }
                | SyncError::TreeTooDeep { .. }
        )
    }

    /// Check if this error ended a login attempt.
    pub fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            SyncError::Kicked { .. } | SyncError::HandshakeFailed(_) | SyncError::ProtocolMismatch { .. }
        )
    }

    /// The kick reason, if the server ended the session.
    pub fn kick_reason(&self) -> Option<&KickReason> {
        match self {
            SyncError::Kicked { reason } => Some(reason),
            _ => None,
        }
    }
}
