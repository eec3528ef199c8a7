//! Packets exchanged between a mapping server and its clients.
//!
//! Client-to-server and server-to-client packets are disjoint enumerations; the
//! byte layout of each is implemented in [`codec`](super::codec).

use std::fmt;

use crate::{
    constants::{CHECKSUM_SIZE, MAX_USERNAME_LENGTH},
    entry::Entry,
    mapping::EntryChange,
    tree::EntryTree,
};

/// Packet ids of client-to-server packets.
pub mod c2s_id {
    pub const LOGIN: u8 = 0;
    pub const CONFIRM_CHANGE: u8 = 1;
    pub const MESSAGE: u8 = 6;
    pub const ENTRY_CHANGE: u8 = 7;
}

/// Packet ids of server-to-client packets.
pub mod s2c_id {
    pub const KICK: u8 = 0;
    pub const SYNC_MAPPINGS: u8 = 1;
    pub const MESSAGE: u8 = 6;
    pub const USER_LIST: u8 = 7;
    pub const ENTRY_CHANGE: u8 = 8;
}

/// The first packet a client sends.
#[derive(Clone, PartialEq, Eq)]
pub struct LoginC2s {
    pub version: u16,
    pub checksum: [u8; CHECKSUM_SIZE],
    pub password: String,
    pub username: String,
}

impl fmt::Debug for LoginC2s {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginC2s")
            .field("version", &self.version)
            .field("checksum", &self.checksum)
            .field("password", &"<redacted>")
            .field("username", &self.username)
            .finish()
    }
}

/// Usernames are 1 to 32 characters: letters, digits, `_`, `-` and `.`.
pub fn is_valid_username(username: &str) -> bool {
    let length = username.chars().count();
    (1..=MAX_USERNAME_LENGTH).contains(&length)
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Packets sent by a client.
#[derive(Debug, Clone, PartialEq)]
pub enum C2sPacket {
    Login(LoginC2s),
    /// Acknowledges that the change with `sync_id` was applied locally.
    ConfirmChange { sync_id: u16 },
    Message { message: String },
    EntryChange { change: EntryChange },
}

impl C2sPacket {
    pub fn id(&self) -> u8 {
        match self {
            C2sPacket::Login(_) => c2s_id::LOGIN,
            C2sPacket::ConfirmChange { .. } => c2s_id::CONFIRM_CHANGE,
            C2sPacket::Message { .. } => c2s_id::MESSAGE,
            C2sPacket::EntryChange { .. } => c2s_id::ENTRY_CHANGE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            C2sPacket::Login(_) => "Login",
            C2sPacket::ConfirmChange { .. } => "ConfirmChange",
            C2sPacket::Message { .. } => "Message",
            C2sPacket::EntryChange { .. } => "EntryChange",
        }
    }
}

/// Packets sent by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum S2cPacket {
    /// Sent right before the server closes the connection.
    Kick { reason: KickReason },
    /// The whole mapping tree, sent once after a successful login.
    SyncMappings { mappings: EntryTree },
    Message { message: ServerMessage },
    UserList { users: Vec<String> },
    /// An accepted change, or a correction when `sync_id` is the dummy id.
    EntryChange { sync_id: u16, change: EntryChange },
}

impl S2cPacket {
    pub fn id(&self) -> u8 {
        match self {
            S2cPacket::Kick { .. } => s2c_id::KICK,
            S2cPacket::SyncMappings { .. } => s2c_id::SYNC_MAPPINGS,
            S2cPacket::Message { .. } => s2c_id::MESSAGE,
            S2cPacket::UserList { .. } => s2c_id::USER_LIST,
            S2cPacket::EntryChange { .. } => s2c_id::ENTRY_CHANGE,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            S2cPacket::Kick { .. } => "Kick",
            S2cPacket::SyncMappings { .. } => "SyncMappings",
            S2cPacket::Message { .. } => "Message",
            S2cPacket::UserList { .. } => "UserList",
            S2cPacket::EntryChange { .. } => "EntryChange",
        }
    }
}

/// Why the server ended a session. Travels as its code string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KickReason {
    MismatchingProtocol,
    InvalidUsername,
    WrongPassword,
    UsernameTaken,
    WrongJar,
    Disconnected,
    ServerClosed,
    /// A code this version does not know.
    Other(String),
}

impl KickReason {
    pub fn code(&self) -> &str {
        match self {
            KickReason::MismatchingProtocol => "disconnect.mismatching_protocol",
            KickReason::InvalidUsername => "disconnect.invalid_username",
            KickReason::WrongPassword => "disconnect.wrong_password",
            KickReason::UsernameTaken => "disconnect.username_taken",
            KickReason::WrongJar => "disconnect.wrong_jar",
            KickReason::Disconnected => "disconnect.disconnected",
            KickReason::ServerClosed => "disconnect.server_closed",
            KickReason::Other(code) => code,
        }
    }

    pub fn from_code(code: &str) -> Self {
        match code {
            "disconnect.mismatching_protocol" => KickReason::MismatchingProtocol,
            "disconnect.invalid_username" => KickReason::InvalidUsername,
            "disconnect.wrong_password" => KickReason::WrongPassword,
            "disconnect.username_taken" => KickReason::UsernameTaken,
            "disconnect.wrong_jar" => KickReason::WrongJar,
            "disconnect.disconnected" => KickReason::Disconnected,
            "disconnect.server_closed" => KickReason::ServerClosed,
            other => KickReason::Other(other.to_string()),
        }
    }
}

impl fmt::Display for KickReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            KickReason::MismatchingProtocol => "mismatching protocol version",
            KickReason::InvalidUsername => "invalid username",
            KickReason::WrongPassword => "wrong password",
            KickReason::UsernameTaken => "username is already taken",
            KickReason::WrongJar => "the server is mapping a different jar",
            KickReason::Disconnected => "disconnected",
            KickReason::ServerClosed => "server closed",
            KickReason::Other(code) => code,
        };
        f.write_str(text)
    }
}

/// Chat-style notifications broadcast by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Chat { user: String, message: String },
    Connect { user: String },
    Disconnect { user: String },
    EditDocs { user: String, entry: Entry },
    MarkDeobf { user: String, entry: Entry },
    RemoveMapping { user: String, entry: Entry },
    Rename { user: String, entry: Entry, new_name: String },
}

impl ServerMessage {
    pub(crate) const CHAT: u8 = 0;
    pub(crate) const CONNECT: u8 = 1;
    pub(crate) const DISCONNECT: u8 = 2;
    pub(crate) const EDIT_DOCS: u8 = 3;
    pub(crate) const MARK_DEOBF: u8 = 4;
    pub(crate) const REMOVE_MAPPING: u8 = 5;
    pub(crate) const RENAME: u8 = 6;

    pub fn kind(&self) -> u8 {
        match self {
            ServerMessage::Chat { .. } => Self::CHAT,
            ServerMessage::Connect { .. } => Self::CONNECT,
            ServerMessage::Disconnect { .. } => Self::DISCONNECT,
            ServerMessage::EditDocs { .. } => Self::EDIT_DOCS,
            ServerMessage::MarkDeobf { .. } => Self::MARK_DEOBF,
            ServerMessage::RemoveMapping { .. } => Self::REMOVE_MAPPING,
            ServerMessage::Rename { .. } => Self::RENAME,
        }
    }

    /// The user the message is about.
    pub fn user(&self) -> &str {
        match self {
            ServerMessage::Chat { user, .. }
            | ServerMessage::Connect { user }
            | ServerMessage::Disconnect { user }
            | ServerMessage::EditDocs { user, .. }
            | ServerMessage::MarkDeobf { user, .. }
            | ServerMessage::RemoveMapping { user, .. }
            | ServerMessage::Rename { user, .. } => user,
        }
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Chat { user, message } => write!(f, "<{user}> {message}"),
            ServerMessage::Connect { user } => write!(f, "{user} joined"),
            ServerMessage::Disconnect { user } => write!(f, "{user} left"),
            ServerMessage::EditDocs { user, entry } => {
                write!(f, "{user} edited the documentation of {entry}")
            }
            ServerMessage::MarkDeobf { user, entry } => {
                write!(f, "{user} marked {entry} as deobfuscated")
            }
            ServerMessage::RemoveMapping { user, entry } => {
                write!(f, "{user} removed the mapping of {entry}")
            }
            ServerMessage::Rename {
                user,
                entry,
                new_name,
            } => write!(f, "{user} renamed {entry} to {new_name}"),
        }
    }
}
