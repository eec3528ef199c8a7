//! Live collaboration on a shared mapping tree.
//!
//! One [`Server`] is authoritative over the mappings. Clients log in, receive a
//! full snapshot and then propose changes one entry at a time. The server
//! validates each change, applies it to its canonical tree and forwards it to
//! every other client, which confirms it by sync id. Until a client confirmed
//! the latest change to an entry, its own edits to that entry are refused and
//! answered with a correction carrying the current mapping.
//!
//! The wire format is a stream of id-tagged packets over TCP, see [`codec`].

pub mod client;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::{Client, ClientConfig, ClientEvent, ClientState};
pub use error::SyncError;
pub use protocol::{C2sPacket, KickReason, LoginC2s, S2cPacket, ServerMessage};
pub use server::{ConnectionId, Server, ServerConfig};
