//! Everything the server knows, owned by a single task.
//!
//! `ServerState` holds the canonical mappings, the lock table and the sessions.
//! It never touches a socket: each session only has the sending end of its
//! connection's outbound queue, so the logic here can be driven directly in tests.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};

use tokio::sync::{
    mpsc::{self, error::TrySendError},
    oneshot,
};
use tracing::{debug, info, trace, warn};

use super::{ServerConfig, locks::LockTable};
use crate::{
    constants::{CHECKSUM_SIZE, DUMMY_SYNC_ID, PROTOCOL_VERSION},
    entry::Entry,
    mapping::{EntryChange, EntryMapping, TristateChange, ValidationContext, put_change},
    sync::{
        error::SyncError,
        protocol::{C2sPacket, KickReason, LoginC2s, S2cPacket, ServerMessage, is_valid_username},
    },
    tree::{DeltaTrackingTree, EntryTree, MappingDelta},
};

/// Identifies one accepted connection for the lifetime of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The server's view of one connection.
#[derive(Debug)]
struct Session {
    outbound: mpsc::Sender<S2cPacket>,
    /// Dropping this stops the connection's reader.
    _shutdown: oneshot::Sender<()>,
    username: Option<String>,
    /// Set once the client confirmed the initial snapshot.
    approved: bool,
}

#[derive(Debug)]
pub(crate) struct ServerState {
    mappings: DeltaTrackingTree,
    checksum: [u8; CHECKSUM_SIZE],
    password: String,
    sessions: BTreeMap<ConnectionId, Session>,
    locks: LockTable,
    /// Connections whose outbound queue overflowed, dropped by [`Self::disconnect_stalled`].
    stalled: Vec<ConnectionId>,
}

impl ServerState {
    pub fn new(config: &ServerConfig, mappings: EntryTree) -> Self {
        Self {
            mappings: DeltaTrackingTree::from(mappings),
            checksum: config.checksum,
            password: config.password.clone(),
            sessions: BTreeMap::new(),
            locks: LockTable::default(),
            stalled: Vec::new(),
        }
    }

    pub fn on_connect(
        &mut self,
        conn: ConnectionId,
        outbound: mpsc::Sender<S2cPacket>,
        shutdown: oneshot::Sender<()>,
    ) {
        debug!(%conn, "Connection opened");
        self.sessions.insert(
            conn,
            Session {
                outbound,
                _shutdown: shutdown,
                username: None,
                approved: false,
            },
        );
    }

    pub fn handle_packet(&mut self, conn: ConnectionId, packet: C2sPacket) {
        let Some(session) = self.sessions.get(&conn) else {
            trace!(%conn, packet = packet.name(), "Packet from closed connection");
            return;
        };
        let username = session.username.clone();

        match (packet, username) {
            (C2sPacket::Login(login), None) => self.handle_login(conn, login),
            (C2sPacket::Login(_), Some(user)) => {
                warn!(%conn, %user, "Ignoring second login");
            }
            (packet, None) => {
                warn!(%conn, packet = packet.name(), "Packet before login, closing connection");
                self.on_disconnect(conn);
            }
            (C2sPacket::ConfirmChange { sync_id }, Some(_)) => self.confirm_change(conn, sync_id),
            (C2sPacket::Message { message }, Some(user)) => {
                let message = message.trim();
                if !message.is_empty() {
                    self.broadcast_message(ServerMessage::Chat {
                        user,
                        message: message.to_string(),
                    });
                }
            }
            (C2sPacket::EntryChange { change }, Some(user)) => {
                self.handle_entry_change(conn, &user, change)
            }
        }
    }

    /// Checks run in a fixed order and the first failure ends the connection.
    fn handle_login(&mut self, conn: ConnectionId, login: LoginC2s) {
        let LoginC2s {
            version,
            checksum,
            password,
            username,
        } = login;

        let rejection = if version != PROTOCOL_VERSION {
            Some(KickReason::MismatchingProtocol)
        } else if !is_valid_username(&username) {
            Some(KickReason::InvalidUsername)
        } else if password != self.password {
            Some(KickReason::WrongPassword)
        } else if self.is_logged_in(&username) {
            Some(KickReason::UsernameTaken)
        } else if checksum != self.checksum {
            Some(KickReason::WrongJar)
        } else {
            None
        };

        if let Some(reason) = rejection {
            info!(%conn, %username, reason = reason.code(), "Login rejected");
            self.kick(conn, reason);
            return;
        }

        if let Some(session) = self.sessions.get_mut(&conn) {
            session.username = Some(username.clone());
        }
        info!(%conn, user = %username, "User logged in");

        let mappings = self.snapshot();
        self.send(conn, S2cPacket::SyncMappings { mappings });
        self.broadcast_user_list();
        self.broadcast_message(ServerMessage::Connect { user: username });
    }

    fn confirm_change(&mut self, conn: ConnectionId, sync_id: u16) {
        if sync_id == DUMMY_SYNC_ID {
            if let Some(session) = self.sessions.get_mut(&conn) {
                if !session.approved {
                    debug!(%conn, "Snapshot confirmed");
                }
                session.approved = true;
            }
        }
        self.locks.confirm(conn, sync_id);
    }

    fn can_modify_entry(&self, conn: ConnectionId, entry: &Entry) -> bool {
        let approved = self
            .sessions
            .get(&conn)
            .is_some_and(|session| session.approved);
        approved && self.locks.can_modify(conn, entry)
    }

    fn handle_entry_change(&mut self, conn: ConnectionId, user: &str, change: EntryChange) {
        let target = change.target().clone();
        if change.is_empty() {
            trace!(%conn, %user, entry = %target, "Dropping empty change");
            return;
        }
        if !self.can_modify_entry(conn, &target) {
            debug!(%conn, %user, entry = %target, "Change refused, entry is locked");
            self.send_correction(conn, &target);
            return;
        }

        let mut vc = ValidationContext::new();
        if put_change(&mut self.mappings, &change, &mut vc).is_none() {
            let reasons: Vec<String> = vc.messages().iter().map(ToString::to_string).collect();
            debug!(%conn, %user, entry = %target, ?reasons, "Change failed validation");
            self.send_correction(conn, &target);
            return;
        }

        let others: HashSet<ConnectionId> = self
            .logged_in()
            .filter(|(other, _)| *other != conn)
            .map(|(other, _)| other)
            .collect();
        let sync_id = self.locks.lock(&target, others.clone());
        debug!(%conn, %user, entry = %target, sync_id, "Change accepted");

        let packet = S2cPacket::EntryChange { sync_id, change: change.clone() };
        for other in others {
            self.send(other, packet.clone());
        }

        for message in change_messages(user, &change) {
            self.broadcast_message(message);
        }
    }

    /// Restate the authoritative mapping of `entry` to `conn`.
    fn send_correction(&mut self, conn: ConnectionId, entry: &Entry) {
        let mapping = self.mappings.get(entry).cloned().unwrap_or_default();
        self.send(
            conn,
            S2cPacket::EntryChange {
                sync_id: DUMMY_SYNC_ID,
                change: EntryChange::from_mapping(entry.clone(), &mapping),
            },
        );
    }

    /// A read or encode failure ends the connection; a wrong protocol version is told why first.
    pub fn on_connection_error(&mut self, conn: ConnectionId, error: &SyncError) {
        match error {
            SyncError::ProtocolMismatch { .. } => {
                info!(%conn, %error, "Login rejected");
                self.kick(conn, KickReason::MismatchingProtocol);
            }
            SyncError::ConnectionClosed => {
                debug!(%conn, "Connection closed by peer");
                self.on_disconnect(conn);
            }
            error => {
                warn!(%conn, %error, "Dropping connection");
                self.on_disconnect(conn);
            }
        }
    }

    /// Send `reason` to the connection and close it.
    pub fn kick(&mut self, conn: ConnectionId, reason: KickReason) {
        self.send(conn, S2cPacket::Kick { reason });
        self.on_disconnect(conn);
    }

    /// Kick the session logged in as `username`, if there is one.
    pub fn kick_user(&mut self, username: &str, reason: KickReason) -> bool {
        let conn = self
            .logged_in()
            .find(|(_, user)| *user == username)
            .map(|(conn, _)| conn);
        match conn {
            Some(conn) => {
                self.kick(conn, reason);
                true
            }
            None => false,
        }
    }

    pub fn on_disconnect(&mut self, conn: ConnectionId) {
        let Some(session) = self.sessions.remove(&conn) else {
            return;
        };
        self.locks.forget(conn);

        if let Some(user) = session.username {
            info!(%conn, %user, "User disconnected");
            self.broadcast_user_list();
            self.broadcast_message(ServerMessage::Disconnect { user });
        } else {
            debug!(%conn, "Connection closed before login");
        }
    }

    /// Drop the connections that stopped reading.
    ///
    /// Their queues are full, so they are closed without a kick packet.
    pub fn disconnect_stalled(&mut self) {
        while let Some(conn) = self.stalled.pop() {
            if self.sessions.contains_key(&conn) {
                warn!(%conn, "Outbound queue full, dropping connection");
                self.on_disconnect(conn);
            }
        }
    }

    /// Kick every connection, logged in or not.
    pub fn shutdown(&mut self) {
        for session in self.sessions.values() {
            let _ = session.outbound.try_send(S2cPacket::Kick {
                reason: KickReason::ServerClosed,
            });
        }
        self.sessions.clear();
        self.locks.clear();
        self.stalled.clear();
    }

    pub fn broadcast_message(&mut self, message: ServerMessage) {
        info!(target: "chat", "{message}");
        self.send_to_logged_in(S2cPacket::Message { message });
    }

    fn broadcast_user_list(&mut self) {
        let users = self.users();
        self.send_to_logged_in(S2cPacket::UserList { users });
    }

    fn send_to_logged_in(&mut self, packet: S2cPacket) {
        let conns: Vec<ConnectionId> = self.logged_in().map(|(conn, _)| conn).collect();
        for conn in conns {
            self.send(conn, packet.clone());
        }
    }

    fn send(&mut self, conn: ConnectionId, packet: S2cPacket) {
        let Some(session) = self.sessions.get(&conn) else {
            return;
        };
        trace!(%conn, packet = packet.name(), "Queueing packet");
        match session.outbound.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(packet)) => {
                debug!(%conn, packet = packet.name(), "Outbound queue full");
                if !self.stalled.contains(&conn) {
                    self.stalled.push(conn);
                }
            }
            Err(TrySendError::Closed(_)) => trace!(%conn, "Writer already gone"),
        }
    }

    fn logged_in(&self) -> impl Iterator<Item = (ConnectionId, &str)> {
        self.sessions
            .iter()
            .filter_map(|(conn, session)| Some((*conn, session.username.as_deref()?)))
    }

    fn is_logged_in(&self, username: &str) -> bool {
        self.logged_in().any(|(_, user)| user == username)
    }

    /// Sorted names of the logged-in users.
    pub fn users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.logged_in().map(|(_, user)| user.to_string()).collect();
        users.sort();
        users
    }

    pub fn mapping(&self, entry: &Entry) -> Option<EntryMapping> {
        self.mappings.get(entry).cloned()
    }

    pub fn snapshot(&self) -> EntryTree {
        (*self.mappings).clone()
    }

    pub fn take_delta(&mut self) -> MappingDelta {
        self.mappings.take_delta()
    }
}

/// The chat notifications describing an accepted change.
fn change_messages(user: &str, change: &EntryChange) -> Vec<ServerMessage> {
    let user = user.to_string();
    let entry = change.target().clone();
    let mut messages = Vec::new();
    match change.deobf_name() {
        TristateChange::Set(name) if name.trim() == entry.name() => {
            messages.push(ServerMessage::MarkDeobf {
                user: user.clone(),
                entry: entry.clone(),
            })
        }
        TristateChange::Set(name) => messages.push(ServerMessage::Rename {
            user: user.clone(),
            entry: entry.clone(),
            new_name: name.trim().to_string(),
        }),
        TristateChange::Reset => messages.push(ServerMessage::RemoveMapping {
            user: user.clone(),
            entry: entry.clone(),
        }),
        TristateChange::Unchanged => {}
    }
    if !change.javadoc().is_unchanged() {
        messages.push(ServerMessage::EditDocs { user, entry });
    }
    messages
}
