//! Client side of a mapping session.
//!
//! [`ClientState`] is the socket-free part: the replica of the server's mappings
//! and what the server told us about users and chat. [`Client`] wraps it with a
//! TCP connection, a reader task that applies incoming packets and answers the
//! ones that need a confirmation, and a writer task that sends queued packets.

use std::{
    fmt,
    sync::{Arc, RwLock},
};

use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        TcpStream, ToSocketAddrs,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{Instrument, debug, debug_span, info, trace, warn};

use crate::{
    Result,
    constants::{CHECKSUM_SIZE, DUMMY_SYNC_ID, MAX_PASSWORD_LENGTH, PROTOCOL_VERSION},
    entry::Entry,
    mapping::{EntryChange, EntryMapping, ValidationContext, ValidationError, apply_change, put_change},
    sync::{
        codec::{encode_c2s, read_s2c, write_packet},
        error::SyncError,
        protocol::{C2sPacket, KickReason, LoginC2s, S2cPacket, ServerMessage, is_valid_username},
    },
    tree::EntryTree,
};

/// Who we log in as.
#[derive(Clone)]
pub struct ClientConfig {
    pub username: String,
    pub password: String,
    /// Checksum of the local copy of the binary being mapped.
    pub checksum: [u8; CHECKSUM_SIZE],
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("checksum", &self.checksum)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: String::new(),
            checksum: [0; CHECKSUM_SIZE],
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_checksum(mut self, checksum: [u8; CHECKSUM_SIZE]) -> Self {
        self.checksum = checksum;
        self
    }

    /// Catch logins the server would refuse anyway.
    pub fn validate(&self) -> std::result::Result<(), SyncError> {
        if !is_valid_username(&self.username) {
            return Err(SyncError::InvalidConfig(format!(
                "invalid username '{}'",
                self.username
            )));
        }
        let length = self.password.encode_utf16().count();
        if length > MAX_PASSWORD_LENGTH {
            return Err(SyncError::InvalidConfig(format!(
                "password is {length} characters long, at most {MAX_PASSWORD_LENGTH} are allowed"
            )));
        }
        Ok(())
    }

    fn login(&self) -> C2sPacket {
        C2sPacket::Login(LoginC2s {
            version: PROTOCOL_VERSION,
            checksum: self.checksum,
            password: self.password.clone(),
            username: self.username.clone(),
        })
    }
}

/// What a client knows about the session.
#[derive(Debug, Clone)]
pub struct ClientState {
    username: String,
    mappings: EntryTree,
    users: Vec<String>,
    messages: Vec<ServerMessage>,
    kick_reason: Option<KickReason>,
    synced: bool,
}

impl ClientState {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            mappings: EntryTree::new(),
            users: Vec::new(),
            messages: Vec::new(),
            kick_reason: None,
            synced: false,
        }
    }

    /// Apply a packet from the server. Returns the reply to send, if any.
    pub fn handle_packet(&mut self, packet: S2cPacket) -> Option<C2sPacket> {
        match packet {
            S2cPacket::SyncMappings { mappings } => {
                debug!(mappings = mappings.len(), "Received mapping snapshot");
                self.mappings = mappings;
                self.synced = true;
                Some(C2sPacket::ConfirmChange {
                    sync_id: DUMMY_SYNC_ID,
                })
            }
            S2cPacket::EntryChange { sync_id, change } => {
                trace!(sync_id, entry = %change.target(), "Applying change");
                // The server already validated it.
                let target = change.target().clone();
                let previous = self.mappings.get(&target).cloned().unwrap_or_default();
                let mapping = apply_change(&previous, &change);
                if mapping.is_default() {
                    self.mappings.remove(&target);
                } else {
                    self.mappings.insert(target, mapping);
                }
                (sync_id != DUMMY_SYNC_ID).then_some(C2sPacket::ConfirmChange { sync_id })
            }
            S2cPacket::Message { message } => {
                self.messages.push(message);
                None
            }
            S2cPacket::UserList { users } => {
                self.users = users;
                None
            }
            S2cPacket::Kick { reason } => {
                self.kick_reason = Some(reason);
                None
            }
        }
    }

    /// Validate `change` against the replica and apply it there, returning the
    /// packet proposing it to the server.
    ///
    /// The server answers a refused change with a correction, which
    /// [`handle_packet`](Self::handle_packet) applies over this one.
    pub fn prepare_change(&mut self, change: EntryChange) -> std::result::Result<C2sPacket, ValidationError> {
        let mut vc = ValidationContext::new();
        if put_change(&mut self.mappings, &change, &mut vc).is_none() {
            vc.into_result()?;
        }
        Ok(C2sPacket::EntryChange { change })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn mappings(&self) -> &EntryTree {
        &self.mappings
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    /// Every message received, oldest first.
    pub fn messages(&self) -> &[ServerMessage] {
        &self.messages
    }

    pub fn kick_reason(&self) -> Option<&KickReason> {
        self.kick_reason.as_ref()
    }

    /// Whether the initial snapshot arrived.
    pub fn is_synced(&self) -> bool {
        self.synced
    }
}

/// Notifications about packets the client already applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    MappingsSynced { count: usize },
    /// Another user's change, or a correction of ours when `sync_id` is the dummy id.
    EntryChanged { sync_id: u16, change: EntryChange },
    Message(ServerMessage),
    UserList(Vec<String>),
    Kicked(KickReason),
    Disconnected,
}

impl ClientEvent {
    pub fn for_packet(packet: &S2cPacket) -> Self {
        match packet {
            S2cPacket::Kick { reason } => ClientEvent::Kicked(reason.clone()),
            S2cPacket::SyncMappings { mappings } => ClientEvent::MappingsSynced {
                count: mappings.len(),
            },
            S2cPacket::Message { message } => ClientEvent::Message(message.clone()),
            S2cPacket::UserList { users } => ClientEvent::UserList(users.clone()),
            S2cPacket::EntryChange { sync_id, change } => ClientEvent::EntryChanged {
                sync_id: *sync_id,
                change: change.clone(),
            },
        }
    }
}

/// A logged-in connection to a mapping server.
#[derive(Debug)]
pub struct Client {
    username: String,
    state: Arc<RwLock<ClientState>>,
    outbound: mpsc::UnboundedSender<C2sPacket>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    shutdown: oneshot::Sender<()>,
    writer: JoinHandle<()>,
}

impl Client {
    /// Connect and log in. Returns once the server sent the mapping snapshot.
    pub async fn connect(addr: impl ToSocketAddrs + fmt::Display, config: ClientConfig) -> Result<Client> {
        config.validate()?;

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| SyncError::ConnectionFailed {
                address: addr.to_string(),
                reason: e.to_string(),
            })?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        write_packet(&mut writer, &encode_c2s(&config.login())?).await?;

        let mut state = ClientState::new(config.username.clone());
        let snapshot = match read_s2c(&mut reader).await? {
            packet @ S2cPacket::SyncMappings { .. } => packet,
            S2cPacket::Kick { reason } => return Err(SyncError::Kicked { reason }.into()),
            packet => {
                return Err(SyncError::HandshakeFailed(format!(
                    "expected the mapping snapshot, got {}",
                    packet.name()
                ))
                .into());
            }
        };
        info!(address = %addr, user = %config.username, "Logged in");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let _ = event_tx.send(ClientEvent::for_packet(&snapshot));
        if let Some(reply) = state.handle_packet(snapshot) {
            let _ = outbound_tx.send(reply);
        }
        let state = Arc::new(RwLock::new(state));

        let span = debug_span!("client", user = %config.username);
        let writer = tokio::spawn(write_loop(writer, outbound_rx).instrument(span.clone()));
        tokio::spawn(
            read_loop(
                reader,
                Arc::clone(&state),
                outbound_tx.clone(),
                event_tx,
                shutdown_rx,
            )
            .instrument(span),
        );

        Ok(Client {
            username: config.username,
            state,
            outbound: outbound_tx,
            events: event_rx,
            shutdown: shutdown_tx,
            writer,
        })
    }

    /// The next event, or `None` once the connection is gone and every event was read.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events.recv().await
    }

    /// Validate and apply `change` locally, then send it to the server.
    pub async fn propose_change(&self, change: EntryChange) -> Result<()> {
        let packet = self.state.write().unwrap().prepare_change(change)?;
        self.send(packet)
    }

    pub async fn send_message(&self, message: impl Into<String>) -> Result<()> {
        self.send(C2sPacket::Message {
            message: message.into(),
        })
    }

    fn send(&self, packet: C2sPacket) -> Result<()> {
        self.outbound
            .send(packet)
            .map_err(|_| SyncError::ConnectionClosed)?;
        Ok(())
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The replica's mapping of `entry`.
    pub fn mapping(&self, entry: &Entry) -> Option<EntryMapping> {
        self.state.read().unwrap().mappings().get(entry).cloned()
    }

    /// Run `f` against the replica.
    pub fn with_mappings<R>(&self, f: impl FnOnce(&EntryTree) -> R) -> R {
        f(self.state.read().unwrap().mappings())
    }

    pub fn users(&self) -> Vec<String> {
        self.state.read().unwrap().users().to_vec()
    }

    pub fn messages(&self) -> Vec<ServerMessage> {
        self.state.read().unwrap().messages().to_vec()
    }

    pub fn kick_reason(&self) -> Option<KickReason> {
        self.state.read().unwrap().kick_reason().cloned()
    }

    /// Close the connection after sending whatever is still queued.
    pub async fn disconnect(self) {
        let Client {
            outbound,
            shutdown,
            writer,
            ..
        } = self;
        let _ = shutdown.send(());
        drop(outbound);
        let _ = writer.await;
        debug!("Disconnected");
    }
}

async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    state: Arc<RwLock<ClientState>>,
    outbound: mpsc::UnboundedSender<C2sPacket>,
    events: mpsc::UnboundedSender<ClientEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let result = tokio::select! {
            _ = &mut shutdown => break,
            result = read_s2c(&mut reader) => result,
        };
        let packet = match result {
            Ok(packet) => packet,
            Err(SyncError::ConnectionClosed) => {
                debug!("Server closed the connection");
                break;
            }
            Err(e) => {
                warn!("Dropping connection: {e}");
                break;
            }
        };

        trace!(packet = packet.name(), "Received packet");
        let event = ClientEvent::for_packet(&packet);
        let reply = state.write().unwrap().handle_packet(packet);
        if let Some(reply) = reply {
            let _ = outbound.send(reply);
        }
        let _ = events.send(event);
    }
    let _ = events.send(ClientEvent::Disconnected);
}

async fn write_loop(mut writer: OwnedWriteHalf, mut outbound: mpsc::UnboundedReceiver<C2sPacket>) {
    while let Some(packet) = outbound.recv().await {
        let bytes = match encode_c2s(&packet) {
            Ok(bytes) => bytes,
            Err(e) => {
                // The server would wait for it forever; end the session instead.
                warn!(packet = packet.name(), "Failed to encode packet, disconnecting: {e}");
                break;
            }
        };
        if let Err(e) = write_packet(&mut writer, &bytes).await {
            debug!("Failed to write packet: {e}");
            return;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{entry::ClassEntry, mapping::Message};

    fn class(name: &str) -> Entry {
        ClassEntry::new(name).into()
    }

    fn synced_state() -> ClientState {
        let mut state = ClientState::new("alice");
        let mut mappings = EntryTree::new();
        mappings.insert(class("b"), EntryMapping::named("Bar"));
        state.handle_packet(S2cPacket::SyncMappings { mappings });
        state
    }

    #[test]
    fn test_snapshot_replaces_replica_and_is_confirmed() {
        let mut state = ClientState::new("alice");
        state.mappings.insert(class("stale"), EntryMapping::named("Old"));
        assert!(!state.is_synced());

        let mut mappings = EntryTree::new();
        mappings.insert(class("b"), EntryMapping::named("Bar"));
        let reply = state.handle_packet(S2cPacket::SyncMappings { mappings });

        assert_eq!(
            reply,
            Some(C2sPacket::ConfirmChange {
                sync_id: DUMMY_SYNC_ID
            })
        );
        assert!(state.is_synced());
        assert!(!state.mappings().contains(&class("stale")));
        assert_eq!(state.mappings().get(&class("b")), Some(&EntryMapping::named("Bar")));
    }

    #[test]
    fn test_broadcast_change_is_applied_and_confirmed() {
        let mut state = synced_state();
        let reply = state.handle_packet(S2cPacket::EntryChange {
            sync_id: 7,
            change: EntryChange::modify(class("a")).with_deobf_name("Foo"),
        });

        assert_eq!(reply, Some(C2sPacket::ConfirmChange { sync_id: 7 }));
        assert_eq!(state.mappings().get(&class("a")), Some(&EntryMapping::named("Foo")));
    }

    #[test]
    fn test_correction_overrides_local_change_without_reply() {
        let mut state = synced_state();
        let packet = state
            .prepare_change(EntryChange::modify(class("a")).with_deobf_name("Foo"))
            .unwrap();
        assert!(matches!(packet, C2sPacket::EntryChange { .. }));
        assert_eq!(state.mappings().get(&class("a")), Some(&EntryMapping::named("Foo")));

        let reply = state.handle_packet(S2cPacket::EntryChange {
            sync_id: DUMMY_SYNC_ID,
            change: EntryChange::from_mapping(class("a"), &EntryMapping::DEFAULT),
        });

        assert_eq!(reply, None);
        assert!(!state.mappings().contains(&class("a")));
    }

    #[test]
    fn test_invalid_local_change_is_not_sent() {
        let mut state = synced_state();
        let err = state
            .prepare_change(EntryChange::modify(class("a")).with_deobf_name("Bar"))
            .unwrap_err();

        assert!(err.contains(Message::NonUniqueName));
        assert!(!state.mappings().contains(&class("a")));
    }

    #[test]
    fn test_messages_users_and_kick() {
        let mut state = synced_state();
        state.handle_packet(S2cPacket::UserList {
            users: vec!["alice".into(), "bob".into()],
        });
        state.handle_packet(S2cPacket::Message {
            message: ServerMessage::Connect { user: "bob".into() },
        });
        state.handle_packet(S2cPacket::Kick {
            reason: KickReason::ServerClosed,
        });

        assert_eq!(state.users(), ["alice", "bob"]);
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.kick_reason(), Some(&KickReason::ServerClosed));
    }

    #[test]
    fn test_config_validation() {
        assert!(ClientConfig::new("alice").validate().is_ok());
        assert!(ClientConfig::new("").validate().is_err());
        let long_password = ClientConfig::new("alice").with_password("x".repeat(MAX_PASSWORD_LENGTH + 1));
        assert!(matches!(
            long_password.validate(),
            Err(SyncError::InvalidConfig(_))
        ));
        assert!(!format!("{long_password:?}").contains("xxx"));
    }
}
