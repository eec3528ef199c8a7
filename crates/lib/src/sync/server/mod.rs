//! The mapping server.
//!
//! A single actor task owns the [`ServerState`](state::ServerState): the canonical
//! mappings, the lock table and the sessions. Connection tasks and [`Server`]
//! handles only talk to it through channels, so every mutation and every
//! broadcast happens in one order. Outbound packets go into a per-connection
//! bounded queue drained by that connection's writer, which keeps the actor from
//! ever waiting on a slow client. A client whose queue fills up is dropped.

use std::{fmt, net::SocketAddr, ops::ControlFlow};

use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
};
use tracing::{Instrument, debug, debug_span, error, info, info_span};

use crate::{
    Result,
    constants::{CHECKSUM_SIZE, DEFAULT_PORT, MAX_PASSWORD_LENGTH, OUTBOUND_QUEUE_SIZE},
    entry::Entry,
    mapping::EntryMapping,
    sync::{
        error::SyncError,
        protocol::{C2sPacket, KickReason, S2cPacket, ServerMessage},
    },
    tree::{EntryTree, MappingDelta},
};

mod conn;
mod locks;
mod state;

pub use state::ConnectionId;

use state::ServerState;

/// How a server listens and whom it lets in.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind, e.g. `0.0.0.0:34712`. Port 0 picks a free port.
    pub bind_address: String,
    /// Checksum of the binary being mapped; clients must present the same one.
    pub checksum: [u8; CHECKSUM_SIZE],
    /// Shared password; empty means anyone may join.
    pub password: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{DEFAULT_PORT}"),
            checksum: [0; CHECKSUM_SIZE],
            password: String::new(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_address", &self.bind_address)
            .field("checksum", &self.checksum)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ServerConfig {
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            ..Self::default()
        }
    }

    pub fn with_checksum(mut self, checksum: [u8; CHECKSUM_SIZE]) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Check that the password fits in a login packet.
    pub fn validate(&self) -> std::result::Result<(), SyncError> {
        let length = self.password.encode_utf16().count();
        if length > MAX_PASSWORD_LENGTH {
            return Err(SyncError::InvalidConfig(format!(
                "password is {length} characters long, at most {MAX_PASSWORD_LENGTH} are allowed"
            )));
        }
        Ok(())
    }
}

/// Requests from [`Server`] handles to the actor.
#[derive(Debug)]
enum ServerCommand {
    TakeDelta {
        response: oneshot::Sender<MappingDelta>,
    },
    GetMapping {
        entry: Entry,
        response: oneshot::Sender<Option<EntryMapping>>,
    },
    Snapshot {
        response: oneshot::Sender<EntryTree>,
    },
    GetUsers {
        response: oneshot::Sender<Vec<String>>,
    },
    Kick {
        username: String,
        reason: KickReason,
        response: oneshot::Sender<bool>,
    },
    SendMessage {
        message: ServerMessage,
    },
    Stop {
        response: oneshot::Sender<()>,
    },
}

/// What connection tasks report to the actor.
#[derive(Debug)]
enum ConnectionEvent {
    Opened {
        conn: ConnectionId,
        outbound: mpsc::Sender<S2cPacket>,
        shutdown: oneshot::Sender<()>,
    },
    Packet {
        conn: ConnectionId,
        packet: C2sPacket,
    },
    /// Reading or encoding failed; the session is over.
    Failed {
        conn: ConnectionId,
        error: SyncError,
    },
}

/// Handle to a running server.
///
/// Handles are cheap to clone. The server stops when [`stop`](Self::stop) is
/// called or when the last handle is dropped.
#[derive(Debug, Clone)]
pub struct Server {
    commands: mpsc::Sender<ServerCommand>,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind the listener and start serving `mappings`.
    pub async fn start(config: ServerConfig, mappings: EntryTree) -> Result<Server> {
        config.validate()?;

        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|e| SyncError::ServerBind {
                address: config.bind_address.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| SyncError::ServerBind {
            address: config.bind_address.clone(),
            reason: format!("Failed to get local address: {e}"),
        })?;

        let (command_tx, command_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(1024);

        let state = ServerState::new(&config, mappings);
        tokio::spawn(
            run_actor(state, command_rx, event_rx).instrument(info_span!("server", %local_addr)),
        );
        tokio::spawn(
            accept_loop(listener, event_tx).instrument(info_span!("accept", %local_addr)),
        );

        info!(%local_addr, "Server listening");
        Ok(Server {
            commands: command_tx,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> ServerCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| SyncError::ServerNotRunning)?;
        Ok(rx.await.map_err(|_| SyncError::ServerNotRunning)?)
    }

    /// Drain the mapping changes made since the previous call.
    pub async fn take_delta(&self) -> Result<MappingDelta> {
        self.request(|response| ServerCommand::TakeDelta { response })
            .await
    }

    pub async fn mapping(&self, entry: impl Into<Entry>) -> Result<Option<EntryMapping>> {
        let entry = entry.into();
        self.request(|response| ServerCommand::GetMapping { entry, response })
            .await
    }

    /// A copy of the current mappings.
    pub async fn snapshot(&self) -> Result<EntryTree> {
        self.request(|response| ServerCommand::Snapshot { response })
            .await
    }

    /// Sorted names of the logged-in users.
    pub async fn users(&self) -> Result<Vec<String>> {
        self.request(|response| ServerCommand::GetUsers { response })
            .await
    }

    /// Kick a user. Returns whether such a user was logged in.
    pub async fn kick(&self, username: impl Into<String>, reason: KickReason) -> Result<bool> {
        let username = username.into();
        self.request(|response| ServerCommand::Kick {
            username,
            reason,
            response,
        })
        .await
    }

    /// Broadcast a message to every logged-in user.
    pub async fn send_message(&self, message: ServerMessage) -> Result<()> {
        self.commands
            .send(ServerCommand::SendMessage { message })
            .await
            .map_err(|_| SyncError::ServerNotRunning)?;
        Ok(())
    }

    /// Kick every connection and stop accepting new ones.
    pub async fn stop(&self) -> Result<()> {
        self.request(|response| ServerCommand::Stop { response })
            .await
    }
}

async fn run_actor(
    mut state: ServerState,
    mut commands: mpsc::Receiver<ServerCommand>,
    mut events: mpsc::Receiver<ConnectionEvent>,
) {
    debug!("Server actor started");
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => {
                    if handle_command(&mut state, command).is_break() {
                        break;
                    }
                }
                None => {
                    // Every handle was dropped.
                    state.shutdown();
                    break;
                }
            },
            Some(event) = events.recv() => handle_event(&mut state, event),
        }
        state.disconnect_stalled();
    }
    info!("Server stopped");
}

/// Breaks once the server was stopped.
fn handle_command(state: &mut ServerState, command: ServerCommand) -> ControlFlow<()> {
    match command {
        ServerCommand::TakeDelta { response } => {
            let _ = response.send(state.take_delta());
        }
        ServerCommand::GetMapping { entry, response } => {
            let _ = response.send(state.mapping(&entry));
        }
        ServerCommand::Snapshot { response } => {
            let _ = response.send(state.snapshot());
        }
        ServerCommand::GetUsers { response } => {
            let _ = response.send(state.users());
        }
        ServerCommand::Kick {
            username,
            reason,
            response,
        } => {
            let _ = response.send(state.kick_user(&username, reason));
        }
        ServerCommand::SendMessage { message } => state.broadcast_message(message),
        ServerCommand::Stop { response } => {
            state.shutdown();
            let _ = response.send(());
            return ControlFlow::Break(());
        }
    }
    ControlFlow::Continue(())
}

fn handle_event(state: &mut ServerState, event: ConnectionEvent) {
    match event {
        ConnectionEvent::Opened {
            conn,
            outbound,
            shutdown,
        } => state.on_connect(conn, outbound, shutdown),
        ConnectionEvent::Packet { conn, packet } => state.handle_packet(conn, packet),
        ConnectionEvent::Failed { conn, error } => state.on_connection_error(conn, &error),
    }
}

/// Accept connections until the actor goes away.
async fn accept_loop(listener: TcpListener, events: mpsc::Sender<ConnectionEvent>) {
    let mut next_id = 1;
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = events.closed() => break,
        };
        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Failed to accept connection: {e}");
                continue;
            }
        };

        let conn = ConnectionId::new(next_id);
        next_id += 1;
        info!(%conn, %peer, "Accepted connection");

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let opened = ConnectionEvent::Opened {
            conn,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
        };
        if events.send(opened).await.is_err() {
            break;
        }

        let (reader, writer) = stream.into_split();
        tokio::spawn(
            conn::write_loop(conn, writer, outbound_rx, events.clone())
                .instrument(debug_span!("conn_writer", %conn)),
        );
        tokio::spawn(
            conn::read_loop(conn, reader, events.clone(), shutdown_rx)
                .instrument(debug_span!("conn_reader", %conn)),
        );
    }
    debug!("Accept loop stopped");
}
