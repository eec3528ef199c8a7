use std::{future::Future, net::SocketAddr, time::Duration};

use rosetta::{
    ClassEntry, Entry, EntryMapping, EntryTree, FieldEntry, LocalVariableEntry, MethodEntry,
    constants::{CHECKSUM_SIZE, PROTOCOL_VERSION},
    sync::{
        C2sPacket, Client, ClientConfig, ClientEvent, LoginC2s, Server, ServerConfig,
        codec::{encode_c2s, write_packet},
    },
};
use tokio::{
    io::BufReader,
    net::{TcpStream, tcp::OwnedReadHalf, tcp::OwnedWriteHalf},
};

pub const CHECKSUM: [u8; CHECKSUM_SIZE] = [0x5a; CHECKSUM_SIZE];
pub const PASSWORD: &str = "letmein";

/// How long any single step of a test may take.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Fail the test instead of hanging when `future` does not complete in time.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(STEP_TIMEOUT, future)
        .await
        .expect("Timed out")
}

pub fn class(name: &str) -> Entry {
    ClassEntry::new(name).into()
}

/// A small mapping set: one named class with a named field, a method and a parameter.
pub fn sample_tree() -> EntryTree {
    let owner = ClassEntry::new("b");
    let method = MethodEntry::new(owner.clone(), "c", "(I)V");
    let mut tree = EntryTree::new();
    tree.insert(owner.clone().into(), EntryMapping::named("Player"));
    tree.insert(
        FieldEntry::new(owner, "d", "I").into(),
        EntryMapping::named("health"),
    );
    tree.insert(
        LocalVariableEntry::new(method, 1, "e", true).into(),
        EntryMapping::named("amount"),
    );
    tree
}

pub fn server_config() -> ServerConfig {
    ServerConfig::new("127.0.0.1:0")
        .with_checksum(CHECKSUM)
        .with_password(PASSWORD)
}

pub async fn start_server() -> Server {
    Server::start(server_config(), sample_tree())
        .await
        .expect("Failed to start server")
}

pub fn client_config(username: &str) -> ClientConfig {
    ClientConfig::new(username)
        .with_password(PASSWORD)
        .with_checksum(CHECKSUM)
}

/// Connect a client and skip the events of its own login.
pub async fn join(addr: SocketAddr, username: &str) -> Client {
    let mut client = within(Client::connect(addr, client_config(username)))
        .await
        .expect("Failed to connect");
    wait_for(&mut client, |event| {
        matches!(event, ClientEvent::Message(message) if message.user() == username)
    })
    .await;
    client
}

/// Read events until one matches, returning it.
pub async fn wait_for(
    client: &mut Client,
    mut predicate: impl FnMut(&ClientEvent) -> bool,
) -> ClientEvent {
    within(async {
        loop {
            let event = client.next_event().await.expect("Connection closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
}

/// A raw connection for sending hand-made packets.
pub async fn raw_connection(addr: SocketAddr) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
    let stream = within(TcpStream::connect(addr))
        .await
        .expect("Failed to connect");
    let (reader, writer) = stream.into_split();
    (BufReader::new(reader), writer)
}

pub fn login(username: &str) -> LoginC2s {
    LoginC2s {
        version: PROTOCOL_VERSION,
        checksum: CHECKSUM,
        password: PASSWORD.to_string(),
        username: username.to_string(),
    }
}

pub async fn send(writer: &mut OwnedWriteHalf, packet: &C2sPacket) {
    let bytes = encode_c2s(packet).expect("Failed to encode");
    within(write_packet(writer, &bytes))
        .await
        .expect("Failed to write");
}
