use rosetta::{
    ClassEntry, Entry, EntryChange, EntryMapping, EntryTree, FieldEntry, LocalVariableEntry,
    MethodEntry,
    sync::{
        C2sPacket, S2cPacket, ServerMessage, SyncError,
        codec::{encode_c2s, encode_s2c, read_c2s, read_s2c, write_packet},
    },
};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

use crate::helpers::{login, sample_tree, within};

/// A connected pair of sockets.
async fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, accepted) = within(async {
        tokio::join!(TcpStream::connect(addr), listener.accept())
    })
    .await;
    (client.unwrap(), accepted.unwrap().0)
}

#[tokio::test]
async fn test_snapshot_survives_the_wire() {
    let mut tree = sample_tree();
    let outer = ClassEntry::new("net/example/a");
    let inner = ClassEntry::inner(outer.clone(), "net/example/a$1");
    let method = MethodEntry::new(inner.clone(), "run", "()V");
    tree.insert(
        LocalVariableEntry::new(method.clone(), 0, "this", false).into(),
        EntryMapping::new(None, Some("The receiver.".into()), rosetta::TokenType::User),
    );
    tree.insert(
        FieldEntry::new(outer.clone(), "b", "Ljava/lang/String;").into(),
        EntryMapping::named("label"),
    );
    tree.remove(&ClassEntry::new("b").into());

    let (mut sender, receiver) = socket_pair().await;
    let bytes = encode_s2c(&S2cPacket::SyncMappings {
        mappings: tree.clone(),
    })
    .unwrap();
    write_packet(&mut sender, &bytes).await.unwrap();

    let mut reader = BufReader::new(receiver);
    let S2cPacket::SyncMappings { mappings } = within(read_s2c(&mut reader)).await.unwrap() else {
        panic!("Expected a snapshot");
    };

    for node in &tree {
        let decoded = mappings
            .find_node(node.entry())
            .unwrap_or_else(|| panic!("{} was lost", node.entry()));
        assert_eq!(decoded.mapping(), node.mapping(), "{}", node.entry());
        assert_eq!(decoded.child_count(), node.child_count());
    }
    assert_eq!(mappings.len(), tree.len());
}

#[tokio::test]
async fn test_packets_arrive_in_order() {
    let (client, server) = socket_pair().await;
    let (_, mut writer) = client.into_split();
    let mut reader = BufReader::new(server);

    let packets = vec![
        C2sPacket::Login(login("alice")),
        C2sPacket::ConfirmChange { sync_id: 0 },
        C2sPacket::Message {
            message: "hello".into(),
        },
        C2sPacket::EntryChange {
            change: EntryChange::modify(Entry::from(ClassEntry::new("a")))
                .with_deobf_name("Foo")
                .with_javadoc("A foo."),
        },
    ];
    for packet in &packets {
        write_packet(&mut writer, &encode_c2s(packet).unwrap())
            .await
            .unwrap();
    }
    writer.shutdown().await.unwrap();

    for expected in packets {
        assert_eq!(within(read_c2s(&mut reader)).await.unwrap(), expected);
    }
    assert!(matches!(
        within(read_c2s(&mut reader)).await,
        Err(SyncError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_server_packets_arrive_in_order() {
    let (client, server) = socket_pair().await;
    let mut reader = BufReader::new(client);
    let mut writer = server;

    let packets = vec![
        S2cPacket::SyncMappings {
            mappings: EntryTree::new(),
        },
        S2cPacket::UserList {
            users: vec!["alice".into()],
        },
        S2cPacket::Message {
            message: ServerMessage::Connect {
                user: "alice".into(),
            },
        },
    ];
    let mut bytes = Vec::new();
    for packet in &packets {
        bytes.extend(encode_s2c(packet).unwrap());
    }
    // Packets have no length framing, so one write may carry several of them.
    write_packet(&mut writer, &bytes).await.unwrap();

    for expected in packets {
        assert_eq!(within(read_s2c(&mut reader)).await.unwrap(), expected);
    }
}
