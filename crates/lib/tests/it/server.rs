use rosetta::{
    EntryChange, EntryMapping, Error,
    constants::{DUMMY_SYNC_ID, MAX_PASSWORD_LENGTH, PROTOCOL_VERSION},
    sync::{
        C2sPacket, Client, ClientEvent, KickReason, S2cPacket, Server, ServerConfig,
        ServerMessage, SyncError, codec::read_s2c,
    },
};

use crate::helpers::{
    class, client_config, join, login, raw_connection, sample_tree, send, server_config,
    start_server, wait_for, within,
};

fn kick_of(result: rosetta::Result<Client>) -> KickReason {
    match result {
        Err(Error::Sync(SyncError::Kicked { reason })) => reason,
        Err(e) => panic!("Expected a kick, got {e}"),
        Ok(_) => panic!("Expected a kick, got a session"),
    }
}

#[tokio::test]
async fn test_rejected_logins_are_kicked_with_reason() {
    let server = start_server().await;
    let addr = server.local_addr();

    let wrong_password = client_config("alice").with_password("guess");
    assert_eq!(
        kick_of(within(Client::connect(addr, wrong_password)).await),
        KickReason::WrongPassword
    );

    let wrong_jar = client_config("alice").with_checksum([0; 20]);
    assert_eq!(
        kick_of(within(Client::connect(addr, wrong_jar)).await),
        KickReason::WrongJar
    );

    // Neither attempt kept the name.
    let _alice = join(addr, "alice").await;
    assert_eq!(server.users().await.unwrap(), vec!["alice".to_string()]);
}

#[tokio::test]
async fn test_old_protocol_version_is_rejected_first() {
    let server = start_server().await;
    let (mut reader, mut writer) = raw_connection(server.local_addr()).await;

    let mut old = login("alice");
    old.version = PROTOCOL_VERSION - 1;
    old.password = "wrong".into();
    old.checksum = [0; 20];
    send(&mut writer, &C2sPacket::Login(old)).await;

    assert_eq!(
        within(read_s2c(&mut reader)).await.unwrap(),
        S2cPacket::Kick {
            reason: KickReason::MismatchingProtocol
        }
    );
    assert!(matches!(
        within(read_s2c(&mut reader)).await,
        Err(SyncError::ConnectionClosed)
    ));
}

#[tokio::test]
async fn test_taken_username_does_not_evict_session() {
    let server = start_server().await;
    let addr = server.local_addr();
    let mut alice = join(addr, "alice").await;

    assert_eq!(
        kick_of(within(Client::connect(addr, client_config("alice"))).await),
        KickReason::UsernameTaken
    );

    // The original session still works.
    alice.send_message("still here").await.unwrap();
    let event = wait_for(&mut alice, |event| matches!(event, ClientEvent::Message(_))).await;
    assert_eq!(
        event,
        ClientEvent::Message(ServerMessage::Chat {
            user: "alice".into(),
            message: "still here".into(),
        })
    );
    assert_eq!(server.users().await.unwrap(), vec!["alice".to_string()]);
}

#[tokio::test]
async fn test_changes_to_one_entry_keep_their_order() {
    let server = start_server().await;
    let addr = server.local_addr();
    let alice = join(addr, "alice").await;
    let mut bob = join(addr, "bob").await;
    let mut carol = join(addr, "carol").await;

    alice
        .propose_change(EntryChange::modify(class("a")).with_deobf_name("Foo"))
        .await
        .unwrap();
    alice
        .propose_change(EntryChange::modify(class("a")).with_deobf_name("Bar"))
        .await
        .unwrap();

    for client in [&mut bob, &mut carol] {
        let mut received = Vec::new();
        while received.len() < 2 {
            if let ClientEvent::EntryChanged { sync_id, change } =
                wait_for(client, |event| matches!(event, ClientEvent::EntryChanged { .. })).await
            {
                received.push((sync_id, change.deobf_name().new_value().cloned()));
            }
        }
        assert_eq!(received[0].1.as_deref(), Some("Foo"));
        assert_eq!(received[1].1.as_deref(), Some("Bar"));
        assert!(received[0].0 < received[1].0, "Sync ids increase: {received:?}");
        assert_eq!(client.mapping(&class("a")), Some(EntryMapping::named("Bar")));
    }
    assert_eq!(
        server.mapping(class("a")).await.unwrap(),
        Some(EntryMapping::named("Bar"))
    );
}

#[tokio::test]
async fn test_rejected_change_is_corrected_for_sender_only() {
    let server = start_server().await;
    let addr = server.local_addr();
    let mut alice = join(addr, "alice").await;

    let (mut reader, mut writer) = raw_connection(addr).await;
    send(&mut writer, &C2sPacket::Login(login("mallory"))).await;
    send(
        &mut writer,
        &C2sPacket::ConfirmChange {
            sync_id: DUMMY_SYNC_ID,
        },
    )
    .await;
    // Class b is already called Player.
    send(
        &mut writer,
        &C2sPacket::EntryChange {
            change: EntryChange::modify(class("a")).with_deobf_name("Player"),
        },
    )
    .await;

    let correction = within(async {
        loop {
            if let S2cPacket::EntryChange { sync_id, change } = read_s2c(&mut reader).await.unwrap() {
                return (sync_id, change);
            }
        }
    })
    .await;
    assert_eq!(
        correction,
        (
            DUMMY_SYNC_ID,
            EntryChange::from_mapping(class("a"), &EntryMapping::DEFAULT)
        )
    );
    assert_eq!(server.mapping(class("a")).await.unwrap(), None);

    // Alice only hears about mallory joining and then her own chat message.
    alice.send_message("ping").await.unwrap();
    let event = wait_for(&mut alice, |event| {
        matches!(
            event,
            ClientEvent::EntryChanged { .. } | ClientEvent::Message(ServerMessage::Chat { .. })
        )
    })
    .await;
    assert!(matches!(event, ClientEvent::Message(_)), "got {event:?}");
}

#[tokio::test]
async fn test_disconnect_is_announced() {
    let server = start_server().await;
    let addr = server.local_addr();
    let mut alice = join(addr, "alice").await;
    let bob = join(addr, "bob").await;

    bob.disconnect().await;

    wait_for(&mut alice, |event| {
        *event == ClientEvent::Message(ServerMessage::Disconnect { user: "bob".into() })
    })
    .await;
    assert_eq!(alice.users(), vec!["alice".to_string()]);
    assert_eq!(server.users().await.unwrap(), vec!["alice".to_string()]);
}

#[tokio::test]
async fn test_kick_and_stop() {
    let server = start_server().await;
    let addr = server.local_addr();
    let mut alice = join(addr, "alice").await;
    let mut bob = join(addr, "bob").await;

    assert!(server.kick("bob", KickReason::Disconnected).await.unwrap());
    assert!(!server.kick("nobody", KickReason::Disconnected).await.unwrap());
    wait_for(&mut bob, |event| *event == ClientEvent::Kicked(KickReason::Disconnected)).await;
    wait_for(&mut bob, |event| *event == ClientEvent::Disconnected).await;

    server.stop().await.unwrap();
    wait_for(&mut alice, |event| *event == ClientEvent::Kicked(KickReason::ServerClosed)).await;
    assert_eq!(alice.kick_reason(), Some(KickReason::ServerClosed));

    assert!(matches!(
        server.users().await,
        Err(Error::Sync(SyncError::ServerNotRunning))
    ));
}

#[tokio::test]
async fn test_server_messages_reach_everyone() {
    let server = start_server().await;
    let mut alice = join(server.local_addr(), "alice").await;

    let notice = ServerMessage::Chat {
        user: "server".into(),
        message: "Restarting soon".into(),
    };
    server.send_message(notice.clone()).await.unwrap();
    wait_for(&mut alice, |event| *event == ClientEvent::Message(notice.clone())).await;
}

#[tokio::test]
async fn test_start_rejects_bad_config() {
    let long_password = server_config().with_password("x".repeat(MAX_PASSWORD_LENGTH + 1));
    assert!(matches!(
        Server::start(long_password, sample_tree()).await,
        Err(Error::Sync(SyncError::InvalidConfig(_)))
    ));

    let server = start_server().await;
    let taken = ServerConfig::new(server.local_addr().to_string());
    let err = Server::start(taken, sample_tree()).await.unwrap_err();
    assert!(matches!(err, Error::Sync(SyncError::ServerBind { .. })), "got {err}");
}

#[tokio::test]
async fn test_delta_records_accepted_changes() {
    let server = start_server().await;
    let alice = join(server.local_addr(), "alice").await;
    assert!(server.take_delta().await.unwrap().is_empty());

    alice
        .propose_change(EntryChange::modify(class("b")).clear_deobf_name())
        .await
        .unwrap();
    // The change is applied once the server answers a later request.
    let delta = within(async {
        loop {
            let delta = server.take_delta().await.unwrap();
            if !delta.is_empty() {
                return delta;
            }
            tokio::task::yield_now().await;
        }
    })
    .await;

    assert_eq!(delta.len(), 1);
    assert_eq!(delta.changes()[0].old, Some(EntryMapping::named("Player")));
    assert_eq!(delta.changes()[0].new, None);
    assert!(server.snapshot().await.unwrap().find_node(&class("b")).is_some());
}

/// Poll until the server lists exactly `expected`.
async fn wait_for_users(server: &Server, expected: &[&str]) {
    within(async {
        while server.users().await.unwrap() != expected {
            tokio::task::yield_now().await;
        }
    })
    .await;
}

#[tokio::test]
async fn test_packet_before_login_closes_connection() {
    let server = start_server().await;
    let (mut reader, mut writer) = raw_connection(server.local_addr()).await;

    send(
        &mut writer,
        &C2sPacket::EntryChange {
            change: EntryChange::modify(class("a")).with_deobf_name("Foo"),
        },
    )
    .await;

    assert!(matches!(
        within(read_s2c(&mut reader)).await,
        Err(SyncError::ConnectionClosed)
    ));
    assert_eq!(server.mapping(class("a")).await.unwrap(), None);
}

#[tokio::test]
async fn test_unencodable_snapshot_fails_login() {
    let mut tree = sample_tree();
    tree.insert(class("z"), EntryMapping::named("x".repeat(70_000)));
    let server = Server::start(server_config(), tree).await.unwrap();

    match within(Client::connect(server.local_addr(), client_config("alice"))).await {
        Err(Error::Sync(e)) => assert!(e.is_network_error(), "got {e}"),
        Err(e) => panic!("Expected a closed connection, got {e}"),
        Ok(_) => panic!("Expected the login to fail"),
    }
    wait_for_users(&server, &[]).await;
}

#[tokio::test]
async fn test_unencodable_message_ends_client_session() {
    let server = start_server().await;
    let addr = server.local_addr();
    let mut alice = join(addr, "alice").await;
    let mut bob = join(addr, "bob").await;

    alice.send_message("x".repeat(70_000)).await.unwrap();

    wait_for(&mut alice, |event| *event == ClientEvent::Disconnected).await;
    wait_for(&mut bob, |event| {
        *event == ClientEvent::Message(ServerMessage::Disconnect { user: "alice".into() })
    })
    .await;
    wait_for_users(&server, &["bob"]).await;
}
