use rosetta::{
    ClassEntry, EntryChange, EntryMapping, FieldEntry,
    sync::{ClientEvent, ServerMessage},
};

use crate::helpers::{class, join, start_server, wait_for};

fn renamed_by_alice() -> ServerMessage {
    ServerMessage::Rename {
        user: "alice".into(),
        entry: class("a"),
        new_name: "Foo".into(),
    }
}

#[tokio::test]
async fn test_rename_reaches_other_client() {
    let server = start_server().await;
    let addr = server.local_addr();
    let mut alice = join(addr, "alice").await;
    let mut bob = join(addr, "bob").await;

    alice
        .propose_change(EntryChange::modify(class("a")).with_deobf_name("Foo"))
        .await
        .unwrap();

    let event = wait_for(&mut bob, |event| matches!(event, ClientEvent::EntryChanged { .. })).await;
    assert_eq!(
        event,
        ClientEvent::EntryChanged {
            sync_id: 1,
            change: EntryChange::modify(class("a")).with_deobf_name("Foo"),
        }
    );
    assert_eq!(bob.mapping(&class("a")), Some(EntryMapping::named("Foo")));
    bob.with_mappings(|tree| {
        let node = tree.find_node(&class("a")).expect("Node for a");
        assert_eq!(node.mapping().and_then(|m| m.target_name()), Some("Foo"));
    });

    let rename = ClientEvent::Message(renamed_by_alice());
    wait_for(&mut bob, |event| *event == rename).await;
    wait_for(&mut alice, |event| *event == rename).await;
    assert!(alice.messages().contains(&renamed_by_alice()));
    assert!(bob.messages().contains(&renamed_by_alice()));
    assert_eq!(alice.mapping(&class("a")), Some(EntryMapping::named("Foo")));
    assert_eq!(renamed_by_alice().to_string(), "alice renamed a to Foo");
}

#[tokio::test]
async fn test_late_joiner_sees_earlier_edits() {
    let server = start_server().await;
    let addr = server.local_addr();
    let mut alice = join(addr, "alice").await;
    let health = FieldEntry::new(ClassEntry::new("b"), "d", "I");

    alice
        .propose_change(
            EntryChange::modify(health.clone())
                .with_deobf_name("hitPoints")
                .with_javadoc("Remaining hit points."),
        )
        .await
        .unwrap();
    wait_for(&mut alice, |event| {
        matches!(event, ClientEvent::Message(ServerMessage::EditDocs { .. }))
    })
    .await;

    let carol = join(addr, "carol").await;
    let mapping = carol.mapping(&health.into()).expect("Mapped field");
    assert_eq!(mapping.target_name(), Some("hitPoints"));
    assert_eq!(mapping.javadoc(), Some("Remaining hit points."));
    assert_eq!(carol.users(), vec!["alice".to_string(), "carol".to_string()]);
}

#[tokio::test]
async fn test_chat_between_clients() {
    let server = start_server().await;
    let addr = server.local_addr();
    let alice = join(addr, "alice").await;
    let mut bob = join(addr, "bob").await;

    alice.send_message("   ").await.unwrap();
    alice.send_message("  found the main loop ").await.unwrap();

    let event = wait_for(&mut bob, |event| {
        matches!(event, ClientEvent::Message(ServerMessage::Chat { .. }))
    })
    .await;
    assert_eq!(
        event,
        ClientEvent::Message(ServerMessage::Chat {
            user: "alice".into(),
            message: "found the main loop".into(),
        })
    );
}
