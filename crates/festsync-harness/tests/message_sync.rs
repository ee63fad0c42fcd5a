//! End-to-end sync scenarios.
//!
//! Full runtimes talk to the simulated backend through `SimDriver`, so
//! every action the client produces is executed exactly as in production.

use std::time::Duration;

use festsync_client::{ClientAction, ClientEvent, ScrollCommand};
use festsync_harness::{InvariantRegistry, SimOp, SimWorld, lock_backend};
use festsync_proto::{Inbound, NotificationFilter};

const CONVERSATION: u64 = 1;

/// Two live clients with conversation 1 on screen.
async fn two_clients() -> SimWorld {
    let mut world = SimWorld::new(7);
    world.add_client("Aoi").await;
    world.add_client("Ren").await;
    for client in 0..2 {
        world.apply(&SimOp::Connect { client }).await;
        world.apply(&SimOp::Open { client, conversation_id: CONVERSATION }).await;
    }
    world
}

fn render(world: &SimWorld, client: usize) -> String {
    world
        .client(client)
        .log(CONVERSATION)
        .map(|log| {
            log.messages()
                .iter()
                .map(|m| format!("{}: {}", m.sender_name, m.content))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

fn assert_invariants(world: &SimWorld, context: &str) {
    if let Err(violations) = InvariantRegistry::quiescent().check_all(&world.snapshot()) {
        let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
        panic!("invariant violation {context}:\n  {}", messages.join("\n  "));
    }
}

#[tokio::test]
async fn messages_reach_every_subscriber_in_order() {
    let mut world = two_clients().await;

    world
        .dispatch(0, ClientEvent::SendMessage {
            conversation_id: CONVERSATION,
            content: "hello".into(),
        })
        .await
        .unwrap();
    world.settle().await;
    world
        .dispatch(1, ClientEvent::SendMessage {
            conversation_id: CONVERSATION,
            content: "hi Aoi".into(),
        })
        .await
        .unwrap();
    world.settle().await;
    world.apply(&SimOp::SendFile { client: 0, conversation_id: CONVERSATION, image: true }).await;

    insta::assert_snapshot!(render(&world, 0), @r"
    Aoi: hello
    Ren: hi Aoi
    Aoi: shared an image: stage-map.png
    ");
    assert_eq!(render(&world, 0), render(&world, 1));
    assert_eq!(world.client(0).messages().pending_sends(), 0);
    assert_invariants(&world, "after exchange");
}

#[tokio::test]
async fn reconnect_rejoins_and_refetches_missed_messages() {
    let mut world = two_clients().await;

    world.apply(&SimOp::DropConnection { client: 1 }).await;
    assert!(!world.client(1).is_live());

    world
        .dispatch(0, ClientEvent::SendMessage {
            conversation_id: CONVERSATION,
            content: "while you were away".into(),
        })
        .await
        .unwrap();
    world.settle().await;
    assert_eq!(render(&world, 1), "");

    world.apply(&SimOp::Connect { client: 1 }).await;
    assert!(world.client(1).is_live());
    assert_eq!(world.client(1).session_epoch(), 2);
    assert_eq!(render(&world, 1), "Aoi: while you were away");

    // Subscription was replayed, so live pushes flow again
    world
        .dispatch(0, ClientEvent::SendMessage {
            conversation_id: CONVERSATION,
            content: "welcome back".into(),
        })
        .await
        .unwrap();
    world.settle().await;
    assert_eq!(render(&world, 1), "Aoi: while you were away\nAoi: welcome back");
    assert_invariants(&world, "after reconnect");
}

#[tokio::test]
async fn typing_indicator_lifecycle() {
    let mut world = two_clients().await;

    world.apply(&SimOp::Type { client: 0, conversation_id: CONVERSATION }).await;
    assert_eq!(world.client(1).typing_users(CONVERSATION), vec![1]);

    // Sending ends the burst
    world
        .dispatch(0, ClientEvent::SendMessage { conversation_id: CONVERSATION, content: "ok".into() })
        .await
        .unwrap();
    world.settle().await;
    assert!(world.client(1).typing_users(CONVERSATION).is_empty());

    // Idle ends the burst
    world.apply(&SimOp::Type { client: 0, conversation_id: CONVERSATION }).await;
    assert_eq!(world.client(1).typing_users(CONVERSATION), vec![1]);
    world.advance(Duration::from_millis(1100)).await;
    assert!(world.client(1).typing_users(CONVERSATION).is_empty());
    assert!(world.client(0).typing_users(CONVERSATION).is_empty());
}

#[tokio::test]
async fn remote_typer_expires_when_stop_is_lost() {
    let mut world = two_clients().await;

    world.apply(&SimOp::Type { client: 0, conversation_id: CONVERSATION }).await;
    world.apply(&SimOp::DropConnection { client: 0 }).await;
    assert_eq!(world.client(1).typing_users(CONVERSATION), vec![1]);

    world.advance(Duration::from_secs(3)).await;
    assert!(world.client(1).typing_users(CONVERSATION).is_empty());
}

#[tokio::test]
async fn send_lost_in_flight_stalls() {
    let mut world = two_clients().await;

    // The transport dies but the client has not read the disconnect yet
    lock_backend(world.backend()).drop_connection(1, "reset by peer");
    let updates = world
        .dispatch(0, ClientEvent::SendMessage { conversation_id: CONVERSATION, content: "lost".into() })
        .await
        .unwrap();
    assert!(updates.iter().all(|u| !matches!(u, ClientAction::SendStalled { .. })));

    world.advance(Duration::from_secs(3)).await;
    assert!(!world.client(0).is_live());
    assert_eq!(world.stats().stalled_sends, 1);

    world.advance(Duration::from_secs(3)).await;
    assert_eq!(world.stats().stalled_sends, 1, "reported once");
}

#[tokio::test]
async fn own_message_scrolls_reader_who_scrolled_away() {
    let mut world = two_clients().await;
    world.apply(&SimOp::Send { client: 1, conversation_id: CONVERSATION }).await;
    world.apply(&SimOp::Scroll { client: 0, distance_px: 300 }).await;
    world.apply(&SimOp::Scroll { client: 1, distance_px: 300 }).await;

    let updates = world
        .dispatch(0, ClientEvent::SendMessage { conversation_id: CONVERSATION, content: "me".into() })
        .await
        .unwrap();
    assert!(!updates.iter().any(|u| matches!(u, ClientAction::Scroll { .. })));

    // The echo is read during settle; only the sender is moved
    world.settle().await;
    assert!(world.client(0).scroll().is_at_bottom());
    assert!(!world.client(1).scroll().is_at_bottom());
}

#[tokio::test]
async fn first_history_page_jumps_to_bottom() {
    let mut world = SimWorld::new(3);
    world.add_client("Aoi").await;
    {
        let mut backend = lock_backend(world.backend());
        backend.seed_message(CONVERSATION, 9, "Staff", "welcome");
        backend.seed_message(CONVERSATION, 9, "Staff", "booths open at 10");
    }
    world.apply(&SimOp::Connect { client: 0 }).await;

    world
        .dispatch(0, ClientEvent::OpenConversation { conversation_id: CONVERSATION })
        .await
        .unwrap();
    let updates = world.runtime_mut(0).poll().await.unwrap();

    assert_eq!(render(&world, 0), "Staff: welcome\nStaff: booths open at 10");
    assert!(updates.contains(&ClientAction::Scroll {
        conversation_id: CONVERSATION,
        command: ScrollCommand::JumpToBottom,
    }));
}

#[tokio::test]
async fn pushed_notification_lands_in_live_feed() {
    let mut world = two_clients().await;
    world.apply(&SimOp::Publish { client: 0 }).await;
    world
        .dispatch(0, ClientEvent::BootstrapFeed { filter: NotificationFilter::All })
        .await
        .unwrap();
    assert_eq!(world.client(0).feed().items().len(), 1);
    assert_eq!(world.client(0).feed().unread_count(), 1);

    world.apply(&SimOp::Publish { client: 0 }).await;
    assert_eq!(world.client(0).feed().items().len(), 2);
    assert_eq!(world.client(0).feed().unread_count(), 2);
    assert!(world.client(1).feed().items().is_empty());

    let newest = world.client(0).feed().items()[0].id;
    world.dispatch(0, ClientEvent::MarkNotificationRead { notification_id: newest }).await.unwrap();
    assert_eq!(world.client(0).feed().unread_count(), 1);
    assert_eq!(world.notifications().unread(1), 1);

    world.dispatch(0, ClientEvent::MarkAllNotificationsRead).await.unwrap();
    assert_eq!(world.notifications().unread(1), 0);
    assert_invariants(&world, "after feed mutations");
}

#[tokio::test]
async fn feed_fetch_completes_before_queued_channel_events() {
    let mut world = two_clients().await;
    world.apply(&SimOp::Publish { client: 0 }).await;
    world
        .dispatch(1, ClientEvent::SendMessage {
            conversation_id: CONVERSATION,
            content: "during fetch".into(),
        })
        .await
        .unwrap();

    let updates = world
        .dispatch(0, ClientEvent::BootstrapFeed { filter: NotificationFilter::All })
        .await
        .unwrap();
    assert!(updates.contains(&ClientAction::FeedUpdated));
    assert_eq!(world.client(0).feed().items().len(), 1);
    assert_eq!(render(&world, 0), "");

    // The push waited in the driver and arrives on the next poll
    world.runtime_mut(0).poll().await.unwrap();
    assert_eq!(render(&world, 0), "Ren: during fetch");
}

#[tokio::test]
async fn backend_error_while_connecting_fails_the_attempt() {
    let mut world = SimWorld::new(5);
    world.add_client("Aoi").await;

    world.dispatch(0, ClientEvent::Connect).await.unwrap();
    {
        // Replace the handshake with a refusal
        let mut backend = lock_backend(world.backend());
        backend.take_inbound(1);
        backend.deliver(1, Inbound::Error { reason: "unauthorized".into() });
    }
    world.settle().await;

    assert!(!world.client(0).is_live());
    assert_eq!(world.stats().backend_errors, 1);
}
