//! Connection lifecycle against an in-process host: connect, join, receive
//! updates on the network task, reconcile on the test thread.

use std::sync::Arc;
use std::time::Duration;

use ember_shared::{
    DeliveryMode, Envelope, HealthRecord, JoinSnapshot, SpawnRecord, Tag, TextMessage, TickDelta,
    DEFAULT_PORT,
};
use ember_sync::{
    ConnectionManager, ConnectionState, GameSession, InboxSink, MemoryHost, MemoryTransport,
    MessageRouter, NullObserver, SessionInbox, SyncConfig, SyncError, TcpTransport,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

fn client() -> (Arc<ConnectionManager<MemoryTransport>>, MemoryHost, Arc<SessionInbox>) {
    let (transport, host) = MemoryTransport::pair();
    let inbox = Arc::new(SessionInbox::default());
    let manager = Arc::new(ConnectionManager::new(transport, Arc::clone(&inbox)));
    (manager, host, inbox)
}

/// Polls until the inbox has drained the network task's work into the
/// session, or gives up.
async fn step_until<F>(session: &mut GameSession, mut done: F)
where
    F: FnMut(&GameSession) -> bool,
{
    for _ in 0..200 {
        session.fixed_update();
        if done(session) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_join_and_updates_through_receive_loop() {
    let (manager, host, inbox) = client();
    let mut notification = manager.connected_notification();

    manager.connect("127.0.0.1", DEFAULT_PORT).await.unwrap();
    notification.changed().await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Connected);

    let (text_tx, text_rx) = crossbeam_channel::unbounded();
    let router = MessageRouter::new(InboxSink::new(Arc::clone(&inbox)).with_external(text_tx));
    let receive_loop = manager.spawn_receive_loop(router).unwrap();

    manager.request_join().unwrap();
    assert_eq!(
        host.take_sent(),
        vec![(Envelope::empty(Tag::JOIN_REQUEST), DeliveryMode::Reliable)]
    );

    let mut session = GameSession::new(inbox, &SyncConfig::default(), NullObserver);

    host.deliver_record(
        Tag::JOIN_ACCEPT,
        &JoinSnapshot {
            server_tick_at_join: 50,
            initial_entities: vec![SpawnRecord::new(1, "Alice"), SpawnRecord::new(2, "Bob")],
        },
    )
    .unwrap();
    step_until(&mut session, |s| s.registry().len() == 2).await;
    assert_eq!(session.last_received_server_tick(), 50);

    host.deliver_record(
        Tag::TICK_UPDATE,
        &TickDelta {
            health_updates: vec![HealthRecord { id: 2, health: 7 }],
            ..TickDelta::empty(51)
        },
    )
    .unwrap();
    step_until(&mut session, |s| s.last_received_server_tick() == 51).await;
    assert_eq!(session.registry().get(2).unwrap().health, 7);

    host.deliver_record(
        Tag::TEXT,
        &TextMessage {
            text: "welcome".to_owned(),
        },
    )
    .unwrap();
    let forwarded = tokio::task::spawn_blocking(move || text_rx.recv_timeout(Duration::from_secs(2)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(forwarded.read::<TextMessage>().unwrap().text, "welcome");

    host.disconnect();
    let stats = receive_loop.await.unwrap();
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.forwarded, 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    // Freeze keeps the last known entities
    session.fixed_update();
    assert_eq!(session.registry().len(), 2);
}

#[tokio::test]
async fn test_failed_connect_then_retry_by_caller() {
    let (manager, host, _inbox) = client();
    host.refuse_connections(true);

    let err = manager.connect("127.0.0.1", DEFAULT_PORT).await.unwrap_err();
    assert!(matches!(err, SyncError::Transport(_)));
    assert!(matches!(
        manager.spawn_receive_loop(MessageRouter::new(InboxSink::new(Arc::clone(manager.inbox())))),
        Err(SyncError::NotConnected)
    ));

    host.refuse_connections(false);
    manager.connect("127.0.0.1", DEFAULT_PORT).await.unwrap();
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_local_disconnect_ends_receive_loop() {
    let (manager, _host, inbox) = client();
    manager.connect("127.0.0.1", DEFAULT_PORT).await.unwrap();
    let receive_loop = manager
        .spawn_receive_loop(MessageRouter::new(InboxSink::new(Arc::clone(&inbox))))
        .unwrap();

    manager.disconnect();

    let stats = receive_loop.await.unwrap();
    assert_eq!(stats.dispatched, 0);
    assert!(inbox.is_closed());
    assert!(inbox.take_disconnect());
}

#[tokio::test]
async fn test_reconnect_survives_old_receive_loop() {
    let (manager, host, inbox) = client();
    manager.connect("127.0.0.1", DEFAULT_PORT).await.unwrap();
    let old_loop = manager
        .spawn_receive_loop(MessageRouter::new(InboxSink::new(Arc::clone(&inbox))))
        .unwrap();

    // The old loop has not run yet: its local disconnect is still queued
    manager.disconnect();
    manager.connect("127.0.0.1", DEFAULT_PORT).await.unwrap();
    let new_loop = manager
        .spawn_receive_loop(MessageRouter::new(InboxSink::new(Arc::clone(&inbox))))
        .unwrap();

    let old_stats = old_loop.await.unwrap();
    assert_eq!(old_stats.dispatched, 0);
    assert!(manager.is_connected());
    assert!(host.is_connected());
    assert!(!inbox.is_closed());

    host.deliver_record(Tag::TICK_UPDATE, &TickDelta::empty(9)).unwrap();
    let mut session = GameSession::new(Arc::clone(&inbox), &SyncConfig::default(), NullObserver);
    step_until(&mut session, |s| s.last_received_server_tick() == 9).await;

    host.disconnect();
    let new_stats = new_loop.await.unwrap();
    assert_eq!(new_stats.dispatched, 1);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tcp_host_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let inbox = Arc::new(SessionInbox::default());
    let manager = Arc::new(ConnectionManager::new(TcpTransport::new(), Arc::clone(&inbox)));

    let (connected, accepted) = tokio::join!(manager.connect("127.0.0.1", port), listener.accept());
    connected.unwrap();
    let (mut host, _) = accepted.unwrap();

    manager
        .spawn_receive_loop(MessageRouter::new(InboxSink::new(Arc::clone(&inbox))))
        .unwrap();

    let join = Envelope::from_record(
        Tag::JOIN_ACCEPT,
        &JoinSnapshot {
            server_tick_at_join: 8,
            initial_entities: vec![SpawnRecord::new(5, "Eve")],
        },
    )
    .unwrap();
    host.write_all(&join.encode().unwrap()).await.unwrap();

    let mut session = GameSession::new(inbox, &SyncConfig::default(), NullObserver);
    step_until(&mut session, |s| s.registry().contains(5)).await;
    assert_eq!(session.client_tick(), session.last_received_server_tick() + 1);

    drop(host);
    let mut notification = manager.connected_notification();
    tokio::time::timeout(
        Duration::from_secs(2),
        notification.wait_for(|state| *state == ConnectionState::Disconnected),
    )
    .await
    .unwrap()
    .unwrap();
}
