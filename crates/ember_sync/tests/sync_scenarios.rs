//! End-to-end reconciliation scenarios driven through the shared inbox, the
//! way the network task and the fixed-step loop see them.

use std::sync::Arc;

use ember_shared::{
    DespawnRecord, Envelope, HealthRecord, JoinSnapshot, SimState, SpawnRecord, StateRecord, Tag,
    TickDelta,
};
use ember_sync::{
    DisconnectPolicy, EntityEvent, GameSession, InboxSink, MessageRouter, RecordingObserver,
    SessionInbox, StaleDeltaPolicy, SyncConfig, FULL_HEALTH,
};

struct Harness {
    router: MessageRouter<InboxSink>,
    session: GameSession<RecordingObserver>,
}

impl Harness {
    fn new(config: &SyncConfig) -> Self {
        let inbox = Arc::new(SessionInbox::default());
        Self {
            router: MessageRouter::new(InboxSink::new(Arc::clone(&inbox))),
            session: GameSession::new(inbox, config, RecordingObserver::new()),
        }
    }

    fn receive_delta(&mut self, delta: &TickDelta) {
        let bytes = Envelope::from_record(Tag::TICK_UPDATE, delta)
            .unwrap()
            .encode()
            .unwrap();
        self.router.on_bytes_received(&bytes);
    }
}

fn alice_and_bob(tick: u32) -> JoinSnapshot {
    JoinSnapshot {
        server_tick_at_join: tick,
        initial_entities: vec![SpawnRecord::new(1, "Alice"), SpawnRecord::new(2, "Bob")],
    }
}

#[test]
fn test_join_then_first_delta() {
    let mut harness = Harness::new(&SyncConfig::default());

    harness.session.apply_join(&alice_and_bob(50));

    assert_eq!(harness.session.last_received_server_tick(), 50);
    assert_eq!(harness.session.client_tick(), 50);
    assert_eq!(harness.session.registry().ids(), vec![1, 2]);

    harness.receive_delta(&TickDelta {
        spawns: vec![SpawnRecord::new(3, "Cara")],
        despawns: vec![DespawnRecord { id: 2 }],
        health_updates: vec![HealthRecord { id: 1, health: 80 }],
        ..TickDelta::empty(51)
    });
    harness.session.fixed_update();

    let registry = harness.session.registry();
    assert_eq!(registry.ids(), vec![1, 3]);
    assert_eq!(registry.get(1).unwrap().health, 80);
    assert_eq!(registry.get(3).unwrap().display_name, "Cara");
    assert_eq!(registry.get(3).unwrap().health, FULL_HEALTH);
    assert_eq!(harness.session.last_received_server_tick(), 51);
    assert_eq!(harness.session.client_tick(), 51);
}

#[test]
fn test_join_accept_over_the_wire() {
    let mut harness = Harness::new(&SyncConfig::default());
    let bytes = Envelope::from_record(Tag::JOIN_ACCEPT, &alice_and_bob(50))
        .unwrap()
        .encode()
        .unwrap();
    harness.router.on_bytes_received(&bytes);

    // Nothing changes until the simulation side runs
    assert!(harness.session.registry().is_empty());

    harness.session.fixed_update();
    assert_eq!(harness.session.registry().ids(), vec![1, 2]);
    assert_eq!(harness.session.last_received_server_tick(), 50);
}

#[test]
fn test_client_tick_advances_once_per_step() {
    let mut harness = Harness::new(&SyncConfig::default());
    harness.session.apply_join(&JoinSnapshot::default());

    let mut server_tick = 0;
    for step in 1..=1000u32 {
        // Sparse, bursty arrivals
        if step % 7 == 0 {
            for _ in 0..3 {
                server_tick += 1;
                harness.receive_delta(&TickDelta::empty(server_tick));
            }
        }
        harness.session.fixed_update();
        assert_eq!(harness.session.client_tick(), step);
    }
}

#[test]
fn test_spawn_and_despawn_across_one_pass() {
    let mut harness = Harness::new(&SyncConfig::default());
    harness.session.apply_join(&JoinSnapshot::default());

    harness.receive_delta(&TickDelta {
        spawns: vec![SpawnRecord::new(9, "Flash")],
        ..TickDelta::empty(1)
    });
    harness.receive_delta(&TickDelta {
        despawns: vec![DespawnRecord { id: 9 }],
        ..TickDelta::empty(2)
    });
    harness.session.fixed_update();

    assert!(!harness.session.registry().contains(9));
}

#[test]
fn test_unknown_ids_leave_registry_untouched() {
    let mut harness = Harness::new(&SyncConfig::default());
    harness.session.apply_join(&alice_and_bob(10));
    harness.session.observer_mut().take_events();

    harness.receive_delta(&TickDelta {
        despawns: vec![DespawnRecord { id: 500 }],
        state_updates: vec![StateRecord {
            id: 501,
            sim_state: SimState::at(4.0, 0.0, 4.0),
        }],
        health_updates: vec![HealthRecord { id: 502, health: 1 }],
        ..TickDelta::empty(11)
    });
    let report = harness.session.fixed_update();

    assert_eq!(report.unknown_ids, 3);
    assert_eq!(harness.session.registry().ids(), vec![1, 2]);
    assert!(harness.session.observer().events().is_empty());
}

#[test]
fn test_observer_sees_changes_in_apply_order() {
    let mut harness = Harness::new(&SyncConfig::default());
    harness.session.apply_join(&alice_and_bob(10));
    harness.session.observer_mut().take_events();

    let moved = SimState::at(1.0, 2.0, 3.0);
    harness.receive_delta(&TickDelta {
        spawns: vec![SpawnRecord::new(3, "Cara")],
        despawns: vec![DespawnRecord { id: 2 }],
        state_updates: vec![StateRecord { id: 3, sim_state: moved }],
        health_updates: vec![HealthRecord { id: 1, health: 55 }],
        ..TickDelta::empty(11)
    });
    harness.session.fixed_update();

    assert_eq!(
        harness.session.observer_mut().take_events(),
        vec![
            EntityEvent::Spawned {
                id: 3,
                display_name: "Cara".to_owned()
            },
            EntityEvent::Despawned { id: 2 },
            EntityEvent::StateChanged {
                id: 3,
                sim_state: moved
            },
            EntityEvent::HealthChanged { id: 1, health: 55 },
        ]
    );
}

#[test]
fn test_stale_and_duplicate_deltas() {
    let mut harness = Harness::new(&SyncConfig::default());
    harness.session.apply_join(&alice_and_bob(50));

    harness.receive_delta(&TickDelta {
        health_updates: vec![HealthRecord { id: 1, health: 10 }],
        ..TickDelta::empty(52)
    });
    // Late and duplicate arrivals carry older state
    harness.receive_delta(&TickDelta {
        health_updates: vec![HealthRecord { id: 1, health: 90 }],
        ..TickDelta::empty(51)
    });
    harness.receive_delta(&TickDelta {
        health_updates: vec![HealthRecord { id: 1, health: 90 }],
        ..TickDelta::empty(52)
    });
    let report = harness.session.fixed_update();

    assert_eq!(report.stale_dropped, 2);
    assert_eq!(harness.session.registry().get(1).unwrap().health, 10);
    assert_eq!(harness.session.last_received_server_tick(), 52);
}

#[test]
fn test_apply_policy_uses_arrival_order() {
    let config = SyncConfig {
        stale_delta_policy: StaleDeltaPolicy::Apply,
        ..SyncConfig::default()
    };
    let mut harness = Harness::new(&config);
    harness.session.apply_join(&alice_and_bob(50));

    harness.receive_delta(&TickDelta {
        health_updates: vec![HealthRecord { id: 1, health: 10 }],
        ..TickDelta::empty(52)
    });
    harness.receive_delta(&TickDelta {
        health_updates: vec![HealthRecord { id: 1, health: 90 }],
        ..TickDelta::empty(51)
    });
    harness.session.fixed_update();

    assert_eq!(harness.session.registry().get(1).unwrap().health, 90);
    assert_eq!(harness.session.last_received_server_tick(), 51);
}

#[test]
fn test_disconnect_discards_buffered_deltas() {
    let mut harness = Harness::new(&SyncConfig::default());
    harness.session.apply_join(&alice_and_bob(50));

    harness.receive_delta(&TickDelta {
        despawns: vec![DespawnRecord { id: 1 }],
        ..TickDelta::empty(51)
    });
    harness.session.inbox().close();
    // Arrives after the session closed
    harness.receive_delta(&TickDelta {
        despawns: vec![DespawnRecord { id: 2 }],
        ..TickDelta::empty(52)
    });

    for _ in 0..3 {
        let report = harness.session.fixed_update();
        assert_eq!(report.deltas_applied, 0);
    }
    assert_eq!(harness.session.registry().ids(), vec![1, 2]);
    assert_eq!(harness.session.last_received_server_tick(), 50);
}

#[test]
fn test_disconnect_despawn_all_policy() {
    let config = SyncConfig {
        disconnect_policy: DisconnectPolicy::DespawnAll,
        ..SyncConfig::default()
    };
    let mut harness = Harness::new(&config);
    harness.session.apply_join(&alice_and_bob(50));

    harness.session.inbox().close();
    harness.session.fixed_update();

    assert!(harness.session.registry().is_empty());
}

#[test]
fn test_local_participant_never_materialized() {
    let mut harness = Harness::new(&SyncConfig::default());
    harness.session.inbox().set_local_participant(2);
    harness.session.apply_join(&alice_and_bob(50));

    harness.receive_delta(&TickDelta {
        spawns: vec![SpawnRecord::new(2, "Bob")],
        ..TickDelta::empty(51)
    });
    harness.session.fixed_update();

    assert_eq!(harness.session.registry().ids(), vec![1]);
    assert_eq!(harness.session.local_participant_id(), Some(2));
}

#[test]
fn test_buffer_overflow_keeps_newest() {
    let mut harness = Harness::new(&SyncConfig::default());
    harness.session.apply_join(&JoinSnapshot::default());

    // Default capacity is 4
    for tick in 1..=6 {
        harness.receive_delta(&TickDelta {
            spawns: vec![SpawnRecord::new(u16::try_from(tick).unwrap(), "x")],
            ..TickDelta::empty(tick)
        });
    }
    let report = harness.session.fixed_update();

    assert_eq!(report.deltas_applied, 4);
    assert_eq!(harness.session.registry().ids(), vec![3, 4, 5, 6]);
    assert_eq!(harness.session.last_received_server_tick(), 6);
}

#[test]
fn test_malformed_messages_do_not_stall() {
    let mut harness = Harness::new(&SyncConfig::default());
    harness.session.apply_join(&JoinSnapshot::default());

    harness.router.on_bytes_received(&[0xFF; 3]);
    harness
        .router
        .on_message_received(Envelope::new(Tag::TICK_UPDATE, vec![1, 2, 3]));
    harness.receive_delta(&TickDelta {
        spawns: vec![SpawnRecord::new(4, "Dana")],
        ..TickDelta::empty(1)
    });
    harness.session.fixed_update();

    assert_eq!(harness.router.stats().dropped, 2);
    assert!(harness.session.registry().contains(4));
}
