//! End-to-end channel scenarios over the in-memory store and bus.

use copresence::{
    ChannelConfig, ClientId, ConfigRegistry, LockError, ManualClock, MemoryBus, MemoryStore,
    PresenceError, PresenceHub, StoreError, UserId,
};
use serde_json::json;
use std::sync::Arc;

struct TestBed {
    hub: PresenceHub,
    bus: Arc<MemoryBus>,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
}

fn testbed() -> TestBed {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let bus = Arc::new(MemoryBus::new());

    let registry = ConfigRegistry::new();
    registry.register_prefix("/test", |name| match name {
        "/test/public1" | "/test/public2" => Some(ChannelConfig::new().public(true)),
        "/test/count-only" => Some(ChannelConfig::new().public(true).count_only(true)),
        "/test/allowed-users" => Some(ChannelConfig::new().allowed_users([UserId(5)])),
        "/test/no-access" => Some(ChannelConfig::new()),
        _ => None,
    });

    let hub = PresenceHub::new(registry, store.clone(), bus.clone()).clock(clock.clone());
    TestBed {
        hub,
        bus,
        clock,
        store,
    }
}

#[tokio::test]
async fn multi_client_enter_and_leave_publish_once_each() {
    let bed = testbed();
    let channel = bed.hub.channel("/test/public1").unwrap();
    let user = UserId(42);

    channel.present(user, &ClientId::from("1")).await.unwrap();
    channel.present(user, &ClientId::from("2")).await.unwrap();

    // Second device joined an already-present user: still one event.
    let topic = channel.bus_topic_name();
    assert_eq!(bed.bus.messages(&topic).len(), 1);
    assert_eq!(
        bed.bus.messages(&topic)[0].payload,
        json!({ "enteringUsers": [{ "id": 42 }] })
    );

    channel.leave(user, &ClientId::from("2")).await.unwrap();
    // One device remains; the user has not left yet.
    assert_eq!(bed.bus.messages(&topic).len(), 1);
    assert_eq!(channel.user_ids().await.unwrap().len(), 1);

    channel.leave(user, &ClientId::from("1")).await.unwrap();
    assert!(channel.user_ids().await.unwrap().is_empty());

    let messages = bed.bus.messages(&topic);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].payload, json!({ "leavingUserIds": [42] }));
}

#[tokio::test]
async fn repeated_present_publishes_single_entering_event() {
    let bed = testbed();
    let channel = bed.hub.channel("/test/public1").unwrap();
    let client = ClientId::from("a");

    for _ in 0..3 {
        channel.present(UserId(7), &client).await.unwrap();
    }

    assert_eq!(bed.bus.messages(&channel.bus_topic_name()).len(), 1);
    assert_eq!(channel.count().await.unwrap(), 1);
}

#[tokio::test]
async fn repeated_leave_publishes_single_leaving_event() {
    let bed = testbed();
    let channel = bed.hub.channel("/test/public1").unwrap();
    let client = ClientId::from("a");

    channel.present(UserId(7), &client).await.unwrap();
    for _ in 0..3 {
        channel.leave(UserId(7), &client).await.unwrap();
    }

    assert_eq!(bed.bus.messages(&channel.bus_topic_name()).len(), 2);
}

#[tokio::test]
async fn leave_of_absent_entry_is_a_noop() {
    let bed = testbed();
    let channel = bed.hub.channel("/test/public1").unwrap();

    channel.leave(UserId(1), &ClientId::from("a")).await.unwrap();

    assert!(bed.bus.messages(&channel.bus_topic_name()).is_empty());
}

#[tokio::test]
async fn count_only_channel_publishes_deltas_without_identities() {
    let bed = testbed();
    let channel = bed.hub.channel("/test/count-only").unwrap();
    let client = ClientId::from("a");

    channel.present(UserId(7), &client).await.unwrap();
    channel.leave(UserId(7), &client).await.unwrap();

    let messages = bed.bus.messages(&channel.bus_topic_name());
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].payload, json!({ "countDelta": 1 }));
    assert_eq!(messages[1].payload, json!({ "countDelta": -1 }));
}

#[tokio::test]
async fn allow_list_gates_entry_and_viewing() {
    let bed = testbed();
    let channel = bed.hub.channel("/test/allowed-users").unwrap();

    assert!(channel.can_enter(Some(UserId(5))));
    assert!(!channel.can_enter(Some(UserId(6))));
    assert!(!channel.can_view(None));

    let err = channel
        .present(UserId(6), &ClientId::from("a"))
        .await
        .unwrap_err();
    assert!(matches!(err, PresenceError::Forbidden(name) if name == "/test/allowed-users"));

    channel.present(UserId(5), &ClientId::from("a")).await.unwrap();
    let messages = bed.bus.messages(&channel.bus_topic_name());
    assert_eq!(messages.len(), 1);
    // Restriction metadata rides along with the publish, outside the body.
    assert_eq!(messages[0].options.allowed_user_ids, Some(vec![UserId(5)]));
    assert_eq!(messages[0].payload, json!({ "enteringUsers": [{ "id": 5 }] }));
}

#[tokio::test]
async fn no_access_channel_denies_everyone() {
    let bed = testbed();
    let channel = bed.hub.channel("/test/no-access").unwrap();

    assert!(!channel.can_enter(Some(UserId(1))));
    assert!(!channel.can_view(Some(UserId(1))));
    assert!(matches!(
        channel.present(UserId(1), &ClientId::from("a")).await,
        Err(PresenceError::Forbidden(_))
    ));
}

#[tokio::test]
async fn unknown_channel_is_not_found_not_forbidden() {
    let bed = testbed();

    // No prefix matches.
    assert!(matches!(
        bed.hub.channel("/video/1"),
        Err(PresenceError::NotFound(_))
    ));
    // Prefix matches but the resolver declines the name.
    assert!(matches!(
        bed.hub.channel("/test/unknown"),
        Err(PresenceError::NotFound(_))
    ));
}

#[tokio::test]
async fn sweep_expires_abandoned_entries() {
    let bed = testbed();
    let channel = bed.hub.channel("/test/public1").unwrap();
    channel.present(UserId(9), &ClientId::from("a")).await.unwrap();

    bed.clock.advance(61);
    bed.hub.auto_leave_all().await.unwrap();

    let messages = bed.bus.messages("/presence/test/public1");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].payload, json!({ "leavingUserIds": [9] }));

    let channel = bed.hub.channel("/test/public1").unwrap();
    assert!(channel.user_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn sweep_never_removes_young_entries() {
    let bed = testbed();
    let channel = bed.hub.channel("/test/public1").unwrap();
    channel.present(UserId(9), &ClientId::from("a")).await.unwrap();

    bed.clock.advance(59);
    bed.hub.auto_leave_all().await.unwrap();

    let channel = bed.hub.channel("/test/public1").unwrap();
    assert_eq!(
        channel.user_ids().await.unwrap(),
        [UserId(9)].into_iter().collect()
    );
    assert_eq!(bed.bus.messages("/presence/test/public1").len(), 1);
}

#[tokio::test]
async fn present_refreshes_the_entry() {
    let bed = testbed();
    let channel = bed.hub.channel("/test/public1").unwrap();
    let client = ClientId::from("a");

    channel.present(UserId(9), &client).await.unwrap();
    bed.clock.advance(40);
    channel.present(UserId(9), &client).await.unwrap();
    bed.clock.advance(40);

    // 80s since first call, 40s since refresh: still present.
    bed.hub.auto_leave_all().await.unwrap();
    let channel = bed.hub.channel("/test/public1").unwrap();
    assert_eq!(channel.count().await.unwrap(), 1);
    assert_eq!(bed.bus.messages("/presence/test/public1").len(), 1);
}

#[tokio::test]
async fn sweep_batches_leaves_into_one_event() {
    let bed = testbed();
    let channel = bed.hub.channel("/test/public1").unwrap();
    channel.present(UserId(1), &ClientId::from("a")).await.unwrap();
    channel.present(UserId(2), &ClientId::from("b")).await.unwrap();
    channel.present(UserId(3), &ClientId::from("c")).await.unwrap();

    bed.clock.advance(61);
    bed.hub.auto_leave_all().await.unwrap();

    let messages = bed.bus.messages("/presence/test/public1");
    // Three enters, then a single batched leave.
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[3].payload, json!({ "leavingUserIds": [1, 2, 3] }));
}

#[tokio::test]
async fn state_snapshots_membership_with_bus_position() {
    let bed = testbed();
    let channel = bed.hub.channel("/test/public1").unwrap();
    channel.present(UserId(1), &ClientId::from("a")).await.unwrap();
    channel.present(UserId(2), &ClientId::from("b")).await.unwrap();

    let state = channel.state().await.unwrap();
    assert_eq!(state.count, 2);
    assert_eq!(state.count, state.user_ids.len());
    assert_eq!(
        state.user_ids,
        [UserId(1), UserId(2)].into_iter().collect()
    );
    assert_eq!(
        state.bus_last_id,
        bed.bus.messages(&channel.bus_topic_name()).last().unwrap().id
    );
}

#[tokio::test]
async fn channels_are_independent() {
    let bed = testbed();
    let first = bed.hub.channel("/test/public1").unwrap();
    let second = bed.hub.channel("/test/public2").unwrap();
    let client = ClientId::from("a");

    first.present(UserId(1), &client).await.unwrap();
    second.present(UserId(1), &client).await.unwrap();
    first.leave(UserId(1), &client).await.unwrap();

    assert!(first.user_ids().await.unwrap().is_empty());
    assert_eq!(second.count().await.unwrap(), 1);
    assert_eq!(bed.bus.messages(&first.bus_topic_name()).len(), 2);
    assert_eq!(bed.bus.messages(&second.bus_topic_name()).len(), 1);
}

#[tokio::test]
async fn store_failure_surfaces_and_releases_the_lock() {
    let bed = testbed();
    let channel = bed.hub.channel("/test/public1").unwrap();
    channel.present(UserId(1), &ClientId::from("a")).await.unwrap();

    bed.store.set_read_only(true);
    let err = channel
        .present(UserId(2), &ClientId::from("a"))
        .await
        .unwrap_err();
    // The write-rejecting store is hit first while taking the lock.
    assert!(matches!(
        err,
        PresenceError::Lock(LockError::Store(StoreError::ReadOnly))
    ));
    // The failed operation committed nothing and published nothing.
    assert_eq!(bed.bus.messages(&channel.bus_topic_name()).len(), 1);
    assert_eq!(channel.count().await.unwrap(), 1);

    // After failback the channel is not wedged by a stuck lock.
    bed.store.set_read_only(false);
    channel.present(UserId(2), &ClientId::from("a")).await.unwrap();
    assert_eq!(channel.count().await.unwrap(), 2);
}

#[tokio::test]
async fn count_always_matches_user_ids() {
    let bed = testbed();
    let channel = bed.hub.channel("/test/public1").unwrap();

    let steps: &[(u64, &str, bool)] = &[
        (1, "a", true),
        (1, "b", true),
        (2, "a", true),
        (1, "a", false),
        (3, "a", true),
        (2, "a", false),
        (1, "b", false),
    ];
    for &(user, client, enter) in steps {
        let client = ClientId::from(client);
        if enter {
            channel.present(UserId(user), &client).await.unwrap();
        } else {
            channel.leave(UserId(user), &client).await.unwrap();
        }
        assert_eq!(
            channel.count().await.unwrap(),
            channel.user_ids().await.unwrap().len()
        );
    }

    assert_eq!(
        channel.user_ids().await.unwrap(),
        [UserId(3)].into_iter().collect()
    );
}
