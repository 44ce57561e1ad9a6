//! Integration tests for Tourbase
//!
//! These tests drive the change-notification layer end to end through its
//! public API: an in-process CDC hub, the channel registry, subscription
//! handles, the liveness monitor, and consumer refetch adapters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use tourbase_common::config::RealtimeConfig;
use tourbase_realtime::adapter::{fields_changed, RefetchAdapter};
use tourbase_realtime::{CdcHub, ChangeOp, ChannelRegistry, LivenessMonitor, Subscription};

/// Test helper wiring a registry over a fresh in-process hub
fn create_test_registry() -> (CdcHub, ChannelRegistry) {
    tourbase_common::logging::init("warn");
    let hub = CdcHub::new();
    let registry = ChannelRegistry::new(Arc::new(hub.clone()));
    (hub, registry)
}

fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
    let count = Arc::new(AtomicUsize::new(0));
    let reader = count.clone();
    (count, move || reader.load(Ordering::SeqCst))
}

// ============================================================================
// Connector Lifecycle Tests
// ============================================================================

#[test]
fn test_no_dangling_connectors() {
    let (hub, registry) = create_test_registry();

    // At every step, the set of open channels must equal the set of tables
    // with at least one listener.
    let d1 = registry.subscribe("destinations", |_| {});
    assert_eq!(hub.open_tables(), vec!["destinations"]);

    let a1 = registry.subscribe("audio_guides", |_| {});
    let d2 = registry.subscribe("destinations", |_| {});
    assert_eq!(hub.open_tables(), vec!["audio_guides", "destinations"]);

    d1.unsubscribe();
    assert_eq!(hub.open_tables(), vec!["audio_guides", "destinations"]);

    d2.unsubscribe();
    assert_eq!(hub.open_tables(), vec!["audio_guides"]);

    a1.unsubscribe();
    assert!(hub.open_tables().is_empty());
    assert_eq!(registry.table_count(), 0);
}

#[test]
fn test_reference_counting() {
    let (hub, registry) = create_test_registry();

    let subs: Vec<Subscription> = (0..5)
        .map(|_| registry.subscribe("destinations", |_| {}))
        .collect();

    // N-1 unsubscribes leave the channel open; the Nth closes it.
    for sub in subs.iter().take(4) {
        sub.unsubscribe();
        assert!(hub.is_open("destinations"));
    }
    subs[4].unsubscribe();
    assert!(!hub.is_open("destinations"));
}

#[test]
fn test_resubscribe_reopens_channel() {
    let (hub, registry) = create_test_registry();
    let (count, calls) = counter();

    let sub = registry.subscribe("destinations", |_| {});
    sub.unsubscribe();
    assert!(!hub.is_open("destinations"));

    let c = count.clone();
    let _sub = registry.subscribe("destinations", move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    hub.emit_insert("destinations", json!({"id": "d1"}));
    assert_eq!(calls(), 1);
}

// ============================================================================
// Fan-out Tests
// ============================================================================

#[test]
fn test_fan_out_completeness_and_order() {
    let (hub, registry) = create_test_registry();
    let order = Arc::new(Mutex::new(Vec::new()));

    let _subs: Vec<Subscription> = (0..4)
        .map(|i| {
            let o = order.clone();
            registry.subscribe("destinations", move |event| {
                o.lock().push((i, event.record_id.clone()));
            })
        })
        .collect();

    hub.emit_insert("destinations", json!({"id": "d1"}));

    let calls = order.lock().clone();
    assert_eq!(calls.len(), 4);
    let expected: Vec<(usize, String)> = (0..4).map(|i| (i, "d1".to_string())).collect();
    assert_eq!(calls, expected);
}

#[test]
fn test_snapshot_stability_self_unsubscribe() {
    let (hub, registry) = create_test_registry();
    let order = Arc::new(Mutex::new(Vec::new()));
    let middle: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

    let o = order.clone();
    let _first = registry.subscribe("destinations", move |_| o.lock().push("first"));

    // The middle listener removes itself during its own invocation.
    let o = order.clone();
    let m = middle.clone();
    let sub = registry.subscribe("destinations", move |_| {
        o.lock().push("middle");
        if let Some(sub) = m.lock().take() {
            sub.unsubscribe();
        }
    });
    *middle.lock() = Some(sub);

    let o = order.clone();
    let _last = registry.subscribe("destinations", move |_| o.lock().push("last"));

    // Current event is delivered to the full snapshot, middle included.
    hub.emit_insert("destinations", json!({"id": "d1"}));
    assert_eq!(*order.lock(), vec!["first", "middle", "last"]);

    // The next event reflects the removal.
    hub.emit_insert("destinations", json!({"id": "d2"}));
    assert_eq!(
        *order.lock(),
        vec!["first", "middle", "last", "first", "last"]
    );
}

#[test]
fn test_snapshot_stability_subscribe_during_fanout() {
    let (hub, registry) = create_test_registry();
    let (late_calls, late) = counter();
    let added = Arc::new(Mutex::new(Vec::new()));

    let reg = registry.clone();
    let a = added.clone();
    let _sub = registry.subscribe("destinations", move |_| {
        let mut added = a.lock();
        if added.is_empty() {
            let c = late_calls.clone();
            added.push(reg.subscribe("destinations", move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }));
        }
    });

    // The listener added mid-fan-out must not see the current event.
    hub.emit_insert("destinations", json!({"id": "d1"}));
    assert_eq!(late(), 0);

    hub.emit_insert("destinations", json!({"id": "d2"}));
    assert_eq!(late(), 1);
}

#[test]
fn test_isolation_under_listener_panic() {
    let (hub, registry) = create_test_registry();
    let (count, calls) = counter();

    let _panicking = registry.subscribe("destinations", |_| {
        panic!("listener bug");
    });
    let c = count.clone();
    let _healthy = registry.subscribe("destinations", move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    hub.emit_insert("destinations", json!({"id": "d1"}));
    assert_eq!(calls(), 1);

    // The panicking listener is neither removed nor allowed to wedge the
    // channel: the healthy one keeps receiving.
    hub.emit_insert("destinations", json!({"id": "d2"}));
    assert_eq!(calls(), 2);
    assert!(hub.is_open("destinations"));
}

// ============================================================================
// Scenario Tests
// ============================================================================

#[test]
fn test_two_consumers_on_destinations() {
    let (hub, registry) = create_test_registry();
    let consumer1 = Arc::new(Mutex::new(Vec::new()));
    let consumer2 = Arc::new(Mutex::new(Vec::new()));

    let c1 = consumer1.clone();
    let sub1 = registry.subscribe("destinations", move |event| {
        c1.lock().push((event.op, event.record_id.clone()));
    });
    let c2 = consumer2.clone();
    let sub2 = registry.subscribe("destinations", move |event| {
        c2.lock().push((event.op, event.record_id.clone()));
    });

    hub.emit_update(
        "destinations",
        json!({"id": "d1", "rating": 4.2}),
        json!({"id": "d1", "rating": 4.7}),
    );
    assert_eq!(*consumer1.lock(), vec![(ChangeOp::Update, "d1".to_string())]);
    assert_eq!(*consumer2.lock(), vec![(ChangeOp::Update, "d1".to_string())]);

    sub1.unsubscribe();
    hub.emit_update(
        "destinations",
        json!({"id": "d1", "rating": 4.7}),
        json!({"id": "d1", "rating": 4.9}),
    );
    assert_eq!(consumer1.lock().len(), 1);
    assert_eq!(consumer2.lock().len(), 2);

    sub2.unsubscribe();
    assert!(!registry.connection_states().contains_key("destinations"));
}

#[test]
fn test_subscribe_many_combined_teardown() {
    let (hub, registry) = create_test_registry();
    let (count, calls) = counter();

    let c = count.clone();
    let sub = registry.subscribe_many(&["a", "b"], move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    hub.emit_insert("a", json!({"id": "1"}));
    hub.emit_insert("b", json!({"id": "2"}));
    assert_eq!(calls(), 2);

    sub.unsubscribe();
    hub.emit_insert("a", json!({"id": "3"}));
    hub.emit_insert("b", json!({"id": "4"}));
    assert_eq!(calls(), 2);
    assert!(hub.open_tables().is_empty());
}

#[test]
fn test_shared_channel_between_single_and_group_subscriptions() {
    let (hub, registry) = create_test_registry();
    let (count, calls) = counter();

    let c = count.clone();
    let single = registry.subscribe("destinations", move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    let c = count.clone();
    let group = registry.subscribe_many(&["destinations", "services"], move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    hub.emit_insert("destinations", json!({"id": "d1"}));
    assert_eq!(calls(), 2);

    // The group teardown must not close a channel the single subscription
    // still holds.
    group.unsubscribe();
    assert!(hub.is_open("destinations"));
    assert!(!hub.is_open("services"));

    hub.emit_insert("destinations", json!({"id": "d2"}));
    assert_eq!(calls(), 3);

    single.unsubscribe();
    assert!(hub.open_tables().is_empty());
}

// ============================================================================
// Failure Semantics Tests
// ============================================================================

#[test]
fn test_refused_backend_surfaces_only_in_connection_state() {
    let (hub, registry) = create_test_registry();
    hub.refuse("payments");
    let (count, calls) = counter();

    // Subscribe still succeeds synchronously.
    let c = count.clone();
    let sub = registry.subscribe("payments", move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    assert!(sub.is_active());

    let states = registry.connection_states();
    assert_eq!(states.get("payments"), Some(&false));

    // No channel, no delivery.
    hub.emit_insert("payments", json!({"id": "p1"}));
    assert_eq!(calls(), 0);

    sub.unsubscribe();
    assert_eq!(registry.table_count(), 0);
}

#[test]
fn test_transport_drop_and_recovery() {
    let (hub, registry) = create_test_registry();
    let (count, calls) = counter();

    let c = count.clone();
    let _sub = registry.subscribe("destinations", move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    hub.interrupt("destinations");
    assert_eq!(registry.connection_states().get("destinations"), Some(&false));
    hub.emit_insert("destinations", json!({"id": "d1"}));
    assert_eq!(calls(), 0);

    // The transport recovers autonomously; delivery resumes.
    hub.restore("destinations");
    assert_eq!(registry.connection_states().get("destinations"), Some(&true));
    hub.emit_insert("destinations", json!({"id": "d2"}));
    assert_eq!(calls(), 1);
}

// ============================================================================
// Liveness Monitor Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_liveness_with_config_interval() {
    let (hub, registry) = create_test_registry();
    let _sub = registry.subscribe_many(&["destinations", "audio_guides"], |_| {});

    let config = RealtimeConfig {
        liveness_interval_secs: 5,
    };
    let monitor = LivenessMonitor::spawn_with_config(
        registry,
        vec!["destinations".to_string(), "audio_guides".to_string()],
        &config,
    );
    assert!(!monitor.is_live());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(monitor.is_live());

    hub.interrupt("audio_guides");
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!monitor.is_live());
}

// ============================================================================
// Consumer Adapter Tests
// ============================================================================

#[test]
fn test_selective_refetch_over_shared_channel() {
    let (hub, registry) = create_test_registry();
    let (unconditional, unconditional_calls) = counter();
    let (selective, selective_calls) = counter();

    // Two adapters share the one "destinations" channel but apply their own
    // business rules.
    let u = unconditional.clone();
    let catalog = RefetchAdapter::new(
        &registry,
        &["destinations"],
        tourbase_realtime::adapter::any_change(),
        move || {
            u.fetch_add(1, Ordering::SeqCst);
        },
    );
    let s = selective.clone();
    let ranking = RefetchAdapter::new(
        &registry,
        &["destinations"],
        fields_changed(&["rating", "order_position"]),
        move || {
            s.fetch_add(1, Ordering::SeqCst);
        },
    );

    // Name-only change: catalog refetches, ranking does not.
    hub.emit_update(
        "destinations",
        json!({"id": "d1", "name": "Lisboa", "rating": 4.2}),
        json!({"id": "d1", "name": "Lisbon", "rating": 4.2}),
    );
    assert_eq!(unconditional_calls(), 1);
    assert_eq!(selective_calls(), 0);

    hub.emit_update(
        "destinations",
        json!({"id": "d1", "name": "Lisbon", "rating": 4.2}),
        json!({"id": "d1", "name": "Lisbon", "rating": 4.7}),
    );
    assert_eq!(unconditional_calls(), 2);
    assert_eq!(selective_calls(), 1);

    catalog.stop();
    ranking.stop();
    assert!(hub.open_tables().is_empty());
}
