use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;

use mash::{
    AttributeId, EndpointId, FeatureType, HeartbeatMode, Notification, SubscriptionManager,
    SubscriptionPolicy, Value, ZoneId,
};

const ENDPOINT: EndpointId = EndpointId(1);
const ATTR: AttributeId = AttributeId(0x20);

type Sink = Arc<Mutex<Vec<Notification>>>;

fn manager_with(policy: SubscriptionPolicy) -> (Arc<SubscriptionManager>, Sink) {
    let seen: Sink = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let manager = SubscriptionManager::new(
        policy,
        Arc::new(move |notification| {
            sink.lock()
                .expect("test sink mutex poisoned")
                .push(notification);
        }),
    );
    (manager, seen)
}

fn current_values(value_mw: i64) -> BTreeMap<AttributeId, Value> {
    BTreeMap::from([(ATTR, Value::I64(value_mw))])
}

fn subscribe(
    manager: &SubscriptionManager,
    min: Duration,
    max: Duration,
    priming_value: i64,
) -> u32 {
    manager
        .subscribe(
            ZoneId::new("zone-local"),
            ENDPOINT,
            FeatureType::EnergyControl,
            vec![ATTR],
            min,
            max,
            current_values(priming_value),
        )
        .expect("subscription should establish")
}

fn drain(seen: &Sink) -> Vec<Notification> {
    std::mem::take(&mut *seen.lock().expect("test sink mutex poisoned"))
}

#[tokio::test(start_paused = true)]
async fn a_value_that_bounces_back_within_the_window_is_suppressed() {
    let (manager, seen) = manager_with(SubscriptionPolicy::default());
    subscribe(
        &manager,
        Duration::from_millis(100),
        Duration::from_secs(1),
        5_000_000,
    );
    let priming = drain(&seen);
    assert_eq!(1, priming.len());
    assert!(priming[0].is_priming);

    manager.notify_change(ENDPOINT, FeatureType::EnergyControl, ATTR, Value::I64(3_000_000));
    manager.notify_change(ENDPOINT, FeatureType::EnergyControl, ATTR, Value::I64(5_000_000));
    tokio::time::advance(Duration::from_millis(150)).await;
    manager.process_notifications();

    assert!(drain(&seen).is_empty());
}

#[tokio::test(start_paused = true)]
async fn a_value_that_settles_on_a_new_value_is_delivered_once() {
    let (manager, seen) = manager_with(SubscriptionPolicy::default());
    let id = subscribe(
        &manager,
        Duration::from_millis(100),
        Duration::from_secs(1),
        5_000_000,
    );
    drain(&seen);

    manager.notify_change(ENDPOINT, FeatureType::EnergyControl, ATTR, Value::I64(3_000_000));
    manager.notify_change(ENDPOINT, FeatureType::EnergyControl, ATTR, Value::I64(2_000_000));
    tokio::time::advance(Duration::from_millis(150)).await;
    manager.process_notifications();

    let delivered = drain(&seen);
    assert_eq!(1, delivered.len());
    assert_eq!(id, delivered[0].subscription_id);
    assert!(!delivered[0].is_priming);
    assert!(!delivered[0].is_heartbeat);
    assert_eq!(
        BTreeMap::from([(ATTR, Value::I64(2_000_000))]),
        delivered[0].attributes
    );
}

#[tokio::test(start_paused = true)]
async fn changes_inside_the_window_wait_for_min_interval() {
    let (manager, seen) = manager_with(SubscriptionPolicy::default());
    subscribe(
        &manager,
        Duration::from_millis(100),
        Duration::from_secs(1),
        1,
    );
    drain(&seen);

    manager.notify_change(ENDPOINT, FeatureType::EnergyControl, ATTR, Value::I64(2));
    tokio::time::advance(Duration::from_millis(50)).await;
    manager.process_notifications();
    assert!(drain(&seen).is_empty());

    tokio::time::advance(Duration::from_millis(60)).await;
    manager.process_notifications();
    assert_eq!(1, drain(&seen).len());
}

#[tokio::test(start_paused = true)]
async fn idle_subscriptions_emit_heartbeats_at_max_interval() {
    let (manager, seen) = manager_with(SubscriptionPolicy::default());
    let id = subscribe(
        &manager,
        Duration::from_millis(50),
        Duration::from_millis(100),
        7,
    );
    drain(&seen);

    tokio::time::advance(Duration::from_millis(150)).await;
    manager.process_notifications();

    let delivered = drain(&seen);
    assert_eq!(1, delivered.len());
    assert!(delivered[0].is_heartbeat);
    assert_eq!(id, delivered[0].subscription_id);
    // Empty heartbeat mode carries no attribute snapshot.
    assert!(delivered[0].attributes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn full_heartbeats_carry_the_last_notified_snapshot() {
    let (manager, seen) = manager_with(
        SubscriptionPolicy::builder()
            .heartbeat_mode(HeartbeatMode::Full)
            .build(),
    );
    subscribe(
        &manager,
        Duration::from_millis(50),
        Duration::from_millis(100),
        7,
    );
    drain(&seen);

    tokio::time::advance(Duration::from_millis(150)).await;
    manager.process_notifications();

    let delivered = drain(&seen);
    assert_eq!(1, delivered.len());
    assert!(delivered[0].is_heartbeat);
    assert_eq!(BTreeMap::from([(ATTR, Value::I64(7))]), delivered[0].attributes);
}

#[tokio::test(start_paused = true)]
async fn priming_always_precedes_change_notifications() {
    let (manager, seen) = manager_with(SubscriptionPolicy::default());
    subscribe(
        &manager,
        Duration::from_millis(10),
        Duration::from_secs(1),
        1,
    );
    manager.notify_change(ENDPOINT, FeatureType::EnergyControl, ATTR, Value::I64(2));
    tokio::time::advance(Duration::from_millis(20)).await;
    manager.process_notifications();

    let delivered = drain(&seen);
    assert_eq!(2, delivered.len());
    assert!(delivered[0].is_priming);
    assert!(!delivered[1].is_priming);
}

#[tokio::test(start_paused = true)]
async fn suppression_can_be_disabled_by_policy() {
    let (manager, seen) = manager_with(
        SubscriptionPolicy::builder()
            .suppress_bounce_back(false)
            .build(),
    );
    subscribe(
        &manager,
        Duration::from_millis(100),
        Duration::from_secs(1),
        5_000_000,
    );
    drain(&seen);

    manager.notify_change(ENDPOINT, FeatureType::EnergyControl, ATTR, Value::I64(3_000_000));
    manager.notify_change(ENDPOINT, FeatureType::EnergyControl, ATTR, Value::I64(5_000_000));
    tokio::time::advance(Duration::from_millis(150)).await;
    manager.process_notifications();

    // Without suppression the bounced-back value is still delivered.
    let delivered = drain(&seen);
    assert_eq!(1, delivered.len());
    assert_eq!(
        BTreeMap::from([(ATTR, Value::I64(5_000_000))]),
        delivered[0].attributes
    );
}

#[tokio::test(start_paused = true)]
async fn unsubscribed_subscriptions_no_longer_deliver() {
    let (manager, seen) = manager_with(SubscriptionPolicy::default());
    let id = subscribe(
        &manager,
        Duration::from_millis(10),
        Duration::from_secs(1),
        1,
    );
    drain(&seen);

    assert!(manager.unsubscribe(id));
    manager.notify_change(ENDPOINT, FeatureType::EnergyControl, ATTR, Value::I64(2));
    tokio::time::advance(Duration::from_millis(20)).await;
    manager.process_notifications();

    assert!(drain(&seen).is_empty());
    assert_eq!(0, manager.subscription_count());
}
