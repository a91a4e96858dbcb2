use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::model::{AttributeId, EndpointId, FeatureType, Value};
use crate::wire::Status;
use crate::zones::ZoneId;

use super::{HeartbeatMode, SubscriptionPolicy};

/// One delivered notification: priming snapshot, coalesced change set, or
/// heartbeat.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub subscription_id: u32,
    pub zone: ZoneId,
    pub endpoint: EndpointId,
    pub feature: FeatureType,
    pub attributes: BTreeMap<AttributeId, Value>,
    pub is_priming: bool,
    pub is_heartbeat: bool,
    pub timestamp: OffsetDateTime,
}

/// Receives every notification the manager emits; called outside its lock.
pub type NotificationSink = Arc<dyn Fn(Notification) + Send + Sync>;

/// Errors returned by subscription establishment.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum SubscribeError {
    #[error("subscription intervals are invalid (min {min:?}, max {max:?})")]
    InvalidInterval { min: Duration, max: Duration },
    #[error("subscription limit reached ({limit})")]
    ResourceExhausted { limit: usize },
    #[error("attribute {attribute} does not exist on the subscribed feature")]
    InvalidAttributeId { attribute: AttributeId },
}

impl SubscribeError {
    /// Returns the wire status this error maps to.
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            SubscribeError::InvalidInterval { .. } => Status::InvalidCommand,
            SubscribeError::ResourceExhausted { .. } => Status::ResourceExhausted,
            SubscribeError::InvalidAttributeId { .. } => Status::NotFound,
        }
    }
}

#[derive(Debug)]
struct Subscription {
    id: u32,
    zone: ZoneId,
    endpoint: EndpointId,
    feature: FeatureType,
    /// Empty selection subscribes to every attribute.
    attribute_ids: BTreeSet<AttributeId>,
    min_interval: Duration,
    max_interval: Duration,
    last_notified: Instant,
    window_start: Option<Instant>,
    last_values: BTreeMap<AttributeId, Value>,
    pending: BTreeMap<AttributeId, Value>,
    active: bool,
}

impl Subscription {
    fn watches(&self, attribute: AttributeId) -> bool {
        self.attribute_ids.is_empty() || self.attribute_ids.contains(&attribute)
    }
}

#[derive(Default)]
struct ManagerState {
    subscriptions: HashMap<u32, Subscription>,
    by_feature: HashMap<(EndpointId, u16), BTreeSet<u32>>,
}

/// Tracks per-(zone, endpoint, feature) subscriptions and turns attribute
/// changes into coalesced, bounce-back-suppressed notifications.
pub struct SubscriptionManager {
    policy: SubscriptionPolicy,
    sink: NotificationSink,
    next_id: AtomicU32,
    inner: Mutex<ManagerState>,
}

impl SubscriptionManager {
    /// Creates a manager delivering through `sink`.
    #[must_use]
    pub fn new(policy: SubscriptionPolicy, sink: NotificationSink) -> Arc<Self> {
        Arc::new(Self {
            policy,
            sink,
            next_id: AtomicU32::new(1),
            inner: Mutex::new(ManagerState::default()),
        })
    }

    /// Establishes a subscription and synchronously emits its priming
    /// notification built from `current_values`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInterval` for a zero max interval or inverted bounds
    /// (unless auto-correct is enabled), `ResourceExhausted` when limits are
    /// hit, and `InvalidAttributeId` for a selection the feature lacks.
    #[instrument(skip(self, current_values), level = "debug", fields(%zone, %endpoint, %feature))]
    pub fn subscribe(
        &self,
        zone: ZoneId,
        endpoint: EndpointId,
        feature: FeatureType,
        attribute_ids: Vec<AttributeId>,
        min_interval: Duration,
        max_interval: Duration,
        current_values: BTreeMap<AttributeId, Value>,
    ) -> Result<u32, SubscribeError> {
        if max_interval.is_zero() {
            return Err(SubscribeError::InvalidInterval {
                min: min_interval,
                max: max_interval,
            });
        }
        let (min_interval, max_interval) = if min_interval <= max_interval {
            (min_interval, max_interval)
        } else if self.policy.auto_correct_intervals {
            (max_interval, min_interval)
        } else {
            return Err(SubscribeError::InvalidInterval {
                min: min_interval,
                max: max_interval,
            });
        };
        if attribute_ids.len() > self.policy.max_attributes_per_subscription {
            return Err(SubscribeError::ResourceExhausted {
                limit: self.policy.max_attributes_per_subscription,
            });
        }
        for attribute in &attribute_ids {
            if !current_values.contains_key(attribute) {
                return Err(SubscribeError::InvalidAttributeId {
                    attribute: *attribute,
                });
            }
        }

        let priming = {
            let mut state = self.lock_state();
            if state.subscriptions.len() >= self.policy.max_subscriptions {
                return Err(SubscribeError::ResourceExhausted {
                    limit: self.policy.max_subscriptions,
                });
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let selection: BTreeSet<AttributeId> = attribute_ids.iter().copied().collect();
            let baseline: BTreeMap<AttributeId, Value> = if selection.is_empty() {
                current_values
            } else {
                current_values
                    .into_iter()
                    .filter(|(attribute, _)| selection.contains(attribute))
                    .collect()
            };

            let subscription = Subscription {
                id,
                zone: zone.clone(),
                endpoint,
                feature,
                attribute_ids: selection,
                min_interval,
                max_interval,
                last_notified: Instant::now(),
                window_start: None,
                last_values: baseline.clone(),
                pending: BTreeMap::new(),
                active: true,
            };
            state
                .by_feature
                .entry((endpoint, feature.id()))
                .or_default()
                .insert(id);
            state.subscriptions.insert(id, subscription);
            debug!(subscription_id = id, "subscription established");

            Notification {
                subscription_id: id,
                zone,
                endpoint,
                feature,
                attributes: baseline,
                is_priming: true,
                is_heartbeat: false,
                timestamp: OffsetDateTime::now_utc(),
            }
        };

        let id = priming.subscription_id;
        (self.sink)(priming);
        Ok(id)
    }

    /// Removes one subscription; returns false when it does not exist.
    pub fn unsubscribe(&self, id: u32) -> bool {
        let mut state = self.lock_state();
        let Some(mut subscription) = state.subscriptions.remove(&id) else {
            return false;
        };
        subscription.active = false;
        let key = (subscription.endpoint, subscription.feature.id());
        if let Some(index) = state.by_feature.get_mut(&key) {
            index.remove(&id);
            if index.is_empty() {
                state.by_feature.remove(&key);
            }
        }
        debug!(subscription_id = id, "subscription removed");
        true
    }

    /// Records one attribute change for matching subscriptions.
    pub fn notify_change(
        &self,
        endpoint: EndpointId,
        feature: FeatureType,
        attribute: AttributeId,
        value: Value,
    ) {
        self.notify_changes(endpoint, feature, &[(attribute, value)]);
    }

    /// Records a batch of attribute changes for matching subscriptions.
    pub fn notify_changes(
        &self,
        endpoint: EndpointId,
        feature: FeatureType,
        changes: &[(AttributeId, Value)],
    ) {
        let mut state = self.lock_state();
        let Some(ids) = state.by_feature.get(&(endpoint, feature.id())).cloned() else {
            return;
        };
        let now = Instant::now();
        for id in ids {
            let Some(subscription) = state.subscriptions.get_mut(&id) else {
                continue;
            };
            if !subscription.active {
                continue;
            }
            for (attribute, value) in changes {
                if !subscription.watches(*attribute) {
                    continue;
                }
                subscription.pending.insert(*attribute, value.clone());
                if subscription.window_start.is_none() {
                    subscription.window_start = Some(now);
                }
            }
        }
    }

    /// Records changes visible only to one zone's subscriptions.
    ///
    /// Per-zone attribute views (read-hook answers) change per caller; the
    /// matching change records must not leak into other zones' subscriptions.
    pub fn notify_zone_changes(
        &self,
        zone: &ZoneId,
        endpoint: EndpointId,
        feature: FeatureType,
        changes: &[(AttributeId, Value)],
    ) {
        let mut state = self.lock_state();
        let Some(ids) = state.by_feature.get(&(endpoint, feature.id())).cloned() else {
            return;
        };
        let now = Instant::now();
        for id in ids {
            let Some(subscription) = state.subscriptions.get_mut(&id) else {
                continue;
            };
            if !subscription.active || &subscription.zone != zone {
                continue;
            }
            for (attribute, value) in changes {
                if !subscription.watches(*attribute) {
                    continue;
                }
                subscription.pending.insert(*attribute, value.clone());
                if subscription.window_start.is_none() {
                    subscription.window_start = Some(now);
                }
            }
        }
    }

    /// Flushes closed coalescing windows and emits due heartbeats.
    ///
    /// Called periodically; the tick granularity bounds notification latency.
    pub fn process_notifications(&self) {
        let due = {
            let mut state = self.lock_state();
            let now = Instant::now();
            let mut due = Vec::new();

            let mut ids: Vec<u32> = state.subscriptions.keys().copied().collect();
            ids.sort_unstable();
            for id in ids {
                let suppress = self.policy.suppress_bounce_back;
                let heartbeat_mode = self.policy.heartbeat_mode;
                let subscription = state
                    .subscriptions
                    .get_mut(&id)
                    .expect("subscription ids enumerated above");
                if !subscription.active {
                    continue;
                }

                if let Some(window_start) = subscription.window_start
                    && now.duration_since(window_start) >= subscription.min_interval
                {
                    let pending = std::mem::take(&mut subscription.pending);
                    subscription.window_start = None;

                    let changes: BTreeMap<AttributeId, Value> = if suppress {
                        pending
                            .into_iter()
                            .filter(|(attribute, value)| {
                                subscription.last_values.get(attribute) != Some(value)
                            })
                            .collect()
                    } else {
                        pending
                    };

                    // The window closes whether or not anything survived
                    // suppression.
                    subscription.last_notified = now;
                    if !changes.is_empty() {
                        subscription.last_values.extend(changes.clone());
                        due.push(Notification {
                            subscription_id: subscription.id,
                            zone: subscription.zone.clone(),
                            endpoint: subscription.endpoint,
                            feature: subscription.feature,
                            attributes: changes,
                            is_priming: false,
                            is_heartbeat: false,
                            timestamp: OffsetDateTime::now_utc(),
                        });
                    }
                }

                if now.duration_since(subscription.last_notified) >= subscription.max_interval {
                    subscription.last_notified = now;
                    let attributes = match heartbeat_mode {
                        HeartbeatMode::Empty => BTreeMap::new(),
                        HeartbeatMode::Full => subscription.last_values.clone(),
                    };
                    due.push(Notification {
                        subscription_id: subscription.id,
                        zone: subscription.zone.clone(),
                        endpoint: subscription.endpoint,
                        feature: subscription.feature,
                        attributes,
                        is_priming: false,
                        is_heartbeat: true,
                        timestamp: OffsetDateTime::now_utc(),
                    });
                }
            }
            due
        };

        for notification in due {
            (self.sink)(notification);
        }
    }

    /// Drops every subscription owned by `zone`; used on disconnect.
    pub fn clear_zone(&self, zone: &ZoneId) {
        let ids: Vec<u32> = {
            let state = self.lock_state();
            state
                .subscriptions
                .values()
                .filter(|subscription| &subscription.zone == zone)
                .map(|subscription| subscription.id)
                .collect()
        };
        for id in ids {
            self.unsubscribe(id);
        }
    }

    /// Drops every subscription; used on connection loss of the transport.
    pub fn clear_all(&self) {
        let mut state = self.lock_state();
        for subscription in state.subscriptions.values_mut() {
            subscription.active = false;
        }
        state.subscriptions.clear();
        state.by_feature.clear();
    }

    /// Returns the live subscription count.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.lock_state().subscriptions.len()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.inner.lock().expect("subscription manager mutex poisoned")
    }
}
