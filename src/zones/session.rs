use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::registry::ZoneRegistry;
use super::ZoneId;

/// Failsafe transitions observed by the service layer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FailsafeEvent {
    /// The zone stayed silent past its configured duration.
    Triggered { zone: ZoneId },
    /// The zone spoke again after a failsafe fired.
    Cleared { zone: ZoneId },
}

/// Observes failsafe transitions; invoked outside the session lock.
pub type FailsafeHook = Arc<dyn Fn(FailsafeEvent) + Send + Sync>;

/// Per-connected-zone lifecycle: last-seen stamping and the failsafe
/// watchdog.
///
/// A fired failsafe never disconnects the zone; it only flags the state and
/// lets the hook apply the configured limits.
pub struct ZoneSessions {
    weak_self: Weak<ZoneSessions>,
    registry: Arc<ZoneRegistry>,
    hook: Mutex<Option<FailsafeHook>>,
    timers: Mutex<HashMap<ZoneId, CancellationToken>>,
    cancel: CancellationToken,
}

impl ZoneSessions {
    /// Creates the session tracker over the zone registry.
    #[must_use]
    pub fn new(registry: Arc<ZoneRegistry>) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            weak_self: weak_self.clone(),
            registry,
            hook: Mutex::new(None),
            timers: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Registers the failsafe observer.
    pub fn set_failsafe_hook(&self, hook: FailsafeHook) {
        *self.hook.lock().expect("failsafe hook mutex poisoned") = Some(hook);
    }

    /// Starts tracking a connected zone and arms its failsafe countdown.
    #[instrument(skip(self), level = "debug", fields(zone = %zone))]
    pub fn connected(&self, zone: &ZoneId) {
        if self.registry.set_connected(zone, true).is_err() {
            debug!(zone = %zone, "connection from unknown zone ignored");
            return;
        }
        self.registry.touch(zone, OffsetDateTime::now_utc());
        self.arm_failsafe(zone);
    }

    /// Records traffic from a zone: stamps last-seen, clears an active
    /// failsafe, and restarts the countdown.
    pub fn message_received(&self, zone: &ZoneId) {
        if self.registry.get(zone).is_none() {
            return;
        }
        self.registry.touch(zone, OffsetDateTime::now_utc());
        if self.registry.set_failsafe_active(zone, false) {
            info!(zone = %zone, "failsafe cleared");
            self.fire(FailsafeEvent::Cleared { zone: zone.clone() });
        }
        self.arm_failsafe(zone);
    }

    /// Stops tracking a disconnected zone; the registry record survives.
    ///
    /// An active failsafe flag is dropped silently: the disconnect path
    /// clears the zone's limits anyway.
    #[instrument(skip(self), level = "debug", fields(zone = %zone))]
    pub fn disconnected(&self, zone: &ZoneId) {
        self.disarm_failsafe(zone);
        self.registry.set_failsafe_active(zone, false);
        let _ = self.registry.set_connected(zone, false);
    }

    /// Drops all timers for a removed zone.
    pub fn forget(&self, zone: &ZoneId) {
        self.disarm_failsafe(zone);
    }

    /// Cancels every countdown; used on service shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.timers
            .lock()
            .expect("failsafe timers mutex poisoned")
            .clear();
    }

    fn arm_failsafe(&self, zone: &ZoneId) {
        let Some(record) = self.registry.get(zone) else {
            return;
        };
        let duration = record.failsafe.duration;
        if duration.is_zero() {
            return;
        }

        let token = self.cancel.child_token();
        {
            let mut timers = self.timers.lock().expect("failsafe timers mutex poisoned");
            if let Some(previous) = timers.insert(zone.clone(), token.clone()) {
                previous.cancel();
            }
        }

        let weak = self.weak_self.clone();
        let zone = zone.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(duration) => {
                    if let Some(sessions) = weak.upgrade() {
                        sessions.failsafe_fired(&zone);
                    }
                }
            }
        });
    }

    fn disarm_failsafe(&self, zone: &ZoneId) {
        let mut timers = self.timers.lock().expect("failsafe timers mutex poisoned");
        if let Some(token) = timers.remove(zone) {
            token.cancel();
        }
    }

    fn failsafe_fired(&self, zone: &ZoneId) {
        if self.registry.get(zone).is_none() {
            return;
        }
        if !self.registry.set_failsafe_active(zone, true) {
            info!(zone = %zone, "failsafe triggered");
            self.fire(FailsafeEvent::Triggered { zone: zone.clone() });
        }
    }

    fn fire(&self, event: FailsafeEvent) {
        let hook = self
            .hook
            .lock()
            .expect("failsafe hook mutex poisoned")
            .clone();
        if let Some(hook) = hook {
            hook(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::super::{FailsafeConfig, ZoneRecord, ZoneType};
    use super::*;

    fn registry_with_zone(duration: Duration) -> (Arc<ZoneRegistry>, ZoneId) {
        let registry = Arc::new(ZoneRegistry::new());
        let zone = ZoneId::new("zone-local");
        registry.add(ZoneRecord::new(
            zone.clone(),
            ZoneType::Local,
            FailsafeConfig {
                duration,
                consumption_limit: Some(2_000_000),
                production_limit: None,
            },
        ));
        (registry, zone)
    }

    fn collecting_hook() -> (FailsafeHook, Arc<Mutex<Vec<FailsafeEvent>>>) {
        let seen: Arc<Mutex<Vec<FailsafeEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (
            Arc::new(move |event| {
                sink.lock().expect("test hook mutex poisoned").push(event);
            }),
            seen,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn silence_triggers_the_failsafe_once() {
        let (registry, zone) = registry_with_zone(Duration::from_secs(5));
        let sessions = ZoneSessions::new(Arc::clone(&registry));
        let (hook, seen) = collecting_hook();
        sessions.set_failsafe_hook(hook);

        sessions.connected(&zone);
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;

        assert!(registry.is_failsafe_active(&zone));
        assert_eq!(
            vec![FailsafeEvent::Triggered { zone: zone.clone() }],
            *seen.lock().expect("test hook mutex poisoned")
        );
        // The zone stays connected; a failsafe never disconnects.
        assert!(registry.is_connected(&zone));
    }

    #[tokio::test(start_paused = true)]
    async fn traffic_keeps_resetting_the_countdown() {
        let (registry, zone) = registry_with_zone(Duration::from_secs(5));
        let sessions = ZoneSessions::new(Arc::clone(&registry));
        let (hook, seen) = collecting_hook();
        sessions.set_failsafe_hook(hook);

        sessions.connected(&zone);
        for _ in 0..3 {
            tokio::time::advance(Duration::from_secs(4)).await;
            sessions.message_received(&zone);
        }
        tokio::time::advance(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;

        assert!(!registry.is_failsafe_active(&zone));
        assert!(seen.lock().expect("test hook mutex poisoned").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn next_message_clears_an_active_failsafe() {
        let (registry, zone) = registry_with_zone(Duration::from_secs(5));
        let sessions = ZoneSessions::new(Arc::clone(&registry));
        let (hook, seen) = collecting_hook();
        sessions.set_failsafe_hook(hook);

        sessions.connected(&zone);
        tokio::time::advance(Duration::from_secs(6)).await;
        tokio::task::yield_now().await;
        sessions.message_received(&zone);

        let events = seen.lock().expect("test hook mutex poisoned");
        assert_eq!(
            vec![
                FailsafeEvent::Triggered { zone: zone.clone() },
                FailsafeEvent::Cleared { zone: zone.clone() },
            ],
            *events
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_disarms_the_countdown() {
        let (registry, zone) = registry_with_zone(Duration::from_secs(5));
        let sessions = ZoneSessions::new(Arc::clone(&registry));
        let (hook, seen) = collecting_hook();
        sessions.set_failsafe_hook(hook);

        sessions.connected(&zone);
        sessions.disconnected(&zone);
        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;

        assert!(seen.lock().expect("test hook mutex poisoned").is_empty());
        assert!(!registry.is_connected(&zone));
        assert_eq!(1, registry.len());
    }
}
