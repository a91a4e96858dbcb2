use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use super::{FailsafeConfig, ZoneId, ZoneType};

/// Errors returned by zone bookkeeping.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ZoneRegistryError {
    #[error("zone `{zone}` is not known to this device")]
    ZoneNotFound { zone: ZoneId },
}

/// One commissioned zone as the device remembers it across restarts.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ZoneRecord {
    pub id: ZoneId,
    pub zone_type: ZoneType,
    pub failsafe: FailsafeConfig,
    pub last_seen: Option<OffsetDateTime>,
}

impl ZoneRecord {
    /// Creates a record for a freshly commissioned zone.
    #[must_use]
    pub fn new(id: ZoneId, zone_type: ZoneType, failsafe: FailsafeConfig) -> Self {
        Self {
            id,
            zone_type,
            failsafe,
            last_seen: None,
        }
    }
}

#[derive(Debug)]
struct ZoneEntry {
    record: ZoneRecord,
    connected: bool,
    failsafe_active: bool,
}

/// The set of commissioned zones and their transient connection state.
///
/// Zones outlive connections; they leave this registry only through an
/// explicit removal.
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    inner: Mutex<HashMap<ZoneId, ZoneEntry>>,
}

impl ZoneRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a commissioned zone, disconnected.
    pub fn add(&self, record: ZoneRecord) {
        let mut zones = self.lock_zones();
        debug!(zone = %record.id, zone_type = %record.zone_type, "zone registered");
        zones.insert(
            record.id.clone(),
            ZoneEntry {
                record,
                connected: false,
                failsafe_active: false,
            },
        );
    }

    /// Restores persisted zones; all start disconnected.
    pub fn restore(&self, records: Vec<ZoneRecord>) {
        let mut zones = self.lock_zones();
        for record in records {
            zones.insert(
                record.id.clone(),
                ZoneEntry {
                    record,
                    connected: false,
                    failsafe_active: false,
                },
            );
        }
    }

    /// Removes a zone permanently; returns its record.
    ///
    /// # Errors
    ///
    /// Returns `ZoneNotFound` when the zone is unknown.
    pub fn remove(&self, zone: &ZoneId) -> Result<ZoneRecord, ZoneRegistryError> {
        let mut zones = self.lock_zones();
        zones
            .remove(zone)
            .map(|entry| entry.record)
            .ok_or_else(|| ZoneRegistryError::ZoneNotFound { zone: zone.clone() })
    }

    /// Returns one zone's record.
    #[must_use]
    pub fn get(&self, zone: &ZoneId) -> Option<ZoneRecord> {
        self.lock_zones().get(zone).map(|entry| entry.record.clone())
    }

    /// Returns all records, sorted by zone ID for stable iteration.
    #[must_use]
    pub fn records(&self) -> Vec<ZoneRecord> {
        let zones = self.lock_zones();
        let mut records: Vec<ZoneRecord> =
            zones.values().map(|entry| entry.record.clone()).collect();
        records.sort_by(|left, right| left.id.cmp(&right.id));
        records
    }

    /// Returns the number of known zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_zones().len()
    }

    /// Returns true when no zone has been commissioned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_zones().is_empty()
    }

    /// Flags a zone connected or disconnected.
    ///
    /// # Errors
    ///
    /// Returns `ZoneNotFound` when the zone is unknown.
    pub fn set_connected(&self, zone: &ZoneId, connected: bool) -> Result<(), ZoneRegistryError> {
        let mut zones = self.lock_zones();
        let entry = zones
            .get_mut(zone)
            .ok_or_else(|| ZoneRegistryError::ZoneNotFound { zone: zone.clone() })?;
        entry.connected = connected;
        Ok(())
    }

    /// Returns a zone's connection flag.
    #[must_use]
    pub fn is_connected(&self, zone: &ZoneId) -> bool {
        self.lock_zones()
            .get(zone)
            .is_some_and(|entry| entry.connected)
    }

    /// Stamps a zone's last-seen time.
    pub fn touch(&self, zone: &ZoneId, timestamp: OffsetDateTime) {
        if let Some(entry) = self.lock_zones().get_mut(zone) {
            entry.record.last_seen = Some(timestamp);
        }
    }

    /// Flags a zone's failsafe as active or cleared; returns the previous
    /// flag.
    pub fn set_failsafe_active(&self, zone: &ZoneId, active: bool) -> bool {
        let mut zones = self.lock_zones();
        let Some(entry) = zones.get_mut(zone) else {
            return false;
        };
        std::mem::replace(&mut entry.failsafe_active, active)
    }

    /// Returns a zone's failsafe-active flag.
    #[must_use]
    pub fn is_failsafe_active(&self, zone: &ZoneId) -> bool {
        self.lock_zones()
            .get(zone)
            .is_some_and(|entry| entry.failsafe_active)
    }

    /// Returns true while any zone's failsafe is active.
    #[must_use]
    pub fn any_failsafe_active(&self) -> bool {
        self.lock_zones()
            .values()
            .any(|entry| entry.failsafe_active)
    }

    fn lock_zones(&self) -> std::sync::MutexGuard<'_, HashMap<ZoneId, ZoneEntry>> {
        self.inner.lock().expect("zone registry mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;

    fn record(id: &str, zone_type: ZoneType) -> ZoneRecord {
        ZoneRecord::new(ZoneId::new(id), zone_type, FailsafeConfig::default())
    }

    #[test]
    fn restored_zones_start_disconnected() {
        let registry = ZoneRegistry::new();
        registry.restore(vec![record("zone-grid", ZoneType::Grid)]);

        assert_eq!(1, registry.len());
        assert!(!registry.is_connected(&ZoneId::new("zone-grid")));
    }

    #[test]
    fn zones_persist_until_removed() {
        let registry = ZoneRegistry::new();
        registry.add(record("zone-user", ZoneType::User));

        registry
            .set_connected(&ZoneId::new("zone-user"), true)
            .expect("known zone should flag connected");
        registry
            .set_connected(&ZoneId::new("zone-user"), false)
            .expect("known zone should flag disconnected");
        assert_eq!(1, registry.len());

        let removed = registry
            .remove(&ZoneId::new("zone-user"))
            .expect("known zone should remove");
        assert_eq!(ZoneType::User, removed.zone_type);
        assert_matches!(
            registry.remove(&ZoneId::new("zone-user")),
            Err(ZoneRegistryError::ZoneNotFound { .. })
        );
    }

    #[test]
    fn failsafe_flag_reports_previous_state() {
        let registry = ZoneRegistry::new();
        registry.add(record("zone-local", ZoneType::Local));
        let zone = ZoneId::new("zone-local");

        assert!(!registry.set_failsafe_active(&zone, true));
        assert!(registry.set_failsafe_active(&zone, true));
        assert!(registry.is_failsafe_active(&zone));
        assert!(registry.set_failsafe_active(&zone, false));
        assert!(!registry.is_failsafe_active(&zone));
    }
}
