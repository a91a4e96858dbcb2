use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::zones::{FailsafeConfig, ZoneId, ZoneRecord, ZoneType};

/// One zone as written to the state document.
///
/// Zones are always persisted disconnected; subscriptions never survive a
/// restart.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PersistedZone {
    pub id: ZoneId,
    #[serde(rename = "type")]
    pub zone_type: ZoneType,
    pub priority: u8,
    #[serde(rename = "failsafeConfig")]
    pub failsafe: FailsafeConfig,
    #[serde(
        rename = "lastSeen",
        with = "time::serde::rfc3339::option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_seen: Option<OffsetDateTime>,
    #[serde(default)]
    pub connected: bool,
}

impl From<ZoneRecord> for PersistedZone {
    fn from(record: ZoneRecord) -> Self {
        Self {
            priority: record.zone_type.priority(),
            id: record.id,
            zone_type: record.zone_type,
            failsafe: record.failsafe,
            last_seen: record.last_seen,
            connected: false,
        }
    }
}

impl From<PersistedZone> for ZoneRecord {
    fn from(zone: PersistedZone) -> Self {
        Self {
            id: zone.id,
            zone_type: zone.zone_type,
            failsafe: zone.failsafe,
            last_seen: zone.last_seen,
        }
    }
}

/// The JSON state document stored next to the certificate blob.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(rename = "deviceID")]
    pub device_id: String,
    #[serde(default)]
    pub zones: Vec<PersistedZone>,
}

impl PersistedState {
    /// Builds the document from the live zone registry contents.
    #[must_use]
    pub fn new(device_id: impl Into<String>, records: Vec<ZoneRecord>) -> Self {
        Self {
            device_id: device_id.into(),
            zones: records.into_iter().map(PersistedZone::from).collect(),
        }
    }

    /// Converts back into registry records.
    #[must_use]
    pub fn into_records(self) -> Vec<ZoneRecord> {
        self.zones.into_iter().map(ZoneRecord::from).collect()
    }
}
