mod registry;
mod session;

pub use self::registry::{ZoneRecord, ZoneRegistry, ZoneRegistryError};
pub use self::session::{FailsafeEvent, ZoneSessions};

use std::time::Duration;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use strum_macros::Display as StrumDisplay;

/// Globally unique controller identity.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Display, Serialize, Deserialize,
)]
pub struct ZoneId(String);

impl ZoneId {
    /// Creates a zone identity from its canonical string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ZoneId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Zone categories, ordered by control priority.
#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, StrumDisplay, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ZoneType {
    /// Grid operator or aggregator control.
    #[strum(to_string = "grid")]
    Grid,
    /// Local energy-management system.
    #[strum(to_string = "local")]
    Local,
    /// End-user application.
    #[strum(to_string = "user")]
    User,
}

impl ZoneType {
    /// Returns the tie-break priority; larger values win.
    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            ZoneType::Grid => 3,
            ZoneType::Local => 2,
            ZoneType::User => 1,
        }
    }
}

/// Watchdog limits a zone configures at commissioning time.
///
/// When the zone stays silent for `duration`, the configured per-direction
/// limits are applied on its behalf until it speaks again.
#[serde_as]
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailsafeConfig {
    /// Silence interval after which the failsafe fires.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub duration: Duration,
    /// Consumption limit applied while the failsafe is active, in mW.
    pub consumption_limit: Option<i64>,
    /// Production limit applied while the failsafe is active, in mW.
    pub production_limit: Option<i64>,
}

impl Default for FailsafeConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(120),
            consumption_limit: None,
            production_limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn zone_priorities_order_grid_above_local_above_user() {
        assert!(ZoneType::Grid.priority() > ZoneType::Local.priority());
        assert!(ZoneType::Local.priority() > ZoneType::User.priority());
    }

    #[test]
    fn failsafe_config_round_trips_through_json() {
        let config = FailsafeConfig {
            duration: Duration::from_secs(90),
            consumption_limit: Some(4_200_000),
            production_limit: None,
        };
        let json = serde_json::to_string(&config).expect("failsafe config should serialise");
        let restored: FailsafeConfig =
            serde_json::from_str(&json).expect("failsafe config should deserialise");
        assert_eq!(config, restored);
    }
}
