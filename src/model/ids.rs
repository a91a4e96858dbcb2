use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use strum_macros::Display as StrumDisplay;

/// Endpoint identifier, unique within one device.
///
/// Endpoint `0` is the reserved root endpoint.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Display,
    From,
    Into,
    Serialize,
    Deserialize,
)]
pub struct EndpointId(pub u8);

impl EndpointId {
    /// The reserved root endpoint present on every device.
    pub const ROOT: EndpointId = EndpointId(0);
}

/// Attribute identifier, unique within one feature.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Display,
    From,
    Into,
    Serialize,
    Deserialize,
)]
pub struct AttributeId(pub u16);

/// Command identifier, unique within one feature.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Display,
    From,
    Into,
    Serialize,
    Deserialize,
)]
pub struct CommandId(pub u8);

/// Endpoint type tags.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, StrumDisplay, Serialize, Deserialize)]
pub enum EndpointType {
    /// Reserved root endpoint carrying device-wide features.
    #[strum(to_string = "device_root")]
    DeviceRoot,
    /// EV supply equipment.
    #[strum(to_string = "ev_charger")]
    EvCharger,
    /// PV or hybrid inverter.
    #[strum(to_string = "inverter")]
    Inverter,
    /// Stationary battery storage.
    #[strum(to_string = "battery")]
    Battery,
    /// Heat pump.
    #[strum(to_string = "heat_pump")]
    HeatPump,
}

/// Feature types keyed by their 16-bit type ID.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, StrumDisplay)]
pub enum FeatureType {
    /// Device identity and versions; mandatory on the root endpoint.
    #[strum(to_string = "device_info")]
    DeviceInfo,
    /// Static electrical connection ratings.
    #[strum(to_string = "electrical")]
    Electrical,
    /// Live electrical measurements.
    #[strum(to_string = "measurement")]
    Measurement,
    /// Per-zone energy limit control.
    #[strum(to_string = "energy_control")]
    EnergyControl,
    /// Operating state and error reporting.
    #[strum(to_string = "status")]
    Status,
    /// EV charging session bookkeeping.
    #[strum(to_string = "charging_session")]
    ChargingSession,
    /// Vendor-specific feature outside the standard catalogue.
    #[strum(to_string = "vendor({0})")]
    Vendor(u16),
}

impl FeatureType {
    /// Returns the wire type ID of this feature.
    #[must_use]
    pub fn id(self) -> u16 {
        match self {
            FeatureType::DeviceInfo => 0x0001,
            FeatureType::Electrical => 0x0002,
            FeatureType::Measurement => 0x0003,
            FeatureType::EnergyControl => 0x0004,
            FeatureType::Status => 0x0005,
            FeatureType::ChargingSession => 0x0006,
            FeatureType::Vendor(id) => id,
        }
    }
}

impl From<u16> for FeatureType {
    fn from(id: u16) -> Self {
        match id {
            0x0001 => FeatureType::DeviceInfo,
            0x0002 => FeatureType::Electrical,
            0x0003 => FeatureType::Measurement,
            0x0004 => FeatureType::EnergyControl,
            0x0005 => FeatureType::Status,
            0x0006 => FeatureType::ChargingSession,
            other => FeatureType::Vendor(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(FeatureType::DeviceInfo, 0x0001)]
    #[case(FeatureType::EnergyControl, 0x0004)]
    #[case(FeatureType::ChargingSession, 0x0006)]
    #[case(FeatureType::Vendor(0xFC01), 0xFC01)]
    fn feature_type_round_trips_through_wire_id(#[case] feature: FeatureType, #[case] id: u16) {
        assert_eq!(id, feature.id());
        assert_eq!(feature, FeatureType::from(id));
    }

    #[test]
    fn root_endpoint_is_zero() {
        assert_eq!(EndpointId(0), EndpointId::ROOT);
    }
}
