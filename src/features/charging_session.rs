use crate::model::{AccessMode, AttributeId, AttributeSpec, DataType, Feature, FeatureType, Value};

use super::FEATURE_MAP_CORE;

pub const ATTR_SESSION_ACTIVE: AttributeId = AttributeId(0x0001);
pub const ATTR_SESSION_ENERGY: AttributeId = AttributeId(0x0002);
pub const ATTR_SESSION_DURATION: AttributeId = AttributeId(0x0003);
pub const ATTR_PLUGGED_IN: AttributeId = AttributeId(0x0004);

/// Builds the ChargingSession feature for EV-charger endpoints.
#[must_use]
pub fn feature() -> Feature {
    Feature::new(FeatureType::ChargingSession, 1, FEATURE_MAP_CORE)
        .with_attribute(
            ATTR_SESSION_ACTIVE,
            AttributeSpec::new("sessionActive", DataType::Bool, AccessMode::Read)
                .with_default(Value::Bool(false)),
        )
        .with_attribute(
            ATTR_SESSION_ENERGY,
            AttributeSpec::new("sessionEnergy", DataType::U64, AccessMode::Read)
                .with_unit("mWh")
                .with_default(Value::U64(0)),
        )
        .with_attribute(
            ATTR_SESSION_DURATION,
            AttributeSpec::new("sessionDuration", DataType::U32, AccessMode::Read)
                .with_unit("s")
                .with_default(Value::U32(0)),
        )
        .with_attribute(
            ATTR_PLUGGED_IN,
            AttributeSpec::new("pluggedIn", DataType::Bool, AccessMode::Read)
                .with_default(Value::Bool(false)),
        )
}
