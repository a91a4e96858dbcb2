use crate::model::{AccessMode, AttributeId, AttributeSpec, DataType, Feature, FeatureType, Value};

use super::FEATURE_MAP_CORE;

pub const ATTR_ACTIVE_POWER: AttributeId = AttributeId(0x0001);
pub const ATTR_TOTAL_ENERGY_IMPORTED: AttributeId = AttributeId(0x0002);
pub const ATTR_TOTAL_ENERGY_EXPORTED: AttributeId = AttributeId(0x0003);
pub const ATTR_VOLTAGE: AttributeId = AttributeId(0x0004);
pub const ATTR_CURRENT: AttributeId = AttributeId(0x0005);

/// Builds the Measurement feature.
///
/// All attributes are written by device logic through internal setters and
/// surface to zones read-only.
#[must_use]
pub fn feature() -> Feature {
    Feature::new(FeatureType::Measurement, 1, FEATURE_MAP_CORE)
        .with_attribute(
            ATTR_ACTIVE_POWER,
            AttributeSpec::new("activePower", DataType::I64, AccessMode::Read)
                .with_unit("mW")
                .with_default(Value::I64(0)),
        )
        .with_attribute(
            ATTR_TOTAL_ENERGY_IMPORTED,
            AttributeSpec::new("totalEnergyImported", DataType::U64, AccessMode::Read)
                .with_unit("mWh")
                .with_default(Value::U64(0)),
        )
        .with_attribute(
            ATTR_TOTAL_ENERGY_EXPORTED,
            AttributeSpec::new("totalEnergyExported", DataType::U64, AccessMode::Read)
                .with_unit("mWh")
                .with_default(Value::U64(0)),
        )
        .with_attribute(
            ATTR_VOLTAGE,
            AttributeSpec::new("voltage", DataType::U32, AccessMode::Read)
                .with_unit("mV")
                .nullable(),
        )
        .with_attribute(
            ATTR_CURRENT,
            AttributeSpec::new("current", DataType::U32, AccessMode::Read)
                .with_unit("mA")
                .nullable(),
        )
}
