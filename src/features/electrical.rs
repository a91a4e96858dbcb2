use crate::model::{
    AccessMode, AttributeId, AttributeSpec, DataType, Feature, FeatureType, Value,
};

use super::FEATURE_MAP_CORE;

pub const ATTR_NOMINAL_VOLTAGE: AttributeId = AttributeId(0x0001);
pub const ATTR_PHASE_COUNT: AttributeId = AttributeId(0x0002);
pub const ATTR_MAX_CURRENT: AttributeId = AttributeId(0x0003);
pub const ATTR_MAX_POWER: AttributeId = AttributeId(0x0004);

/// Static electrical connection ratings.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ElectricalRatings {
    /// Nominal phase voltage in mV.
    pub nominal_voltage_mv: u32,
    pub phase_count: u8,
    /// Rated current per phase in mA.
    pub max_current_ma: u32,
    /// Rated power in mW.
    pub max_power_mw: i64,
}

impl Default for ElectricalRatings {
    fn default() -> Self {
        // 230 V, three phases, 32 A: a common European wallbox connection.
        Self {
            nominal_voltage_mv: 230_000,
            phase_count: 3,
            max_current_ma: 32_000,
            max_power_mw: 22_000_000,
        }
    }
}

/// Builds the Electrical feature from connection ratings.
#[must_use]
pub fn feature(ratings: &ElectricalRatings) -> Feature {
    Feature::new(FeatureType::Electrical, 1, FEATURE_MAP_CORE)
        .with_attribute(
            ATTR_NOMINAL_VOLTAGE,
            AttributeSpec::new("nominalVoltage", DataType::U32, AccessMode::ReadOnly)
                .with_unit("mV")
                .with_default(Value::U32(ratings.nominal_voltage_mv)),
        )
        .with_attribute(
            ATTR_PHASE_COUNT,
            AttributeSpec::new("phaseCount", DataType::U8, AccessMode::ReadOnly)
                .with_default(Value::U8(ratings.phase_count)),
        )
        .with_attribute(
            ATTR_MAX_CURRENT,
            AttributeSpec::new("maxCurrent", DataType::U32, AccessMode::ReadOnly)
                .with_unit("mA")
                .with_default(Value::U32(ratings.max_current_ma)),
        )
        .with_attribute(
            ATTR_MAX_POWER,
            AttributeSpec::new("maxPower", DataType::I64, AccessMode::ReadOnly)
                .with_unit("mW")
                .with_default(Value::I64(ratings.max_power_mw)),
        )
}
