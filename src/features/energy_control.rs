use strum_macros::Display as StrumDisplay;

use crate::model::{
    AccessMode, AttributeId, AttributeSpec, Command, CommandId, DataType, Feature, FeatureType,
    ParameterSpec, Value,
};

use super::{FEATURE_MAP_CORE, FEATURE_MAP_FLEX};

pub const ATTR_EFFECTIVE_CONSUMPTION_LIMIT: AttributeId = AttributeId(0x0010);
pub const ATTR_EFFECTIVE_PRODUCTION_LIMIT: AttributeId = AttributeId(0x0011);
pub const ATTR_MY_CONSUMPTION_LIMIT: AttributeId = AttributeId(0x0012);
pub const ATTR_MY_PRODUCTION_LIMIT: AttributeId = AttributeId(0x0013);
pub const ATTR_CONTROL_STATE: AttributeId = AttributeId(0x0014);
pub const ATTR_MAX_CONSUMPTION_LIMIT: AttributeId = AttributeId(0x0015);
pub const ATTR_MAX_PRODUCTION_LIMIT: AttributeId = AttributeId(0x0016);

pub const CMD_SET_LIMIT: CommandId = CommandId(0x01);
pub const CMD_CLEAR_LIMIT: CommandId = CommandId(0x02);

/// Control states published through the `controlState` attribute.
#[derive(Debug, Clone, Copy, Eq, PartialEq, StrumDisplay)]
pub enum ControlState {
    /// No zone holds a limit; the device acts on its own.
    #[strum(to_string = "autonomous")]
    Autonomous,
    /// At least one zone limit is stored.
    #[strum(to_string = "controlled")]
    Controlled,
    /// The device is actually curtailed by the effective limit.
    #[strum(to_string = "limited")]
    Limited,
    /// Failsafe limits are in force for a silent zone.
    #[strum(to_string = "failsafe")]
    Failsafe,
    /// A local override blocks external control.
    #[strum(to_string = "override")]
    Override,
}

impl ControlState {
    /// Returns the wire encoding.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            ControlState::Autonomous => 0,
            ControlState::Controlled => 1,
            ControlState::Limited => 2,
            ControlState::Failsafe => 3,
            ControlState::Override => 4,
        }
    }

    /// Decodes a wire value.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ControlState::Autonomous),
            1 => Some(ControlState::Controlled),
            2 => Some(ControlState::Limited),
            3 => Some(ControlState::Failsafe),
            4 => Some(ControlState::Override),
            _ => None,
        }
    }
}

/// Builds the EnergyControl feature.
///
/// Limit attributes are internal-write and published by the limit resolver;
/// the `my*` attributes answer through the resolver's read hook. Capacity
/// bounds of zero mean unbounded.
#[must_use]
pub fn feature(max_consumption_mw: i64, max_production_mw: i64) -> Feature {
    let mut feature_map = FEATURE_MAP_CORE | FEATURE_MAP_FLEX;
    if max_production_mw != 0 {
        feature_map |= super::FEATURE_MAP_BATTERY;
    }

    Feature::new(FeatureType::EnergyControl, 1, feature_map)
        .with_attribute(
            ATTR_EFFECTIVE_CONSUMPTION_LIMIT,
            AttributeSpec::new("effectiveConsumptionLimit", DataType::I64, AccessMode::Read)
                .nullable()
                .with_unit("mW"),
        )
        .with_attribute(
            ATTR_EFFECTIVE_PRODUCTION_LIMIT,
            AttributeSpec::new("effectiveProductionLimit", DataType::I64, AccessMode::Read)
                .nullable()
                .with_unit("mW"),
        )
        .with_attribute(
            ATTR_MY_CONSUMPTION_LIMIT,
            AttributeSpec::new("myConsumptionLimit", DataType::I64, AccessMode::Read)
                .nullable()
                .with_unit("mW"),
        )
        .with_attribute(
            ATTR_MY_PRODUCTION_LIMIT,
            AttributeSpec::new("myProductionLimit", DataType::I64, AccessMode::Read)
                .nullable()
                .with_unit("mW"),
        )
        .with_attribute(
            ATTR_CONTROL_STATE,
            AttributeSpec::new("controlState", DataType::U8, AccessMode::Read)
                .with_default(Value::U8(ControlState::Autonomous.code())),
        )
        .with_attribute(
            ATTR_MAX_CONSUMPTION_LIMIT,
            AttributeSpec::new("maxConsumptionLimit", DataType::I64, AccessMode::ReadOnly)
                .with_unit("mW")
                .with_default(Value::I64(max_consumption_mw)),
        )
        .with_attribute(
            ATTR_MAX_PRODUCTION_LIMIT,
            AttributeSpec::new("maxProductionLimit", DataType::I64, AccessMode::ReadOnly)
                .with_unit("mW")
                .with_default(Value::I64(max_production_mw)),
        )
        .with_command(
            CMD_SET_LIMIT,
            Command::new(
                "SetLimit",
                vec![
                    ParameterSpec::optional("consumptionLimit", DataType::I64),
                    ParameterSpec::optional("productionLimit", DataType::I64),
                    ParameterSpec::optional("duration", DataType::U32),
                    ParameterSpec::optional("cause", DataType::U8),
                ],
            ),
        )
        .with_command(
            CMD_CLEAR_LIMIT,
            Command::new(
                "ClearLimit",
                vec![ParameterSpec::optional("direction", DataType::U8)],
            ),
        )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ControlState::Autonomous, 0)]
    #[case(ControlState::Controlled, 1)]
    #[case(ControlState::Limited, 2)]
    #[case(ControlState::Failsafe, 3)]
    #[case(ControlState::Override, 4)]
    fn control_state_codes_round_trip(#[case] state: ControlState, #[case] code: u8) {
        assert_eq!(code, state.code());
        assert_eq!(Some(state), ControlState::from_code(code));
    }

    #[test]
    fn feature_starts_autonomous_with_null_limits() {
        let feature = feature(22_000_000, 0);

        let state = feature
            .attribute(ATTR_CONTROL_STATE)
            .expect("controlState should exist");
        assert_eq!(&Value::U8(0), state.value());

        let effective = feature
            .attribute(ATTR_EFFECTIVE_CONSUMPTION_LIMIT)
            .expect("effectiveConsumptionLimit should exist");
        assert!(effective.value().is_null());

        assert!(feature.command(CMD_SET_LIMIT).is_some());
        assert!(feature.command(CMD_CLEAR_LIMIT).is_some());
    }

    #[test]
    fn production_capacity_enables_battery_capability() {
        assert_eq!(0, feature(10, 0).feature_map() & super::super::FEATURE_MAP_BATTERY);
        assert_ne!(0, feature(10, 10).feature_map() & super::super::FEATURE_MAP_BATTERY);
    }
}
