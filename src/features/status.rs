use strum_macros::Display as StrumDisplay;

use crate::model::{AccessMode, AttributeId, AttributeSpec, DataType, Feature, FeatureType, Value};

use super::FEATURE_MAP_CORE;

pub const ATTR_OPERATING_STATE: AttributeId = AttributeId(0x0001);
pub const ATTR_LAST_ERROR: AttributeId = AttributeId(0x0002);

/// Coarse device health states.
#[derive(Debug, Clone, Copy, Eq, PartialEq, StrumDisplay)]
pub enum OperatingState {
    #[strum(to_string = "normal")]
    Normal,
    #[strum(to_string = "standby")]
    Standby,
    #[strum(to_string = "fault")]
    Fault,
}

impl OperatingState {
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            OperatingState::Normal => 0,
            OperatingState::Standby => 1,
            OperatingState::Fault => 2,
        }
    }
}

/// Builds the Status feature.
#[must_use]
pub fn feature() -> Feature {
    Feature::new(FeatureType::Status, 1, FEATURE_MAP_CORE)
        .with_attribute(
            ATTR_OPERATING_STATE,
            AttributeSpec::new("operatingState", DataType::U8, AccessMode::Read)
                .with_default(Value::U8(OperatingState::Normal.code())),
        )
        .with_attribute(
            ATTR_LAST_ERROR,
            AttributeSpec::new("lastError", DataType::Text, AccessMode::Read).nullable(),
        )
}
