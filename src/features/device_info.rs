use bon::Builder;

use crate::model::{
    AccessMode, AttributeId, AttributeSpec, DataType, Feature, FeatureType, Value,
};

use super::FEATURE_MAP_CORE;

pub const ATTR_VENDOR_NAME: AttributeId = AttributeId(0x0001);
pub const ATTR_PRODUCT_NAME: AttributeId = AttributeId(0x0002);
pub const ATTR_SERIAL_NUMBER: AttributeId = AttributeId(0x0003);
pub const ATTR_VENDOR_ID: AttributeId = AttributeId(0x0004);
pub const ATTR_PRODUCT_ID: AttributeId = AttributeId(0x0005);
pub const ATTR_SOFTWARE_VERSION: AttributeId = AttributeId(0x0006);
pub const ATTR_DEVICE_ID: AttributeId = AttributeId(0x0007);

/// Static identity of the device exposing the model.
#[derive(Debug, Clone, Eq, PartialEq, Builder)]
pub struct DeviceIdentity {
    #[builder(into)]
    pub device_id: String,
    pub vendor_id: u16,
    pub product_id: u16,
    #[builder(into)]
    pub vendor_name: String,
    #[builder(into)]
    pub product_name: String,
    #[builder(into)]
    pub serial_number: String,
    #[builder(into)]
    pub software_version: String,
}

/// Builds the DeviceInfo feature; mandatory on the root endpoint.
#[must_use]
pub fn feature(identity: &DeviceIdentity) -> Feature {
    Feature::new(FeatureType::DeviceInfo, 1, FEATURE_MAP_CORE)
        .with_attribute(
            ATTR_VENDOR_NAME,
            AttributeSpec::new("vendorName", DataType::Text, AccessMode::ReadOnly)
                .with_default(Value::Text(identity.vendor_name.clone())),
        )
        .with_attribute(
            ATTR_PRODUCT_NAME,
            AttributeSpec::new("productName", DataType::Text, AccessMode::ReadOnly)
                .with_default(Value::Text(identity.product_name.clone())),
        )
        .with_attribute(
            ATTR_SERIAL_NUMBER,
            AttributeSpec::new("serialNumber", DataType::Text, AccessMode::ReadOnly)
                .with_default(Value::Text(identity.serial_number.clone())),
        )
        .with_attribute(
            ATTR_VENDOR_ID,
            AttributeSpec::new("vendorID", DataType::U16, AccessMode::ReadOnly)
                .with_default(Value::U16(identity.vendor_id)),
        )
        .with_attribute(
            ATTR_PRODUCT_ID,
            AttributeSpec::new("productID", DataType::U16, AccessMode::ReadOnly)
                .with_default(Value::U16(identity.product_id)),
        )
        .with_attribute(
            ATTR_SOFTWARE_VERSION,
            AttributeSpec::new("softwareVersion", DataType::Text, AccessMode::ReadOnly)
                .with_default(Value::Text(identity.software_version.clone())),
        )
        .with_attribute(
            ATTR_DEVICE_ID,
            AttributeSpec::new("deviceID", DataType::Text, AccessMode::ReadOnly)
                .with_default(Value::Text(identity.device_id.clone())),
        )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn feature_carries_identity_defaults() {
        let identity = DeviceIdentity::builder()
            .device_id("mash-evse-01")
            .vendor_id(0xFFF1)
            .product_id(0x0042)
            .vendor_name("MASH Labs")
            .product_name("Wallbox One")
            .serial_number("WB1-000123")
            .software_version("1.4.0")
            .build();

        let feature = feature(&identity);
        let vendor = feature
            .attribute(ATTR_VENDOR_NAME)
            .expect("vendorName should exist");
        assert_eq!(&Value::Text("MASH Labs".into()), vendor.value());

        let product_id = feature
            .attribute(ATTR_PRODUCT_ID)
            .expect("productID should exist");
        assert_eq!(&Value::U16(0x0042), product_id.value());
    }
}
