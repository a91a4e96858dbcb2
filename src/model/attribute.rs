use strum_macros::Display as StrumDisplay;

use super::value::{DataType, Value};

/// Access modes gating external reads and writes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, StrumDisplay)]
pub enum AccessMode {
    /// Constant after construction; externally readable.
    #[strum(to_string = "read_only")]
    ReadOnly,
    /// Externally readable, internally written.
    #[strum(to_string = "read")]
    Read,
    /// Externally readable and writable.
    #[strum(to_string = "read_write")]
    ReadWrite,
    /// Visible only to owning device code.
    #[strum(to_string = "internal")]
    Internal,
}

impl AccessMode {
    /// Returns true when an external caller may read the attribute.
    #[must_use]
    pub fn readable_externally(self) -> bool {
        !matches!(self, AccessMode::Internal)
    }

    /// Returns true when an external caller may write the attribute.
    #[must_use]
    pub fn writable_externally(self) -> bool {
        matches!(self, AccessMode::ReadWrite)
    }
}

/// Static attribute metadata.
#[derive(Debug, Clone)]
pub struct AttributeSpec {
    pub name: &'static str,
    pub data_type: DataType,
    pub access: AccessMode,
    pub nullable: bool,
    pub unit: Option<&'static str>,
    pub default: Option<Value>,
}

impl AttributeSpec {
    /// Creates a non-nullable spec with no unit and no default.
    #[must_use]
    pub fn new(name: &'static str, data_type: DataType, access: AccessMode) -> Self {
        Self {
            name,
            data_type,
            access,
            nullable: false,
            unit: None,
            default: None,
        }
    }

    /// Marks the attribute nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Attaches a unit string.
    #[must_use]
    pub fn with_unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Attaches an initial value.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// One live attribute: static spec plus current value and revision.
#[derive(Debug, Clone)]
pub struct Attribute {
    spec: AttributeSpec,
    value: Value,
    revision: u32,
}

/// Value validation failures shared by external writes and internal setters.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ValueViolation {
    /// The value's type does not match the declared data type.
    WrongType,
    /// Null was written to a non-nullable attribute.
    NullForbidden,
}

impl Attribute {
    /// Creates an attribute initialised to its default, or null without one.
    #[must_use]
    pub fn new(spec: AttributeSpec) -> Self {
        let value = spec.default.clone().unwrap_or(Value::Null);
        Self {
            spec,
            value,
            revision: 0,
        }
    }

    /// Returns the static metadata.
    #[must_use]
    pub fn spec(&self) -> &AttributeSpec {
        &self.spec
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the monotonic revision counter.
    #[must_use]
    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// Validates `value` against the declared type and nullability.
    pub fn validate(&self, value: &Value) -> Result<(), ValueViolation> {
        if value.is_null() {
            if self.spec.nullable {
                return Ok(());
            }
            return Err(ValueViolation::NullForbidden);
        }
        if !value.conforms_to(self.spec.data_type) {
            return Err(ValueViolation::WrongType);
        }
        Ok(())
    }

    /// Stores a validated value and bumps the revision.
    pub fn store(&mut self, value: Value) -> Result<(), ValueViolation> {
        self.validate(&value)?;
        self.value = value;
        self.revision = self.revision.wrapping_add(1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn limit_spec() -> AttributeSpec {
        AttributeSpec::new("effectiveConsumptionLimit", DataType::I64, AccessMode::Read)
            .nullable()
            .with_unit("mW")
    }

    #[test]
    fn attribute_initialises_to_default_or_null() {
        let defaulted = Attribute::new(
            AttributeSpec::new("phaseCount", DataType::U8, AccessMode::ReadOnly)
                .with_default(Value::U8(3)),
        );
        assert_eq!(&Value::U8(3), defaulted.value());

        let blank = Attribute::new(limit_spec());
        assert!(blank.value().is_null());
        assert_eq!(0, blank.revision());
    }

    #[test]
    fn store_bumps_revision_per_mutation() {
        let mut attribute = Attribute::new(limit_spec());
        attribute
            .store(Value::I64(5_000_000))
            .expect("typed value should store");
        attribute
            .store(Value::Null)
            .expect("nullable attribute should accept null");
        assert_eq!(2, attribute.revision());
    }

    #[rstest]
    #[case(Value::U64(5), ValueViolation::WrongType)]
    #[case(Value::Text("fast".into()), ValueViolation::WrongType)]
    fn store_rejects_mismatched_types(#[case] value: Value, #[case] expected: ValueViolation) {
        let mut attribute = Attribute::new(limit_spec());
        assert_matches!(attribute.store(value), Err(violation) if violation == expected);
        assert_eq!(0, attribute.revision());
    }

    #[test]
    fn store_rejects_null_on_non_nullable() {
        let mut attribute = Attribute::new(AttributeSpec::new(
            "controlState",
            DataType::U8,
            AccessMode::Read,
        ));
        assert_matches!(attribute.store(Value::Null), Err(ValueViolation::NullForbidden));
    }

    #[test]
    fn access_modes_gate_external_operations() {
        assert!(AccessMode::Read.readable_externally());
        assert!(!AccessMode::Internal.readable_externally());
        assert!(AccessMode::ReadWrite.writable_externally());
        assert!(!AccessMode::ReadOnly.writable_externally());
        assert!(!AccessMode::Read.writable_externally());
    }
}
