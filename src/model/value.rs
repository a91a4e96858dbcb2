use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use strum_macros::Display as StrumDisplay;

/// Data type tags declared by attribute and command-parameter metadata.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, StrumDisplay, Serialize)]
pub enum DataType {
    #[strum(to_string = "bool")]
    Bool,
    #[strum(to_string = "u8")]
    U8,
    #[strum(to_string = "u16")]
    U16,
    #[strum(to_string = "u32")]
    U32,
    #[strum(to_string = "u64")]
    U64,
    #[strum(to_string = "i8")]
    I8,
    #[strum(to_string = "i16")]
    I16,
    #[strum(to_string = "i32")]
    I32,
    #[strum(to_string = "i64")]
    I64,
    #[strum(to_string = "string")]
    Text,
    #[strum(to_string = "bytes")]
    Bytes,
    #[strum(to_string = "array")]
    Array,
    #[strum(to_string = "map")]
    Map,
}

/// Dynamically typed attribute and parameter values.
///
/// Signed and unsigned integers are distinct types; no coercion happens at
/// this layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Command parameters and results keyed by parameter name.
pub type ParamMap = BTreeMap<String, Value>;

impl Value {
    /// Returns the data type of this value, or `None` for null.
    #[must_use]
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(DataType::Bool),
            Value::U8(_) => Some(DataType::U8),
            Value::U16(_) => Some(DataType::U16),
            Value::U32(_) => Some(DataType::U32),
            Value::U64(_) => Some(DataType::U64),
            Value::I8(_) => Some(DataType::I8),
            Value::I16(_) => Some(DataType::I16),
            Value::I32(_) => Some(DataType::I32),
            Value::I64(_) => Some(DataType::I64),
            Value::Text(_) => Some(DataType::Text),
            Value::Bytes(_) => Some(DataType::Bytes),
            Value::Array(_) => Some(DataType::Array),
            Value::Map(_) => Some(DataType::Map),
        }
    }

    /// Returns true for the null value.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true when this value is either null or exactly of `data_type`.
    #[must_use]
    pub fn conforms_to(&self, data_type: DataType) -> bool {
        match self.data_type() {
            None => true,
            Some(own) => own == data_type,
        }
    }

    /// Returns the signed 64-bit payload of any signed integer value.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I8(value) => Some(i64::from(*value)),
            Value::I16(value) => Some(i64::from(*value)),
            Value::I32(value) => Some(i64::from(*value)),
            Value::I64(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the unsigned 64-bit payload of any unsigned integer value.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U8(value) => Some(u64::from(*value)),
            Value::U16(value) => Some(u64::from(*value)),
            Value::U32(value) => Some(u64::from(*value)),
            Value::U64(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the boolean payload, if any.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::U8(value) => write!(f, "{value}"),
            Value::U16(value) => write!(f, "{value}"),
            Value::U32(value) => write!(f, "{value}"),
            Value::U64(value) => write!(f, "{value}"),
            Value::I8(value) => write!(f, "{value}"),
            Value::I16(value) => write!(f, "{value}"),
            Value::I32(value) => write!(f, "{value}"),
            Value::I64(value) => write!(f, "{value}"),
            Value::Text(value) => write!(f, "{value}"),
            Value::Bytes(value) => write!(f, "0x{}", hex::encode(value)),
            Value::Array(values) => {
                write!(f, "[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Value::U8(value)
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::U16(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::U32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Value::Bool(true), DataType::Bool)]
    #[case(Value::U16(7), DataType::U16)]
    #[case(Value::I64(-5), DataType::I64)]
    #[case(Value::Text("evse".into()), DataType::Text)]
    #[case(Value::Bytes(vec![1, 2]), DataType::Bytes)]
    fn data_type_matches_variant(#[case] value: Value, #[case] expected: DataType) {
        assert_eq!(Some(expected), value.data_type());
    }

    #[test]
    fn null_has_no_data_type_and_conforms_everywhere() {
        assert_eq!(None, Value::Null.data_type());
        assert!(Value::Null.conforms_to(DataType::U8));
        assert!(Value::Null.conforms_to(DataType::Text));
    }

    #[rstest]
    #[case(Value::U8(1), DataType::I8)]
    #[case(Value::I32(1), DataType::U32)]
    #[case(Value::U64(1), DataType::I64)]
    fn signed_and_unsigned_integers_do_not_coerce(
        #[case] value: Value,
        #[case] declared: DataType,
    ) {
        assert!(!value.conforms_to(declared));
    }

    #[test]
    fn display_renders_compound_values() {
        let value = Value::Array(vec![Value::U8(1), Value::Text("x".into()), Value::Null]);
        assert_eq!("[1, x, null]", value.to_string());

        let value = Value::Bytes(vec![0xAB, 0x01]);
        assert_eq!("0xab01", value.to_string());
    }
}
