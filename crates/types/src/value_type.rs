//! Coercion targets.

use std::fmt;

/// Coercion target declared by a UDF parameter or return slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Accepts every variant unchanged.
    Any,
    /// Boolean.
    Bool,
    /// 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// UTF-8 string.
    String,
    /// Byte sequence.
    Blob,
    /// UTC timestamp.
    Timestamp,
    /// Array whose elements coerce to the inner type.
    Array(Box<ValueType>),
    /// String-keyed map whose values coerce to the inner type.
    Map(Box<ValueType>),
}

impl ValueType {
    /// `array<element>`
    pub fn array_of(element: ValueType) -> Self {
        ValueType::Array(Box::new(element))
    }

    /// `map<element>`
    pub fn map_of(element: ValueType) -> Self {
        ValueType::Map(Box::new(element))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => f.write_str("any"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::Int => f.write_str("int"),
            ValueType::Float => f.write_str("float"),
            ValueType::String => f.write_str("string"),
            ValueType::Blob => f.write_str("blob"),
            ValueType::Timestamp => f.write_str("timestamp"),
            ValueType::Array(inner) => write!(f, "array<{inner}>"),
            ValueType::Map(inner) => write!(f, "map<{inner}>"),
        }
    }
}
