//! Bridges between [`Value`] and native Rust types.
//!
//! `FromValue` runs the weak coercion from [`crate::coerce`] and then
//! narrows; `IntoValue` is its inverse. Lossy directions:
//! - integer narrowing (`i8`..`i32`, `u8`..`u64`) wraps out-of-range values (`as` semantics)
//! - `f32` loses precision relative to the stored `f64`
//! - float to integer truncates toward zero
//!
//! `u64` values above `i64::MAX` cannot be returned and fail with `TypeCoercion`.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use sfq_common::{Result, SfqError};

use crate::coerce::{to_blob, to_bool, to_float, to_int, to_string, to_timestamp};
use crate::value::Value;
use crate::value_type::ValueType;

/// Native byte sequence mapped to [`Value::Blob`].
///
/// `Vec<u8>` maps to an array of integers instead.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob(pub Vec<u8>);

/// Native type with a fixed coercion target.
pub trait NativeType {
    /// Target used when coercing engine values into this type.
    fn value_type() -> ValueType;
}

/// Conversion from an engine value, coercing weakly.
pub trait FromValue: NativeType + Sized {
    /// Coerce `value` and convert it to `Self`.
    fn from_value(value: &Value) -> Result<Self>;
}

/// Conversion into an engine value.
pub trait IntoValue: NativeType {
    /// Convert `self` into the engine model.
    fn into_value(self) -> Result<Value>;
}

macro_rules! impl_narrow_int {
    ($($t:ty),* $(,)?) => {$(
        impl NativeType for $t {
            fn value_type() -> ValueType {
                ValueType::Int
            }
        }

        impl FromValue for $t {
            fn from_value(value: &Value) -> Result<Self> {
                Ok(to_int(value)? as $t)
            }
        }

        impl IntoValue for $t {
            fn into_value(self) -> Result<Value> {
                Ok(Value::Int(i64::from(self)))
            }
        }
    )*};
}

impl_narrow_int!(i8, i16, i32, u8, u16, u32);

impl NativeType for i64 {
    fn value_type() -> ValueType {
        ValueType::Int
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        to_int(value)
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Result<Value> {
        Ok(Value::Int(self))
    }
}

impl NativeType for u64 {
    fn value_type() -> ValueType {
        ValueType::Int
    }
}

impl FromValue for u64 {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(to_int(value)? as u64)
    }
}

impl IntoValue for u64 {
    fn into_value(self) -> Result<Value> {
        i64::try_from(self).map(Value::Int).map_err(|_| {
            SfqError::TypeCoercion(format!("u64 {self} exceeds the int range"))
        })
    }
}

impl NativeType for f64 {
    fn value_type() -> ValueType {
        ValueType::Float
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        to_float(value)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Result<Value> {
        Ok(Value::Float(self))
    }
}

impl NativeType for f32 {
    fn value_type() -> ValueType {
        ValueType::Float
    }
}

impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(to_float(value)? as f32)
    }
}

impl IntoValue for f32 {
    fn into_value(self) -> Result<Value> {
        Ok(Value::Float(f64::from(self)))
    }
}

impl NativeType for bool {
    fn value_type() -> ValueType {
        ValueType::Bool
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        to_bool(value)
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Result<Value> {
        Ok(Value::Bool(self))
    }
}

impl NativeType for String {
    fn value_type() -> ValueType {
        ValueType::String
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        to_string(value)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Result<Value> {
        Ok(Value::String(self))
    }
}

impl NativeType for Blob {
    fn value_type() -> ValueType {
        ValueType::Blob
    }
}

impl FromValue for Blob {
    fn from_value(value: &Value) -> Result<Self> {
        to_blob(value).map(Blob)
    }
}

impl IntoValue for Blob {
    fn into_value(self) -> Result<Value> {
        Ok(Value::Blob(self.0))
    }
}

impl NativeType for DateTime<Utc> {
    fn value_type() -> ValueType {
        ValueType::Timestamp
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self> {
        to_timestamp(value)
    }
}

impl IntoValue for DateTime<Utc> {
    fn into_value(self) -> Result<Value> {
        Ok(Value::Timestamp(self))
    }
}

// Accept-any: the variant type itself.
impl NativeType for Value {
    fn value_type() -> ValueType {
        ValueType::Any
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Result<Value> {
        Ok(self)
    }
}

impl<T: NativeType> NativeType for Vec<T> {
    fn value_type() -> ValueType {
        ValueType::array_of(T::value_type())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| T::from_value(item).map_err(|e| at(e, &format!("element {i}"))))
                .collect(),
            other => Err(mismatch(other, Self::value_type())),
        }
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Result<Value> {
        self.into_iter()
            .map(IntoValue::into_value)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }
}

/// `None` maps to [`Value::Null`]; anything else coerces as `T`.
impl<T: NativeType> NativeType for Option<T> {
    fn value_type() -> ValueType {
        T::value_type()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(value).map(Some)
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Result<Value> {
        match self {
            Some(v) => v.into_value(),
            None => Ok(Value::Null),
        }
    }
}

impl<T: NativeType> NativeType for BTreeMap<String, T> {
    fn value_type() -> ValueType {
        ValueType::map_of(T::value_type())
    }
}

impl<T: FromValue> FromValue for BTreeMap<String, T> {
    fn from_value(value: &Value) -> Result<Self> {
        map_entries(value, Self::value_type())?
            .iter()
            .map(|(k, v)| {
                T::from_value(v)
                    .map(|v| (k.clone(), v))
                    .map_err(|e| at(e, &format!("key {k:?}")))
            })
            .collect()
    }
}

impl<T: IntoValue> IntoValue for BTreeMap<String, T> {
    fn into_value(self) -> Result<Value> {
        self.into_iter()
            .map(|(k, v)| v.into_value().map(|v| (k, v)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Value::Map)
    }
}

impl<T: NativeType> NativeType for HashMap<String, T> {
    fn value_type() -> ValueType {
        ValueType::map_of(T::value_type())
    }
}

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn from_value(value: &Value) -> Result<Self> {
        map_entries(value, Self::value_type())?
            .iter()
            .map(|(k, v)| {
                T::from_value(v)
                    .map(|v| (k.clone(), v))
                    .map_err(|e| at(e, &format!("key {k:?}")))
            })
            .collect()
    }
}

impl<T: IntoValue> IntoValue for HashMap<String, T> {
    fn into_value(self) -> Result<Value> {
        self.into_iter()
            .map(|(k, v)| v.into_value().map(|v| (k, v)))
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Value::Map)
    }
}

fn map_entries(value: &Value, target: ValueType) -> Result<&BTreeMap<String, Value>> {
    match value {
        Value::Map(entries) => Ok(entries),
        other => Err(mismatch(other, target)),
    }
}

fn mismatch(value: &Value, target: ValueType) -> SfqError {
    SfqError::TypeCoercion(format!("cannot coerce {} to {target}", value.type_name()))
}

fn at(err: SfqError, location: &str) -> SfqError {
    match err {
        SfqError::TypeCoercion(msg) => SfqError::TypeCoercion(format!("{location}: {msg}")),
        other => other,
    }
}
