//! Weak coercion between [`Value`] variants and [`ValueType`] targets.
//!
//! Every (source variant, target) pair has an explicit arm below: either a
//! conversion or a rejection. Rejections and parse failures surface as
//! [`SfqError::TypeCoercion`]. All functions are pure.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use sfq_common::{Result, SfqError};

use crate::value::Value;
use crate::value_type::ValueType;

// i64::MAX is not representable as f64; 2^63 is the first float out of range.
const I64_UPPER_BOUND_F64: f64 = 9_223_372_036_854_775_808.0;

/// Coerce `value` to the variant described by `target`.
pub fn coerce(value: &Value, target: &ValueType) -> Result<Value> {
    match target {
        ValueType::Any => Ok(value.clone()),
        ValueType::Bool => to_bool(value).map(Value::Bool),
        ValueType::Int => to_int(value).map(Value::Int),
        ValueType::Float => to_float(value).map(Value::Float),
        ValueType::String => to_string(value).map(Value::String),
        ValueType::Blob => to_blob(value).map(Value::Blob),
        ValueType::Timestamp => to_timestamp(value).map(Value::Timestamp),
        ValueType::Array(element) => to_array(value, element).map(Value::Array),
        ValueType::Map(element) => to_map(value, element).map(Value::Map),
    }
}

/// Only booleans coerce to bool.
pub fn to_bool(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(v) => Ok(*v),
        Value::Null
        | Value::Int(_)
        | Value::Float(_)
        | Value::String(_)
        | Value::Blob(_)
        | Value::Timestamp(_)
        | Value::Array(_)
        | Value::Map(_) => Err(reject(value, &ValueType::Bool)),
    }
}

/// Numbers widen or truncate; strings parse as decimal; timestamps give unix seconds.
pub fn to_int(value: &Value) -> Result<i64> {
    match value {
        Value::Int(v) => Ok(*v),
        Value::Float(v) => float_to_int(*v),
        Value::String(s) => {
            let trimmed = s.trim();
            match trimmed.parse::<i64>() {
                Ok(v) => Ok(v),
                Err(_) => float_to_int(parse_float(trimmed, "int")?),
            }
        }
        Value::Timestamp(ts) => Ok(ts.timestamp()),
        Value::Null | Value::Bool(_) | Value::Blob(_) | Value::Array(_) | Value::Map(_) => {
            Err(reject(value, &ValueType::Int))
        }
    }
}

/// Numbers widen; strings parse as decimal; timestamps give fractional unix seconds.
pub fn to_float(value: &Value) -> Result<f64> {
    match value {
        Value::Float(v) => Ok(*v),
        Value::Int(v) => Ok(*v as f64),
        Value::String(s) => parse_float(s.trim(), "float"),
        Value::Timestamp(ts) => {
            Ok(ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_nanos()) / 1e9)
        }
        Value::Null | Value::Bool(_) | Value::Blob(_) | Value::Array(_) | Value::Map(_) => {
            Err(reject(value, &ValueType::Float))
        }
    }
}

/// Scalars render to text; containers, blobs and null are rejected.
pub fn to_string(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(v) => Ok(v.to_string()),
        Value::Int(v) => Ok(v.to_string()),
        Value::Float(v) => Ok(v.to_string()),
        Value::Timestamp(ts) => Ok(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        Value::Null | Value::Blob(_) | Value::Array(_) | Value::Map(_) => {
            Err(reject(value, &ValueType::String))
        }
    }
}

/// Only blobs coerce to blob.
pub fn to_blob(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::Blob(b) => Ok(b.clone()),
        Value::Null
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Float(_)
        | Value::String(_)
        | Value::Timestamp(_)
        | Value::Array(_)
        | Value::Map(_) => Err(reject(value, &ValueType::Blob)),
    }
}

/// Integers and floats are read as unix seconds; strings as RFC 3339.
pub fn to_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::Timestamp(ts) => Ok(*ts),
        Value::Int(secs) => DateTime::from_timestamp(*secs, 0).ok_or_else(|| {
            SfqError::TypeCoercion(format!("unix seconds {secs} out of timestamp range"))
        }),
        Value::Float(secs) => float_to_timestamp(*secs),
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| {
                SfqError::TypeCoercion(format!("cannot parse string {s:?} as timestamp: {e}"))
            }),
        Value::Null | Value::Bool(_) | Value::Blob(_) | Value::Array(_) | Value::Map(_) => {
            Err(reject(value, &ValueType::Timestamp))
        }
    }
}

/// Elementwise coercion; the first failing element fails the whole array.
pub fn to_array(value: &Value, element: &ValueType) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                coerce(item, element).map_err(|e| nested(e, &format!("element {i}")))
            })
            .collect(),
        Value::Null
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Float(_)
        | Value::String(_)
        | Value::Blob(_)
        | Value::Timestamp(_)
        | Value::Map(_) => Err(reject(value, &ValueType::array_of(element.clone()))),
    }
}

/// Entrywise coercion of map values; keys are kept.
pub fn to_map(value: &Value, element: &ValueType) -> Result<BTreeMap<String, Value>> {
    match value {
        Value::Map(entries) => entries
            .iter()
            .map(|(k, v)| {
                coerce(v, element)
                    .map(|v| (k.clone(), v))
                    .map_err(|e| nested(e, &format!("key {k:?}")))
            })
            .collect(),
        Value::Null
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Float(_)
        | Value::String(_)
        | Value::Blob(_)
        | Value::Timestamp(_)
        | Value::Array(_) => Err(reject(value, &ValueType::map_of(element.clone()))),
    }
}

fn float_to_int(v: f64) -> Result<i64> {
    if !v.is_finite() || v < -I64_UPPER_BOUND_F64 || v >= I64_UPPER_BOUND_F64 {
        return Err(SfqError::TypeCoercion(format!(
            "float {v} out of int range"
        )));
    }
    Ok(v.trunc() as i64)
}

fn float_to_timestamp(secs: f64) -> Result<DateTime<Utc>> {
    if !secs.is_finite() {
        return Err(SfqError::TypeCoercion(format!(
            "float {secs} is not a valid unix time"
        )));
    }
    let whole = secs.floor();
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    if whole < i64::MIN as f64 || whole >= I64_UPPER_BOUND_F64 {
        return Err(SfqError::TypeCoercion(format!(
            "unix seconds {secs} out of timestamp range"
        )));
    }
    DateTime::from_timestamp(whole as i64, nanos).ok_or_else(|| {
        SfqError::TypeCoercion(format!("unix seconds {secs} out of timestamp range"))
    })
}

fn parse_float(s: &str, target: &str) -> Result<f64> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(SfqError::TypeCoercion(format!(
            "cannot parse string {s:?} as {target}"
        ))),
    }
}

fn reject(value: &Value, target: &ValueType) -> SfqError {
    SfqError::TypeCoercion(format!("cannot coerce {} to {target}", value.type_name()))
}

fn nested(err: SfqError, location: &str) -> SfqError {
    match err {
        SfqError::TypeCoercion(msg) => SfqError::TypeCoercion(format!("{location}: {msg}")),
        other => other,
    }
}
