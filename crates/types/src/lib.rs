#![deny(missing_docs)]

//! Value type system for SFQ UDFs.
//!
//! Architecture role:
//! - closed runtime [`Value`] model shared by the query layer and UDFs
//! - [`ValueType`] coercion targets declared by UDF parameters
//! - weak coercion table ([`coerce()`]) and native bridges ([`FromValue`] / [`IntoValue`])
//!
//! Key modules:
//! - [`value`]
//! - [`value_type`]
//! - [`coerce`]
//! - [`native`]

pub mod coerce;
pub mod native;
pub mod value;
pub mod value_type;

pub use coerce::coerce;
pub use native::{Blob, FromValue, IntoValue, NativeType};
pub use value::{Value, ValueKind};
pub use value_type::ValueType;
