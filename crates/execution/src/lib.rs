#![deny(missing_docs)]

//! UDF extensibility layer used by the query compiler and execution runtime.
//!
//! Architecture role:
//! - uniform UDF contract and hand-written UDF helper
//! - signature validation for typed Rust functions
//! - generic adapter coercing engine values into native parameters
//! - name + arity registry shared by query compilation
//!
//! Key modules:
//! - [`context`]
//! - [`udf`]
//! - [`signature`]
//! - [`generic`]
//! - [`registry`]
//!
//! Feature flags:
//! - none; registry behavior is driven by [`sfq_common::RegistryConfig`].

pub mod context;
pub mod generic;
pub mod registry;
pub mod signature;
pub mod udf;

// Re-export only what you want at the crate root (no globs).
pub use context::{ProcessingContext, SharedContext};
pub use generic::{
    GenericFunction, GenericUdf, Param, Returns, Variadic, convert_generic, must_convert_generic,
};
pub use registry::{UdfRegistry, global_udf_registry};
pub use signature::{
    DeclaredShape, FunctionSignature, ParamKind, ReturnKind, ReturnShape, SignatureForm, validate,
};
pub use udf::{
    Arity, FnUdf, Udf, UdfRef, must_register_global_udf, register_global_udf, resolve_global_udf,
};
