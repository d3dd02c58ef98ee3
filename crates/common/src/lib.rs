//! Shared configuration, error types, and observability primitives for SFQ crates.
//!
//! Architecture role:
//! - defines the registry configuration passed to the execution layer
//! - provides common [`SfqError`] / [`Result`] contracts
//! - hosts UDF metrics
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`metrics`]

pub mod config;
pub mod error;
pub mod metrics;

pub use config::{OverlapPolicy, RegistryConfig};
pub use error::{BoxError, Result, SfqError};
pub use metrics::{MetricsRegistry, global_metrics};
