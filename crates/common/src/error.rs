use thiserror::Error;

/// Boxed cause carried by [`SfqError::UdfExecution`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Canonical SFQ error taxonomy used across crates.
///
/// Classification guidance:
/// - configuration time (startup should abort): [`SfqError::Signature`],
///   [`SfqError::DuplicateRegistration`], [`SfqError::InvalidName`],
///   [`SfqError::RegistryFrozen`], [`SfqError::InvalidConfig`]
/// - runtime (returned to the execution layer, decided per tuple):
///   [`SfqError::NoMatchingUdf`], [`SfqError::Arity`], [`SfqError::TypeCoercion`],
///   [`SfqError::UdfExecution`], [`SfqError::Cancelled`]
#[derive(Debug, Error)]
pub enum SfqError {
    /// A candidate function's parameter/return shape is not a legal calling form.
    ///
    /// Examples:
    /// - context parameter in a position other than the first
    /// - two variadic parameters, or a fixed parameter after the variadic one
    /// - no return value, or an error-only return
    #[error("signature error: {0}")]
    Signature(String),

    /// Two registrations under one name accept a common arity.
    #[error("duplicate registration: {0}")]
    DuplicateRegistration(String),

    /// Empty UDF name or a name containing reserved characters.
    #[error("invalid udf name: {0}")]
    InvalidName(String),

    /// Registration attempted after the registry was frozen.
    #[error("registry frozen: {0}")]
    RegistryFrozen(String),

    /// No registered candidate under `name` accepts `arity`.
    #[error("no udf `{name}` accepts {arity} argument(s)")]
    NoMatchingUdf {
        /// Normalized function name.
        name: String,
        /// Requested argument count.
        arity: usize,
    },

    /// Call-time argument count outside of what the UDF accepts.
    #[error("arity error: {0}")]
    Arity(String),

    /// A value could not be converted between the engine model and a native type.
    ///
    /// Examples:
    /// - malformed decimal string passed to a numeric parameter
    /// - non-boolean value passed to a boolean parameter
    /// - native `u64` return value above `i64::MAX`
    #[error("type coercion error: {0}")]
    TypeCoercion(String),

    /// The function reported failure through its declared error channel.
    #[error("udf execution failed: {0}")]
    UdfExecution(#[source] BoxError),

    /// Processing context was cancelled or its deadline elapsed.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Invalid or inconsistent configuration values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SfqError {
    /// Returns `true` for failures that represent a misconfigured deployment
    /// rather than a data-dependent condition.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SfqError::Signature(_)
                | SfqError::DuplicateRegistration(_)
                | SfqError::InvalidName(_)
                | SfqError::RegistryFrozen(_)
                | SfqError::InvalidConfig(_)
        )
    }
}

/// Standard SFQ result alias.
pub type Result<T> = std::result::Result<T, SfqError>;
