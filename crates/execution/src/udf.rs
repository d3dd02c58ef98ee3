//! UDF runtime contract, hand-written UDF helper, and global registry shortcuts.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use sfq_common::{Result, SfqError};
use sfq_types::Value;

use crate::context::SharedContext;
use crate::registry::global_udf_registry;

/// Runtime UDF contract.
///
/// Instances are shared across workers and called concurrently, so
/// implementations must not keep per-call state.
pub trait Udf: Send + Sync {
    /// Invoke the function for one tuple (or one aggregation group).
    fn call(&self, ctx: &SharedContext, args: &[Value]) -> Result<Value>;
    /// Whether a call site with `arity` arguments can bind to this UDF.
    fn accept(&self, arity: usize) -> bool;
    /// Whether argument `position` must be pre-aggregated over a group.
    fn is_aggregation_parameter(&self, position: usize) -> bool;
    /// Accepted arities as `(min, max)`, `max = None` meaning unbounded.
    ///
    /// `None` marks the predicate as opaque; the registry then probes
    /// [`Udf::accept`] to detect overlaps.
    fn arity_bounds(&self) -> Option<(usize, Option<usize>)> {
        None
    }
}

/// Shared UDF handle stored by registries and query plans.
pub type UdfRef = Arc<dyn Udf>;

/// Arity predicate for hand-written UDFs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly `n` arguments.
    Exact(usize),
    /// `n` or more arguments.
    AtLeast(usize),
    /// Between `min` and `max` arguments, inclusive.
    Between(usize, usize),
}

impl Arity {
    /// Whether `arity` satisfies the predicate.
    pub fn accepts(self, arity: usize) -> bool {
        match self {
            Arity::Exact(n) => arity == n,
            Arity::AtLeast(n) => arity >= n,
            Arity::Between(min, max) => (min..=max).contains(&arity),
        }
    }

    /// Inclusive `(min, max)` range; `max = None` when unbounded.
    pub fn bounds(self) -> (usize, Option<usize>) {
        match self {
            Arity::Exact(n) => (n, Some(n)),
            Arity::AtLeast(n) => (n, None),
            Arity::Between(min, max) => (min, Some(max)),
        }
    }
}

type UdfBody = dyn Fn(&SharedContext, &[Value]) -> Result<Value> + Send + Sync;

/// Hand-written UDF over raw values.
///
/// Unlike the generic adapter it can declare aggregation parameters.
pub struct FnUdf {
    arity: Arity,
    aggregation_params: BTreeSet<usize>,
    body: Box<UdfBody>,
}

impl FnUdf {
    /// UDF with the given arity predicate and body.
    pub fn new<F>(arity: Arity, body: F) -> Self
    where
        F: Fn(&SharedContext, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            arity,
            aggregation_params: BTreeSet::new(),
            body: Box::new(body),
        }
    }

    /// Mark argument positions that must receive aggregated input.
    pub fn with_aggregation_params(mut self, positions: impl IntoIterator<Item = usize>) -> Self {
        self.aggregation_params.extend(positions);
        self
    }
}

impl fmt::Debug for FnUdf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnUdf")
            .field("arity", &self.arity)
            .field("aggregation_params", &self.aggregation_params)
            .finish()
    }
}

impl Udf for FnUdf {
    fn call(&self, ctx: &SharedContext, args: &[Value]) -> Result<Value> {
        if !self.arity.accepts(args.len()) {
            return Err(SfqError::Arity(format!(
                "{:?} does not accept {} argument(s)",
                self.arity,
                args.len()
            )));
        }
        (self.body)(ctx, args)
    }

    fn accept(&self, arity: usize) -> bool {
        self.arity.accepts(arity)
    }

    fn is_aggregation_parameter(&self, position: usize) -> bool {
        self.aggregation_params.contains(&position)
    }

    fn arity_bounds(&self) -> Option<(usize, Option<usize>)> {
        Some(self.arity.bounds())
    }
}

/// Register `udf` under `name` in the global registry.
pub fn register_global_udf(name: &str, udf: UdfRef) -> Result<()> {
    global_udf_registry().register(name, udf)
}

/// Like [`register_global_udf`] but panics on failure; meant for process-start wiring.
pub fn must_register_global_udf(name: &str, udf: UdfRef) {
    global_udf_registry().must_register(name, udf)
}

/// Resolve `name` with `arity` arguments against the global registry.
pub fn resolve_global_udf(name: &str, arity: usize) -> Result<UdfRef> {
    global_udf_registry().resolve(name, arity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ProcessingContext;

    fn sum_udf() -> FnUdf {
        FnUdf::new(Arity::Between(1, 3), |_ctx, args| {
            let mut total = 0_i64;
            for arg in args {
                total += sfq_types::coerce::to_int(arg)?;
            }
            Ok(Value::Int(total))
        })
        .with_aggregation_params([0])
    }

    #[test]
    fn arity_predicates() {
        assert!(Arity::Exact(2).accepts(2));
        assert!(!Arity::Exact(2).accepts(3));
        assert!(Arity::AtLeast(1).accepts(10));
        assert!(!Arity::AtLeast(1).accepts(0));
        assert!(Arity::Between(1, 3).accepts(3));
        assert!(!Arity::Between(1, 3).accepts(4));
        assert_eq!(Arity::AtLeast(100).bounds(), (100, None));
        assert_eq!(Arity::Between(1, 3).bounds(), (1, Some(3)));
    }

    #[test]
    fn fn_udf_declares_aggregation_positions() {
        let udf = sum_udf();
        assert!(udf.is_aggregation_parameter(0));
        assert!(!udf.is_aggregation_parameter(1));
    }

    #[test]
    fn fn_udf_rechecks_arity_at_call_time() {
        let udf = sum_udf();
        let ctx = ProcessingContext::new("t").shared();
        assert_eq!(
            udf.call(&ctx, &[Value::Int(1), Value::from("2")]).unwrap(),
            Value::Int(3)
        );
        assert!(matches!(udf.call(&ctx, &[]), Err(SfqError::Arity(_))));
    }

    #[test]
    #[should_panic(expected = "failed to register udf `udf_unit_twice`")]
    fn must_register_global_panics_on_duplicate() {
        must_register_global_udf("udf_unit_twice", Arc::new(sum_udf()));
        must_register_global_udf("udf_unit_twice", Arc::new(sum_udf()));
    }
}
