//! Name + arity UDF registry.
//!
//! Lifecycle: construct, register during process start, [`UdfRegistry::freeze`],
//! then serve lookups. Lookups take a shared read lock so concurrent query
//! compilation never serializes. Registration checks overlaps against a copy
//! of the candidates with no lock held, then takes the write lock only to
//! re-check and insert. The map is modified only after validation, so a
//! poisoned lock still guards a consistent map and is recovered.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use sfq_common::{MetricsRegistry, OverlapPolicy, RegistryConfig, Result, SfqError, global_metrics};
use sfq_types::Value;
use tracing::{debug, info, warn};

use crate::context::SharedContext;
use crate::udf::{Udf, UdfRef};

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, Vec<UdfRef>>,
    frozen: bool,
}

/// Registry of UDF candidates keyed by name; candidates under one name are
/// told apart by the arities they accept.
pub struct UdfRegistry {
    config: RegistryConfig,
    metrics: MetricsRegistry,
    inner: RwLock<RegistryState>,
}

impl std::fmt::Debug for UdfRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (names, frozen) = {
            let state = self.state();
            (state.entries.len(), state.frozen)
        };
        f.debug_struct("UdfRegistry")
            .field("names", &names)
            .field("frozen", &frozen)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for UdfRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl UdfRegistry {
    /// Empty registry reporting to its own metrics registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            metrics: MetricsRegistry::new(),
            inner: RwLock::new(RegistryState::default()),
        }
    }

    /// Report registration/resolution/call metrics to `metrics` instead.
    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = metrics;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Metrics sink used by this registry.
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Register `udf` under `name`.
    ///
    /// Fails with `InvalidName`, `RegistryFrozen`, or (under
    /// [`OverlapPolicy::Reject`]) `DuplicateRegistration` when an existing
    /// candidate under the same name accepts an arity the new one accepts.
    pub fn register(&self, name: &str, udf: UdfRef) -> Result<()> {
        let key = match self.normalize(name) {
            Ok(key) => key,
            Err(e) => {
                self.metrics.record_registration("rejected");
                warn!(udf = name, error = %e, "udf registration rejected");
                return Err(e);
            }
        };
        let udf = if self.config.record_call_metrics {
            Arc::new(InstrumentedUdf {
                name: key.clone(),
                inner: udf,
                metrics: self.metrics.clone(),
            }) as UdfRef
        } else {
            udf
        };
        self.insert_all(&key, vec![udf])
    }

    /// Like [`UdfRegistry::register`] but panics on failure; meant for
    /// process-start wiring where a bad registration is a deployment error.
    pub fn must_register(&self, name: &str, udf: UdfRef) {
        if let Err(e) = self.register(name, udf) {
            panic!("failed to register udf `{name}`: {e}");
        }
    }

    /// Expose every candidate registered under `existing` as `alias` too.
    pub fn alias(&self, existing: &str, alias: &str) -> Result<()> {
        let candidates = self.candidates(existing);
        if candidates.is_empty() {
            return Err(SfqError::InvalidConfig(format!(
                "cannot alias unknown udf `{existing}`"
            )));
        }
        let key = self.normalize(alias)?;
        self.insert_all(&key, candidates)
    }

    /// Resolve the candidate under `name` that accepts `arity`.
    pub fn resolve(&self, name: &str, arity: usize) -> Result<UdfRef> {
        let key = self.key(name);
        let found = self
            .state()
            .entries
            .get(&key)
            .and_then(|candidates| candidates.iter().find(|u| u.accept(arity)).cloned());
        match found {
            Some(udf) => {
                self.metrics.record_resolution("hit");
                Ok(udf)
            }
            None => {
                self.metrics.record_resolution("miss");
                debug!(udf = %key, arity, "no udf candidate accepts arity");
                Err(SfqError::NoMatchingUdf { name: key, arity })
            }
        }
    }

    /// All candidates registered under `name`, in registration order.
    pub fn candidates(&self, name: &str) -> Vec<UdfRef> {
        self.state()
            .entries
            .get(&self.key(name))
            .cloned()
            .unwrap_or_default()
    }

    /// Whether any candidate is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.state().entries.contains_key(&self.key(name))
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names = self.state().entries.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every candidate under `name`.
    ///
    /// Returns `true` when something was removed.
    pub fn deregister(&self, name: &str) -> Result<bool> {
        let key = self.key(name);
        let mut state = self.state_mut();
        if state.frozen {
            return Err(SfqError::RegistryFrozen(format!(
                "cannot deregister `{key}` after freeze"
            )));
        }
        Ok(state.entries.remove(&key).is_some())
    }

    /// End the registration phase; later registrations fail with `RegistryFrozen`.
    pub fn freeze(&self) {
        let mut state = self.state_mut();
        if !state.frozen {
            state.frozen = true;
            info!(names = state.entries.len(), "udf registry frozen");
        }
    }

    /// Whether [`UdfRegistry::freeze`] was called.
    pub fn is_frozen(&self) -> bool {
        self.state().frozen
    }

    /// Unfrozen copy sharing the same UDF instances, e.g. a per-query
    /// registry seeded from the global one.
    pub fn snapshot(&self) -> UdfRegistry {
        let entries = self.state().entries.clone();
        UdfRegistry {
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            inner: RwLock::new(RegistryState {
                entries,
                frozen: false,
            }),
        }
    }

    fn state(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(&self, name: &str) -> String {
        if self.config.case_insensitive_names {
            name.to_ascii_lowercase()
        } else {
            name.to_string()
        }
    }

    fn normalize(&self, name: &str) -> Result<String> {
        validate_name(name)?;
        Ok(self.key(name))
    }

    fn insert_all(&self, key: &str, udfs: Vec<UdfRef>) -> Result<()> {
        loop {
            let existing = {
                let state = self.state();
                if state.frozen {
                    drop(state);
                    return self.reject(key, frozen_error(key));
                }
                state.entries.get(key).cloned().unwrap_or_default()
            };
            // User `accept` code runs here, outside the lock.
            if let Err(e) = self.check_overlap(key, &existing, &udfs) {
                return self.reject(key, e);
            }

            let mut state = self.state_mut();
            if state.frozen {
                drop(state);
                return self.reject(key, frozen_error(key));
            }
            let current = state.entries.get(key).map(Vec::as_slice).unwrap_or(&[]);
            if !same_candidates(current, &existing) {
                debug!(udf = key, "candidates changed during registration; retrying");
                continue;
            }
            let candidates = state.entries.entry(key.to_string()).or_default();
            let added = udfs.len();
            candidates.extend(udfs);
            let total = candidates.len();
            drop(state);
            for _ in 0..added {
                self.metrics.record_registration("accepted");
            }
            info!(udf = key, candidates = total, "registered udf");
            return Ok(());
        }
    }

    fn reject(&self, key: &str, err: SfqError) -> Result<()> {
        self.metrics.record_registration("rejected");
        warn!(udf = key, error = %err, "udf registration rejected");
        Err(err)
    }

    fn check_overlap(&self, key: &str, existing: &[UdfRef], udfs: &[UdfRef]) -> Result<()> {
        if self.config.overlap_policy == OverlapPolicy::FirstMatch {
            return Ok(());
        }
        let mut seen = existing.iter().collect::<Vec<_>>();
        for udf in udfs {
            let overlap = seen
                .iter()
                .filter_map(|other| overlapping_arity(other, udf, self.config.max_probe_arity))
                .min();
            if let Some(arity) = overlap {
                return Err(SfqError::DuplicateRegistration(format!(
                    "`{key}` already has a candidate accepting {arity} argument(s)"
                )));
            }
            seen.push(udf);
        }
        Ok(())
    }
}

fn frozen_error(key: &str) -> SfqError {
    SfqError::RegistryFrozen(format!("cannot register `{key}` after freeze"))
}

fn same_candidates(current: &[UdfRef], seen: &[UdfRef]) -> bool {
    current.len() == seen.len() && current.iter().zip(seen).all(|(a, b)| Arc::ptr_eq(a, b))
}

/// Smallest arity both UDFs accept.
///
/// Declared ranges are intersected exactly. When either side is opaque the
/// probe covers the other side's declared range, or `0..=max_probe` when
/// neither declares one.
fn overlapping_arity(a: &UdfRef, b: &UdfRef, max_probe: usize) -> Option<usize> {
    let (probe_lo, probe_hi) = match (a.arity_bounds(), b.arity_bounds()) {
        (Some((a_lo, a_hi)), Some((b_lo, b_hi))) => {
            let lo = a_lo.max(b_lo);
            let hi = match (a_hi, b_hi) {
                (Some(x), Some(y)) => Some(x.min(y)),
                (x, y) => x.or(y),
            };
            return match hi {
                Some(hi) if lo > hi => None,
                _ => Some(lo),
            };
        }
        (Some((lo, hi)), None) | (None, Some((lo, hi))) => {
            (lo, hi.unwrap_or(lo.saturating_add(max_probe)))
        }
        (None, None) => (0, max_probe),
    };
    (probe_lo..=probe_hi).find(|&arity| a.accept(arity) && b.accept(arity))
}

/// Names start with an ASCII letter or `_`, followed by ASCII letters, digits, or `_`.
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(SfqError::InvalidName("udf name must not be empty".to_string()));
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(SfqError::InvalidName(format!(
            "`{name}` must start with a letter or '_'"
        )));
    }
    if let Some(c) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(SfqError::InvalidName(format!(
            "`{name}` contains reserved character {c:?}"
        )));
    }
    Ok(())
}

struct InstrumentedUdf {
    name: String,
    inner: UdfRef,
    metrics: MetricsRegistry,
}

impl Udf for InstrumentedUdf {
    fn call(&self, ctx: &SharedContext, args: &[Value]) -> Result<Value> {
        let started = Instant::now();
        let out = self.inner.call(ctx, args);
        self.metrics
            .record_udf_call(&self.name, out.is_ok(), started.elapsed().as_secs_f64());
        out
    }

    fn accept(&self, arity: usize) -> bool {
        self.inner.accept(arity)
    }

    fn is_aggregation_parameter(&self, position: usize) -> bool {
        self.inner.is_aggregation_parameter(position)
    }

    fn arity_bounds(&self) -> Option<(usize, Option<usize>)> {
        self.inner.arity_bounds()
    }
}

fn global_registry() -> &'static Arc<UdfRegistry> {
    static REGISTRY: OnceLock<Arc<UdfRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let config = RegistryConfig::from_env().unwrap_or_else(|e| {
            warn!(error = %e, "invalid udf registry environment; using defaults");
            RegistryConfig::default()
        });
        Arc::new(UdfRegistry::new(config).with_metrics(global_metrics().clone()))
    })
}

/// Return the global UDF registry shared by default runtimes.
pub fn global_udf_registry() -> Arc<UdfRegistry> {
    Arc::clone(global_registry())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ProcessingContext;
    use crate::generic::{Variadic, must_convert_generic};
    use crate::udf::{Arity, FnUdf};

    fn ctx() -> SharedContext {
        ProcessingContext::new("registry-test").shared()
    }

    fn inc1() -> UdfRef {
        Arc::new(must_convert_generic(|x: i64| x + 1))
    }

    fn inc2() -> UdfRef {
        Arc::new(must_convert_generic(|x: i64, by: i64| x + by))
    }

    #[test]
    fn resolves_by_arity() {
        let reg = UdfRegistry::default();
        reg.register("inc", inc1()).unwrap();
        reg.register("inc", inc2()).unwrap();

        let one = reg.resolve("inc", 1).unwrap();
        assert_eq!(one.call(&ctx(), &[Value::Int(1)]).unwrap(), Value::Int(2));
        let two = reg.resolve("inc", 2).unwrap();
        assert_eq!(
            two.call(&ctx(), &[Value::Int(1), Value::Int(5)]).unwrap(),
            Value::Int(6)
        );

        let err = reg.resolve("inc", 3).err().expect("no arity 3");
        assert!(matches!(err, SfqError::NoMatchingUdf { arity: 3, .. }));
        assert!(matches!(
            reg.resolve("dec", 1).err(),
            Some(SfqError::NoMatchingUdf { .. })
        ));
    }

    #[test]
    fn rejects_overlapping_arities() {
        let reg = UdfRegistry::default();
        reg.register("concat", Arc::new(must_convert_generic(|xs: Variadic<String>| xs.concat())))
            .unwrap();
        let err = reg.register("concat", inc2()).expect_err("overlap at 2");
        assert!(matches!(err, SfqError::DuplicateRegistration(_)));
        assert!(err.to_string().contains("accepting 2"));
        assert_eq!(reg.candidates("concat").len(), 1);
    }

    #[test]
    fn first_match_policy_keeps_both_and_prefers_earliest() {
        let reg = UdfRegistry::new(RegistryConfig {
            overlap_policy: OverlapPolicy::FirstMatch,
            ..RegistryConfig::default()
        });
        reg.register("f", Arc::new(must_convert_generic(|_xs: Variadic<Value>| "variadic".to_string())))
            .unwrap();
        reg.register("f", Arc::new(must_convert_generic(|_x: Value| "unary".to_string())))
            .unwrap();
        let udf = reg.resolve("f", 1).unwrap();
        assert_eq!(udf.call(&ctx(), &[Value::Null]).unwrap(), Value::from("variadic"));
        assert_eq!(reg.candidates("f").len(), 2);
    }

    #[test]
    fn names_are_validated_and_case_folded() {
        let reg = UdfRegistry::default();
        for bad in ["", "1abc", "a-b", "a.b", "sum()", "x y"] {
            let err = reg.register(bad, inc1()).expect_err(bad);
            assert!(matches!(err, SfqError::InvalidName(_)), "{bad}");
        }
        reg.register("My_Inc", inc1()).unwrap();
        assert!(reg.contains("my_inc"));
        assert!(reg.resolve("MY_INC", 1).is_ok());
        assert_eq!(reg.names(), vec!["my_inc".to_string()]);
    }

    #[test]
    fn case_sensitive_names_when_configured() {
        let reg = UdfRegistry::new(RegistryConfig {
            case_insensitive_names: false,
            ..RegistryConfig::default()
        });
        reg.register("Inc", inc1()).unwrap();
        reg.register("inc", inc1()).unwrap();
        assert_eq!(reg.names(), vec!["Inc".to_string(), "inc".to_string()]);
    }

    #[test]
    fn freeze_blocks_registration_but_not_lookup() {
        let reg = UdfRegistry::default();
        reg.register("inc", inc1()).unwrap();
        reg.freeze();
        assert!(reg.is_frozen());
        let err = reg.register("inc", inc2()).expect_err("frozen");
        assert!(matches!(err, SfqError::RegistryFrozen(_)));
        assert!(reg.deregister("inc").is_err());
        assert!(reg.resolve("inc", 1).is_ok());
    }

    #[test]
    fn alias_shares_candidates() {
        let reg = UdfRegistry::default();
        reg.register("inc", inc1()).unwrap();
        reg.register("inc", inc2()).unwrap();
        reg.alias("inc", "increment").unwrap();
        assert_eq!(reg.candidates("increment").len(), 2);
        assert!(Arc::ptr_eq(
            &reg.resolve("inc", 2).unwrap(),
            &reg.resolve("increment", 2).unwrap()
        ));
        assert!(reg.alias("missing", "other").is_err());
        let err = reg.alias("inc", "increment").expect_err("alias twice");
        assert!(matches!(err, SfqError::DuplicateRegistration(_)));
    }

    #[test]
    fn snapshot_is_independent_and_unfrozen() {
        let reg = UdfRegistry::default();
        reg.register("inc", inc1()).unwrap();
        reg.freeze();
        let copy = reg.snapshot();
        assert!(!copy.is_frozen());
        copy.register("inc", inc2()).unwrap();
        assert!(copy.resolve("inc", 2).is_ok());
        assert!(reg.resolve("inc", 2).is_err());
    }

    #[test]
    fn deregister_removes_all_candidates() {
        let reg = UdfRegistry::default();
        reg.register("inc", inc1()).unwrap();
        assert_eq!(reg.len(), 1);
        assert!(reg.deregister("INC").unwrap());
        assert!(!reg.deregister("inc").unwrap());
        assert!(reg.is_empty());
    }

    #[test]
    fn hand_written_udfs_keep_aggregation_metadata() {
        let reg = UdfRegistry::new(RegistryConfig {
            record_call_metrics: true,
            ..RegistryConfig::default()
        });
        let avg = FnUdf::new(Arity::Exact(1), |_ctx, args| match &args[0] {
            Value::Array(xs) if !xs.is_empty() => {
                let mut sum = 0.0;
                for x in xs {
                    sum += sfq_types::coerce::to_float(x)?;
                }
                Ok(Value::Float(sum / xs.len() as f64))
            }
            _ => Ok(Value::Null),
        })
        .with_aggregation_params([0]);
        reg.register("my_avg", Arc::new(avg)).unwrap();

        let udf = reg.resolve("my_avg", 1).unwrap();
        assert!(udf.is_aggregation_parameter(0));
        let out = udf
            .call(&ctx(), &[Value::Array(vec![Value::Int(1), Value::Int(2)])])
            .unwrap();
        assert_eq!(out, Value::Float(1.5));

        let text = reg.metrics().render_prometheus();
        assert!(text.contains("sfq_udf_calls_total"));
        assert!(text.contains("my_avg"));
    }

    fn labelled(arity: Arity, label: &'static str) -> UdfRef {
        Arc::new(FnUdf::new(arity, move |_ctx, _args| Ok(Value::from(label))))
    }

    struct PanickyAccept;

    impl Udf for PanickyAccept {
        fn call(&self, _ctx: &SharedContext, _args: &[Value]) -> Result<Value> {
            Ok(Value::Null)
        }

        fn accept(&self, _arity: usize) -> bool {
            panic!("accept blew up");
        }

        fn is_aggregation_parameter(&self, _position: usize) -> bool {
            false
        }
    }

    #[test]
    fn rejects_overlap_beyond_probe_limit() {
        let reg = UdfRegistry::default();
        reg.register("f", labelled(Arity::AtLeast(100), "first")).unwrap();
        let err = reg
            .register("f", labelled(Arity::Exact(100), "second"))
            .expect_err("overlap at 100");
        assert!(matches!(err, SfqError::DuplicateRegistration(_)));
        assert!(err.to_string().contains("accepting 100"));

        let err = reg
            .register("f", labelled(Arity::Between(150, 1_000), "third"))
            .expect_err("overlap at 150");
        assert!(err.to_string().contains("accepting 150"));

        reg.register("f", labelled(Arity::Between(10, 99), "fourth")).unwrap();
        assert_eq!(reg.candidates("f").len(), 2);
        let udf = reg.resolve("f", 100).unwrap();
        let args = vec![Value::Null; 100];
        assert_eq!(udf.call(&ctx(), &args).unwrap(), Value::from("first"));
    }

    #[test]
    fn generic_udfs_report_exact_arity_ranges() {
        let wide = must_convert_generic(|_x: i64, _rest: Variadic<i64>| 0_i64);
        assert_eq!(wide.arity_bounds(), Some((1, None)));
        let fixed = must_convert_generic(|x: i64, y: i64| x + y);
        assert_eq!(fixed.arity_bounds(), Some((2, Some(2))));

        let reg = UdfRegistry::new(RegistryConfig {
            record_call_metrics: true,
            max_probe_arity: 0,
            ..RegistryConfig::default()
        });
        reg.register("g", Arc::new(wide)).unwrap();
        let err = reg.register("g", Arc::new(fixed)).expect_err("overlap at 2");
        assert!(err.to_string().contains("accepting 2"));
    }

    #[test]
    fn panicking_accept_does_not_break_lookups() {
        let reg = Arc::new(UdfRegistry::default());
        reg.register("ok", inc1()).unwrap();
        reg.register("boom", inc1()).unwrap();

        let writer = Arc::clone(&reg);
        let joined = std::thread::spawn(move || {
            let _ = writer.register("boom", Arc::new(PanickyAccept));
        })
        .join();
        assert!(joined.is_err());

        assert!(reg.resolve("ok", 1).is_ok());
        assert_eq!(reg.candidates("boom").len(), 1);
        reg.register("later", inc2()).unwrap();
        assert_eq!(reg.names(), vec!["boom", "later", "ok"]);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let reg = Arc::new(UdfRegistry::default());
        reg.register("inc", inc1()).unwrap();

        let writer = Arc::clone(&reg);
        let joined = std::thread::spawn(move || {
            let _state = writer.inner.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(joined.is_err());
        assert!(reg.inner.is_poisoned());

        assert!(reg.resolve("inc", 1).is_ok());
        assert_eq!(reg.len(), 1);
        reg.register("inc", inc2()).unwrap();
        reg.freeze();
        assert!(reg.is_frozen());
    }

    #[test]
    #[should_panic(expected = "failed to register udf")]
    fn must_register_panics_on_duplicate() {
        let reg = UdfRegistry::default();
        reg.must_register("inc", inc1());
        reg.must_register("inc", inc1());
    }
}
