use std::sync::{Arc, OnceLock};

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    udf_registrations: CounterVec,
    udf_resolutions: CounterVec,
    udf_calls: CounterVec,
    udf_call_seconds: HistogramVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    /// `outcome` is `accepted` or `rejected`.
    pub fn record_registration(&self, outcome: &str) {
        self.inner
            .udf_registrations
            .with_label_values(&[outcome])
            .inc();
    }

    /// `outcome` is `hit` or `miss`.
    pub fn record_resolution(&self, outcome: &str) {
        self.inner
            .udf_resolutions
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_udf_call(&self, udf: &str, ok: bool, secs: f64) {
        let outcome = if ok { "ok" } else { "error" };
        self.inner
            .udf_calls
            .with_label_values(&[udf, outcome])
            .inc();
        self.inner
            .udf_call_seconds
            .with_label_values(&[udf])
            .observe(secs.max(0.0));
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let udf_registrations = counter_vec(
            &registry,
            "sfq_udf_registrations_total",
            "UDF registration attempts",
            &["outcome"],
        );
        let udf_resolutions = counter_vec(
            &registry,
            "sfq_udf_resolutions_total",
            "UDF name+arity resolutions",
            &["outcome"],
        );
        let udf_calls = counter_vec(
            &registry,
            "sfq_udf_calls_total",
            "UDF invocations",
            &["udf", "outcome"],
        );
        let udf_call_seconds = histogram_vec(
            &registry,
            "sfq_udf_call_seconds",
            "Time spent inside each UDF call",
            &["udf"],
        );

        Self {
            registry,
            udf_registrations,
            udf_resolutions,
            udf_calls,
            udf_call_seconds,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

static GLOBAL_METRICS: OnceLock<MetricsRegistry> = OnceLock::new();

pub fn global_metrics() -> &'static MetricsRegistry {
    GLOBAL_METRICS.get_or_init(MetricsRegistry::new)
}
