// Path: crates/telemetry/src/prometheus.rs
//! A concrete implementation of the metrics sinks using the Prometheus crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge, register_histogram, register_histogram_vec,
    register_int_counter, register_int_counter_vec, Gauge, Histogram, HistogramVec, IntCounter,
    IntCounterVec,
};

// --- Metric Statics ---
// We use OnceCell to hold the metric collectors. They will be initialized
// exactly once by the `install` function.

static CONNECTIONS_ACTIVE: OnceCell<Gauge> = OnceCell::new();
static REQUEST_DURATION_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static REQUESTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static SLOTS_OCCUPIED: OnceCell<Gauge> = OnceCell::new();
static TRANSACTIONS_COMMITTED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static TRANSACTIONS_ROLLED_BACK_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static COMMIT_DURATION_SECONDS: OnceCell<Histogram> = OnceCell::new();
static ERRORS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Helper macro to reduce boilerplate for getting a metric from OnceCell.
/// This will panic if `install()` has not been called, which is intentional
/// as it indicates a critical application setup error.
macro_rules! get_metric {
    ($metric:ident) => {
        $metric
            .get()
            .expect("Prometheus sink not initialized. Call telemetry::prometheus::install() first.")
    };
}

impl RpcMetricsSink for PrometheusSink {
    fn inc_connections_active(&self) {
        get_metric!(CONNECTIONS_ACTIVE).inc();
    }
    fn dec_connections_active(&self) {
        get_metric!(CONNECTIONS_ACTIVE).dec();
    }
    fn observe_request_duration(&self, basic_task: u32, detail_task: u32, duration_secs: f64) {
        get_metric!(REQUEST_DURATION_SECONDS)
            .with_label_values(&[&basic_task.to_string(), &detail_task.to_string()])
            .observe(duration_secs);
    }
    fn inc_requests_total(&self, basic_task: u32, detail_task: u32, errc: &'static str) {
        get_metric!(REQUESTS_TOTAL)
            .with_label_values(&[&basic_task.to_string(), &detail_task.to_string(), errc])
            .inc();
    }
}

impl KeyStoreMetricsSink for PrometheusSink {
    fn set_slots_occupied(&self, count: f64) {
        get_metric!(SLOTS_OCCUPIED).set(count);
    }
    fn inc_transactions_committed(&self) {
        get_metric!(TRANSACTIONS_COMMITTED_TOTAL).inc();
    }
    fn inc_transactions_rolled_back(&self) {
        get_metric!(TRANSACTIONS_ROLLED_BACK_TOTAL).inc();
    }
    fn observe_commit_duration(&self, duration_secs: f64) {
        get_metric!(COMMIT_DURATION_SECONDS).observe(duration_secs);
    }
}

impl ErrorMetricsSink for PrometheusSink {
    fn inc_error(&self, component: &'static str, errc: &'static str) {
        get_metric!(ERRORS_TOTAL)
            .with_label_values(&[component, errc])
            .inc();
    }
}

/// Initializes all Prometheus metrics collectors and returns a static reference to the sink.
/// This function must be called only once at application startup.
#[allow(clippy::expect_used)]
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    CONNECTIONS_ACTIVE
        .set(register_gauge!(
            "crypto_daemon_connections_active",
            "Current number of connected IPC clients."
        )?)
        .expect("static already initialized");
    REQUEST_DURATION_SECONDS
        .set(register_histogram_vec!(
            "crypto_daemon_request_duration_seconds",
            "Latency of dispatched RPC requests.",
            &["basic_task", "detail_task"],
            exponential_buckets(0.0001, 2.0, 16)?
        )?)
        .expect("static already initialized");
    REQUESTS_TOTAL
        .set(register_int_counter_vec!(
            "crypto_daemon_requests_total",
            "Total dispatched RPC requests, by task and resulting wire error code.",
            &["basic_task", "detail_task", "errc"]
        )?)
        .expect("static already initialized");
    SLOTS_OCCUPIED
        .set(register_gauge!(
            "crypto_daemon_slots_occupied",
            "Current number of occupied key-storage slots."
        )?)
        .expect("static already initialized");
    TRANSACTIONS_COMMITTED_TOTAL
        .set(register_int_counter!(
            "crypto_daemon_transactions_committed_total",
            "Total key-storage transactions committed."
        )?)
        .expect("static already initialized");
    TRANSACTIONS_ROLLED_BACK_TOTAL
        .set(register_int_counter!(
            "crypto_daemon_transactions_rolled_back_total",
            "Total key-storage transactions rolled back."
        )?)
        .expect("static already initialized");
    COMMIT_DURATION_SECONDS
        .set(register_histogram!(
            "crypto_daemon_commit_duration_seconds",
            "Latency of a transaction commit (shadow write + fsync + rename).",
            exponential_buckets(0.0005, 2.0, 14)?
        )?)
        .expect("static already initialized");
    ERRORS_TOTAL
        .set(register_int_counter_vec!(
            "crypto_daemon_errors_total",
            "Total errors, categorized by component and SecurityErrc wire code.",
            &["component", "errc"]
        )?)
        .expect("static already initialized");

    static SINK: PrometheusSink = PrometheusSink;
    Ok(&SINK)
}
