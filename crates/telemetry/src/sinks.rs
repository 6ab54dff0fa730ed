// Path: crates/telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling core logic from the backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink` implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns a static reference to the configured error metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn error_metrics() -> &'static dyn ErrorMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured RPC/broker metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn rpc_metrics() -> &'static dyn RpcMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured key-storage engine metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn keystore_metrics() -> &'static dyn KeyStoreMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

// --- Trait Definitions ---

/// A sink for metrics related to the RPC broker and wire framing layer.
pub trait RpcMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the gauge for the current number of connected clients.
    fn inc_connections_active(&self);
    /// Decrements the gauge for the current number of connected clients.
    fn dec_connections_active(&self);
    /// Observes the latency of a dispatched request, labeled by `(basic_task, detail_task)`.
    fn observe_request_duration(&self, basic_task: u32, detail_task: u32, duration_secs: f64);
    /// Increments a counter for total dispatched requests, labeled by task and wire error code.
    fn inc_requests_total(&self, basic_task: u32, detail_task: u32, errc: &'static str);
}
impl RpcMetricsSink for NopSink {
    fn inc_connections_active(&self) {}
    fn dec_connections_active(&self) {}
    fn observe_request_duration(&self, _basic_task: u32, _detail_task: u32, _duration_secs: f64) {}
    fn inc_requests_total(&self, _basic_task: u32, _detail_task: u32, _errc: &'static str) {}
}

/// A sink for metrics related to the key-storage engine.
pub trait KeyStoreMetricsSink: Send + Sync + std::fmt::Debug {
    /// Sets the gauge for the current number of occupied slots.
    fn set_slots_occupied(&self, count: f64);
    /// Increments a counter for committed transactions.
    fn inc_transactions_committed(&self);
    /// Increments a counter for rolled-back transactions.
    fn inc_transactions_rolled_back(&self);
    /// Observes the latency of a transaction commit (shadow write + fsync + rename).
    fn observe_commit_duration(&self, duration_secs: f64);
}
impl KeyStoreMetricsSink for NopSink {
    fn set_slots_occupied(&self, _count: f64) {}
    fn inc_transactions_committed(&self) {}
    fn inc_transactions_rolled_back(&self) {}
    fn observe_commit_duration(&self, _duration_secs: f64) {}
}

/// A sink for recording structured error metrics, categorized by component and wire code.
pub trait ErrorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for a specific error, categorized by its component and `SecurityErrc` code.
    fn inc_error(&self, component: &'static str, errc: &'static str);
}
impl ErrorMetricsSink for NopSink {
    fn inc_error(&self, _component: &'static str, _errc: &'static str) {}
}

/// A unified sink that implements all domain-specific traits, providing a single
/// point of implementation for metrics backends like Prometheus.
pub trait MetricsSink: RpcMetricsSink + KeyStoreMetricsSink + ErrorMetricsSink {}

// Blanket implementation to allow any type that implements all sub-traits
// to be used as a `MetricsSink`.
impl<T> MetricsSink for T where T: RpcMetricsSink + KeyStoreMetricsSink + ErrorMetricsSink {}
