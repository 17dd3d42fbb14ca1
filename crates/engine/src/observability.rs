//! Prometheus metrics for the reasoning engine
//!
//! Registers against the default registry so the serving layer can expose
//! everything through a single `/metrics` gather.

use prometheus::{register_histogram, register_int_gauge, Histogram, IntGauge};
use std::sync::OnceLock;

/// Histogram buckets for build/evaluation latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    build_latency_seconds: Histogram,
    evaluation_latency_seconds: Histogram,
    reasoning_ticks: IntGauge,
    reasoning_tick_errors: IntGauge,
    buffer_snapshots: IntGauge,
    failing_checks: IntGauge,
    loop_running: IntGauge,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            build_latency_seconds: register_histogram!(
                "topolens_build_latency_seconds",
                "Time spent building a topology graph from provider listings",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register build_latency_seconds"),

            evaluation_latency_seconds: register_histogram!(
                "topolens_evaluation_latency_seconds",
                "Time spent evaluating the diagnostic check battery",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register evaluation_latency_seconds"),

            reasoning_ticks: register_int_gauge!(
                "topolens_reasoning_ticks_total",
                "Total number of completed reasoning ticks"
            )
            .expect("Failed to register reasoning_ticks"),

            reasoning_tick_errors: register_int_gauge!(
                "topolens_reasoning_tick_errors_total",
                "Total number of reasoning ticks that failed"
            )
            .expect("Failed to register reasoning_tick_errors"),

            buffer_snapshots: register_int_gauge!(
                "topolens_buffer_snapshots",
                "Number of snapshots currently held in the context buffer"
            )
            .expect("Failed to register buffer_snapshots"),

            failing_checks: register_int_gauge!(
                "topolens_failing_checks",
                "Failed or errored checks in the most recent diagnostic report"
            )
            .expect("Failed to register failing_checks"),

            loop_running: register_int_gauge!(
                "topolens_loop_running",
                "Whether the reasoning loop is currently running (1) or idle (0)"
            )
            .expect("Failed to register loop_running"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance. Multiple clones
/// share the same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_build_latency(&self, duration_secs: f64) {
        self.inner().build_latency_seconds.observe(duration_secs);
    }

    pub fn observe_evaluation_latency(&self, duration_secs: f64) {
        self.inner().evaluation_latency_seconds.observe(duration_secs);
    }

    pub fn inc_ticks(&self) {
        self.inner().reasoning_ticks.inc();
    }

    pub fn inc_tick_errors(&self) {
        self.inner().reasoning_tick_errors.inc();
    }

    pub fn set_buffer_snapshots(&self, count: i64) {
        self.inner().buffer_snapshots.set(count);
    }

    pub fn set_failing_checks(&self, count: i64) {
        self.inner().failing_checks.set(count);
    }

    pub fn set_loop_running(&self, running: bool) {
        self.inner().loop_running.set(i64::from(running));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_metrics_creation() {
        // Prometheus registration is global, so a single handle is exercised
        // end to end rather than re-registering per test.
        let metrics = EngineMetrics::new();

        metrics.observe_build_latency(0.05);
        metrics.observe_evaluation_latency(0.002);
        metrics.inc_ticks();
        metrics.inc_tick_errors();
        metrics.set_buffer_snapshots(3);
        metrics.set_failing_checks(1);
        metrics.set_loop_running(true);
        metrics.set_loop_running(false);
    }
}
