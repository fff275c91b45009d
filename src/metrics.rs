//! Prometheus metrics for the playbook engine.
//!
//! Metrics live in a process-wide registry. Recording into a metric never
//! fails the engine; registration happens once via [`init_metrics`].
//!
//! # Example
//! ```no_run
//! use incident_playbook_engine::metrics;
//!
//! metrics::init_metrics().ok();
//! println!("{}", metrics::gather_metrics());
//! ```

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry};
use std::time::Duration;

const NAMESPACE: &str = "incident_playbook_engine";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    /// Total number of finished playbook executions
    ///
    /// Labels: playbook_id, status
    pub static ref PLAYBOOK_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("playbook_executions_total", "Total number of finished playbook executions")
            .namespace(NAMESPACE),
        &["playbook_id", "status"]
    ).expect("Failed to create PLAYBOOK_EXECUTIONS_TOTAL metric");

    /// Playbook execution duration in seconds
    ///
    /// Labels: playbook_id
    pub static ref PLAYBOOK_EXECUTION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "playbook_execution_duration_seconds",
            "Playbook execution duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["playbook_id"]
    ).expect("Failed to create PLAYBOOK_EXECUTION_DURATION_SECONDS metric");

    /// Number of running playbook executions
    pub static ref PLAYBOOK_EXECUTIONS_ACTIVE: Gauge = Gauge::with_opts(
        Opts::new("playbook_executions_active", "Number of running playbook executions")
            .namespace(NAMESPACE)
    ).expect("Failed to create PLAYBOOK_EXECUTIONS_ACTIVE metric");

    /// Total number of executed steps
    ///
    /// Labels: action, outcome (success, failure, timeout)
    pub static ref PLAYBOOK_STEPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("playbook_steps_total", "Total number of executed playbook steps")
            .namespace(NAMESPACE),
        &["action", "outcome"]
    ).expect("Failed to create PLAYBOOK_STEPS_TOTAL metric");

    /// Step duration in seconds
    ///
    /// Labels: action
    pub static ref PLAYBOOK_STEP_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "playbook_step_duration_seconds",
            "Playbook step duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        &["action"]
    ).expect("Failed to create PLAYBOOK_STEP_DURATION_SECONDS metric");

    /// Executions dropped from the bounded history
    pub static ref PLAYBOOK_HISTORY_EVICTIONS_TOTAL: Counter = Counter::with_opts(
        Opts::new("playbook_history_evictions_total", "Executions evicted from history")
            .namespace(NAMESPACE)
    ).expect("Failed to create PLAYBOOK_HISTORY_EVICTIONS_TOTAL metric");
}

/// Register all metrics with the global registry
///
/// Call once at startup; a second call returns `AlreadyReg`.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(PLAYBOOK_EXECUTIONS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(PLAYBOOK_EXECUTION_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(PLAYBOOK_EXECUTIONS_ACTIVE.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(PLAYBOOK_STEPS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(PLAYBOOK_STEP_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(PLAYBOOK_HISTORY_EVICTIONS_TOTAL.clone()))?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Generate Prometheus text format metrics
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

pub(crate) fn record_step(action: &str, outcome: &str, elapsed: Duration) {
    PLAYBOOK_STEPS_TOTAL
        .with_label_values(&[action, outcome])
        .inc();
    PLAYBOOK_STEP_DURATION_SECONDS
        .with_label_values(&[action])
        .observe(elapsed.as_secs_f64());
}

pub(crate) fn record_execution_started() {
    PLAYBOOK_EXECUTIONS_ACTIVE.inc();
}

pub(crate) fn record_execution_finished(playbook_id: &str, status: &str, duration_secs: Option<f64>) {
    PLAYBOOK_EXECUTIONS_ACTIVE.dec();
    PLAYBOOK_EXECUTIONS_TOTAL
        .with_label_values(&[playbook_id, status])
        .inc();
    if let Some(secs) = duration_secs {
        PLAYBOOK_EXECUTION_DURATION_SECONDS
            .with_label_values(&[playbook_id])
            .observe(secs);
    }
}

pub(crate) fn record_eviction() {
    PLAYBOOK_HISTORY_EVICTIONS_TOTAL.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        // The global registry only accepts each metric once per process
        let result = init_metrics();
        assert!(result.is_ok() || matches!(result, Err(prometheus::Error::AlreadyReg)));
    }

    #[test]
    fn test_step_metrics() {
        let before = PLAYBOOK_STEPS_TOTAL
            .with_label_values(&["metrics_test_action", "success"])
            .get();
        record_step("metrics_test_action", "success", Duration::from_millis(5));
        let after = PLAYBOOK_STEPS_TOTAL
            .with_label_values(&["metrics_test_action", "success"])
            .get();
        assert_eq!(after, before + 1.0);
    }

    #[test]
    fn test_gather_metrics_renders_text() {
        let _ = init_metrics();
        record_eviction();
        let output = gather_metrics();
        assert!(output.contains("incident_playbook_engine_playbook_history_evictions_total"));
    }
}
