//! Shared helpers for the integration tests: scripted actions and
//! Prometheus exposition parsing.

#![allow(dead_code)]

use async_trait::async_trait;
use incident_playbook_engine::{
    config::EngineConfig,
    error::{AppError, Result},
    playbooks::{create_default_registry, ActionContext, ActionRegistry, ActionResult, StepAction},
};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Succeeds and counts how often it ran
#[derive(Default)]
pub struct CountingAction {
    calls: AtomicUsize,
}

impl CountingAction {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepAction for CountingAction {
    async fn execute(
        &self,
        _parameters: &HashMap<String, JsonValue>,
        context: &ActionContext,
    ) -> Result<ActionResult> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ActionResult::success(json!({
            "call": call,
            "step_id": context.get_variable("step_id"),
        })))
    }
}

/// Always errors
pub struct FailingAction;

#[async_trait]
impl StepAction for FailingAction {
    async fn execute(
        &self,
        _parameters: &HashMap<String, JsonValue>,
        _context: &ActionContext,
    ) -> Result<ActionResult> {
        Err(AppError::Internal("remote host refused connection".to_string()))
    }
}

/// Panics inside the action body
pub struct PanickingAction;

#[async_trait]
impl StepAction for PanickingAction {
    async fn execute(
        &self,
        _parameters: &HashMap<String, JsonValue>,
        _context: &ActionContext,
    ) -> Result<ActionResult> {
        panic!("action state corrupted");
    }
}

/// Sleeps for a fixed time before succeeding
pub struct SlowAction(pub Duration);

#[async_trait]
impl StepAction for SlowAction {
    async fn execute(
        &self,
        _parameters: &HashMap<String, JsonValue>,
        _context: &ActionContext,
    ) -> Result<ActionResult> {
        tokio::time::sleep(self.0).await;
        Ok(ActionResult::success(json!({ "slept_ms": self.0.as_millis() as u64 })))
    }
}

/// Handles on the scripted actions registered in [`test_registry`]
pub struct TestActions {
    pub counter: Arc<CountingAction>,
}

/// Built-in actions plus `count`, `fail`, `panic` and `slow` (200ms)
pub fn test_registry() -> (ActionRegistry, TestActions) {
    let counter = Arc::new(CountingAction::default());

    let mut registry = create_default_registry();
    registry.register("count", counter.clone());
    registry.register("fail", Arc::new(FailingAction));
    registry.register("panic", Arc::new(PanickingAction));
    registry.register("slow", Arc::new(SlowAction(Duration::from_millis(200))));

    (registry, TestActions { counter })
}

/// Engine settings with a short inter-step delay
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        step_delay_ms: 10,
        seed_default_playbooks: false,
        ..Default::default()
    }
}

/// Value of the sample `name{labels}` in Prometheus text output.
///
/// `labels` must list every label of the sample, in exposition order.
pub fn sample_value(output: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    let selector = if labels.is_empty() {
        name.to_string()
    } else {
        let rendered: Vec<String> = labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect();
        format!("{}{{{}}}", name, rendered.join(","))
    };

    output
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let (series, value) = line.rsplit_once(' ')?;
            (series == selector).then(|| value.parse::<f64>().ok()).flatten()
        })
}

/// Check if a metric family is declared in Prometheus output
pub fn metric_exists(output: &str, metric_name: &str) -> bool {
    output
        .lines()
        .any(|line| line.starts_with(&format!("# TYPE {} ", metric_name)))
}
