use crate::config::UnknownActionPolicy;
use crate::error::StepFailure;
use crate::metrics;
use crate::models::PlaybookStep;
use crate::playbooks::{ActionContext, ActionRegistry};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{info, warn};

/// Step executor - runs one playbook step against the action registry
pub struct StepExecutor {
    action_registry: Arc<ActionRegistry>,
    unknown_action_policy: UnknownActionPolicy,
}

impl StepExecutor {
    /// Create a new step executor
    pub fn new(action_registry: Arc<ActionRegistry>, unknown_action_policy: UnknownActionPolicy) -> Self {
        Self {
            action_registry,
            unknown_action_policy,
        }
    }

    /// Execute a single step, bounded by its timeout when one is set
    pub async fn execute(
        &self,
        step: &PlaybookStep,
        context: &ActionContext,
    ) -> Result<JsonValue, StepFailure> {
        let started = Instant::now();
        let outcome = self.execute_inner(step, context).await;

        let label = match &outcome {
            Ok(_) => "success",
            Err(StepFailure::Timeout(_)) => "timeout",
            Err(_) => "failure",
        };
        metrics::record_step(&step.action, label, started.elapsed());

        match &outcome {
            Ok(_) => info!(
                step_id = %step.id,
                action = %step.action,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Step executed"
            ),
            Err(failure) => warn!(
                step_id = %step.id,
                action = %step.action,
                error = %failure,
                "Step failed"
            ),
        }

        outcome
    }

    async fn execute_inner(
        &self,
        step: &PlaybookStep,
        context: &ActionContext,
    ) -> Result<JsonValue, StepFailure> {
        let budget = step_budget(step)?;

        let action = match self.action_registry.resolve(&step.action) {
            Some(action) => action,
            None => {
                return match self.unknown_action_policy {
                    UnknownActionPolicy::Fail => Err(StepFailure::UnknownAction(step.action.clone())),
                    UnknownActionPolicy::Fallback => {
                        warn!(
                            step_id = %step.id,
                            action = %step.action,
                            "No action registered, using fallback result"
                        );
                        Ok(json!({
                            "status": "unknown_action",
                            "action": step.action,
                        }))
                    }
                };
            }
        };

        let step_context = context.for_step(&step.id);
        let parameters = step_context.substitute_parameters(&step.parameters);

        info!(
            step_id = %step.id,
            action = %step.action,
            timeout_secs = ?step.timeout,
            "Executing step"
        );

        let call = action.execute(&parameters, &step_context);
        let result = match budget {
            Some(limit) => match timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => return Err(StepFailure::Timeout(limit.as_secs_f64())),
            },
            None => call.await,
        };

        match result {
            Ok(result) if result.success => Ok(result.output),
            Ok(result) => Err(StepFailure::ActionFailed(
                result.error.unwrap_or_else(|| "Action failed".to_string()),
            )),
            Err(e) => Err(StepFailure::ActionFailed(e.to_string())),
        }
    }
}

/// Parse the step timeout (seconds) into a duration. A positive timeout too
/// large for a `Duration` leaves the step unbounded.
fn step_budget(step: &PlaybookStep) -> Result<Option<Duration>, StepFailure> {
    match step.timeout {
        None => Ok(None),
        Some(secs) => match Duration::try_from_secs_f64(secs) {
            Ok(limit) => Ok(Some(limit)),
            Err(_) if secs > 0.0 => Ok(None),
            Err(_) => Err(StepFailure::InvalidTimeout(secs)),
        },
    }
}
