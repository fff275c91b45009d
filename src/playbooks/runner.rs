use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{ExecutionStatus, IncidentPlaybook};
use crate::playbooks::{ActionContext, ExecutionHistory, StepExecutor};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};
use uuid::Uuid;

/// How the step loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopOutcome {
    /// Every step was attempted without a required failure
    Completed,
    /// A required step failed; the record is already marked failed
    Aborted,
    /// Someone else ended the execution and settled its metrics
    Interrupted,
    /// The record left the history mid-run
    Evicted,
}

/// Drives one execution record through its playbook's steps
pub struct ExecutionRunner {
    executor: Arc<StepExecutor>,
    history: Arc<ExecutionHistory>,
    step_delay: Duration,
}

impl ExecutionRunner {
    pub fn new(executor: Arc<StepExecutor>, history: Arc<ExecutionHistory>, step_delay: Duration) -> Self {
        Self {
            executor,
            history,
            step_delay,
        }
    }

    /// Run the execution on a task of the given runtime
    pub fn spawn(
        self: &Arc<Self>,
        runtime: &Handle,
        playbook: IncidentPlaybook,
        execution_id: Uuid,
    ) -> JoinHandle<()> {
        let runner = Arc::clone(self);
        runtime.spawn(async move { runner.run(playbook, execution_id).await })
    }

    /// Run a pending execution to a terminal status. Never returns an error:
    /// every failure is recorded on the execution itself.
    pub async fn run(&self, playbook: IncidentPlaybook, execution_id: Uuid) {
        match self
            .history
            .update(&execution_id, |e| e.transition(ExecutionStatus::Running))
        {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                info!(execution_id = %execution_id, reason = %e, "Execution ended before it started");
                return;
            }
            None => {
                warn!(execution_id = %execution_id, "Execution missing from history, not starting");
                return;
            }
        }

        metrics::record_execution_started();
        info!(
            execution_id = %execution_id,
            playbook_id = %playbook.id,
            steps = playbook.steps.len(),
            "Playbook execution running"
        );

        // Whoever moves the record out of running settles its metrics
        let settled = match self.drive(&playbook, execution_id).await {
            Ok(LoopOutcome::Completed) => {
                self.finish(&execution_id, ExecutionStatus::Completed, None)
            }
            Ok(LoopOutcome::Aborted) | Ok(LoopOutcome::Evicted) => true,
            Ok(LoopOutcome::Interrupted) => false,
            Err(failure) => {
                self.finish(&execution_id, ExecutionStatus::Failed, Some(failure.to_string()))
            }
        };

        if settled {
            self.report(&playbook, &execution_id);
        }
    }

    /// Run the step loop, turning loop errors and action panics into
    /// [`AppError::ExecutionFailure`]
    async fn drive(&self, playbook: &IncidentPlaybook, execution_id: Uuid) -> Result<LoopOutcome> {
        match AssertUnwindSafe(self.run_steps(playbook, execution_id))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => Err(AppError::ExecutionFailure(e.to_string())),
            Err(panic) => Err(AppError::ExecutionFailure(panic_message(panic.as_ref()))),
        }
    }

    async fn run_steps(&self, playbook: &IncidentPlaybook, execution_id: Uuid) -> Result<LoopOutcome> {
        let incident_id = self
            .history
            .get(&execution_id)
            .map(|e| e.incident_id)
            .ok_or_else(|| AppError::NotFound(format!("Execution {} not found", execution_id)))?;
        let context = ActionContext::new(execution_id, playbook.id, &playbook.name, &incident_id);

        let steps = playbook.ordered_steps();
        let total = steps.len();

        for (index, step) in steps.into_iter().enumerate() {
            let position = index + 1;

            // A stop between steps shows up as a status other than running
            let proceed = self.history.update(&execution_id, |e| {
                if e.status != ExecutionStatus::Running {
                    return false;
                }
                e.current_step = position;
                true
            });
            match proceed {
                Some(true) => {}
                Some(false) => {
                    info!(
                        execution_id = %execution_id,
                        step = position,
                        "Execution no longer running, skipping remaining steps"
                    );
                    return Ok(LoopOutcome::Interrupted);
                }
                None => {
                    warn!(execution_id = %execution_id, "Execution evicted from history mid-run");
                    return Ok(LoopOutcome::Evicted);
                }
            }

            info!(
                execution_id = %execution_id,
                step_id = %step.id,
                step = position,
                total,
                required = step.required,
                "Starting step"
            );

            match self.executor.execute(step, &context).await {
                Ok(output) => {
                    self.history.update(&execution_id, |e| {
                        if e.status == ExecutionStatus::Running {
                            e.results.insert(step.id.clone(), output);
                        }
                    });
                }
                Err(failure) => {
                    let message = format!("Step {} failed: {}", step.name, failure);
                    let aborted = self.history.update(&execution_id, |e| -> Result<bool> {
                        if e.status != ExecutionStatus::Running {
                            return Ok(false);
                        }
                        if step.required {
                            e.fail(message)?;
                            Ok(true)
                        } else {
                            e.errors.push(message);
                            Ok(false)
                        }
                    });

                    match aborted {
                        Some(Ok(true)) => {
                            warn!(
                                execution_id = %execution_id,
                                step_id = %step.id,
                                error = %failure,
                                "Required step failed, aborting execution"
                            );
                            return Ok(LoopOutcome::Aborted);
                        }
                        Some(Ok(false)) => {}
                        Some(Err(e)) => return Err(e),
                        None => return Ok(LoopOutcome::Evicted),
                    }
                }
            }

            if position < total && !self.step_delay.is_zero() {
                sleep(self.step_delay).await;
            }
        }

        Ok(LoopOutcome::Completed)
    }

    /// Move a running execution to a terminal status, optionally recording why.
    /// Returns false when another caller already ended it.
    fn finish(&self, execution_id: &Uuid, status: ExecutionStatus, message: Option<String>) -> bool {
        let result = self.history.update(execution_id, |e| {
            e.transition(status)?;
            if let Some(message) = message {
                e.errors.push(message);
            }
            Ok::<(), AppError>(())
        });

        match result {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                info!(execution_id = %execution_id, reason = %e, "Execution already finished");
                false
            }
            None => {
                warn!(execution_id = %execution_id, "Execution evicted before it finished");
                true
            }
        }
    }

    fn report(&self, playbook: &IncidentPlaybook, execution_id: &Uuid) {
        let playbook_label = playbook.id.to_string();

        let Some(record) = self.history.get(execution_id) else {
            metrics::record_execution_finished(&playbook_label, "evicted", None);
            return;
        };

        metrics::record_execution_finished(
            &playbook_label,
            &record.status.to_string(),
            record.duration_secs(),
        );

        match record.status {
            ExecutionStatus::Completed => info!(
                execution_id = %execution_id,
                playbook_id = %playbook.id,
                incident_id = %record.incident_id,
                results = record.results.len(),
                errors = record.errors.len(),
                duration_secs = ?record.duration_secs(),
                "Playbook execution completed"
            ),
            _ => error!(
                execution_id = %execution_id,
                playbook_id = %playbook.id,
                incident_id = %record.incident_id,
                status = %record.status,
                current_step = record.current_step,
                errors = ?record.errors,
                "Playbook execution failed"
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "action panicked".to_string()
    }
}
