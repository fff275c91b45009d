use crate::config::EngineConfig;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::{
    ExecutionStats, ExecutionStatus, IncidentExecution, IncidentPlaybook, PlaybookCategory,
    PlaybookDefinition, PlaybookSeverity, PlaybookUpdate,
};
use crate::playbooks::{
    defaults, ActionRegistry, ExecutionHistory, ExecutionRunner, PlaybookCatalog, StepExecutor,
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};
use uuid::Uuid;

const STOPPED_MANUALLY: &str = "Execution stopped manually";
const ABORTED_ON_SHUTDOWN: &str = "Execution aborted: engine shutting down";
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Playbook service - the engine's public face. Owns the catalog, the
/// execution history and the background tasks running executions.
pub struct PlaybookService {
    /// Playbook definitions
    catalog: Arc<PlaybookCatalog>,

    /// Bounded execution history
    history: Arc<ExecutionHistory>,

    /// Drives executions on background tasks
    runner: Arc<ExecutionRunner>,

    action_registry: Arc<ActionRegistry>,

    /// In-flight execution tasks, pruned as they finish
    tasks: DashMap<Uuid, JoinHandle<()>>,
}

impl PlaybookService {
    /// Create a service with empty stores
    pub fn new(config: &EngineConfig, action_registry: ActionRegistry) -> Self {
        let action_registry = Arc::new(action_registry);
        let history = Arc::new(ExecutionHistory::new(config.history_capacity));
        let executor = Arc::new(StepExecutor::new(
            action_registry.clone(),
            config.unknown_action_policy,
        ));
        let runner = Arc::new(ExecutionRunner::new(
            executor,
            history.clone(),
            config.step_delay(),
        ));

        info!(
            history_capacity = history.capacity(),
            step_delay_ms = config.step_delay_ms,
            unknown_action_policy = ?config.unknown_action_policy,
            actions = action_registry.names().len(),
            "Playbook service initialized"
        );

        Self {
            catalog: Arc::new(PlaybookCatalog::new()),
            history,
            runner,
            action_registry,
            tasks: DashMap::new(),
        }
    }

    /// Create a service seeded with the built-in playbooks
    pub fn with_defaults(config: &EngineConfig, action_registry: ActionRegistry) -> Self {
        let service = Self::new(config, action_registry);
        service.seed_default_playbooks();
        service
    }

    /// Register the built-in playbooks
    pub fn seed_default_playbooks(&self) -> Vec<IncidentPlaybook> {
        let seeded: Vec<IncidentPlaybook> = defaults::default_playbooks()
            .into_iter()
            .map(|definition| self.catalog.create(definition))
            .collect();

        info!(count = seeded.len(), "Default playbooks seeded");
        seeded
    }

    /// Validate and register definitions, all or nothing
    pub fn register_definitions(
        &self,
        definitions: Vec<PlaybookDefinition>,
    ) -> Result<Vec<IncidentPlaybook>> {
        for definition in &definitions {
            definition.check().map_err(|e| {
                AppError::Validation(format!("Playbook '{}': {}", definition.name, e))
            })?;
        }

        Ok(definitions
            .into_iter()
            .map(|definition| self.catalog.create(definition))
            .collect())
    }

    // ==================== Playbooks ====================

    pub fn create_playbook(&self, definition: PlaybookDefinition) -> IncidentPlaybook {
        self.catalog.create(definition)
    }

    pub fn get_playbook(&self, id: &Uuid) -> Result<IncidentPlaybook> {
        self.catalog
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Playbook {} not found", id)))
    }

    pub fn list_playbooks(&self) -> Vec<IncidentPlaybook> {
        self.catalog.list()
    }

    pub fn list_playbooks_by_category(&self, category: PlaybookCategory) -> Vec<IncidentPlaybook> {
        self.catalog.list_by_category(category)
    }

    pub fn list_playbooks_by_severity(&self, severity: PlaybookSeverity) -> Vec<IncidentPlaybook> {
        self.catalog.list_by_severity(severity)
    }

    pub fn update_playbook(&self, id: &Uuid, update: PlaybookUpdate) -> Result<IncidentPlaybook> {
        self.catalog
            .update(id, update)
            .ok_or_else(|| AppError::NotFound(format!("Playbook {} not found", id)))
    }

    /// Delete a playbook. Executions already started keep running.
    pub fn delete_playbook(&self, id: &Uuid) -> bool {
        self.catalog.delete(id)
    }

    /// Playbooks an external trigger should start for an incident class
    pub fn find_auto_execute_playbooks(
        &self,
        category: PlaybookCategory,
        severity: PlaybookSeverity,
    ) -> Vec<IncidentPlaybook> {
        self.catalog.find_auto_execute(category, severity)
    }

    // ==================== Executions ====================

    /// Start a playbook against an incident.
    ///
    /// Returns the pending record immediately; the steps run on a background
    /// task and progress is observed through [`get_execution`](Self::get_execution).
    /// Must be called from within a tokio runtime.
    pub fn execute_playbook(
        &self,
        playbook_id: &Uuid,
        incident_id: impl Into<String>,
    ) -> Result<IncidentExecution> {
        let playbook = self.get_playbook(playbook_id)?;

        if !playbook.enabled {
            return Err(AppError::Disabled(format!(
                "Playbook {} is disabled",
                playbook_id
            )));
        }

        let runtime = Handle::try_current().map_err(|e| {
            AppError::Internal(format!("execute_playbook needs a tokio runtime: {}", e))
        })?;

        let execution = IncidentExecution::new(playbook.id, incident_id);
        let execution_id = execution.id;

        info!(
            execution_id = %execution_id,
            playbook_id = %playbook.id,
            playbook_name = %playbook.name,
            incident_id = %execution.incident_id,
            "Playbook execution started"
        );

        for evicted in self.history.insert(execution.clone()) {
            info!(execution_id = %evicted, "Execution evicted from history");
        }

        self.tasks.retain(|_, handle| !handle.is_finished());

        let handle = self.runner.spawn(&runtime, playbook, execution_id);
        self.tasks.insert(execution_id, handle);

        Ok(execution)
    }

    pub fn get_execution(&self, id: &Uuid) -> Result<IncidentExecution> {
        self.history
            .get(id)
            .ok_or_else(|| AppError::NotFound(format!("Execution {} not found", id)))
    }

    /// Every retained execution, oldest first
    pub fn list_executions(&self) -> Vec<IncidentExecution> {
        self.history.list_all()
    }

    pub fn list_executions_by_playbook(&self, playbook_id: &Uuid) -> Vec<IncidentExecution> {
        self.history.list_by_playbook(playbook_id)
    }

    /// Executions currently running
    pub fn list_active_executions(&self) -> Vec<IncidentExecution> {
        self.history.list_active()
    }

    /// Stop a pending or running execution before its next step.
    ///
    /// Unlike a running-only stop, a pending execution whose task has not
    /// started yet is also stopped, so a stop issued right after
    /// [`execute_playbook`](Self::execute_playbook) always takes effect.
    /// Returns false when the execution is unknown or already finished.
    pub fn stop_execution(&self, id: &Uuid) -> bool {
        match self.interrupt(id, STOPPED_MANUALLY) {
            Some(current_step) => {
                info!(execution_id = %id, current_step, "Execution stopped manually");
                true
            }
            None => false,
        }
    }

    /// Fail a pending or running execution from outside its task, returning
    /// its current step. Winning the transition out of running also settles
    /// the execution metrics, which the task then leaves alone.
    fn interrupt(&self, id: &Uuid, reason: &str) -> Option<usize> {
        let (was_running, playbook_id, current_step, duration) = self
            .history
            .update(id, |e| {
                let was_running = e.is_active();
                e.fail(reason)
                    .map(|_| (was_running, e.playbook_id, e.current_step, e.duration_secs()))
            })?
            .ok()?;

        if was_running {
            metrics::record_execution_finished(
                &playbook_id.to_string(),
                &ExecutionStatus::Failed.to_string(),
                duration,
            );
        }
        Some(current_step)
    }

    /// Poll until the execution reaches a terminal status
    pub async fn wait_for_execution(&self, id: &Uuid, timeout: Duration) -> Result<IncidentExecution> {
        let deadline = Instant::now() + timeout;

        loop {
            let execution = self.get_execution(id)?;
            if execution.is_terminal() {
                return Ok(execution);
            }

            if Instant::now() >= deadline {
                return Err(AppError::Timeout(format!(
                    "Execution {} still {} after {:?}",
                    id, execution.status, timeout
                )));
            }

            sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    pub fn get_statistics(&self) -> ExecutionStats {
        ExecutionStats {
            total_playbooks: self.catalog.len(),
            enabled_playbooks: self.catalog.enabled_count(),
            total_executions: self.history.len(),
            active_executions: self.history.count_by_status(ExecutionStatus::Running),
            successful_executions: self.history.count_by_status(ExecutionStatus::Completed),
            failed_executions: self.history.count_by_status(ExecutionStatus::Failed),
        }
    }

    /// Registered action names, sorted
    pub fn action_names(&self) -> Vec<String> {
        self.action_registry.names()
    }

    /// Abort in-flight executions and mark them failed. Returns how many were aborted.
    pub fn shutdown(&self) -> usize {
        let ids: Vec<Uuid> = self.tasks.iter().map(|entry| *entry.key()).collect();
        let mut aborted = 0;

        for id in ids {
            let Some((_, handle)) = self.tasks.remove(&id) else {
                continue;
            };
            handle.abort();

            if self.interrupt(&id, ABORTED_ON_SHUTDOWN).is_some() {
                warn!(execution_id = %id, "Execution aborted on shutdown");
                aborted += 1;
            }
        }

        info!(aborted, "Playbook service shut down");
        aborted
    }
}

impl Drop for PlaybookService {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlaybookStep;
    use crate::playbooks::create_default_registry;
    use serde_json::json;

    fn create_test_service() -> PlaybookService {
        let config = EngineConfig {
            step_delay_ms: 5,
            ..Default::default()
        };
        PlaybookService::new(&config, create_default_registry())
    }

    fn create_test_definition() -> PlaybookDefinition {
        PlaybookDefinition::new(
            "Test Playbook",
            PlaybookCategory::Availability,
            PlaybookSeverity::High,
        )
        .with_description("Test playbook")
        .with_step(PlaybookStep::new("a", "First", "noop", 1))
        .with_step(PlaybookStep::new("b", "Second", "noop", 2))
    }

    fn create_slow_definition() -> PlaybookDefinition {
        let mut definition =
            PlaybookDefinition::new("Slow", PlaybookCategory::Network, PlaybookSeverity::Medium);
        for i in 1..=5 {
            definition = definition.with_step(
                PlaybookStep::new(format!("s{}", i), format!("Step {}", i), "wait", i)
                    .with_parameter("duration_ms", json!(50)),
            );
        }
        definition
    }

    #[tokio::test]
    async fn test_create_and_get_playbook() {
        let service = create_test_service();
        let created = service.create_playbook(create_test_definition());

        let retrieved = service.get_playbook(&created.id).unwrap();
        assert_eq!(retrieved, created);
        assert_eq!(service.list_playbooks().len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_playbook() {
        let service = create_test_service();
        let err = service.get_playbook(&Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete_playbook() {
        let service = create_test_service();
        let created = service.create_playbook(create_test_definition());

        let updated = service
            .update_playbook(
                &created.id,
                PlaybookUpdate {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!updated.enabled);
        assert!(updated.updated_at > created.updated_at);

        assert!(service.delete_playbook(&created.id));
        assert!(!service.delete_playbook(&created.id));
        assert!(matches!(
            service.update_playbook(&created.id, PlaybookUpdate::default()),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_playbook_completes() {
        let service = create_test_service();
        let playbook = service.create_playbook(create_test_definition());

        let execution = service.execute_playbook(&playbook.id, "INC-100").unwrap();
        assert_eq!(execution.status, ExecutionStatus::Pending);
        assert_eq!(execution.current_step, 0);
        assert_eq!(execution.incident_id, "INC-100");

        let finished = service
            .wait_for_execution(&execution.id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(finished.status, ExecutionStatus::Completed);
        assert_eq!(finished.results.len(), 2);
        assert!(finished.errors.is_empty());
        assert!(finished.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_execute_refusals_create_nothing() {
        let service = create_test_service();

        let err = service.execute_playbook(&Uuid::new_v4(), "INC-1").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let disabled = service.create_playbook(create_test_definition().disabled());
        let err = service.execute_playbook(&disabled.id, "INC-1").unwrap_err();
        assert!(matches!(err, AppError::Disabled(_)));
        assert!(err.is_refusal());

        assert!(service.list_executions().is_empty());
    }

    #[test]
    fn test_execute_outside_runtime_is_an_error() {
        let service = create_test_service();
        let playbook = service.create_playbook(create_test_definition());

        let err = service.execute_playbook(&playbook.id, "INC-1").unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(service.list_executions().is_empty());
    }

    #[tokio::test]
    async fn test_stop_execution() {
        let service = create_test_service();
        let playbook = service.create_playbook(create_slow_definition());

        let execution = service.execute_playbook(&playbook.id, "INC-2").unwrap();
        assert!(service.stop_execution(&execution.id));
        assert!(!service.stop_execution(&execution.id));
        assert!(!service.stop_execution(&Uuid::new_v4()));

        let stopped = service
            .wait_for_execution(&execution.id, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(stopped.status, ExecutionStatus::Failed);
        assert!(stopped.errors.contains(&STOPPED_MANUALLY.to_string()));
        assert!(stopped.current_step <= playbook.steps.len());
    }

    #[tokio::test]
    async fn test_wait_for_execution_times_out() {
        let service = create_test_service();
        let playbook = service.create_playbook(create_slow_definition());
        let execution = service.execute_playbook(&playbook.id, "INC-3").unwrap();

        let err = service
            .wait_for_execution(&execution.id, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_statistics() {
        let service = create_test_service();
        let playbook = service.create_playbook(create_test_definition());
        service.create_playbook(create_test_definition().disabled());

        let execution = service.execute_playbook(&playbook.id, "INC-4").unwrap();
        service
            .wait_for_execution(&execution.id, Duration::from_secs(5))
            .await
            .unwrap();

        let stats = service.get_statistics();
        assert_eq!(stats.total_playbooks, 2);
        assert_eq!(stats.enabled_playbooks, 1);
        assert_eq!(stats.total_executions, 1);
        assert_eq!(stats.total_executions, service.list_executions().len());
        assert_eq!(stats.active_executions, 0);
        assert_eq!(stats.successful_executions, 1);
        assert_eq!(stats.failed_executions, 0);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_in_flight() {
        let service = create_test_service();
        let playbook = service.create_playbook(create_slow_definition());
        let execution = service.execute_playbook(&playbook.id, "INC-5").unwrap();

        assert_eq!(service.shutdown(), 1);

        let aborted = service.get_execution(&execution.id).unwrap();
        assert_eq!(aborted.status, ExecutionStatus::Failed);
        assert_eq!(aborted.errors, vec![ABORTED_ON_SHUTDOWN.to_string()]);
        assert!(service.list_active_executions().is_empty());
    }

    fn failed_total(playbook_id: &Uuid) -> f64 {
        metrics::PLAYBOOK_EXECUTIONS_TOTAL
            .with_label_values(&[&playbook_id.to_string(), "failed"])
            .get()
    }

    async fn wait_until_running(service: &PlaybookService, id: &Uuid) {
        for _ in 0..500 {
            if service.get_execution(id).unwrap().is_active() {
                return;
            }
            sleep(Duration::from_millis(2)).await;
        }
        panic!("execution {} never started running", id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_while_running_is_counted_once() {
        let service = create_test_service();
        let playbook = service.create_playbook(create_slow_definition());
        let execution = service.execute_playbook(&playbook.id, "INC-6").unwrap();

        wait_until_running(&service, &execution.id).await;
        assert!(service.stop_execution(&execution.id));

        // let the task notice the stop and wind down
        sleep(Duration::from_millis(150)).await;
        assert_eq!(failed_total(&playbook.id), 1.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_while_running_is_counted_once() {
        let service = create_test_service();
        let playbook = service.create_playbook(create_slow_definition());
        let execution = service.execute_playbook(&playbook.id, "INC-8").unwrap();

        wait_until_running(&service, &execution.id).await;
        assert_eq!(service.shutdown(), 1);

        sleep(Duration::from_millis(150)).await;
        assert_eq!(failed_total(&playbook.id), 1.0);
        assert_eq!(
            service.get_execution(&execution.id).unwrap().errors,
            vec![ABORTED_ON_SHUTDOWN.to_string()]
        );
    }

    #[tokio::test]
    async fn test_with_defaults_seeds_playbooks() {
        let config = EngineConfig::default();
        let service = PlaybookService::with_defaults(&config, create_default_registry());

        let names: Vec<String> = service
            .list_playbooks()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(
            names,
            vec!["Security Breach Response", "Performance Degradation Response"]
        );

        let auto = service
            .find_auto_execute_playbooks(PlaybookCategory::Security, PlaybookSeverity::Critical);
        assert_eq!(auto.len(), 1);
    }

    #[tokio::test]
    async fn test_register_definitions_is_all_or_nothing() {
        let service = create_test_service();
        let bad = PlaybookDefinition::new("Bad", PlaybookCategory::Data, PlaybookSeverity::Low)
            .with_step(PlaybookStep::new("dup", "One", "noop", 1))
            .with_step(PlaybookStep::new("dup", "Two", "noop", 2));

        let err = service
            .register_definitions(vec![create_test_definition(), bad])
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(service.list_playbooks().is_empty());

        let registered = service
            .register_definitions(vec![create_test_definition()])
            .unwrap();
        assert_eq!(registered.len(), 1);
    }
}
