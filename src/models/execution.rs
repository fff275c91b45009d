use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::Display;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// One run of a playbook against one incident
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncidentExecution {
    pub id: Uuid,
    pub playbook_id: Uuid,

    /// Free-form identifier of the triggering incident
    pub incident_id: String,

    pub status: ExecutionStatus,

    /// 1-based position of the step in progress or last attempted; 0 before the first step
    pub current_step: usize,

    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Step id -> action output, only for steps that succeeded
    pub results: HashMap<String, serde_json::Value>,

    /// Failure messages in the order they happened
    pub errors: Vec<String>,
}

impl IncidentExecution {
    /// Create a pending execution record
    pub fn new(playbook_id: Uuid, incident_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            playbook_id,
            incident_id: incident_id.into(),
            status: ExecutionStatus::Pending,
            current_step: 0,
            started_at: Utc::now(),
            completed_at: None,
            results: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Move to `next`, stamping `completed_at` on terminal states
    pub fn transition(&mut self, next: ExecutionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidStateTransition(format!(
                "execution {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }

        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Terminal failure with a synthetic error message
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(ExecutionStatus::Failed)?;
        self.errors.push(message.into());
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    /// Allowed moves; terminal states never change again
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        matches!(
            (self, next),
            (ExecutionStatus::Pending, ExecutionStatus::Running)
                | (ExecutionStatus::Pending, ExecutionStatus::Failed)
                | (ExecutionStatus::Running, ExecutionStatus::Completed)
                | (ExecutionStatus::Running, ExecutionStatus::Failed)
        )
    }
}

/// Counts derived from the catalog and history on demand
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionStats {
    pub total_playbooks: usize,
    pub enabled_playbooks: usize,
    pub total_executions: usize,
    pub active_executions: usize,
    pub successful_executions: usize,
    pub failed_executions: usize,
}
