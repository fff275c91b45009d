use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use strum::{Display, EnumString};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};

/// Playbook defines an ordered remediation workflow for a class of incident
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncidentPlaybook {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub severity: PlaybookSeverity,
    pub category: PlaybookCategory,

    /// Steps to execute, run in ascending `order`
    pub steps: Vec<PlaybookStep>,

    /// Disabled playbooks cannot be executed
    pub enabled: bool,

    /// Advisory flag for external triggers; not enforced by the engine
    pub auto_execute: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IncidentPlaybook {
    /// Steps in execution order. Equal `order` values keep list position.
    pub fn ordered_steps(&self) -> Vec<&PlaybookStep> {
        let mut steps: Vec<&PlaybookStep> = self.steps.iter().collect();
        steps.sort_by_key(|step| step.order);
        steps
    }

    /// Check if this playbook should be offered for an incident class
    pub fn matches_incident(&self, category: PlaybookCategory, severity: PlaybookSeverity) -> bool {
        self.enabled && self.category == category && self.severity == severity
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct PlaybookStep {
    /// Unique within its playbook
    #[validate(length(min = 1, max = 128))]
    pub id: String,

    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Name resolved against the action registry
    #[validate(length(min = 1, max = 128))]
    pub action: String,

    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub order: i32,

    /// A failing required step aborts the execution
    #[serde(default = "default_required")]
    pub required: bool,

    /// Time budget in seconds
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl PlaybookStep {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        action: impl Into<String>,
        order: i32,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            action: action.into(),
            parameters: HashMap::new(),
            order,
            required: true,
            timeout: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

fn default_required() -> bool {
    true
}

fn default_enabled() -> bool {
    true
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PlaybookSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PlaybookCategory {
    Security,
    Performance,
    Availability,
    Data,
    Network,
}

/// Input for creating a playbook; id and timestamps are assigned by the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct PlaybookDefinition {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub severity: PlaybookSeverity,
    pub category: PlaybookCategory,

    #[validate(nested)]
    #[serde(default)]
    pub steps: Vec<PlaybookStep>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub auto_execute: bool,
}

impl PlaybookDefinition {
    pub fn new(
        name: impl Into<String>,
        category: PlaybookCategory,
        severity: PlaybookSeverity,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            severity,
            category,
            steps: Vec::new(),
            enabled: true,
            auto_execute: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_step(mut self, step: PlaybookStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn auto_execute(mut self) -> Self {
        self.auto_execute = true;
        self
    }

    /// Validate a definition coming from an untrusted source (files, callers)
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        validate_steps(&self.steps)
    }
}

/// Step ids must be unique and timeouts usable as durations
pub fn validate_steps(steps: &[PlaybookStep]) -> Result<()> {
    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.id.as_str()) {
            return Err(AppError::Validation(format!(
                "Duplicate step id '{}'",
                step.id
            )));
        }
        if let Some(timeout) = step.timeout {
            if !timeout.is_finite() || timeout < 0.0 {
                return Err(AppError::Validation(format!(
                    "Step '{}' has invalid timeout {}",
                    step.id, timeout
                )));
            }
        }
    }
    Ok(())
}

/// Partial update; unset fields keep their previous value
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaybookUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Option<PlaybookSeverity>,
    #[serde(default)]
    pub category: Option<PlaybookCategory>,
    #[serde(default)]
    pub steps: Option<Vec<PlaybookStep>>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub auto_execute: Option<bool>,
}

impl PlaybookUpdate {
    /// Merge the set fields into `playbook`. Never touches id or timestamps.
    pub fn apply_to(self, playbook: &mut IncidentPlaybook) {
        if let Some(name) = self.name {
            playbook.name = name;
        }
        if let Some(description) = self.description {
            playbook.description = description;
        }
        if let Some(severity) = self.severity {
            playbook.severity = severity;
        }
        if let Some(category) = self.category {
            playbook.category = category;
        }
        if let Some(steps) = self.steps {
            playbook.steps = steps;
        }
        if let Some(enabled) = self.enabled {
            playbook.enabled = enabled;
        }
        if let Some(auto_execute) = self.auto_execute {
            playbook.auto_execute = auto_execute;
        }
    }
}
