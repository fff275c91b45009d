use crate::models::{
    IncidentPlaybook, PlaybookCategory, PlaybookDefinition, PlaybookSeverity, PlaybookUpdate,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

/// In-memory store of playbook definitions
pub struct PlaybookCatalog {
    playbooks: DashMap<Uuid, IncidentPlaybook>,

    /// Last timestamp handed out; every new stamp is strictly later
    clock: Mutex<DateTime<Utc>>,
}

impl PlaybookCatalog {
    pub fn new() -> Self {
        Self {
            playbooks: DashMap::new(),
            clock: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Wall-clock time, nudged forward so no two stamps are equal
    fn tick(&self) -> DateTime<Utc> {
        let mut last = self.clock.lock();
        let now = Utc::now();
        let next = if now > *last {
            now
        } else {
            *last + Duration::microseconds(1)
        };
        *last = next;
        next
    }

    /// Store a new playbook under a fresh id
    pub fn create(&self, definition: PlaybookDefinition) -> IncidentPlaybook {
        let now = self.tick();
        let playbook = IncidentPlaybook {
            id: Uuid::new_v4(),
            name: definition.name,
            description: definition.description,
            severity: definition.severity,
            category: definition.category,
            steps: definition.steps,
            enabled: definition.enabled,
            auto_execute: definition.auto_execute,
            created_at: now,
            updated_at: now,
        };

        info!(
            playbook_id = %playbook.id,
            playbook_name = %playbook.name,
            category = %playbook.category,
            severity = %playbook.severity,
            steps = playbook.steps.len(),
            "Playbook created"
        );

        self.playbooks.insert(playbook.id, playbook.clone());
        playbook
    }

    pub fn get(&self, id: &Uuid) -> Option<IncidentPlaybook> {
        self.playbooks.get(id).map(|p| p.clone())
    }

    /// All playbooks, oldest first
    pub fn list(&self) -> Vec<IncidentPlaybook> {
        self.collect_sorted(|_| true)
    }

    pub fn list_by_category(&self, category: PlaybookCategory) -> Vec<IncidentPlaybook> {
        self.collect_sorted(|p| p.category == category)
    }

    pub fn list_by_severity(&self, severity: PlaybookSeverity) -> Vec<IncidentPlaybook> {
        self.collect_sorted(|p| p.severity == severity)
    }

    /// Enabled playbooks flagged for automatic execution on this incident class
    pub fn find_auto_execute(
        &self,
        category: PlaybookCategory,
        severity: PlaybookSeverity,
    ) -> Vec<IncidentPlaybook> {
        self.collect_sorted(|p| p.auto_execute && p.matches_incident(category, severity))
    }

    fn collect_sorted<F>(&self, filter: F) -> Vec<IncidentPlaybook>
    where
        F: Fn(&IncidentPlaybook) -> bool,
    {
        let mut playbooks: Vec<IncidentPlaybook> = self
            .playbooks
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        playbooks.sort_by_key(|p| p.created_at);
        playbooks
    }

    /// Merge `update` into the stored playbook and bump `updated_at`
    pub fn update(&self, id: &Uuid, update: PlaybookUpdate) -> Option<IncidentPlaybook> {
        let mut entry = self.playbooks.get_mut(id)?;
        update.apply_to(entry.value_mut());
        entry.updated_at = self.tick();

        info!(
            playbook_id = %id,
            enabled = entry.enabled,
            updated_at = %entry.updated_at,
            "Playbook updated"
        );

        Some(entry.value().clone())
    }

    /// Remove a playbook; past executions keep only its id
    pub fn delete(&self, id: &Uuid) -> bool {
        let removed = self.playbooks.remove(id).is_some();
        if removed {
            info!(playbook_id = %id, "Playbook deleted");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.playbooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playbooks.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.playbooks.iter().filter(|e| e.value().enabled).count()
    }
}

impl Default for PlaybookCatalog {
    fn default() -> Self {
        Self::new()
    }
}
