use crate::metrics;
use crate::models::{ExecutionStatus, IncidentExecution};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use tracing::warn;
use uuid::Uuid;

/// Default number of executions retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Bounded execution history with first-in-first-out eviction
pub struct ExecutionHistory {
    inner: RwLock<HistoryInner>,
    capacity: usize,
}

struct HistoryInner {
    records: HashMap<Uuid, IncidentExecution>,

    /// Insertion order, oldest at the front
    order: VecDeque<Uuid>,
}

impl ExecutionHistory {
    /// Create a history holding at most `capacity` executions (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: RwLock::new(HistoryInner {
                records: HashMap::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
                order: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert a new execution, returning the ids evicted to make room
    pub fn insert(&self, execution: IncidentExecution) -> Vec<Uuid> {
        let mut inner = self.inner.write();
        let id = execution.id;

        if inner.records.insert(id, execution).is_none() {
            inner.order.push_back(id);
        }

        let mut evicted = Vec::new();
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                if let Some(record) = inner.records.remove(&oldest) {
                    if !record.is_terminal() {
                        warn!(
                            execution_id = %oldest,
                            status = %record.status,
                            "Evicting unfinished execution from history"
                        );
                    }
                }
                metrics::record_eviction();
                evicted.push(oldest);
            }
        }

        evicted
    }

    pub fn get(&self, id: &Uuid) -> Option<IncidentExecution> {
        self.inner.read().records.get(id).cloned()
    }

    /// Apply `f` to the stored record under the write lock.
    ///
    /// Returns `None` when the execution is unknown (never stored or evicted).
    pub fn update<F, R>(&self, id: &Uuid, f: F) -> Option<R>
    where
        F: FnOnce(&mut IncidentExecution) -> R,
    {
        let mut inner = self.inner.write();
        inner.records.get_mut(id).map(f)
    }

    /// All executions, oldest first
    pub fn list_all(&self) -> Vec<IncidentExecution> {
        self.collect(|_| true)
    }

    pub fn list_by_playbook(&self, playbook_id: &Uuid) -> Vec<IncidentExecution> {
        self.collect(|e| e.playbook_id == *playbook_id)
    }

    /// Executions currently running
    pub fn list_active(&self) -> Vec<IncidentExecution> {
        self.collect(|e| e.is_active())
    }

    pub fn count_by_status(&self, status: ExecutionStatus) -> usize {
        self.inner
            .read()
            .records
            .values()
            .filter(|e| e.status == status)
            .count()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn collect<F>(&self, filter: F) -> Vec<IncidentExecution>
    where
        F: Fn(&IncidentExecution) -> bool,
    {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id))
            .filter(|e| filter(*e))
            .cloned()
            .collect()
    }
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
