//! C4: per-task state.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use sched_core::{EngineId, TaskId};
use sched_transport::Envelope;

use crate::dep::DepSpec;

/// Everything the scheduler needs to remember about one submitted task
/// while it's either waiting in `depending` or dispatched to an engine's
/// `pending` map (spec.md §3's `TaskRecord`).
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub envelope: Envelope,
    pub targets: HashSet<EngineId>,
    pub after: DepSpec,
    pub follow: DepSpec,
    pub timeout_deadline: Option<Instant>,
    pub retries_remaining: u32,
}

impl TaskRecord {
    pub fn new(
        envelope: Envelope,
        targets: HashSet<EngineId>,
        after: DepSpec,
        follow: DepSpec,
        timeout_deadline: Option<Instant>,
        retries_remaining: u32,
    ) -> Self {
        Self {
            envelope,
            targets,
            after,
            follow,
            timeout_deadline,
            retries_remaining,
        }
    }

    pub fn msg_id(&self) -> &TaskId {
        &self.envelope.header.msg_id
    }
}

/// The task table: `depending` (waiting on temporal dependencies),
/// `blacklist` (engines that rejected each task), `destinations` (where
/// each finished task last ran — retained even after the engine leaves,
/// so `follow` can still reference it), and the global completed/failed
/// mirrors used by [`crate::dep::DepSpec`] evaluation.
#[derive(Debug, Default)]
pub struct TaskTable {
    all_ids: HashSet<TaskId>,
    all_completed: HashSet<TaskId>,
    all_failed: HashSet<TaskId>,
    depending: HashMap<TaskId, TaskRecord>,
    blacklist: HashMap<TaskId, HashSet<EngineId>>,
    destinations: HashMap<TaskId, EngineId>,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all_ids(&self) -> &HashSet<TaskId> {
        &self.all_ids
    }

    pub fn all_completed(&self) -> &HashSet<TaskId> {
        &self.all_completed
    }

    pub fn all_failed(&self) -> &HashSet<TaskId> {
        &self.all_failed
    }

    pub fn is_known(&self, id: &TaskId) -> bool {
        self.all_ids.contains(id)
    }

    pub fn is_done(&self, id: &TaskId) -> bool {
        self.all_completed.contains(id) || self.all_failed.contains(id)
    }

    pub fn observe(&mut self, id: TaskId) {
        self.all_ids.insert(id);
    }

    pub fn record_success(&mut self, id: TaskId) {
        self.all_completed.insert(id);
    }

    pub fn record_failure(&mut self, id: TaskId) {
        self.all_failed.insert(id);
    }

    pub fn depending(&self) -> &HashMap<TaskId, TaskRecord> {
        &self.depending
    }

    pub fn save_unmet(&mut self, id: TaskId, record: TaskRecord) {
        self.depending.insert(id, record);
    }

    pub fn remove_depending(&mut self, id: &TaskId) -> Option<TaskRecord> {
        self.depending.remove(id)
    }

    pub fn blacklist_of(&self, id: &TaskId) -> Option<&HashSet<EngineId>> {
        self.blacklist.get(id)
    }

    pub fn blacklist_engine(&mut self, id: &TaskId, engine: EngineId) {
        self.blacklist.entry(id.clone()).or_default().insert(engine);
    }

    pub fn clear_blacklist(&mut self, id: &TaskId) {
        self.blacklist.remove(id);
    }

    pub fn set_destination(&mut self, id: TaskId, engine: EngineId) {
        self.destinations.insert(id, engine);
    }

    pub fn destination_of(&self, id: &TaskId) -> Option<&EngineId> {
        self.destinations.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_done_reflects_either_global_set() {
        let mut t = TaskTable::new();
        t.observe(TaskId::new("t1"));
        assert!(!t.is_done(&TaskId::new("t1")));
        t.record_failure(TaskId::new("t1"));
        assert!(t.is_done(&TaskId::new("t1")));
    }

    #[test]
    fn destinations_survive_depending_removal() {
        let mut t = TaskTable::new();
        t.set_destination(TaskId::new("t1"), EngineId::from("e1"));
        t.remove_depending(&TaskId::new("t1"));
        assert_eq!(t.destination_of(&TaskId::new("t1")), Some(&EngineId::from("e1")));
    }

    #[test]
    fn blacklist_accumulates_per_task() {
        let mut t = TaskTable::new();
        t.blacklist_engine(&TaskId::new("t1"), EngineId::from("e1"));
        t.blacklist_engine(&TaskId::new("t1"), EngineId::from("e2"));
        let bl = t.blacklist_of(&TaskId::new("t1")).unwrap();
        assert_eq!(bl.len(), 2);
    }
}
