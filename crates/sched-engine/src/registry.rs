//! C3: the engine registry.

use std::collections::{HashMap, HashSet};

use sched_core::{EngineId, TaskId};

use crate::task::TaskRecord;

/// Outcome of [`EngineRegistry::unregister`]: whether submissions should
/// stop (no engines left) and which tasks were in flight on the engine
/// that just left, which the caller must schedule `handle_stranded` for
/// after the grace window (spec.md §4.3).
pub struct UnregisterOutcome {
    pub engines_remaining: bool,
    pub had_pending: bool,
}

/// Ordered list of registered engines with a parallel load vector, plus
/// the per-engine bookkeeping (`pending`/`completed`/`failed`) spec.md
/// §3 attaches to each engine identity.
///
/// `targets` and `loads` are mutated only as a pair — see invariant 5 in
/// spec.md §3 — and kept LRU-ordered: newest registration at the head,
/// most recently dispatched-to engine rotated to the tail.
#[derive(Debug, Default)]
pub struct EngineRegistry {
    targets: Vec<EngineId>,
    loads: Vec<u32>,
    pending: HashMap<EngineId, HashMap<TaskId, TaskRecord>>,
    completed: HashMap<EngineId, HashSet<TaskId>>,
    failed: HashMap<EngineId, HashSet<TaskId>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn targets(&self) -> &[EngineId] {
        &self.targets
    }

    pub fn loads(&self) -> &[u32] {
        &self.loads
    }

    pub fn index_of(&self, id: &EngineId) -> Option<usize> {
        self.targets.iter().position(|t| t == id)
    }

    pub fn is_registered(&self, id: &EngineId) -> bool {
        self.index_of(id).is_some()
    }

    /// Inserts `id` at the head of `targets`/`loads`, with load 0, and
    /// creates empty bookkeeping entries. Returns `true` if this was the
    /// first engine registered (the caller must resume accepting client
    /// submissions and trigger a full graph re-scan).
    pub fn register(&mut self, id: EngineId) -> bool {
        let was_empty = self.is_empty();
        self.targets.insert(0, id.clone());
        self.loads.insert(0, 0);
        self.pending.insert(id.clone(), HashMap::new());
        self.completed.insert(id.clone(), HashSet::new());
        self.failed.insert(id, HashSet::new());
        debug_assert_eq!(self.targets.len(), self.loads.len());
        was_empty
    }

    /// Removes `id` from `targets`/`loads`. Does not touch `pending` —
    /// the caller is expected to drain it via [`Self::handle_stranded`]
    /// (after a grace delay) or, if it was already empty, call
    /// [`Self::drop_history`] immediately.
    pub fn unregister(&mut self, id: &EngineId) -> UnregisterOutcome {
        if let Some(idx) = self.index_of(id) {
            self.targets.remove(idx);
            self.loads.remove(idx);
        }
        let had_pending = self
            .pending
            .get(id)
            .map(|p| !p.is_empty())
            .unwrap_or(false);
        UnregisterOutcome {
            engines_remaining: !self.is_empty(),
            had_pending,
        }
    }

    /// Drops an unregistered engine's `completed`/`failed` mirrors.
    /// `pending` is dropped separately once `handle_stranded` (or a
    /// plain drain, when it was already empty) has consumed it.
    pub fn drop_history(&mut self, id: &EngineId) {
        self.completed.remove(id);
        self.failed.remove(id);
        self.pending.remove(id);
    }

    /// Pops every entry still in `pending[id]`, for the caller to
    /// synthesize `EngineDied` failures for. Tolerates entries having
    /// already been drained by a late real reply — this only returns
    /// what's left at call time.
    pub fn handle_stranded(&mut self, id: &EngineId) -> Vec<(TaskId, TaskRecord)> {
        let drained = self
            .pending
            .get_mut(id)
            .map(|p| p.drain().collect())
            .unwrap_or_default();
        self.drop_history(id);
        drained
    }

    /// `loads[idx] += 1`, then rotates `idx` to the tail of both
    /// parallel vectors (LRU: most recently dispatched-to goes last).
    /// Returns the engine's new index.
    pub fn add_job(&mut self, idx: usize) -> usize {
        self.loads[idx] += 1;
        let id = self.targets.remove(idx);
        let load = self.loads.remove(idx);
        self.targets.push(id);
        self.loads.push(load);
        self.targets.len() - 1
    }

    /// `loads[idx] -= 1`. No rotation — finishing work doesn't change
    /// recency.
    pub fn finish_job(&mut self, idx: usize) {
        self.loads[idx] = self.loads[idx].saturating_sub(1);
    }

    pub fn completed(&self, id: &EngineId) -> Option<&HashSet<TaskId>> {
        self.completed.get(id)
    }

    pub fn failed(&self, id: &EngineId) -> Option<&HashSet<TaskId>> {
        self.failed.get(id)
    }

    pub fn pending_of(&self, id: &EngineId) -> Option<&HashMap<TaskId, TaskRecord>> {
        self.pending.get(id)
    }

    pub fn insert_pending(&mut self, id: &EngineId, task_id: TaskId, record: TaskRecord) {
        self.pending.entry(id.clone()).or_default().insert(task_id, record);
    }

    pub fn remove_pending(&mut self, id: &EngineId, task_id: &TaskId) -> Option<TaskRecord> {
        self.pending.get_mut(id).and_then(|p| p.remove(task_id))
    }

    pub fn mark_completed(&mut self, id: &EngineId, task_id: TaskId) {
        self.completed.entry(id.clone()).or_default().insert(task_id);
    }

    pub fn mark_failed(&mut self, id: &EngineId, task_id: TaskId) {
        self.failed.entry(id.clone()).or_default().insert(task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dep::DepSpec;
    use sched_transport::Envelope;

    fn engine(name: &str) -> EngineId {
        EngineId::from(name)
    }

    fn record() -> TaskRecord {
        TaskRecord::new(
            Envelope::new(vec![], sched_transport::Header::submission("t1"), vec![]),
            HashSet::new(),
            DepSpec::met(),
            DepSpec::met(),
            None,
            0,
        )
    }

    #[test]
    fn register_inserts_at_head_with_zero_load() {
        let mut reg = EngineRegistry::new();
        assert!(reg.register(engine("e1")));
        assert!(!reg.register(engine("e2")));
        assert_eq!(reg.targets(), &[engine("e2"), engine("e1")]);
        assert_eq!(reg.loads(), &[0, 0]);
    }

    #[test]
    fn add_job_increments_load_and_rotates_to_tail() {
        let mut reg = EngineRegistry::new();
        reg.register(engine("e1"));
        reg.register(engine("e2"));
        // targets = [e2, e1]
        let new_idx = reg.add_job(1); // bump e1
        assert_eq!(new_idx, 1);
        assert_eq!(reg.targets(), &[engine("e2"), engine("e1")]);
        assert_eq!(reg.loads(), &[0, 1]);

        let new_idx = reg.add_job(0); // bump e2, which should move to tail
        assert_eq!(new_idx, 1);
        assert_eq!(reg.targets(), &[engine("e1"), engine("e2")]);
        assert_eq!(reg.loads(), &[1, 1]);
    }

    #[test]
    fn finish_job_decrements_without_rotating() {
        let mut reg = EngineRegistry::new();
        reg.register(engine("e1"));
        reg.add_job(0);
        reg.finish_job(0);
        assert_eq!(reg.loads(), &[0]);
        assert_eq!(reg.targets(), &[engine("e1")]);
    }

    #[test]
    fn unregister_reports_pending_and_removes_from_parallel_vecs() {
        let mut reg = EngineRegistry::new();
        reg.register(engine("e1"));
        reg.insert_pending(&engine("e1"), TaskId::new("t1"), record());

        let outcome = reg.unregister(&engine("e1"));
        assert!(!outcome.engines_remaining);
        assert!(outcome.had_pending);
        assert!(reg.targets().is_empty());
        assert!(reg.loads().is_empty());
    }

    #[test]
    fn handle_stranded_drains_pending_and_drops_history() {
        let mut reg = EngineRegistry::new();
        reg.register(engine("e1"));
        reg.insert_pending(&engine("e1"), TaskId::new("t1"), record());
        reg.mark_completed(&engine("e1"), TaskId::new("t0"));
        reg.unregister(&engine("e1"));

        let stranded = reg.handle_stranded(&engine("e1"));
        assert_eq!(stranded.len(), 1);
        assert_eq!(stranded[0].0, TaskId::new("t1"));
        assert!(reg.completed(&engine("e1")).is_none());
        assert!(reg.pending_of(&engine("e1")).is_none());
    }
}
