//! C5: the dependency graph — a reverse index from an unfinished
//! dependency ID to the set of tasks waiting on it.

use std::collections::{HashMap, HashSet};

use sched_core::TaskId;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    waiters: HashMap<TaskId, HashSet<TaskId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `waiter` as blocked on `dep_id`. No-op if `dep_id` is
    /// already finished — callers are expected to have checked
    /// `all_done` first (spec.md §3 invariant 4).
    pub fn add_waiter(&mut self, dep_id: TaskId, waiter: TaskId) {
        self.waiters.entry(dep_id).or_default().insert(waiter);
    }

    /// Removes and returns every task waiting on `dep_id` — called when
    /// `dep_id` finishes, making its waiters candidates for re-evaluation.
    pub fn pop(&mut self, dep_id: &TaskId) -> HashSet<TaskId> {
        self.waiters.remove(dep_id).unwrap_or_default()
    }

    /// Removes `waiter` from `dep_id`'s waiter set, if present, dropping
    /// the entry entirely once it's empty. Used to scrub a task out of
    /// every dependency it was registered against once it's been placed
    /// or has failed.
    pub fn remove_waiter(&mut self, dep_id: &TaskId, waiter: &TaskId) {
        if let Some(set) = self.waiters.get_mut(dep_id) {
            set.remove(waiter);
            if set.is_empty() {
                self.waiters.remove(dep_id);
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &TaskId> {
        self.waiters.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    pub fn waiters_of(&self, dep_id: &TaskId) -> Option<&HashSet<TaskId>> {
        self.waiters.get(dep_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_removes_entry_and_returns_waiters() {
        let mut g = DependencyGraph::new();
        g.add_waiter(TaskId::new("t1"), TaskId::new("t2"));
        g.add_waiter(TaskId::new("t1"), TaskId::new("t3"));

        let waiters = g.pop(&TaskId::new("t1"));
        assert_eq!(waiters.len(), 2);
        assert!(g.waiters_of(&TaskId::new("t1")).is_none());
    }

    #[test]
    fn pop_on_unknown_dep_returns_empty() {
        let mut g = DependencyGraph::new();
        assert!(g.pop(&TaskId::new("nope")).is_empty());
    }

    #[test]
    fn remove_waiter_drops_entry_when_empty() {
        let mut g = DependencyGraph::new();
        g.add_waiter(TaskId::new("t1"), TaskId::new("t2"));
        g.remove_waiter(&TaskId::new("t1"), &TaskId::new("t2"));
        assert!(g.is_empty());
    }
}
