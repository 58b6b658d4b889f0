//! C1: the dependency predicate.

use std::collections::HashSet;

use sched_core::TaskId;
use sched_transport::DepSpecWire;

/// A dependency predicate: a set of task IDs plus flags selecting which
/// outcomes satisfy it. Used for both `after` (temporal) and `follow`
/// (locational) constraints — see spec.md §4.1's truth table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DepSpec {
    ids: HashSet<TaskId>,
    all: bool,
    success: bool,
    failure: bool,
}

impl DepSpec {
    pub fn new(ids: HashSet<TaskId>, all: bool, success: bool, failure: bool) -> Self {
        Self {
            ids,
            all,
            success,
            failure,
        }
    }

    /// The sentinel empty dependency: trivially met, never unreachable,
    /// regardless of flags. Used to replace an `after` that has already
    /// reduced to nothing, and to mark a dispatched task's `after` as no
    /// longer relevant.
    pub fn met() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &HashSet<TaskId> {
        &self.ids
    }

    pub fn all(&self) -> bool {
        self.all
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn nonempty(&self) -> bool {
        !self.ids.is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.ids.contains(id)
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            ids: self.ids.union(&other.ids).cloned().collect(),
            all: self.all,
            success: self.success,
            failure: self.failure,
        }
    }

    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            ids: self.ids.intersection(&other.ids).cloned().collect(),
            all: self.all,
            success: self.success,
            failure: self.failure,
        }
    }

    pub fn difference(&self, other: &HashSet<TaskId>) -> Self {
        Self {
            ids: self.ids.difference(other).cloned().collect(),
            all: self.all,
            success: self.success,
            failure: self.failure,
        }
    }

    /// Removes IDs that already match this spec's polarity from the
    /// `all`-flavored predicate: already-completed IDs when `success`,
    /// already-failed IDs when `failure`. Used by submission handling
    /// (spec.md §4.5.1 step 4) to reduce `after` before checking it.
    pub fn reduce_all(&self, completed: &HashSet<TaskId>, failed: &HashSet<TaskId>) -> Self {
        if !self.all {
            return self.clone();
        }
        let remaining: HashSet<TaskId> = self
            .ids
            .iter()
            .filter(|id| {
                let already_matched = match (self.success, self.failure) {
                    (true, false) => completed.contains(*id),
                    (false, true) => failed.contains(*id),
                    (true, true) => completed.contains(*id) || failed.contains(*id),
                    (false, false) => completed.contains(*id),
                };
                !already_matched
            })
            .cloned()
            .collect();
        Self {
            ids: remaining,
            all: self.all,
            success: self.success,
            failure: self.failure,
        }
    }

    /// True iff the completed/failed sets already satisfy this predicate
    /// (spec.md §4.1 truth table). The empty predicate is always met.
    pub fn check(&self, completed: &HashSet<TaskId>, failed: &HashSet<TaskId>) -> bool {
        if self.ids.is_empty() {
            return true;
        }
        let d = &self.ids;
        match (self.success, self.failure, self.all) {
            (true, false, false) => !d.is_disjoint(completed),
            (false, true, false) => !d.is_disjoint(failed),
            (true, true, false) => !d.is_disjoint(completed) || !d.is_disjoint(failed),
            (true, false, true) => d.is_subset(completed),
            (false, true, true) => d.is_subset(failed),
            (true, true, true) => d.iter().all(|id| completed.contains(id) || failed.contains(id)),
            (false, false, all) => {
                if all {
                    d.is_subset(completed)
                } else {
                    !d.is_disjoint(completed)
                }
            }
        }
    }

    /// True iff no future completion can ever make [`check`] true.
    pub fn unreachable(&self, completed: &HashSet<TaskId>, failed: &HashSet<TaskId>) -> bool {
        if self.ids.is_empty() {
            return false;
        }
        let d = &self.ids;
        match (self.success, self.failure, self.all) {
            (true, false, false) => d.is_subset(failed),
            (false, true, false) => d.is_subset(completed),
            (true, true, false) => false,
            (true, false, true) => !d.is_disjoint(failed),
            (false, true, true) => !d.is_disjoint(completed),
            (true, true, true) => false,
            (false, false, all) => {
                if all {
                    !d.is_disjoint(failed)
                } else {
                    d.is_subset(failed)
                }
            }
        }
    }

    pub fn to_wire(&self) -> DepSpecWire {
        DepSpecWire {
            ids: self.ids.iter().cloned().collect(),
            all: self.all,
            success: self.success,
            failure: self.failure,
        }
    }
}

impl From<DepSpecWire> for DepSpec {
    fn from(wire: DepSpecWire) -> Self {
        Self {
            ids: wire.ids.into_iter().collect(),
            all: wire.all,
            success: wire.success,
            failure: wire.failure,
        }
    }
}
