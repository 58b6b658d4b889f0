use crate::ids::{EngineId, TaskId};

/// The scheduler's closed error taxonomy (spec.md §7).
///
/// Every variant is surfaced to the originating client as a reply with
/// `status = "error"` and mirrored to the monitor stream with tag
/// `outtask`; none of them propagate as Rust panics.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// Self-referencing dependency, or a dependency naming an unknown
    /// `TaskId`. Fatal at submission time.
    #[error("task {task_id} has an invalid dependency: {reason}")]
    InvalidDependency { task_id: TaskId, reason: String },

    /// The dependency is provably unreachable: a required success has
    /// already failed (or vice versa), or a `follow` would require the
    /// task to run on two engines at once.
    #[error("task {task_id}'s dependency can never be satisfied")]
    ImpossibleDependency { task_id: TaskId },

    /// `timeout_deadline` elapsed while the task was still waiting in
    /// `depending`.
    #[error("task {task_id} timed out waiting on its dependencies")]
    TaskTimeout { task_id: TaskId },

    /// Synthetic failure manufactured for a task that was in flight on an
    /// engine that deregistered and never replied within the grace
    /// window.
    #[error("engine {engine_id} died while running task {task_id}")]
    EngineDied { task_id: TaskId, engine_id: EngineId },
}

impl SchedulerError {
    /// The `TaskId` this error terminates, for callers that need to
    /// correlate the error back to task-table bookkeeping.
    pub fn task_id(&self) -> &TaskId {
        match self {
            SchedulerError::InvalidDependency { task_id, .. }
            | SchedulerError::ImpossibleDependency { task_id }
            | SchedulerError::TaskTimeout { task_id }
            | SchedulerError::EngineDied { task_id, .. } => task_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_accessor_covers_every_variant() {
        let t = TaskId::new("t1");
        assert_eq!(
            SchedulerError::InvalidDependency {
                task_id: t.clone(),
                reason: "self-reference".into()
            }
            .task_id(),
            &t
        );
        assert_eq!(
            SchedulerError::TaskTimeout { task_id: t.clone() }.task_id(),
            &t
        );
    }
}
