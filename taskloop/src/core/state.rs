//! Task lifecycle transitions.
//!
//! Every event is accepted from every state; the only rejected operation is one
//! addressing an unknown id, which is handled by the caller before we get here.
//! Completion fields are kept only while a task is `completed`.

use crate::backlog::{Task, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Complete {
        commit_sha: Option<String>,
        iteration: Option<u32>,
    },
    Skip,
    Block,
    Reset,
}

impl TaskEvent {
    pub fn target(&self) -> TaskStatus {
        match self {
            TaskEvent::Complete { .. } => TaskStatus::Completed,
            TaskEvent::Skip => TaskStatus::Skipped,
            TaskEvent::Block => TaskStatus::Blocked,
            TaskEvent::Reset => TaskStatus::Pending,
        }
    }
}

/// Apply `event` to `task` in place.
pub fn apply_event(task: &mut Task, event: TaskEvent) {
    task.status = event.target();
    match event {
        TaskEvent::Complete {
            commit_sha,
            iteration,
        } => {
            task.commit_sha = commit_sha.filter(|sha| !sha.trim().is_empty());
            task.iteration_completed = iteration;
        }
        TaskEvent::Skip | TaskEvent::Block | TaskEvent::Reset => {
            task.commit_sha = None;
            task.iteration_completed = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task_with_status;

    fn completed(id: &str) -> Task {
        let mut task = task_with_status(id, TaskStatus::Pending);
        apply_event(
            &mut task,
            TaskEvent::Complete {
                commit_sha: Some("deadbeef".to_string()),
                iteration: Some(3),
            },
        );
        task
    }

    #[test]
    fn complete_records_commit_and_iteration() {
        let task = completed("a");
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.commit_sha.as_deref(), Some("deadbeef"));
        assert_eq!(task.iteration_completed, Some(3));
    }

    #[test]
    fn blank_commit_is_not_recorded() {
        let mut task = task_with_status("a", TaskStatus::Pending);
        apply_event(
            &mut task,
            TaskEvent::Complete {
                commit_sha: Some("  ".to_string()),
                iteration: None,
            },
        );
        assert_eq!(task.commit_sha, None);
    }

    #[test]
    fn reset_from_every_terminal_state_clears_completion() {
        for event in [TaskEvent::Skip, TaskEvent::Block] {
            let mut task = completed("a");
            apply_event(&mut task, event);
            assert_eq!(task.commit_sha, None);
            apply_event(&mut task, TaskEvent::Reset);
            assert_eq!(task.status, TaskStatus::Pending);
        }

        let mut task = completed("a");
        apply_event(&mut task, TaskEvent::Reset);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.commit_sha, None);
        assert_eq!(task.iteration_completed, None);
    }

    #[test]
    fn no_event_targets_in_progress() {
        let events = [
            TaskEvent::Complete {
                commit_sha: None,
                iteration: None,
            },
            TaskEvent::Skip,
            TaskEvent::Block,
            TaskEvent::Reset,
        ];
        assert!(
            events
                .iter()
                .all(|event| event.target() != TaskStatus::InProgress)
        );
    }
}
