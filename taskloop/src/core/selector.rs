//! Deterministic "what next" query over the task list.

use crate::backlog::{Task, TaskStatus};

/// First task in list order whose status is `pending`.
///
/// `parent_id` is not consulted, so a sub-task can be returned while its parent
/// is still open.
pub fn next_pending(tasks: &[Task]) -> Option<&Task> {
    tasks.iter().find(|task| task.status == TaskStatus::Pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task_with_status;

    #[test]
    fn returns_none_when_everything_completed() {
        let tasks = vec![
            task_with_status("a", TaskStatus::Completed),
            task_with_status("b", TaskStatus::Completed),
        ];
        assert!(next_pending(&tasks).is_none());
    }

    #[test]
    fn returns_the_single_pending_task() {
        let tasks = vec![
            task_with_status("a", TaskStatus::Completed),
            task_with_status("b", TaskStatus::InProgress),
            task_with_status("c", TaskStatus::Skipped),
            task_with_status("d", TaskStatus::Pending),
            task_with_status("e", TaskStatus::Blocked),
        ];
        assert_eq!(next_pending(&tasks).map(|t| t.id.as_str()), Some("d"));
    }

    #[test]
    fn child_can_be_selected_before_open_parent() {
        let mut child = task_with_status("child", TaskStatus::Pending);
        child.parent_id = Some("parent".to_string());
        let tasks = vec![task_with_status("parent", TaskStatus::Blocked), child];
        assert_eq!(next_pending(&tasks).map(|t| t.id.as_str()), Some("child"));
    }
}
