//! Progress ledger recomputation.

use crate::backlog::{Progress, ProgressStatus, Task, TaskStatus};

/// Recompute the task-derived progress fields from `tasks`.
///
/// Iteration counters are left untouched. Calling this twice yields the same
/// ledger.
pub fn recalculate(tasks: &[Task], progress: &mut Progress) {
    progress.total_tasks = tasks.len();
    progress.completed_tasks = tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Completed)
        .count();
    progress.status = derive_status(tasks, progress.total_iterations_run);
}

fn derive_status(tasks: &[Task], iterations_run: u32) -> ProgressStatus {
    if tasks.is_empty() {
        return if iterations_run > 0 {
            ProgressStatus::InProgress
        } else {
            ProgressStatus::NotStarted
        };
    }
    if tasks
        .iter()
        .all(|task| matches!(task.status, TaskStatus::Completed | TaskStatus::Skipped))
    {
        return ProgressStatus::Completed;
    }
    let touched = tasks.iter().any(|task| task.status != TaskStatus::Pending);
    if touched || iterations_run > 0 {
        ProgressStatus::InProgress
    } else {
        ProgressStatus::NotStarted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task_with_status;

    #[test]
    fn counts_match_task_list() {
        let tasks = vec![
            task_with_status("a", TaskStatus::Completed),
            task_with_status("b", TaskStatus::Pending),
            task_with_status("c", TaskStatus::Skipped),
            task_with_status("d", TaskStatus::Completed),
        ];
        let mut progress = Progress::default();
        recalculate(&tasks, &mut progress);

        assert_eq!(progress.total_tasks, 4);
        assert_eq!(progress.completed_tasks, 2);
        assert_eq!(progress.status, ProgressStatus::InProgress);
    }

    #[test]
    fn is_idempotent_and_keeps_iteration_counters() {
        let tasks = vec![task_with_status("a", TaskStatus::Pending)];
        let mut progress = Progress {
            total_tasks: 99,
            total_iterations_run: 4,
            discovery_iterations: 1,
            impl_iterations: 3,
            ..Progress::default()
        };
        recalculate(&tasks, &mut progress);
        let first = progress.clone();
        recalculate(&tasks, &mut progress);

        assert_eq!(progress, first);
        assert_eq!(progress.total_tasks, 1);
        assert_eq!(progress.total_iterations_run, 4);
        assert_eq!(progress.impl_iterations, 3);
    }

    #[test]
    fn status_reflects_task_states() {
        let mut progress = Progress::default();
        recalculate(&[], &mut progress);
        assert_eq!(progress.status, ProgressStatus::NotStarted);

        recalculate(&[task_with_status("a", TaskStatus::Pending)], &mut progress);
        assert_eq!(progress.status, ProgressStatus::NotStarted);

        recalculate(
            &[
                task_with_status("a", TaskStatus::Completed),
                task_with_status("b", TaskStatus::Skipped),
            ],
            &mut progress,
        );
        assert_eq!(progress.status, ProgressStatus::Completed);

        recalculate(
            &[
                task_with_status("a", TaskStatus::Completed),
                task_with_status("b", TaskStatus::Blocked),
            ],
            &mut progress,
        );
        assert_eq!(progress.status, ProgressStatus::InProgress);
    }
}
