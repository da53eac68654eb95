//! Task-management commands (`taskloop task ...`).
//!
//! Each command is load → mutate → save. A rejected operation returns before
//! saving, so the file on disk is never touched.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::backlog::{Backlog, Priority, Task};
use crate::error::TaskError;
use crate::io::backlog_store::{load_backlog, save_backlog};
use crate::io::git::Git;
use crate::io::init::ProjectPaths;

/// Input for [`add_task`].
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Defaults to the next free `task-N`.
    pub id: Option<String>,
    pub title: String,
    pub parent_id: Option<String>,
    pub priority: Priority,
    pub description: Option<String>,
}

pub fn add_task(root: &Path, new: NewTask) -> Result<Task> {
    update_backlog(root, |backlog| {
        if let Some(parent) = &new.parent_id
            && backlog.find_task(parent).is_none()
        {
            return Err(TaskError::NotFound(parent.clone()));
        }
        let id = new.id.unwrap_or_else(|| backlog.next_task_id());
        let mut task = Task::new(id, new.title.trim());
        task.parent_id = new.parent_id;
        task.priority = new.priority;
        task.description = new.description.filter(|d| !d.trim().is_empty());
        backlog.add_task(task.clone())?;
        info!(id = %task.id, "added task");
        Ok(task)
    })
}

/// Mark a task completed. Without an explicit commit, the current git `HEAD`
/// is recorded when there is one.
pub fn complete_task(
    root: &Path,
    id: &str,
    commit_sha: Option<String>,
    iteration: Option<u32>,
) -> Result<Task> {
    let commit_sha = commit_sha.or_else(|| Git::new(root).try_head_sha());
    update_backlog(root, |backlog| {
        backlog.complete_task(id, commit_sha, iteration)?;
        task_snapshot(backlog, id)
    })
}

pub fn skip_task(root: &Path, id: &str) -> Result<Task> {
    update_backlog(root, |backlog| {
        backlog.skip_task(id)?;
        task_snapshot(backlog, id)
    })
}

pub fn block_task(root: &Path, id: &str) -> Result<Task> {
    update_backlog(root, |backlog| {
        backlog.block_task(id)?;
        task_snapshot(backlog, id)
    })
}

pub fn reset_task(root: &Path, id: &str) -> Result<Task> {
    update_backlog(root, |backlog| {
        backlog.reset_task(id)?;
        task_snapshot(backlog, id)
    })
}

/// First pending task, if any. Read-only.
pub fn next_task(root: &Path) -> Result<Option<Task>> {
    let backlog = load_backlog(&ProjectPaths::new(root).backlog_path)?;
    Ok(backlog.next_task().cloned())
}

fn task_snapshot(backlog: &Backlog, id: &str) -> Result<Task, TaskError> {
    backlog
        .find_task(id)
        .cloned()
        .ok_or_else(|| TaskError::NotFound(id.to_string()))
}

fn update_backlog<T>(
    root: &Path,
    mutate: impl FnOnce(&mut Backlog) -> Result<T, TaskError>,
) -> Result<T> {
    let path = ProjectPaths::new(root).backlog_path;
    let mut backlog = load_backlog(&path)?;
    let value = mutate(&mut backlog)?;
    save_backlog(&path, &mut backlog)?;
    Ok(value)
}
