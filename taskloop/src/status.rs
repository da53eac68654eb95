//! `taskloop status`: progress report plus the task list.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use anyhow::Result;

use crate::backlog::{Backlog, Priority, Task, TaskStatus};
use crate::io::backlog_store::load_backlog;
use crate::io::init::ProjectPaths;

/// Load the backlog and recalculate progress in memory. Nothing is saved.
pub fn load_status(root: &Path) -> Result<Backlog> {
    let mut backlog = load_backlog(&ProjectPaths::new(root).backlog_path)?;
    backlog.recalculate();
    Ok(backlog)
}

/// Human-readable report.
pub fn render_status(backlog: &Backlog) -> String {
    StatusReport(backlog).to_string()
}

struct StatusReport<'a>(&'a Backlog);

impl fmt::Display for StatusReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backlog = self.0;
        let progress = &backlog.progress;
        writeln!(f, "Project: {}", backlog.project.name)?;
        if let Some(description) = &backlog.project.description {
            writeln!(f, "  {description}")?;
        }
        let mode = if backlog.config.pilot_mode {
            "pilot"
        } else {
            "plain"
        };
        writeln!(
            f,
            "Mode: {mode} ({}, sandbox {})",
            backlog.config.ai_tool, backlog.config.sandbox
        )?;
        writeln!(
            f,
            "Status: {} ({}/{} completed)",
            progress.status.as_str(),
            progress.completed_tasks,
            progress.total_tasks
        )?;
        let counts: Vec<String> = TaskStatus::ALL
            .iter()
            .map(|status| format!("{status} {}", backlog.count(*status)))
            .collect();
        writeln!(f, "Tasks: {}", counts.join(", "))?;
        writeln!(
            f,
            "Iterations: {} total ({} discovery, {} implementation)",
            progress.total_iterations_run, progress.discovery_iterations, progress.impl_iterations
        )?;
        if let Some(at) = progress.last_iteration_at {
            writeln!(f, "Last iteration: {}", at.to_rfc3339())?;
        }
        match backlog.next_task() {
            Some(task) => writeln!(f, "Next: {} {}", task.id, task.title)?,
            None => writeln!(f, "Next: (none)")?,
        }
        if !backlog.tasks.is_empty() {
            writeln!(f)?;
            for line in task_tree_lines(&backlog.tasks) {
                writeln!(f, "{line}")?;
            }
        }
        Ok(())
    }
}

/// One line per task, children indented under their parent. Tasks whose parent
/// is missing are shown at the top level.
pub fn task_tree_lines(tasks: &[Task]) -> Vec<String> {
    let ids: HashSet<&str> = tasks.iter().map(|task| task.id.as_str()).collect();
    let mut children: HashMap<&str, Vec<&Task>> = HashMap::new();
    let mut roots = Vec::new();
    for task in tasks {
        match task.parent_id.as_deref() {
            Some(parent) if parent != task.id && ids.contains(parent) => {
                children.entry(parent).or_default().push(task);
            }
            _ => roots.push(task),
        }
    }

    let mut lines = Vec::new();
    let mut seen = HashSet::new();
    for task in roots {
        push_subtree(task, 0, &children, &mut seen, &mut lines);
    }
    // Parent cycles never reach a root; list them flat.
    for task in tasks {
        if !seen.contains(task.id.as_str()) {
            push_subtree(task, 0, &children, &mut seen, &mut lines);
        }
    }
    lines
}

fn push_subtree<'a>(
    task: &'a Task,
    depth: usize,
    children: &HashMap<&str, Vec<&'a Task>>,
    seen: &mut HashSet<&'a str>,
    lines: &mut Vec<String>,
) {
    if !seen.insert(task.id.as_str()) {
        return;
    }
    lines.push(format!(
        "{}{} {} {}{}",
        "  ".repeat(depth),
        status_marker(task.status),
        task.id,
        task.title,
        match task.priority {
            Priority::High => " (high)",
            Priority::Low => " (low)",
            Priority::Medium => "",
        }
    ));
    for child in children.get(task.id.as_str()).into_iter().flatten() {
        push_subtree(child, depth + 1, children, seen, lines);
    }
}

fn status_marker(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "[ ]",
        TaskStatus::InProgress => "[~]",
        TaskStatus::Completed => "[x]",
        TaskStatus::Skipped => "[-]",
        TaskStatus::Blocked => "[!]",
    }
}
