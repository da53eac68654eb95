//! Task import for `taskloop init --import`: a JSON array of task objects or a
//! markdown checklist.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Deserialize;

use crate::backlog::{Backlog, Priority, Task, TaskStatus};

static CHECKBOX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<indent>[ \t]*)[-*+][ \t]+\[(?P<mark>[ xX])\][ \t]+(?P<title>.+?)[ \t]*$")
        .expect("checkbox regex should compile")
});

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedTask {
    id: Option<String>,
    parent_id: Option<String>,
    title: String,
    description: Option<String>,
    #[serde(default)]
    priority: Priority,
    #[serde(default)]
    status: TaskStatus,
}

/// One `- [ ] title` line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChecklistItem {
    indent: usize,
    title: String,
    done: bool,
}

/// Append the tasks in `path` to `backlog`; returns how many were added.
///
/// Tasks without an id get the next free `task-N`. Any rejected task aborts
/// the import with the offending entry named.
pub fn import_tasks(path: &Path, backlog: &mut Backlog) -> Result<usize> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read import file {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext == "json")
        || contents.trim_start().starts_with('[');
    let before = backlog.tasks.len();
    if is_json {
        import_json(&contents, backlog).with_context(|| format!("import {}", path.display()))?;
    } else {
        import_checklist(&contents, backlog)
            .with_context(|| format!("import {}", path.display()))?;
    }
    Ok(backlog.tasks.len() - before)
}

fn import_json(contents: &str, backlog: &mut Backlog) -> Result<()> {
    let entries: Vec<ImportedTask> =
        serde_json::from_str(contents).context("expected a JSON array of task objects")?;
    for (idx, entry) in entries.into_iter().enumerate() {
        let id = entry.id.unwrap_or_else(|| backlog.next_task_id());
        let mut task = Task::new(id, entry.title);
        task.parent_id = entry.parent_id;
        task.description = entry.description;
        task.priority = entry.priority;
        task.status = entry.status;
        backlog
            .add_task(task)
            .with_context(|| format!("task #{}", idx + 1))?;
    }
    Ok(())
}

fn import_checklist(contents: &str, backlog: &mut Backlog) -> Result<()> {
    let items = parse_checklist(contents);
    if items.is_empty() {
        bail!("no `- [ ] task` checklist items found");
    }
    // Open ancestors as (indent, id); an item's parent is the nearest shallower one.
    let mut ancestors: Vec<(usize, String)> = Vec::new();
    for item in items {
        while ancestors
            .last()
            .is_some_and(|(indent, _)| *indent >= item.indent)
        {
            ancestors.pop();
        }
        let id = backlog.next_task_id();
        let mut task = Task::new(id.clone(), item.title);
        task.parent_id = ancestors.last().map(|(_, parent)| parent.clone());
        if item.done {
            task.status = TaskStatus::Completed;
        }
        backlog.add_task(task)?;
        ancestors.push((item.indent, id));
    }
    Ok(())
}

fn parse_checklist(contents: &str) -> Vec<ChecklistItem> {
    contents
        .lines()
        .filter_map(|line| CHECKBOX_RE.captures(line))
        .map(|caps| ChecklistItem {
            indent: caps["indent"]
                .chars()
                .map(|c| if c == '\t' { 4 } else { 1 })
                .sum(),
            title: caps["title"].to_string(),
            done: !caps["mark"].trim().is_empty(),
        })
        .collect()
}
