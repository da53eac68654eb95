//! Semantic invariants not expressible via JSON Schema.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::backlog::{Backlog, SandboxMode, TaskStatus};
use crate::error::{TaskError, ValidationError};

/// Check backlog invariants the schema cannot express:
/// - required strings are non-empty and task ids are well-formed
/// - no duplicate task ids
/// - `maxIterations > 0`; pilot config present iff pilot mode, with ranges >= 1
/// - sandbox settings present for the selected sandbox mode
/// - completion fields only on completed tasks
///
/// Returns every violation found; never mutates.
pub fn validate_backlog(backlog: &Backlog) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if backlog.project.name.trim().is_empty() {
        errors.push(ValidationError::new("project.name", "must not be empty"));
    }
    validate_config(backlog, &mut errors);

    let mut seen = HashSet::new();
    for (idx, task) in backlog.tasks.iter().enumerate() {
        let path = format!("tasks[{idx}]");
        if let Err(TaskError::InvalidId { reason, .. }) = validate_task_id(&task.id) {
            errors.push(ValidationError::new(format!("{path}.id"), reason));
        }
        if !seen.insert(task.id.as_str()) {
            errors.push(ValidationError::new(
                format!("{path}.id"),
                format!("duplicate id `{}`", task.id),
            ));
        }
        if task.title.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("{path}.title"),
                "must not be empty",
            ));
        }
        if task.status != TaskStatus::Completed {
            if task.commit_sha.is_some() {
                errors.push(ValidationError::new(
                    format!("{path}.commitSHA"),
                    format!("set on a task with status `{}`", task.status),
                ));
            }
            if task.iteration_completed.is_some() {
                errors.push(ValidationError::new(
                    format!("{path}.iterationCompleted"),
                    format!("set on a task with status `{}`", task.status),
                ));
            }
        }
    }

    errors
}

fn validate_config(backlog: &Backlog, errors: &mut Vec<ValidationError>) {
    let config = &backlog.config;
    if config.max_iterations == 0 {
        errors.push(ValidationError::new("config.maxIterations", "must be > 0"));
    }
    if config.prompt_file.trim().is_empty() {
        errors.push(ValidationError::new("config.promptFile", "must not be empty"));
    }
    match (config.pilot_mode, &config.pilot_config) {
        (true, None) => errors.push(ValidationError::new(
            "config.pilotConfig",
            "required when pilotMode is true",
        )),
        (false, Some(_)) => errors.push(ValidationError::new(
            "config.pilotConfig",
            "present but pilotMode is false",
        )),
        (true, Some(pilot)) => {
            if pilot.discover_interval == 0 {
                errors.push(ValidationError::new(
                    "config.pilotConfig.discoverInterval",
                    "must be >= 1",
                ));
            }
            if pilot.max_discovery_tasks == 0 {
                errors.push(ValidationError::new(
                    "config.pilotConfig.maxDiscoveryTasks",
                    "must be >= 1",
                ));
            }
        }
        (false, None) => {}
    }
    let blank = |value: &Option<String>| value.as_deref().is_none_or(|v| v.trim().is_empty());
    match config.sandbox {
        SandboxMode::Container if blank(&config.sandbox_image) => errors.push(
            ValidationError::new("config.sandboxImage", "required when sandbox is `container`"),
        ),
        SandboxMode::IsolatedVm if blank(&config.sandbox_template) => {
            errors.push(ValidationError::new(
                "config.sandboxTemplate",
                "required when sandbox is `isolated-vm`",
            ));
        }
        _ => {}
    }
}

static TASK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("task id regex should compile"));

/// Validate that a task id is safe to pass around on command lines and in
/// iteration paths.
pub fn validate_task_id(id: &str) -> Result<(), TaskError> {
    let invalid = |reason: &str| TaskError::InvalidId {
        id: id.to_string(),
        reason: reason.to_string(),
    };
    if id.is_empty() {
        return Err(invalid("id must not be empty"));
    }
    if !TASK_ID_RE.is_match(id) {
        return Err(invalid("id must be [A-Za-z0-9._-] only"));
    }
    Ok(())
}
