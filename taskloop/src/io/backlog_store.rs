//! Backlog load/save helpers with schema + invariant validation.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use chrono::Utc;
use jsonschema::Validator;
use serde_json::Value;
use tracing::debug;

use crate::backlog::Backlog;
use crate::core::invariants::validate_backlog;
use crate::error::BacklogError;

pub const BACKLOG_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/backlog.schema.json"
));

static SCHEMA_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(BACKLOG_SCHEMA).expect("backlog schema should be valid JSON");
    jsonschema::validator_for(&schema).expect("backlog schema should compile")
});

/// Load and validate the backlog from disk (schema + invariants).
///
/// A missing file is [`BacklogError::NotFound`]; unreadable JSON or a schema
/// mismatch is [`BacklogError::Parse`]; typed invariant violations are
/// [`BacklogError::Invalid`].
pub fn load_backlog(path: &Path) -> Result<Backlog, BacklogError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(BacklogError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(BacklogError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let backlog = parse_backlog(path, &contents)?;
    debug!(path = %path.display(), tasks = backlog.tasks.len(), "loaded backlog");
    Ok(backlog)
}

/// Parse backlog text. `path` is only used for error messages.
pub fn parse_backlog(path: &Path, contents: &str) -> Result<Backlog, BacklogError> {
    let parse_error = |message: String| BacklogError::Parse {
        path: path.to_path_buf(),
        message,
    };
    let value: Value =
        serde_json::from_str(contents).map_err(|err| parse_error(format!("invalid JSON: {err}")))?;
    let schema_errors = schema_errors(&value);
    if !schema_errors.is_empty() {
        return Err(parse_error(format!(
            "schema validation failed: {}",
            schema_errors.join("; ")
        )));
    }
    let backlog: Backlog =
        serde_json::from_value(value).map_err(|err| parse_error(err.to_string()))?;
    let errors = validate_backlog(&backlog);
    if !errors.is_empty() {
        return Err(BacklogError::Invalid {
            path: path.to_path_buf(),
            errors,
        });
    }
    Ok(backlog)
}

/// Schema violations for a raw backlog value, one message per error.
pub fn schema_errors(value: &Value) -> Vec<String> {
    SCHEMA_VALIDATOR
        .iter_errors(value)
        .map(|err| err.to_string())
        .collect()
}

/// Refresh `updatedAt`, recalculate progress, and atomically replace the file.
///
/// A backlog that fails [`validate_backlog`] is [`BacklogError::Invalid`] and
/// the file is left as it was.
pub fn save_backlog(path: &Path, backlog: &mut Backlog) -> Result<(), BacklogError> {
    let errors = validate_backlog(backlog);
    if !errors.is_empty() {
        return Err(BacklogError::Invalid {
            path: path.to_path_buf(),
            errors,
        });
    }
    backlog.touch(Utc::now());
    backlog.recalculate();
    let io_error = |source: io::Error| BacklogError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut buf = serde_json::to_string_pretty(backlog).map_err(|err| io_error(err.into()))?;
    buf.push('\n');
    write_atomic(path, &buf).map_err(io_error)?;
    debug!(path = %path.display(), tasks = backlog.tasks.len(), "saved backlog");
    Ok(())
}

/// Write `contents` next to `path` and rename over it so readers never observe a
/// partial file.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::{Task, TaskStatus};
    use crate::test_support::backlog_with_tasks;

    #[test]
    fn save_then_load_preserves_tasks_and_refreshes_progress() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".taskloop/backlog.json");
        let mut backlog = backlog_with_tasks(vec![Task::new("a", "A"), Task::new("b", "B")]);
        backlog.complete_task("a", None, Some(1)).expect("complete");
        let created = backlog.project.updated_at;

        save_backlog(&path, &mut backlog).expect("save");
        let loaded = load_backlog(&path).expect("load");

        assert_eq!(loaded.tasks, backlog.tasks);
        assert_eq!(loaded.progress.total_tasks, 2);
        assert_eq!(loaded.progress.completed_tasks, 1);
        assert!(loaded.project.updated_at >= created);
        assert!(!temp.path().join(".taskloop/backlog.json.tmp").exists());
    }

    #[test]
    fn invalid_backlog_is_not_written() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("backlog.json");
        let mut backlog = backlog_with_tasks(vec![Task::new("a", "A")]);
        save_backlog(&path, &mut backlog).expect("save");
        let before = fs::read_to_string(&path).expect("read");

        backlog.tasks.push(Task::new("b", "  "));
        let err = save_backlog(&path, &mut backlog).unwrap_err();

        let BacklogError::Invalid { errors, .. } = err else {
            panic!("expected invalid error, got {err:?}");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "tasks[1].title");
        assert_eq!(fs::read_to_string(&path).expect("read"), before);
    }

    #[test]
    fn missing_file_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_backlog(&temp.path().join("backlog.json")).unwrap_err();
        assert!(matches!(err, BacklogError::NotFound { .. }));
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("backlog.json");
        fs::write(&path, "{ not json").expect("write");
        let err = load_backlog(&path).unwrap_err();
        assert!(matches!(err, BacklogError::Parse { .. }));
        assert!(err.to_string().contains("corrupted"));
    }

    #[test]
    fn unknown_enum_value_is_rejected_by_schema() {
        let backlog = backlog_with_tasks(vec![Task::new("a", "A")]);
        let mut value = serde_json::to_value(&backlog).expect("serialize");
        value["config"]["aiTool"] = Value::from("cursor");
        value["tasks"][0]["status"] = Value::from("done");

        let err = parse_backlog(Path::new("b.json"), &value.to_string()).unwrap_err();
        let BacklogError::Parse { message, .. } = err else {
            panic!("expected parse error, got {err:?}");
        };
        assert!(message.contains("schema validation failed"));
        assert!(message.contains("cursor"));
    }

    #[test]
    fn duplicate_ids_are_invalid() {
        let mut backlog = backlog_with_tasks(vec![Task::new("a", "A")]);
        backlog.tasks.push(Task::new("a", "again"));
        let text = serde_json::to_string(&backlog).expect("serialize");

        let err = parse_backlog(Path::new("b.json"), &text).unwrap_err();
        let BacklogError::Invalid { errors, .. } = err else {
            panic!("expected invalid error, got {err:?}");
        };
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("duplicate id"));
    }

    #[test]
    fn docker_alias_loads_as_container() {
        let mut backlog = backlog_with_tasks(Vec::new());
        backlog.config.sandbox_image = Some("node:22".to_string());
        let mut value = serde_json::to_value(&backlog).expect("serialize");
        value["config"]["sandbox"] = Value::from("docker");

        let loaded = parse_backlog(Path::new("b.json"), &value.to_string()).expect("parse");
        assert_eq!(loaded.config.sandbox, crate::backlog::SandboxMode::Container);
        assert_eq!(loaded.count(TaskStatus::Pending), 0);
    }
}
