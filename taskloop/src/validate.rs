//! `taskloop validate`: read-only health check of a project's `.taskloop/`.

use std::path::Path;

use anyhow::Result;

use crate::error::BacklogError;
use crate::io::agent::SandboxSpec;
use crate::io::backlog_store::load_backlog;
use crate::io::config::load_settings;
use crate::io::init::ProjectPaths;
use crate::io::sandbox::{SandboxProbe, ensure_sandbox_available};

/// Problems found by [`check_project`]. Empty means healthy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub problems: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Check the backlog, prompts, loop settings, and sandbox. Never mutates.
///
/// A missing backlog is returned as [`BacklogError::NotFound`] rather than a
/// problem, so callers can tell "not initialized" apart from "broken".
pub fn check_project(root: &Path, probe: &dyn SandboxProbe) -> Result<HealthReport> {
    let paths = ProjectPaths::new(root);
    let mut problems = Vec::new();

    if let Err(err) = load_settings(&paths.settings_path) {
        problems.push(format!("{err:#}"));
    }

    let backlog = match load_backlog(&paths.backlog_path) {
        Ok(backlog) => backlog,
        Err(err @ BacklogError::NotFound { .. }) => return Err(err.into()),
        Err(BacklogError::Invalid { errors, .. }) => {
            problems.extend(errors.iter().map(|err| format!("backlog {err}")));
            return Ok(HealthReport { problems });
        }
        Err(err) => {
            problems.push(err.to_string());
            return Ok(HealthReport { problems });
        }
    };

    let prompt_path = paths.prompt_path(&backlog.config);
    if !prompt_path.is_file() {
        problems.push(format!(
            "implementation prompt {} is missing",
            prompt_path.display()
        ));
    }
    if backlog.config.pilot_mode && !paths.discover_prompt_path.is_file() {
        problems.push(format!(
            "discovery prompt {} is missing",
            paths.discover_prompt_path.display()
        ));
    }

    match SandboxSpec::from_config(&backlog.config) {
        Ok(sandbox) => {
            if let Err(err) = ensure_sandbox_available(probe, &sandbox) {
                problems.push(err.to_string());
            }
        }
        Err(err) => problems.push(err.to_string()),
    }

    Ok(HealthReport { problems })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::{SandboxMode, Task};
    use crate::io::sandbox::SandboxStatus;
    use crate::test_support::{AvailableSandbox, TestProject};

    struct DownSandbox;

    impl SandboxProbe for DownSandbox {
        fn probe(&self, _sandbox: &SandboxSpec) -> SandboxStatus {
            SandboxStatus::Unavailable("docker daemon not running".to_string())
        }
    }

    #[test]
    fn fresh_project_is_healthy() {
        let project = TestProject::new(vec![Task::new("a", "A")]);
        let report = check_project(project.root(), &AvailableSandbox).expect("check");
        assert!(report.is_healthy(), "{:?}", report.problems);
    }

    #[test]
    fn missing_backlog_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = check_project(temp.path(), &AvailableSandbox).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BacklogError>(),
            Some(BacklogError::NotFound { .. })
        ));
    }

    #[test]
    fn reports_missing_prompt_and_unavailable_sandbox() {
        let project = TestProject::new(Vec::new());
        project.edit_backlog(|backlog| {
            backlog.config.sandbox = SandboxMode::Container;
            backlog.config.sandbox_image = Some("node:22".to_string());
        });
        std::fs::remove_file(project.prompt_path()).expect("remove prompt");

        let report = check_project(project.root(), &DownSandbox).expect("check");

        assert_eq!(report.problems.len(), 2);
        assert!(report.problems[0].contains("implementation prompt"));
        assert!(report.problems[1].contains("docker daemon not running"));
    }

    #[test]
    fn reports_every_invalid_field() {
        let project = TestProject::new(Vec::new());
        let mut value: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(project.backlog_path()).expect("read"),
        )
        .expect("parse");
        value["tasks"] = serde_json::json!([
            {"id": "a", "title": "one"},
            {"id": "a", "title": "two", "commitSHA": "abc"}
        ]);
        std::fs::write(project.backlog_path(), value.to_string()).expect("write");

        let report = check_project(project.root(), &AvailableSandbox).expect("check");

        assert_eq!(report.problems.len(), 2);
        assert!(report.problems.iter().any(|p| p.contains("duplicate id `a`")));
        assert!(report.problems.iter().any(|p| p.contains("tasks[1].commitSHA")));
    }
}
