//! Per-iteration records under `.taskloop/iterations/<run-id>/<iter>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::types::IterationKind;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationMeta {
    pub run_id: String,
    pub iter: u32,
    pub kind: IterationKind,
    /// Task announced for an implementation iteration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub tasks_before: usize,
    pub tasks_after: usize,
}

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub agent_log_path: PathBuf,
}

impl IterationPaths {
    pub fn new(iterations_dir: &Path, run_id: &str, iter: u32) -> Self {
        let dir = iterations_dir.join(run_id).join(iter.to_string());
        Self {
            meta_path: dir.join("meta.json"),
            agent_log_path: dir.join("agent.log"),
            dir,
        }
    }

    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create iteration dir {}", self.dir.display()))
    }
}

/// Run ids sort chronologically: `run-20260102T030405Z`.
pub fn new_run_id(now: DateTime<Utc>) -> String {
    format!("run-{}", now.format("%Y%m%dT%H%M%SZ"))
}

pub fn write_meta(paths: &IterationPaths, meta: &IterationMeta) -> Result<()> {
    paths.create()?;
    let mut buf = serde_json::to_string_pretty(meta)?;
    buf.push('\n');
    fs::write(&paths.meta_path, buf)
        .with_context(|| format!("write {}", paths.meta_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn iteration_paths_are_stable() {
        let paths = IterationPaths::new(Path::new(".taskloop/iterations"), "run-1", 3);
        assert!(paths.dir.ends_with(Path::new(".taskloop/iterations/run-1/3")));
        assert!(paths.meta_path.ends_with("meta.json"));
        assert!(paths.agent_log_path.ends_with("agent.log"));
    }

    #[test]
    fn run_id_uses_utc_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(new_run_id(now), "run-20260102T030405Z");
    }

    #[test]
    fn writes_camel_case_meta() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = IterationPaths::new(temp.path(), "run-9", 1);
        let meta = IterationMeta {
            run_id: "run-9".to_string(),
            iter: 1,
            kind: IterationKind::Discovery,
            task_id: None,
            success: false,
            error: Some("claude exited with status 1".to_string()),
            started_at: Utc::now(),
            duration_ms: 12,
            tasks_before: 0,
            tasks_after: 0,
        };

        write_meta(&paths, &meta).expect("write meta");

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&paths.meta_path).expect("read"))
                .expect("parse");
        assert_eq!(value["kind"], "discovery");
        assert_eq!(value["tasksBefore"], 0);
        assert!(value.get("taskId").is_none());
    }
}
