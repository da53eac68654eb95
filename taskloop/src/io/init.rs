//! Initialization helpers for `.taskloop/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tracing::info;

use super::backlog_store::{load_backlog, save_backlog};
use super::config::{LoopSettings, write_settings};
use super::detect::detect_quality_checks;
use super::import::import_tasks;
use super::prompt::PromptEngine;
use crate::backlog::{AiTool, Backlog, PilotConfig, RunConfig, SandboxMode};
use crate::core::invariants::validate_backlog;
use crate::error::BacklogError;

/// Implementation prompt location written into `config.promptFile`.
pub const DEFAULT_PROMPT_FILE: &str = ".taskloop/prompt.md";
/// Backlog location, relative to the project root.
pub const BACKLOG_FILE: &str = ".taskloop/backlog.json";

/// All canonical paths within `.taskloop/` for a project root.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub taskloop_dir: PathBuf,
    pub iterations_dir: PathBuf,
    pub gitignore_path: PathBuf,
    pub backlog_path: PathBuf,
    pub settings_path: PathBuf,
    pub discover_prompt_path: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let taskloop_dir = root.join(".taskloop");
        Self {
            iterations_dir: taskloop_dir.join("iterations"),
            gitignore_path: taskloop_dir.join(".gitignore"),
            backlog_path: root.join(BACKLOG_FILE),
            settings_path: taskloop_dir.join("loop.toml"),
            discover_prompt_path: taskloop_dir.join("discover.md"),
            taskloop_dir,
            root,
        }
    }

    /// Implementation prompt named by the backlog config.
    pub fn prompt_path(&self, config: &RunConfig) -> PathBuf {
        self.root.join(&config.prompt_file)
    }
}

/// Options for [`init_project`].
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Defaults to the root directory's name.
    pub name: Option<String>,
    pub description: Option<String>,
    pub ai_tool: AiTool,
    pub sandbox: SandboxMode,
    pub sandbox_image: Option<String>,
    pub sandbox_template: Option<String>,
    pub max_iterations: Option<u32>,
    /// Switch on pilot mode with this config.
    pub pilot: Option<PilotConfig>,
    /// Tasks to import (JSON array or markdown checklist).
    pub import: Option<PathBuf>,
    /// If true, overwrite an existing backlog and prompts.
    pub force: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            ai_tool: AiTool::Claude,
            sandbox: SandboxMode::None,
            sandbox_image: None,
            sandbox_template: None,
            max_iterations: None,
            pilot: None,
            import: None,
            force: false,
        }
    }
}

/// Create `.taskloop/` scaffolding in `root` and return the new backlog.
///
/// Fails if a backlog already exists unless `options.force` is set.
pub fn init_project(root: &Path, options: &InitOptions) -> Result<Backlog> {
    let paths = ProjectPaths::new(root);
    if paths.backlog_path.exists() && !options.force {
        return Err(anyhow!(
            "taskloop init: {} already exists (use --force to overwrite)",
            paths.backlog_path.display()
        ));
    }
    if paths.taskloop_dir.exists() && !paths.taskloop_dir.is_dir() {
        return Err(anyhow!(
            "taskloop init: .taskloop exists but is not a directory"
        ));
    }

    let mut config = RunConfig::new(options.ai_tool, DEFAULT_PROMPT_FILE);
    config.quality_checks = detect_quality_checks(root);
    config.sandbox = options.sandbox;
    config.sandbox_image = options.sandbox_image.clone();
    config.sandbox_template = options.sandbox_template.clone();
    if let Some(max_iterations) = options.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(pilot) = &options.pilot {
        config.pilot_mode = true;
        config.pilot_config = Some(pilot.clone());
    }

    let name = options.name.clone().unwrap_or_else(|| project_name(root));
    let mut backlog = Backlog::new(name, config, Utc::now());
    backlog.project.description = options.description.clone();
    if let Some(import) = &options.import {
        let added = import_tasks(import, &mut backlog)?;
        info!(added, path = %import.display(), "imported tasks");
    }

    let errors = validate_backlog(&backlog);
    if !errors.is_empty() {
        return Err(BacklogError::Invalid {
            path: paths.backlog_path,
            errors,
        }
        .into());
    }

    scaffold(&paths)?;
    write_prompts(&paths, &backlog)?;
    save_backlog(&paths.backlog_path, &mut backlog)
        .with_context(|| format!("write {}", paths.backlog_path.display()))?;
    info!(
        project = %backlog.project.name,
        pilot = backlog.config.pilot_mode,
        tasks = backlog.tasks.len(),
        "initialized project"
    );
    Ok(backlog)
}

/// What [`ensure_pilot_backlog`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PilotSetup {
    /// Backlog was already in pilot mode.
    Ready,
    /// No backlog existed; one was created with pilot defaults.
    Created,
    /// An existing backlog was switched into pilot mode.
    Enabled,
}

/// Make sure a pilot-mode backlog and the discovery prompt exist.
pub fn ensure_pilot_backlog(root: &Path) -> Result<PilotSetup> {
    let paths = ProjectPaths::new(root);
    let mut backlog = match load_backlog(&paths.backlog_path) {
        Ok(backlog) => backlog,
        Err(BacklogError::NotFound { .. }) => {
            let options = InitOptions {
                pilot: Some(PilotConfig::default()),
                ..InitOptions::default()
            };
            init_project(root, &options)?;
            return Ok(PilotSetup::Created);
        }
        Err(err) => return Err(err.into()),
    };

    let engine = PromptEngine::new();
    if !paths.discover_prompt_path.exists() || !backlog.config.pilot_mode {
        write_prompt(
            &paths.discover_prompt_path,
            &engine.render_discover(&backlog, BACKLOG_FILE)?,
        )?;
    }
    if !paths.prompt_path(&backlog.config).exists() {
        write_prompt(
            &paths.prompt_path(&backlog.config),
            &engine.render_implement(&backlog, BACKLOG_FILE)?,
        )?;
    }
    if backlog.config.pilot_mode {
        return Ok(PilotSetup::Ready);
    }

    backlog.enable_pilot();
    save_backlog(&paths.backlog_path, &mut backlog)?;
    info!("enabled pilot mode on existing backlog");
    Ok(PilotSetup::Enabled)
}

fn scaffold(paths: &ProjectPaths) -> Result<()> {
    create_dir(&paths.taskloop_dir)?;
    create_dir(&paths.iterations_dir)?;
    write_file(&paths.gitignore_path, TASKLOOP_GITIGNORE)?;
    if !paths.settings_path.exists() {
        write_settings(&paths.settings_path, &LoopSettings::default())?;
    }
    Ok(())
}

/// Render and write the implementation prompt, plus the discovery prompt in
/// pilot mode.
fn write_prompts(paths: &ProjectPaths, backlog: &Backlog) -> Result<()> {
    let engine = PromptEngine::new();
    write_prompt(
        &paths.prompt_path(&backlog.config),
        &engine.render_implement(backlog, BACKLOG_FILE)?,
    )?;
    if backlog.config.pilot_mode {
        write_prompt(
            &paths.discover_prompt_path,
            &engine.render_discover(backlog, BACKLOG_FILE)?,
        )?;
    }
    Ok(())
}

fn write_prompt(path: &Path, rendered: &str) -> Result<()> {
    let mut contents = rendered.trim_end().to_string();
    contents.push('\n');
    write_file(path, &contents)
}

fn project_name(root: &Path) -> String {
    let absolute = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    absolute
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "project".to_string())
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const TASKLOOP_GITIGNORE: &str = "iterations/\n";

#[cfg(test)]
mod tests {
    use super::*;

    fn read_to_string(path: &Path) -> String {
        fs::read_to_string(path).expect("read file")
    }

    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::write(root.join("go.mod"), "module demo\n").expect("write go.mod");

        let backlog = init_project(root, &InitOptions::default()).expect("init");
        let paths = ProjectPaths::new(root);

        assert!(paths.taskloop_dir.is_dir());
        assert!(paths.iterations_dir.is_dir());
        assert!(paths.backlog_path.is_file());
        assert!(paths.settings_path.is_file());
        assert!(paths.prompt_path(&backlog.config).is_file());
        assert!(!paths.discover_prompt_path.exists());
        assert_eq!(read_to_string(&paths.gitignore_path), TASKLOOP_GITIGNORE);
        assert_eq!(
            backlog.config.quality_checks,
            vec!["go test ./...", "go vet ./..."]
        );

        let loaded = load_backlog(&paths.backlog_path).expect("load");
        assert_eq!(loaded.project.name, backlog.project.name);
        assert!(!loaded.config.pilot_mode);
    }

    #[test]
    fn init_without_force_refuses_existing_backlog() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();

        init_project(root, &InitOptions::default()).expect("init");
        let err = init_project(root, &InitOptions::default()).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn init_with_force_rewrites_prompt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let backlog = init_project(root, &InitOptions::default()).expect("init");
        let prompt_path = ProjectPaths::new(root).prompt_path(&backlog.config);
        fs::write(&prompt_path, "custom").expect("write custom");

        let options = InitOptions {
            force: true,
            ..InitOptions::default()
        };
        init_project(root, &options).expect("re-init");

        assert!(read_to_string(&prompt_path).starts_with("# Implementation iteration"));
    }

    #[test]
    fn pilot_setup_creates_backlog_when_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();

        assert_eq!(ensure_pilot_backlog(root).expect("setup"), PilotSetup::Created);

        let paths = ProjectPaths::new(root);
        let backlog = load_backlog(&paths.backlog_path).expect("load");
        assert!(backlog.config.pilot_mode);
        assert_eq!(backlog.config.pilot_config, Some(PilotConfig::default()));
        assert!(paths.discover_prompt_path.is_file());
        assert_eq!(ensure_pilot_backlog(root).expect("setup"), PilotSetup::Ready);
    }

    #[test]
    fn pilot_setup_enables_existing_backlog() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        let options = InitOptions {
            name: Some("shop".to_string()),
            ..InitOptions::default()
        };
        init_project(root, &options).expect("init");

        assert_eq!(ensure_pilot_backlog(root).expect("setup"), PilotSetup::Enabled);

        let paths = ProjectPaths::new(root);
        let backlog = load_backlog(&paths.backlog_path).expect("load");
        assert_eq!(backlog.project.name, "shop");
        assert!(backlog.config.pilot_mode);
        assert!(read_to_string(&paths.discover_prompt_path).contains("shop"));
    }

    #[test]
    fn pilot_setup_surfaces_corrupt_backlog() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        fs::create_dir_all(&paths.taskloop_dir).expect("mkdir");
        fs::write(&paths.backlog_path, "{").expect("write");

        let err = ensure_pilot_backlog(temp.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BacklogError>(),
            Some(BacklogError::Parse { .. })
        ));
    }

    #[test]
    fn init_rejects_container_without_image() {
        let temp = tempfile::tempdir().expect("tempdir");
        let options = InitOptions {
            sandbox: SandboxMode::Container,
            ..InitOptions::default()
        };
        let err = init_project(temp.path(), &options).unwrap_err();
        assert!(format!("{err:#}").contains("config.sandboxImage"));
        assert!(!ProjectPaths::new(temp.path()).backlog_path.exists());
    }
}
