//! Test-only helpers: backlog fixtures, a scratch project, and scripted
//! collaborators for loop tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::backlog::{AiTool, Backlog, PilotConfig, RunConfig, Task, TaskStatus};
use crate::core::types::IterationKind;
use crate::error::AgentError;
use crate::io::agent::{Agent, AgentRequest, SandboxSpec};
use crate::io::backlog_store::{load_backlog, save_backlog};
use crate::io::init::{DEFAULT_PROMPT_FILE, ProjectPaths};
use crate::io::sandbox::{SandboxProbe, SandboxStatus};
use crate::looping::{LoopEvent, LoopObserver, Sleeper};

/// Backlog named `demo` holding `tasks` as given (no id checks).
pub fn backlog_with_tasks(tasks: Vec<Task>) -> Backlog {
    let created = Utc
        .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp");
    let mut backlog = Backlog::new(
        "demo",
        RunConfig::new(AiTool::Claude, DEFAULT_PROMPT_FILE),
        created,
    );
    backlog.tasks = tasks;
    backlog
}

/// Task titled `<id> title` with the given status.
pub fn task_with_status(id: &str, status: TaskStatus) -> Task {
    let mut task = Task::new(id, format!("{id} title"));
    task.status = status;
    task
}

/// Scratch project with a saved backlog and both prompt files.
pub struct TestProject {
    temp: tempfile::TempDir,
}

impl TestProject {
    pub fn new(tasks: Vec<Task>) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = Self { temp };
        let paths = project.paths();
        fs::create_dir_all(&paths.iterations_dir).expect("create .taskloop");
        let mut backlog = backlog_with_tasks(tasks);
        save_backlog(&paths.backlog_path, &mut backlog).expect("save backlog");
        fs::write(paths.prompt_path(&backlog.config), "implement the next task\n")
            .expect("write prompt");
        fs::write(&paths.discover_prompt_path, "discover new tasks\n")
            .expect("write discover prompt");
        project
    }

    /// Project already in pilot mode with the given discovery interval.
    pub fn pilot(tasks: Vec<Task>, discover_interval: u32) -> Self {
        let project = Self::new(tasks);
        project.edit_backlog(|backlog| {
            backlog.config.pilot_mode = true;
            backlog.config.pilot_config = Some(PilotConfig {
                discover_interval,
                ..PilotConfig::default()
            });
        });
        project
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn paths(&self) -> ProjectPaths {
        ProjectPaths::new(self.root())
    }

    pub fn backlog_path(&self) -> PathBuf {
        self.paths().backlog_path
    }

    pub fn prompt_path(&self) -> PathBuf {
        self.paths().prompt_path(&self.backlog().config)
    }

    pub fn backlog(&self) -> Backlog {
        load_backlog(&self.backlog_path()).expect("load backlog")
    }

    pub fn edit_backlog(&self, edit: impl FnOnce(&mut Backlog)) {
        let mut backlog = self.backlog();
        edit(&mut backlog);
        save_backlog(&self.backlog_path(), &mut backlog).expect("save backlog");
    }

    pub fn write_settings(&self, toml: &str) {
        fs::write(self.paths().settings_path, toml).expect("write loop.toml");
    }
}

/// What a [`ScriptedAgent`] does on one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedRun {
    /// Exit 0 without touching anything.
    Succeed,
    /// Exit non-zero without touching anything.
    Fail,
    /// Complete the next pending task, then exit 0.
    CompleteNext,
    /// Append `n` pending tasks, then exit 0.
    AddTasks(usize),
}

/// Agent that edits the backlog on disk the way a real agent would.
pub struct ScriptedAgent {
    runs: RefCell<VecDeque<ScriptedRun>>,
    fallback: ScriptedRun,
    prompts: RefCell<Vec<PathBuf>>,
}

impl ScriptedAgent {
    /// Play `runs` in order, then keep succeeding.
    pub fn new(runs: Vec<ScriptedRun>) -> Self {
        Self::with_fallback(runs, ScriptedRun::Succeed)
    }

    /// Play `runs` in order, then repeat `fallback` forever.
    pub fn with_fallback(runs: Vec<ScriptedRun>, fallback: ScriptedRun) -> Self {
        Self {
            runs: RefCell::new(runs.into()),
            fallback,
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn invocations(&self) -> usize {
        self.prompts.borrow().len()
    }

    /// Prompt file names in invocation order, e.g. `["discover.md", "prompt.md"]`.
    pub fn prompt_names(&self) -> Vec<String> {
        self.prompts
            .borrow()
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect()
    }
}

impl Agent for ScriptedAgent {
    fn run(&self, request: &AgentRequest) -> Result<(), AgentError> {
        self.prompts.borrow_mut().push(request.prompt_path.clone());
        let run = self
            .runs
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let backlog_path = ProjectPaths::new(&request.workdir).backlog_path;
        let edit = |change: &dyn Fn(&mut Backlog)| {
            let mut backlog = load_backlog(&backlog_path).expect("agent load backlog");
            change(&mut backlog);
            save_backlog(&backlog_path, &mut backlog).expect("agent save backlog");
        };
        match run {
            ScriptedRun::Succeed => Ok(()),
            ScriptedRun::Fail => Err(AgentError::Failed {
                tool: request.tool,
                code: Some(1),
                stderr_tail: Some("scripted failure".to_string()),
            }),
            ScriptedRun::CompleteNext => {
                edit(&|backlog| {
                    if let Some(id) = backlog.next_task().map(|task| task.id.clone()) {
                        backlog
                            .complete_task(&id, Some("deadbeef".to_string()), None)
                            .expect("complete task");
                    }
                });
                Ok(())
            }
            ScriptedRun::AddTasks(count) => {
                edit(&|backlog| {
                    for _ in 0..count {
                        let id = backlog.next_task_id();
                        backlog
                            .add_task(Task::new(id, "discovered work"))
                            .expect("add task");
                    }
                });
                Ok(())
            }
        }
    }
}

/// Records requested pauses instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

/// Records every hook call.
#[derive(Default)]
pub struct RecordingObserver {
    pub starts: Vec<(u32, IterationKind)>,
    /// `(iteration, failed)`
    pub ends: Vec<(u32, bool)>,
    pub events: Vec<LoopEvent>,
}

impl RecordingObserver {
    pub fn kinds(&self) -> Vec<IterationKind> {
        self.starts.iter().map(|(_, kind)| *kind).collect()
    }
}

impl LoopObserver for RecordingObserver {
    fn on_iteration_start(&mut self, iteration: u32, kind: IterationKind) {
        self.starts.push((iteration, kind));
    }

    fn on_iteration_end(&mut self, iteration: u32, error: Option<&AgentError>) {
        self.ends.push((iteration, error.is_some()));
    }

    fn report(&mut self, event: &LoopEvent) {
        self.events.push(event.clone());
    }
}

/// Probe that reports every sandbox as usable.
pub struct AvailableSandbox;

impl SandboxProbe for AvailableSandbox {
    fn probe(&self, _sandbox: &SandboxSpec) -> SandboxStatus {
        SandboxStatus::Available
    }
}
