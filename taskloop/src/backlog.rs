//! Backlog document model (`.taskloop/backlog.json`).
//!
//! The backlog is the single shared mutable resource of a project: the loop
//! controller, the task commands, and the external agent all read and rewrite it.
//! Field names are camelCase on disk.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::invariants::validate_task_id;
use crate::core::progress::recalculate;
use crate::core::selector::next_pending;
use crate::core::state::{TaskEvent, apply_event};
use crate::core::types::IterationKind;
use crate::error::{ConfigError, TaskError};

/// Current on-disk format version.
pub const BACKLOG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backlog {
    pub version: u32,
    pub project: Project,
    pub config: RunConfig,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub progress: Progress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Run configuration persisted alongside the tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub max_iterations: u32,
    /// Shell commands detected from the project. Advisory only: they are rendered
    /// into prompts, never executed by the loop.
    #[serde(default)]
    pub quality_checks: Vec<String>,
    pub ai_tool: AiTool,
    /// Implementation prompt, relative to the project root.
    pub prompt_file: String,
    #[serde(default)]
    pub sandbox: SandboxMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_template: Option<String>,
    #[serde(default)]
    pub pilot_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pilot_config: Option<PilotConfig>,
}

impl RunConfig {
    pub fn new(ai_tool: AiTool, prompt_file: impl Into<String>) -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            quality_checks: Vec::new(),
            ai_tool,
            prompt_file: prompt_file.into(),
            sandbox: SandboxMode::None,
            sandbox_image: None,
            sandbox_template: None,
            pilot_mode: false,
            pilot_config: None,
        }
    }
}

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PilotConfig {
    /// Iterations between discovery runs.
    pub discover_interval: u32,
    /// Cap on tasks a single discovery run may add.
    pub max_discovery_tasks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            discover_interval: 5,
            max_discovery_tasks: 10,
            focus: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    /// Display-only grouping. Never consulted by scheduling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(rename = "commitSHA", default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_completed: Option<u32>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            title: title.into(),
            description: None,
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            commit_sha: None,
            iteration_completed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    /// Reserved for external tooling; no built-in operation enters this state.
    InProgress,
    Completed,
    Skipped,
    Blocked,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Skipped,
        TaskStatus::Blocked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl FromStr for Priority {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(ConfigError::UnsupportedPriority(other.to_string())),
        }
    }
}

/// Supported AI coding agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiTool {
    Claude,
    Codex,
    Gemini,
    Opencode,
    Amp,
}

impl AiTool {
    pub const ALL: [AiTool; 5] = [
        AiTool::Claude,
        AiTool::Codex,
        AiTool::Gemini,
        AiTool::Opencode,
        AiTool::Amp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AiTool::Claude => "claude",
            AiTool::Codex => "codex",
            AiTool::Gemini => "gemini",
            AiTool::Opencode => "opencode",
            AiTool::Amp => "amp",
        }
    }
}

impl fmt::Display for AiTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AiTool {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        AiTool::ALL
            .into_iter()
            .find(|tool| tool.as_str() == wanted)
            .ok_or(ConfigError::UnsupportedAiTool(wanted))
    }
}

/// Isolation strategy for the agent process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    #[default]
    None,
    #[serde(alias = "docker")]
    Container,
    IsolatedVm,
}

impl SandboxMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SandboxMode::None => "none",
            SandboxMode::Container => "container",
            SandboxMode::IsolatedVm => "isolated-vm",
        }
    }
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SandboxMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(SandboxMode::None),
            "container" | "docker" => Ok(SandboxMode::Container),
            "isolated-vm" | "vm" => Ok(SandboxMode::IsolatedVm),
            other => Err(ConfigError::UnsupportedSandbox(other.to_string())),
        }
    }
}

/// Derived ledger. Task counts come from [`Backlog::recalculate`]; iteration
/// counters are only advanced by the loop controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Progress {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub status: ProgressStatus,
    pub total_iterations_run: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_iteration_at: Option<DateTime<Utc>>,
    pub discovery_iterations: u32,
    pub impl_iterations: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not_started",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
        }
    }
}

impl Backlog {
    pub fn new(project_name: impl Into<String>, config: RunConfig, now: DateTime<Utc>) -> Self {
        Self {
            version: BACKLOG_VERSION,
            project: Project {
                name: project_name.into(),
                description: None,
                created_at: now,
                updated_at: now,
            },
            config,
            tasks: Vec::new(),
            progress: Progress::default(),
        }
    }

    pub fn find_task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Append a task. Rejects malformed and colliding ids without mutating.
    pub fn add_task(&mut self, task: Task) -> Result<(), TaskError> {
        validate_task_id(&task.id)?;
        if task.title.trim().is_empty() {
            return Err(TaskError::EmptyTitle(task.id));
        }
        if self.find_task(&task.id).is_some() {
            return Err(TaskError::DuplicateId(task.id));
        }
        self.tasks.push(task);
        Ok(())
    }

    pub fn complete_task(
        &mut self,
        id: &str,
        commit_sha: Option<String>,
        iteration: Option<u32>,
    ) -> Result<(), TaskError> {
        self.transition(
            id,
            TaskEvent::Complete {
                commit_sha,
                iteration,
            },
        )
    }

    pub fn skip_task(&mut self, id: &str) -> Result<(), TaskError> {
        self.transition(id, TaskEvent::Skip)
    }

    pub fn block_task(&mut self, id: &str) -> Result<(), TaskError> {
        self.transition(id, TaskEvent::Block)
    }

    pub fn reset_task(&mut self, id: &str) -> Result<(), TaskError> {
        self.transition(id, TaskEvent::Reset)
    }

    fn transition(&mut self, id: &str, event: TaskEvent) -> Result<(), TaskError> {
        let task = self
            .tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;
        apply_event(task, event);
        Ok(())
    }

    /// First pending task in list order.
    pub fn next_task(&self) -> Option<&Task> {
        next_pending(&self.tasks)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|task| task.status == status).count()
    }

    pub fn pending_count(&self) -> usize {
        self.count(TaskStatus::Pending)
    }

    pub fn recalculate(&mut self) {
        recalculate(&self.tasks, &mut self.progress);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.project.updated_at = now;
    }

    /// Advance the iteration counters for one finished iteration.
    pub fn record_iteration(&mut self, kind: IterationKind, at: DateTime<Utc>) {
        self.progress.total_iterations_run += 1;
        self.progress.last_iteration_at = Some(at);
        match kind {
            IterationKind::Discovery => self.progress.discovery_iterations += 1,
            IterationKind::Implementation => self.progress.impl_iterations += 1,
        }
    }

    /// Switch the backlog into pilot mode, keeping an existing pilot config.
    pub fn enable_pilot(&mut self) {
        self.config.pilot_mode = true;
        if self.config.pilot_config.is_none() {
            self.config.pilot_config = Some(PilotConfig::default());
        }
    }

    /// Next free id of the form `task-N`.
    ///
    /// Past the largest representable suffix, falls back to the lowest unused one.
    pub fn next_task_id(&self) -> String {
        let used: HashSet<u64> = self
            .tasks
            .iter()
            .filter_map(|task| task.id.strip_prefix("task-"))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .collect();
        let next = match used.iter().max() {
            None => 1,
            Some(max) => max
                .checked_add(1)
                .or_else(|| (1..).find(|n| !used.contains(n)))
                .unwrap_or(1),
        };
        format!("task-{next}")
    }
}
