//! Error taxonomy shared by the store, the task commands, and the loop.
//!
//! Orchestration code returns `anyhow::Result` and wraps these typed errors;
//! callers that need the kind (exit codes, loop tests) use `downcast_ref`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::backlog::{AiTool, SandboxMode};

/// Failures loading or saving the backlog document.
#[derive(Debug, Error)]
pub enum BacklogError {
    #[error("no backlog found at {} (run `taskloop init` or `taskloop pilot-init` first)", path.display())]
    NotFound { path: PathBuf },

    #[error("backlog {} is corrupted: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("backlog {} failed validation:\n- {}", path.display(), join_errors(errors))]
    Invalid {
        path: PathBuf,
        errors: Vec<ValidationError>,
    },

    #[error("failed to access backlog {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Rejected task-management operations. Never fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("task `{0}` already exists")]
    DuplicateId(String),

    #[error("task `{0}` not found (see `taskloop task list`)")]
    NotFound(String),

    #[error("invalid task id `{id}`: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("task `{0}` needs a non-empty title")]
    EmptyTitle(String),
}

/// Configuration problems detected before any iteration runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported AI tool `{0}` (expected one of: claude, codex, gemini, opencode, amp)")]
    UnsupportedAiTool(String),

    #[error("unsupported sandbox mode `{0}` (expected one of: none, container, isolated-vm)")]
    UnsupportedSandbox(String),

    #[error("unsupported priority `{0}` (expected one of: low, medium, high)")]
    UnsupportedPriority(String),

    #[error("sandbox `{mode}` requires `{field}` in the backlog config")]
    MissingSandboxSetting {
        mode: SandboxMode,
        field: &'static str,
    },

    #[error("sandbox `{mode}` is not available: {reason}")]
    SandboxUnavailable { mode: SandboxMode, reason: String },

    #[error("prompt file {} is missing (re-run `taskloop init --force` to regenerate it)", path.display())]
    MissingPrompt { path: PathBuf },

    #[error("backlog is not in pilot mode (run `taskloop pilot-init`)")]
    NotPilotMode,
}

/// One failed agent invocation. Counted toward the consecutive-failure
/// threshold, never fatal on its own.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to read prompt {}", path.display())]
    PromptUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch `{program}`: {message}")]
    Launch { program: String, message: String },

    #[error("{tool} exited with {}", describe_exit(*code, stderr_tail.as_deref()))]
    Failed {
        tool: AiTool,
        code: Option<i32>,
        stderr_tail: Option<String>,
    },
}

/// Fatal run aborts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoopError {
    #[error(
        "aborting after {threshold} consecutive agent failures; check the agent's authentication and configuration"
    )]
    TooManyFailures { threshold: u32 },
}

/// One structural problem found by backlog validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// JSON-pointer-like location, e.g. `tasks[2].id`.
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

fn describe_exit(code: Option<i32>, stderr_tail: Option<&str>) -> String {
    let mut out = match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    };
    if let Some(tail) = stderr_tail {
        out.push_str(&format!(": {tail}"));
    }
    out
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n- ")
}
