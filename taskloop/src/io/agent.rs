//! Agent abstraction for one iteration's external-process invocation.
//!
//! The [`Agent`] trait decouples the loop controller from the actual coding
//! agent. Tests use scripted agents that edit the backlog on disk instead of
//! spawning processes.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, instrument, warn};

use crate::backlog::{AiTool, RunConfig, SandboxMode};
use crate::error::{AgentError, ConfigError};
use crate::io::process::{CommandOutput, run_command_with_stream};

/// Resolved sandbox settings for the agent process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxSpec {
    None,
    Container { image: String },
    IsolatedVm { template: String },
}

impl SandboxSpec {
    /// Resolve the sandbox from the backlog config, rejecting a mode whose
    /// image/template is missing.
    pub fn from_config(config: &RunConfig) -> Result<Self, ConfigError> {
        let required = |value: &Option<String>, field: &'static str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .ok_or(ConfigError::MissingSandboxSetting {
                    mode: config.sandbox,
                    field,
                })
        };
        match config.sandbox {
            SandboxMode::None => Ok(SandboxSpec::None),
            SandboxMode::Container => Ok(SandboxSpec::Container {
                image: required(&config.sandbox_image, "sandboxImage")?,
            }),
            SandboxMode::IsolatedVm => Ok(SandboxSpec::IsolatedVm {
                template: required(&config.sandbox_template, "sandboxTemplate")?,
            }),
        }
    }

    pub fn mode(&self) -> SandboxMode {
        match self {
            SandboxSpec::None => SandboxMode::None,
            SandboxSpec::Container { .. } => SandboxMode::Container,
            SandboxSpec::IsolatedVm { .. } => SandboxMode::IsolatedVm,
        }
    }
}

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Project root; the agent runs here (or has it mounted).
    pub workdir: PathBuf,
    /// Prompt file fed to the agent. Opaque to the loop.
    pub prompt_path: PathBuf,
    pub tool: AiTool,
    pub sandbox: SandboxSpec,
    /// Agent stdout is streamed here line by line; stderr is appended at exit.
    pub log_path: Option<PathBuf>,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over agent backends.
pub trait Agent {
    /// Run the agent to completion. A non-zero exit or a spawn failure is the
    /// only failure signal; the agent may have rewritten the backlog either way.
    fn run(&self, request: &AgentRequest) -> Result<(), AgentError>;
}

/// How a tool receives its prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptDelivery {
    Stdin,
    Argument,
}

/// Non-interactive command line for each supported tool.
fn tool_argv(tool: AiTool) -> &'static [&'static str] {
    match tool {
        AiTool::Claude => &["claude", "-p", "--dangerously-skip-permissions"],
        AiTool::Codex => &[
            "codex",
            "exec",
            "--sandbox",
            "danger-full-access",
            "--skip-git-repo-check",
            "-",
        ],
        AiTool::Gemini => &["gemini", "--yolo"],
        AiTool::Opencode => &["opencode", "run"],
        AiTool::Amp => &["amp", "--dangerously-allow-all", "-x"],
    }
}

fn prompt_delivery(tool: AiTool) -> PromptDelivery {
    match tool {
        AiTool::Opencode => PromptDelivery::Argument,
        AiTool::Claude | AiTool::Codex | AiTool::Gemini | AiTool::Amp => PromptDelivery::Stdin,
    }
}

/// Fully resolved process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub stdin: Option<String>,
}

impl Invocation {
    /// Build the argv for `tool`, wrapped for the sandbox.
    pub fn new(tool: AiTool, sandbox: &SandboxSpec, workdir: &Path, prompt: String) -> Self {
        let mut agent_argv: Vec<String> =
            tool_argv(tool).iter().map(|arg| (*arg).to_string()).collect();
        let stdin = match prompt_delivery(tool) {
            PromptDelivery::Stdin => Some(prompt),
            PromptDelivery::Argument => {
                agent_argv.push(prompt);
                None
            }
        };

        let mut argv = match sandbox {
            SandboxSpec::None => Vec::new(),
            SandboxSpec::Container { image } => vec![
                "docker".to_string(),
                "run".to_string(),
                "--rm".to_string(),
                "-i".to_string(),
                "-v".to_string(),
                format!("{}:/workspace", workdir.display()),
                "-w".to_string(),
                "/workspace".to_string(),
                image.clone(),
            ],
            SandboxSpec::IsolatedVm { template } => vec![
                "limactl".to_string(),
                "shell".to_string(),
                "--workdir".to_string(),
                workdir.display().to_string(),
                template.clone(),
            ],
        };
        argv.extend(agent_argv);
        Self { argv, stdin }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    fn command(&self, workdir: &Path) -> Command {
        let mut cmd = Command::new(self.program());
        cmd.args(&self.argv[1..]).current_dir(workdir);
        cmd
    }
}

/// Agent that spawns the configured CLI tool.
pub struct CliAgent;

impl Agent for CliAgent {
    #[instrument(skip_all, fields(tool = %request.tool, sandbox = %request.sandbox.mode()))]
    fn run(&self, request: &AgentRequest) -> Result<(), AgentError> {
        let prompt = fs::read_to_string(&request.prompt_path).map_err(|source| {
            AgentError::PromptUnreadable {
                path: request.prompt_path.clone(),
                source,
            }
        })?;
        let invocation = Invocation::new(request.tool, &request.sandbox, &request.workdir, prompt);
        info!(
            program = invocation.program(),
            workdir = %request.workdir.display(),
            "starting agent"
        );

        let output = run_command_with_stream(
            invocation.command(&request.workdir),
            invocation.stdin.as_deref().map(str::as_bytes),
            None,
            request.output_limit_bytes,
            request.log_path.as_deref(),
        )
        .map_err(|err| AgentError::Launch {
            program: invocation.program().to_string(),
            message: format!("{err:#}"),
        })?;

        if let Some(log_path) = &request.log_path {
            append_stderr_log(log_path, &output);
        }

        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            return Err(AgentError::Failed {
                tool: request.tool,
                code: output.status.code(),
                stderr_tail: output.stderr_tail(),
            });
        }

        debug!("agent completed successfully");
        Ok(())
    }
}

/// Append captured stderr after the streamed stdout. Log problems never fail
/// the iteration.
fn append_stderr_log(path: &Path, output: &CommandOutput) {
    let mut buf = String::from("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    buf.push_str(&output.truncated_notice("agent"));
    let result = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(buf.as_bytes()));
    if let Err(err) = result {
        warn!(err = %err, path = %path.display(), "failed to write agent log");
    }
}
