//! Autonomous iteration controller for AI coding agents.
//!
//! Keeps a task backlog in `.taskloop/backlog.json` and drives an agent CLI
//! through it one iteration at a time (`run`), or alternates discovery and
//! implementation iterations until the project runs dry (`pilot`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use taskloop::backlog::{AiTool, PilotConfig, Priority, SandboxMode};
use taskloop::core::types::{IterationKind, LoopStop};
use taskloop::error::{AgentError, BacklogError, LoopError};
use taskloop::exit_codes;
use taskloop::io::agent::CliAgent;
use taskloop::io::config::load_settings;
use taskloop::io::init::{InitOptions, ProjectPaths, init_project};
use taskloop::io::sandbox::SystemSandboxProbe;
use taskloop::logging;
use taskloop::looping::{
    LoopDeps, LoopEvent, LoopObserver, LoopOptions, LoopSummary, ThreadSleeper, run_loop,
};
use taskloop::pilot::run_pilot;
use taskloop::status::{load_status, render_status, task_tree_lines};
use taskloop::tasks::{self, NewTask};
use taskloop::validate::check_project;

#[derive(Parser)]
#[command(
    name = "taskloop",
    version,
    about = "Drive an AI coding agent through a task backlog"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.taskloop/` with a backlog and an implementation prompt.
    Init(InitArgs),
    /// Like `init`, but in pilot mode with a discovery prompt.
    PilotInit {
        #[command(flatten)]
        init: InitArgs,
        /// Iterations between discovery runs.
        #[arg(long, default_value_t = 5)]
        discover_interval: u32,
        /// Most tasks a single discovery run may add.
        #[arg(long, default_value_t = 10)]
        max_discovery_tasks: u32,
        /// Area the discovery prompt should concentrate on.
        #[arg(long)]
        focus: Option<String>,
    },
    /// Manage backlog tasks.
    #[command(subcommand)]
    Task(TaskCommand),
    /// Print progress and the task list.
    Status,
    /// Check backlog, prompts, loop settings, and sandbox.
    Validate,
    /// Implement pending tasks, one per iteration.
    Run(LoopArgs),
    /// Alternate discovery and implementation iterations.
    Pilot(LoopArgs),
}

#[derive(Args)]
struct InitArgs {
    /// Project name (defaults to the directory name).
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
    /// Agent CLI: claude, codex, gemini, opencode, amp.
    #[arg(long, default_value = "claude")]
    tool: AiTool,
    /// Isolation: none, container, isolated-vm.
    #[arg(long, default_value = "none")]
    sandbox: SandboxMode,
    /// Container image for `--sandbox container`.
    #[arg(long)]
    image: Option<String>,
    /// VM template for `--sandbox isolated-vm`.
    #[arg(long)]
    template: Option<String>,
    #[arg(long)]
    max_iterations: Option<u32>,
    /// Import tasks from a JSON array or a markdown checklist.
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,
    /// Overwrite an existing backlog and prompts.
    #[arg(short, long)]
    force: bool,
}

impl InitArgs {
    fn into_options(self, pilot: Option<PilotConfig>) -> InitOptions {
        InitOptions {
            name: self.name,
            description: self.description,
            ai_tool: self.tool,
            sandbox: self.sandbox,
            sandbox_image: self.image,
            sandbox_template: self.template,
            max_iterations: self.max_iterations,
            pilot,
            import: self.import,
            force: self.force,
        }
    }
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Append a pending task.
    Add {
        title: String,
        /// Explicit id (defaults to the next `task-N`).
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long, default_value = "medium")]
        priority: Priority,
        #[arg(long)]
        description: Option<String>,
    },
    /// Mark a task completed.
    Complete {
        id: String,
        /// Commit to record (defaults to git `HEAD` when available).
        #[arg(long, value_name = "SHA")]
        commit: Option<String>,
        #[arg(long)]
        iteration: Option<u32>,
    },
    /// Mark a task skipped.
    Skip { id: String },
    /// Return a task to pending.
    Reset { id: String },
    /// Mark a task blocked.
    Block { id: String },
    /// Print the next pending task (exit 2 if none).
    Next,
    /// Print every task, children indented under parents.
    List,
}

#[derive(Args)]
struct LoopArgs {
    /// Iteration budget (overrides `config.maxIterations`).
    #[arg(long, value_name = "N")]
    iterations: Option<u32>,
    /// Seconds to pause between iterations (overrides `loop.toml`).
    #[arg(long, value_name = "SECS")]
    pause: Option<u64>,
}

impl LoopArgs {
    fn options(&self) -> LoopOptions {
        LoopOptions {
            max_iterations: self.iterations,
            pause: self.pause.map(Duration::from_secs),
        }
    }
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = std::env::current_dir().context("resolve current directory")?;
    match cli.command {
        Command::Init(args) => cmd_init(&root, args.into_options(None)),
        Command::PilotInit {
            init,
            discover_interval,
            max_discovery_tasks,
            focus,
        } => {
            let pilot = PilotConfig {
                discover_interval,
                max_discovery_tasks,
                focus,
            };
            cmd_init(&root, init.into_options(Some(pilot)))
        }
        Command::Task(command) => cmd_task(&root, command),
        Command::Status => {
            print!("{}", render_status(&load_status(&root)?));
            Ok(exit_codes::OK)
        }
        Command::Validate => cmd_validate(&root),
        Command::Run(args) => cmd_loop(&root, &args, false),
        Command::Pilot(args) => cmd_loop(&root, &args, true),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<LoopError>().is_some() {
        return exit_codes::ABORTED;
    }
    match err.downcast_ref::<BacklogError>() {
        Some(BacklogError::NotFound { .. }) => exit_codes::NOT_INITIALIZED,
        _ => exit_codes::INVALID,
    }
}

fn cmd_init(root: &Path, options: InitOptions) -> Result<i32> {
    let backlog = init_project(root, &options)?;
    let mode = if backlog.config.pilot_mode {
        "pilot"
    } else {
        "plain"
    };
    println!(
        "Initialized {} ({mode} mode, {}, {} task(s))",
        backlog.project.name,
        backlog.config.ai_tool,
        backlog.tasks.len()
    );
    if !backlog.config.quality_checks.is_empty() {
        println!("Quality checks: {}", backlog.config.quality_checks.join(", "));
    }
    Ok(exit_codes::OK)
}

fn cmd_task(root: &Path, command: TaskCommand) -> Result<i32> {
    let task = match command {
        TaskCommand::Add {
            title,
            id,
            parent,
            priority,
            description,
        } => tasks::add_task(
            root,
            NewTask {
                id,
                title,
                parent_id: parent,
                priority,
                description,
            },
        )?,
        TaskCommand::Complete {
            id,
            commit,
            iteration,
        } => tasks::complete_task(root, &id, commit, iteration)?,
        TaskCommand::Skip { id } => tasks::skip_task(root, &id)?,
        TaskCommand::Reset { id } => tasks::reset_task(root, &id)?,
        TaskCommand::Block { id } => tasks::block_task(root, &id)?,
        TaskCommand::Next => {
            return Ok(match tasks::next_task(root)? {
                Some(task) => {
                    println!("{}\t{}", task.id, task.title);
                    exit_codes::OK
                }
                None => {
                    eprintln!("no pending tasks");
                    exit_codes::NOTHING_LEFT
                }
            });
        }
        TaskCommand::List => {
            for line in task_tree_lines(&load_status(root)?.tasks) {
                println!("{line}");
            }
            return Ok(exit_codes::OK);
        }
    };
    println!("{} {}: {}", task.id, task.status, task.title);
    Ok(exit_codes::OK)
}

fn cmd_validate(root: &Path) -> Result<i32> {
    let settings = load_settings(&ProjectPaths::new(root).settings_path).unwrap_or_default();
    let probe = SystemSandboxProbe {
        timeout: settings.probe_timeout(),
    };
    let report = check_project(root, &probe)?;
    if report.is_healthy() {
        println!("ok");
        return Ok(exit_codes::OK);
    }
    for problem in &report.problems {
        println!("- {problem}");
    }
    Ok(exit_codes::INVALID)
}

fn cmd_loop(root: &Path, args: &LoopArgs, pilot: bool) -> Result<i32> {
    let settings = load_settings(&ProjectPaths::new(root).settings_path)?;
    let probe = SystemSandboxProbe {
        timeout: settings.probe_timeout(),
    };
    let deps = LoopDeps {
        agent: &CliAgent,
        probe: &probe,
        sleeper: &ThreadSleeper,
    };
    let mut observer = ConsoleObserver;
    let summary = if pilot {
        let outcome = run_pilot(root, &args.options(), &deps, &mut observer)?;
        outcome.summary
    } else {
        run_loop(root, &args.options(), &deps, &mut observer)?
    };
    print_summary(&summary);
    Ok(exit_codes::OK)
}

fn print_summary(summary: &LoopSummary) {
    println!(
        "{}: {} iteration(s) ({} discovery, {} implementation), {} task(s) generated, {} completed, {} pending",
        summary.run_id,
        summary.iterations_run,
        summary.discovery_iterations,
        summary.implementation_iterations,
        summary.tasks_generated,
        summary.tasks_completed,
        summary.tasks_remaining
    );
}

/// Prints one progress line per loop event to stdout.
struct ConsoleObserver;

impl LoopObserver for ConsoleObserver {
    fn on_iteration_start(&mut self, iteration: u32, kind: IterationKind) {
        println!("[{iteration}] {kind} iteration started");
    }

    fn on_iteration_end(&mut self, iteration: u32, error: Option<&AgentError>) {
        if error.is_none() {
            println!("[{iteration}] agent finished");
        }
    }

    fn report(&mut self, event: &LoopEvent) {
        match event {
            LoopEvent::Started {
                run_id,
                pilot,
                max_iterations,
            } => {
                let mode = if *pilot { "pilot" } else { "plain" };
                println!("{run_id}: {mode} loop, up to {max_iterations} iteration(s)");
            }
            LoopEvent::Implementing {
                iteration,
                task_id,
                title,
            } => println!("[{iteration}] implementing {task_id}: {title}"),
            LoopEvent::Discovering { iteration } => {
                println!("[{iteration}] discovering new tasks");
            }
            LoopEvent::TasksDiscovered { iteration, added } => {
                println!("[{iteration}] discovery added {added} task(s)");
            }
            LoopEvent::EmptyDiscovery {
                iteration,
                streak,
                limit,
            } => println!("[{iteration}] discovery found nothing new ({streak}/{limit})"),
            LoopEvent::AgentFailed {
                iteration,
                consecutive,
                threshold,
                message,
            } => println!("[{iteration}] agent failed ({consecutive}/{threshold}): {message}"),
            LoopEvent::Stopped(stop) => println!("{}", describe_stop(stop)),
        }
    }
}

fn describe_stop(stop: &LoopStop) -> String {
    match stop {
        LoopStop::AllDone => "All tasks done.".to_string(),
        LoopStop::NoNewTasks { empty_discoveries } => format!(
            "No new tasks after {empty_discoveries} empty discovery iteration(s); stopping."
        ),
        LoopStop::MaxIterations { max_iterations } => {
            format!("Reached the iteration limit ({max_iterations}).")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_defaults() {
        let cli = Cli::parse_from(["taskloop", "init"]);
        let Command::Init(args) = cli.command else {
            panic!("expected init");
        };
        assert_eq!(args.tool, AiTool::Claude);
        assert_eq!(args.sandbox, SandboxMode::None);
        assert!(!args.force);
    }

    #[test]
    fn parse_pilot_init_with_sandbox() {
        let cli = Cli::parse_from([
            "taskloop",
            "pilot-init",
            "--tool",
            "codex",
            "--sandbox",
            "docker",
            "--image",
            "node:22",
            "--discover-interval",
            "3",
        ]);
        let Command::PilotInit {
            init,
            discover_interval,
            max_discovery_tasks,
            ..
        } = cli.command
        else {
            panic!("expected pilot-init");
        };
        assert_eq!(init.tool, AiTool::Codex);
        assert_eq!(init.sandbox, SandboxMode::Container);
        assert_eq!(init.image.as_deref(), Some("node:22"));
        assert_eq!(discover_interval, 3);
        assert_eq!(max_discovery_tasks, 10);
    }

    #[test]
    fn rejects_unknown_tool() {
        assert!(Cli::try_parse_from(["taskloop", "init", "--tool", "cursor"]).is_err());
    }

    #[test]
    fn parse_task_add_and_loop_overrides() {
        let cli = Cli::parse_from([
            "taskloop", "task", "add", "Fix login", "--parent", "task-1", "--priority", "high",
        ]);
        let Command::Task(TaskCommand::Add {
            title,
            parent,
            priority,
            ..
        }) = cli.command
        else {
            panic!("expected task add");
        };
        assert_eq!(title, "Fix login");
        assert_eq!(parent.as_deref(), Some("task-1"));
        assert_eq!(priority, Priority::High);

        let cli = Cli::parse_from(["taskloop", "pilot", "--iterations", "4", "--pause", "0"]);
        let Command::Pilot(args) = cli.command else {
            panic!("expected pilot");
        };
        let options = args.options();
        assert_eq!(options.max_iterations, Some(4));
        assert_eq!(options.pause, Some(Duration::ZERO));
    }

    #[test]
    fn loop_abort_maps_to_aborted() {
        let err = anyhow::Error::from(LoopError::TooManyFailures { threshold: 5 });
        assert_eq!(exit_code_for(&err), exit_codes::ABORTED);

        let err = anyhow::Error::from(BacklogError::NotFound {
            path: PathBuf::from(".taskloop/backlog.json"),
        })
        .context("load backlog");
        assert_eq!(exit_code_for(&err), exit_codes::NOT_INITIALIZED);

        assert_eq!(exit_code_for(&anyhow::anyhow!("boom")), exit_codes::INVALID);
    }
}
