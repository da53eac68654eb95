//! Multi-iteration loop controller for `taskloop run` (plain mode).
//!
//! The backlog is reloaded before every decision and saved after every
//! iteration; nothing is cached across iterations because the agent rewrites
//! the same file while it runs. Pilot mode ([`crate::pilot`]) reuses the
//! iteration machinery here and adds discovery scheduling.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::backlog::{AiTool, Backlog, TaskStatus};
use crate::core::failures::FailureTracker;
use crate::core::types::{IterationKind, LoopStop};
use crate::error::{AgentError, ConfigError};
use crate::io::agent::{Agent, AgentRequest, SandboxSpec};
use crate::io::backlog_store::{load_backlog, save_backlog};
use crate::io::config::{LoopSettings, load_settings};
use crate::io::init::ProjectPaths;
use crate::io::iteration_log::{IterationMeta, IterationPaths, new_run_id, write_meta};
use crate::io::sandbox::{SandboxProbe, ensure_sandbox_available};

/// Announcements made while a loop runs. Purely informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopEvent {
    Started {
        run_id: String,
        pilot: bool,
        max_iterations: u32,
    },
    Implementing {
        iteration: u32,
        task_id: String,
        title: String,
    },
    Discovering {
        iteration: u32,
    },
    TasksDiscovered {
        iteration: u32,
        added: usize,
    },
    EmptyDiscovery {
        iteration: u32,
        streak: u32,
        limit: u32,
    },
    AgentFailed {
        iteration: u32,
        consecutive: u32,
        threshold: u32,
        message: String,
    },
    Stopped(LoopStop),
}

/// Reporting hooks. Observers cannot influence control flow.
pub trait LoopObserver {
    fn on_iteration_start(&mut self, _iteration: u32, _kind: IterationKind) {}
    fn on_iteration_end(&mut self, _iteration: u32, _error: Option<&AgentError>) {}
    fn report(&mut self, _event: &LoopEvent) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl LoopObserver for NoopObserver {}

/// Inter-iteration pause.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Collaborators a loop run needs besides the project directory.
pub struct LoopDeps<'a> {
    pub agent: &'a dyn Agent,
    pub probe: &'a dyn SandboxProbe,
    pub sleeper: &'a dyn Sleeper,
}

/// Per-run overrides from the command line.
#[derive(Debug, Clone, Default)]
pub struct LoopOptions {
    /// Overrides `config.maxIterations`.
    pub max_iterations: Option<u32>,
    /// Overrides `pause_secs` from `loop.toml`.
    pub pause: Option<Duration>,
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSummary {
    pub run_id: String,
    pub stop: LoopStop,
    pub iterations_run: u32,
    pub discovery_iterations: u32,
    pub implementation_iterations: u32,
    /// Sum of task-count increases over successful discoveries.
    pub tasks_generated: usize,
    /// Tasks that became `completed` during the run.
    pub tasks_completed: usize,
    /// Pending tasks left at the end.
    pub tasks_remaining: usize,
}

/// Run the plain loop: implement pending tasks one per iteration until none is
/// left or the iteration budget is spent.
pub fn run_loop(
    root: &Path,
    options: &LoopOptions,
    deps: &LoopDeps<'_>,
    observer: &mut dyn LoopObserver,
) -> Result<LoopSummary> {
    let mut run = LoopRun::prepare(root, options, deps, false)?;
    observer.report(&run.started_event());

    let mut stop = LoopStop::MaxIterations {
        max_iterations: run.max_iterations,
    };
    for iteration in 1..=run.max_iterations {
        let backlog = run.reload()?;
        let Some(task) = backlog.next_task() else {
            stop = LoopStop::AllDone;
            break;
        };
        observer.report(&LoopEvent::Implementing {
            iteration,
            task_id: task.id.clone(),
            title: task.title.clone(),
        });

        let prompt_path = run.paths.prompt_path(&backlog.config);
        let task_id = task.id.clone();
        let outcome = run.iteration(
            iteration,
            IterationKind::Implementation,
            &prompt_path,
            Some(task_id),
            backlog.tasks.len(),
            observer,
        )?;
        run.track_failures(iteration, &outcome, observer)?;

        if outcome.backlog.next_task().is_none() {
            stop = LoopStop::AllDone;
            break;
        }
        run.pause_unless_last(iteration);
    }

    run.finish(stop, observer)
}

/// Result of one agent invocation plus the saved backlog afterwards.
pub(crate) struct IterationOutcome {
    pub result: Result<(), AgentError>,
    pub backlog: Backlog,
    pub tasks_before: usize,
    pub tasks_after: usize,
}

/// State shared by the plain and pilot loops for a single run.
pub(crate) struct LoopRun<'a> {
    pub paths: ProjectPaths,
    pub settings: LoopSettings,
    pub deps: &'a LoopDeps<'a>,
    pub run_id: String,
    pub max_iterations: u32,
    pub pilot: bool,
    pub pause: Duration,
    pub tool: AiTool,
    pub sandbox: SandboxSpec,
    pub failures: FailureTracker,
    pub iterations_run: u32,
    pub discovery_iterations: u32,
    pub implementation_iterations: u32,
    pub tasks_generated: usize,
    completed_at_start: usize,
}

impl<'a> LoopRun<'a> {
    /// Load settings and backlog, then check prompts and the sandbox. Any
    /// problem here is fatal before the first iteration.
    pub fn prepare(
        root: &Path,
        options: &LoopOptions,
        deps: &'a LoopDeps<'a>,
        pilot: bool,
    ) -> Result<Self> {
        let paths = ProjectPaths::new(root);
        let settings = load_settings(&paths.settings_path)?;
        let backlog = load_backlog(&paths.backlog_path)?;
        if pilot && !backlog.config.pilot_mode {
            return Err(ConfigError::NotPilotMode.into());
        }

        let mut prompts = vec![paths.prompt_path(&backlog.config)];
        if pilot {
            prompts.push(paths.discover_prompt_path.clone());
        }
        if let Some(path) = prompts.into_iter().find(|path| !path.is_file()) {
            return Err(ConfigError::MissingPrompt { path }.into());
        }

        let sandbox = SandboxSpec::from_config(&backlog.config)?;
        ensure_sandbox_available(deps.probe, &sandbox)?;

        let max_iterations = options
            .max_iterations
            .unwrap_or(backlog.config.max_iterations);
        let run_id = new_run_id(Utc::now());
        info!(
            run_id = %run_id,
            pilot,
            max_iterations,
            tool = %backlog.config.ai_tool,
            sandbox = %sandbox.mode(),
            "starting loop"
        );
        Ok(Self {
            pause: options.pause.unwrap_or_else(|| settings.pause()),
            failures: FailureTracker::new(settings.max_consecutive_failures),
            completed_at_start: backlog.count(TaskStatus::Completed),
            paths,
            settings,
            deps,
            run_id,
            max_iterations,
            pilot,
            tool: backlog.config.ai_tool,
            sandbox,
            iterations_run: 0,
            discovery_iterations: 0,
            implementation_iterations: 0,
            tasks_generated: 0,
        })
    }

    pub fn started_event(&self) -> LoopEvent {
        LoopEvent::Started {
            run_id: self.run_id.clone(),
            pilot: self.pilot,
            max_iterations: self.max_iterations,
        }
    }

    pub fn reload(&self) -> Result<Backlog> {
        Ok(load_backlog(&self.paths.backlog_path)?)
    }

    /// Invoke the agent once, then reload, bump the iteration counters, save,
    /// and write the iteration record.
    pub fn iteration(
        &mut self,
        iteration: u32,
        kind: IterationKind,
        prompt_path: &Path,
        task_id: Option<String>,
        tasks_before: usize,
        observer: &mut dyn LoopObserver,
    ) -> Result<IterationOutcome> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let record_paths = IterationPaths::new(&self.paths.iterations_dir, &self.run_id, iteration);
        record_paths.create()?;

        observer.on_iteration_start(iteration, kind);
        let request = AgentRequest {
            workdir: self.paths.root.clone(),
            prompt_path: prompt_path.to_path_buf(),
            tool: self.tool,
            sandbox: self.sandbox.clone(),
            log_path: Some(record_paths.agent_log_path.clone()),
            output_limit_bytes: self.settings.output_limit_bytes,
        };
        let result = self.deps.agent.run(&request);
        observer.on_iteration_end(iteration, result.as_ref().err());

        self.iterations_run += 1;
        match kind {
            IterationKind::Discovery => self.discovery_iterations += 1,
            IterationKind::Implementation => self.implementation_iterations += 1,
        }

        let mut backlog = self
            .reload()
            .context("reload backlog after agent iteration")?;
        backlog.record_iteration(kind, Utc::now());
        save_backlog(&self.paths.backlog_path, &mut backlog)?;
        let tasks_after = backlog.tasks.len();

        write_meta(
            &record_paths,
            &IterationMeta {
                run_id: self.run_id.clone(),
                iter: iteration,
                kind,
                task_id,
                success: result.is_ok(),
                error: result.as_ref().err().map(describe_error),
                started_at,
                duration_ms: u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX),
                tasks_before,
                tasks_after,
            },
        )?;

        Ok(IterationOutcome {
            result,
            backlog,
            tasks_before,
            tasks_after,
        })
    }

    /// Warn on failure, reset on success, abort at the threshold.
    pub fn track_failures(
        &mut self,
        iteration: u32,
        outcome: &IterationOutcome,
        observer: &mut dyn LoopObserver,
    ) -> Result<()> {
        let Err(err) = &outcome.result else {
            self.failures.record_success();
            return Ok(());
        };
        let message = describe_error(err);
        match self.failures.record_failure() {
            Ok(consecutive) => {
                warn!(
                    iteration,
                    consecutive,
                    threshold = self.failures.threshold(),
                    err = %message,
                    "agent iteration failed"
                );
                observer.report(&LoopEvent::AgentFailed {
                    iteration,
                    consecutive,
                    threshold: self.failures.threshold(),
                    message,
                });
                Ok(())
            }
            Err(abort) => {
                warn!(iteration, err = %message, "consecutive failure threshold reached");
                Err(abort.into())
            }
        }
    }

    pub fn pause_unless_last(&self, iteration: u32) {
        if iteration < self.max_iterations {
            self.deps.sleeper.sleep(self.pause);
        }
    }

    /// Reload, recalculate, persist, and summarize.
    pub fn finish(self, stop: LoopStop, observer: &mut dyn LoopObserver) -> Result<LoopSummary> {
        let mut backlog = self.reload()?;
        save_backlog(&self.paths.backlog_path, &mut backlog)?;
        info!(run_id = %self.run_id, ?stop, iterations = self.iterations_run, "loop finished");
        observer.report(&LoopEvent::Stopped(stop.clone()));
        Ok(LoopSummary {
            run_id: self.run_id,
            stop,
            iterations_run: self.iterations_run,
            discovery_iterations: self.discovery_iterations,
            implementation_iterations: self.implementation_iterations,
            tasks_generated: self.tasks_generated,
            tasks_completed: backlog
                .count(TaskStatus::Completed)
                .saturating_sub(self.completed_at_start),
            tasks_remaining: backlog.pending_count(),
        })
    }
}

/// Error message including its source chain.
fn describe_error(err: &AgentError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
