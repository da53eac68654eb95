//! Pilot mode: the loop alternates discovery iterations (the agent adds tasks)
//! with implementation iterations (the agent works the next pending task).

use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::core::scheduler::{DiscoveryResult, DiscoveryState, stop_before_iteration};
use crate::core::types::{IterationKind, LoopStop};
use crate::error::ConfigError;
use crate::io::init::{PilotSetup, ensure_pilot_backlog};
use crate::looping::{LoopDeps, LoopEvent, LoopObserver, LoopOptions, LoopRun, LoopSummary};

/// Outcome of [`run_pilot`]: what auto-initialization did, then the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PilotSummary {
    pub setup: PilotSetup,
    pub summary: LoopSummary,
}

/// Run the pilot loop, creating or upgrading the backlog first if needed.
pub fn run_pilot(
    root: &Path,
    options: &LoopOptions,
    deps: &LoopDeps<'_>,
    observer: &mut dyn LoopObserver,
) -> Result<PilotSummary> {
    let setup = ensure_pilot_backlog(root)?;
    info!(?setup, "pilot backlog ready");

    let mut run = LoopRun::prepare(root, options, deps, true)?;
    let pilot_config = run
        .reload()?
        .config
        .pilot_config
        .ok_or(ConfigError::NotPilotMode)?;
    let interval = pilot_config.discover_interval;
    let empty_limit = run.settings.empty_discovery_limit;
    observer.report(&run.started_event());

    let mut discovery = DiscoveryState::default();
    let mut stop = LoopStop::MaxIterations {
        max_iterations: run.max_iterations,
    };
    for iteration in 1..=run.max_iterations {
        let backlog = run.reload()?;
        let kind = discovery.kind_for(iteration, interval);
        let next = backlog.next_task();
        if let Some(early) = stop_before_iteration(kind, next.is_some()) {
            stop = early;
            break;
        }

        let (prompt_path, task_id) = match (kind, next) {
            (IterationKind::Implementation, Some(task)) => {
                observer.report(&LoopEvent::Implementing {
                    iteration,
                    task_id: task.id.clone(),
                    title: task.title.clone(),
                });
                (run.paths.prompt_path(&backlog.config), Some(task.id.clone()))
            }
            _ => {
                observer.report(&LoopEvent::Discovering { iteration });
                (run.paths.discover_prompt_path.clone(), None)
            }
        };

        let outcome = run.iteration(
            iteration,
            kind,
            &prompt_path,
            task_id,
            backlog.tasks.len(),
            observer,
        )?;
        run.track_failures(iteration, &outcome, observer)?;

        if kind == IterationKind::Discovery && outcome.result.is_ok() {
            match discovery.record(iteration, outcome.tasks_before, outcome.tasks_after) {
                DiscoveryResult::Added(added) => {
                    run.tasks_generated += added;
                    observer.report(&LoopEvent::TasksDiscovered { iteration, added });
                }
                DiscoveryResult::Empty { streak } => {
                    observer.report(&LoopEvent::EmptyDiscovery {
                        iteration,
                        streak,
                        limit: empty_limit,
                    });
                }
            }
        }

        let has_pending = outcome.backlog.next_task().is_some();
        if let Some(exhausted) = discovery.exhausted(empty_limit, has_pending) {
            stop = exhausted;
            break;
        }
        if iteration < run.max_iterations
            && let Some(early) =
                stop_before_iteration(discovery.kind_for(iteration + 1, interval), has_pending)
        {
            stop = early;
            break;
        }
        run.pause_unless_last(iteration);
    }

    let summary = run.finish(stop, observer)?;
    Ok(PilotSummary { setup, summary })
}
