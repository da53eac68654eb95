//! Prompt generation for implementation and discovery iterations.
//!
//! Prompts are rendered once at init time and written to disk; the loop only
//! hands their paths to the agent.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::backlog::{Backlog, PilotConfig};

const IMPLEMENT_TEMPLATE: &str = include_str!("prompts/implement.md");
const DISCOVER_TEMPLATE: &str = include_str!("prompts/discover.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("implement", IMPLEMENT_TEMPLATE)
            .expect("implement template should be valid");
        env.add_template("discover", DISCOVER_TEMPLATE)
            .expect("discover template should be valid");
        Self { env }
    }

    pub fn render_implement(&self, backlog: &Backlog, backlog_path: &str) -> Result<String> {
        let template = self.env.get_template("implement")?;
        let rendered = template.render(context! {
            project => &backlog.project,
            backlog_path => backlog_path,
            quality_checks => &backlog.config.quality_checks,
        })?;
        Ok(rendered)
    }

    pub fn render_discover(&self, backlog: &Backlog, backlog_path: &str) -> Result<String> {
        let defaults = PilotConfig::default();
        let pilot = backlog.config.pilot_config.as_ref().unwrap_or(&defaults);
        let template = self.env.get_template("discover")?;
        let rendered = template.render(context! {
            project => &backlog.project,
            backlog_path => backlog_path,
            quality_checks => &backlog.config.quality_checks,
            max_discovery_tasks => pilot.max_discovery_tasks,
            focus => pilot.focus.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        })?;
        Ok(rendered)
    }
}
