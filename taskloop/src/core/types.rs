//! Shared deterministic types for loop decisions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What a single loop iteration asks the agent to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationKind {
    /// Analyze the project and append new tasks.
    Discovery,
    /// Work on the next pending task.
    Implementation,
}

impl IterationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IterationKind::Discovery => "discovery",
            IterationKind::Implementation => "implementation",
        }
    }
}

impl fmt::Display for IterationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason why a loop run stopped without a fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// No pending task remains and no discovery is due.
    AllDone,
    /// Consecutive empty discoveries reached the limit with nothing pending.
    NoNewTasks { empty_discoveries: u32 },
    /// The configured number of iterations ran.
    MaxIterations { max_iterations: u32 },
}
