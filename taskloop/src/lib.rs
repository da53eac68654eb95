//! Autonomous iteration controller for AI coding agents.
//!
//! A project keeps a task backlog in `.taskloop/backlog.json`. The loop hands
//! the next pending task to an external agent CLI one iteration at a time, and
//! in pilot mode interleaves discovery iterations that ask the agent to append
//! new tasks. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (task transitions, selection,
//!   progress, scheduling). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (backlog file, agent processes,
//!   sandbox probes, git, prompts).
//!
//! Orchestration modules ([`looping`], [`pilot`], [`tasks`], [`status`],
//! [`validate`]) coordinate core logic with I/O to implement CLI commands.

pub mod backlog;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod pilot;
pub mod status;
pub mod tasks;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
