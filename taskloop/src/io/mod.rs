//! I/O helpers for taskloop commands.

pub mod agent;
pub mod backlog_store;
pub mod config;
pub mod detect;
pub mod git;
pub mod import;
pub mod init;
pub mod iteration_log;
pub mod process;
pub mod prompt;
pub mod sandbox;
