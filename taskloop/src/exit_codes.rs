//! Stable exit codes for `taskloop` commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid input, configuration, or backlog, or any other error.
pub const INVALID: i32 = 1;
/// `taskloop task next` found no pending task.
pub const NOTHING_LEFT: i32 = 2;
/// No backlog exists; run `taskloop init` first.
pub const NOT_INITIALIZED: i32 = 3;
/// The loop aborted after too many consecutive agent failures.
pub const ABORTED: i32 = 4;
