//! Loop tuning stored under `.taskloop/loop.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use super::backlog_store::write_atomic;
use crate::core::scheduler::DEFAULT_EMPTY_DISCOVERY_LIMIT;

/// Loop settings (TOML).
///
/// Edited by humans; every field is optional on disk and falls back to the
/// defaults below. Per-run CLI flags override `pause_secs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopSettings {
    /// Pause between iterations, in seconds. Never applied after the last one.
    pub pause_secs: u64,

    /// Abort the run after this many agent failures in a row.
    pub max_consecutive_failures: u32,

    /// Stop pilot mode after this many empty discoveries once nothing is pending.
    pub empty_discovery_limit: u32,

    /// Truncate captured agent stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Upper bound for each sandbox availability probe.
    pub probe_timeout_secs: u64,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            pause_secs: 2,
            max_consecutive_failures: 5,
            empty_discovery_limit: DEFAULT_EMPTY_DISCOVERY_LIMIT,
            output_limit_bytes: 100_000,
            probe_timeout_secs: 15,
        }
    }
}

impl LoopSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_consecutive_failures == 0 {
            return Err(anyhow!("max_consecutive_failures must be > 0"));
        }
        if self.empty_discovery_limit == 0 {
            return Err(anyhow!("empty_discovery_limit must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.probe_timeout_secs == 0 {
            return Err(anyhow!("probe_timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn pause(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Load settings from a TOML file.
///
/// If the file is missing, returns `LoopSettings::default()`.
pub fn load_settings(path: &Path) -> Result<LoopSettings> {
    if !path.exists() {
        return Ok(LoopSettings::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let settings: LoopSettings =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    settings
        .validate()
        .with_context(|| format!("invalid {}", path.display()))?;
    Ok(settings)
}

/// Atomically write settings to disk (temp file + rename).
pub fn write_settings(path: &Path, settings: &LoopSettings) -> Result<()> {
    settings.validate()?;
    let mut buf = toml::to_string_pretty(settings).context("serialize loop settings")?;
    buf.push('\n');
    write_atomic(path, &buf).with_context(|| format!("write {}", path.display()))
}
