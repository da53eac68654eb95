//! Minimal git adapter: the loop never commits, it only reads `HEAD` to stamp
//! completed tasks.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Full SHA of `HEAD`.
    pub fn head_sha(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        let sha = out.trim().to_string();
        debug!(sha = %sha, "resolved HEAD");
        Ok(sha)
    }

    /// `HEAD` if this is a git checkout with at least one commit.
    pub fn try_head_sha(&self) -> Option<String> {
        match self.head_sha() {
            Ok(sha) if !sha.is_empty() => Some(sha),
            Ok(_) => None,
            Err(err) => {
                debug!(err = %format!("{err:#}"), "no git HEAD available");
                None
            }
        }
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_is_none_outside_a_repository() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(Git::new(temp.path()).try_head_sha(), None);
    }
}
