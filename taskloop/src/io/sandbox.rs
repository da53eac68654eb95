//! Sandbox availability probes, run once before a loop starts.

use std::process::Command;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::error::ConfigError;
use crate::io::agent::SandboxSpec;
use crate::io::process::run_command;

const PROBE_OUTPUT_LIMIT: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxStatus {
    Available,
    Unavailable(String),
}

pub trait SandboxProbe {
    fn probe(&self, sandbox: &SandboxSpec) -> SandboxStatus;
}

/// Probes the host: `docker info` for containers, `limactl list` for VMs.
#[derive(Debug, Clone)]
pub struct SystemSandboxProbe {
    pub timeout: Duration,
}

impl SandboxProbe for SystemSandboxProbe {
    #[instrument(skip_all, fields(sandbox = %sandbox.mode()))]
    fn probe(&self, sandbox: &SandboxSpec) -> SandboxStatus {
        match sandbox {
            SandboxSpec::None => SandboxStatus::Available,
            SandboxSpec::Container { .. } => {
                let mut cmd = Command::new("docker");
                cmd.args(["info", "--format", "{{.ServerVersion}}"]);
                self.check(cmd, "docker", |_| None)
            }
            SandboxSpec::IsolatedVm { template } => {
                let mut cmd = Command::new("limactl");
                cmd.args(["list", "--format", "{{.Status}}", template.as_str()]);
                self.check(cmd, "limactl", |stdout| lima_status_problem(template, stdout))
            }
        }
    }
}

impl SystemSandboxProbe {
    fn check(
        &self,
        cmd: Command,
        program: &str,
        inspect: impl Fn(&str) -> Option<String>,
    ) -> SandboxStatus {
        let output = match run_command(cmd, None, Some(self.timeout), PROBE_OUTPUT_LIMIT) {
            Ok(output) => output,
            Err(err) => {
                return SandboxStatus::Unavailable(format!("`{program}` could not be run: {err:#}"));
            }
        };
        if output.timed_out {
            return SandboxStatus::Unavailable(format!(
                "`{program}` did not answer within {}s",
                self.timeout.as_secs()
            ));
        }
        if !output.status.success() {
            let detail = output
                .stderr_tail()
                .unwrap_or_else(|| format!("exit status {:?}", output.status.code()));
            return SandboxStatus::Unavailable(format!("`{program}` failed: {detail}"));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(program, stdout = %stdout.trim(), "probe succeeded");
        match inspect(&stdout) {
            Some(problem) => SandboxStatus::Unavailable(problem),
            None => SandboxStatus::Available,
        }
    }
}

/// `limactl list` prints one status per matching instance.
fn lima_status_problem(template: &str, stdout: &str) -> Option<String> {
    match stdout.lines().map(str::trim).find(|line| !line.is_empty()) {
        None => Some(format!("no lima instance named `{template}`")),
        Some("Running") => None,
        Some(status) => Some(format!(
            "lima instance `{template}` is {status} (start it with `limactl start {template}`)"
        )),
    }
}

/// Fail with [`ConfigError::SandboxUnavailable`] unless the sandbox is usable.
pub fn ensure_sandbox_available<P: SandboxProbe + ?Sized>(
    probe: &P,
    sandbox: &SandboxSpec,
) -> Result<(), ConfigError> {
    match probe.probe(sandbox) {
        SandboxStatus::Available => Ok(()),
        SandboxStatus::Unavailable(reason) => Err(ConfigError::SandboxUnavailable {
            mode: sandbox.mode(),
            reason,
        }),
    }
}
