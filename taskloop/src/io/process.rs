//! Child process capture with bounded output, an optional timeout, and an
//! optional stdout tee for live agent logs.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn truncated_notice(&self, label: &str) -> String {
        let mut notice = String::new();
        if self.stdout_truncated > 0 {
            notice.push_str(&format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        if self.stderr_truncated > 0 {
            notice.push_str(&format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        notice
    }

    /// Last non-empty stderr line, for short failure messages.
    pub fn stderr_tail(&self) -> Option<String> {
        String::from_utf8_lossy(&self.stderr)
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }
}

/// Run a command to completion and capture stdout/stderr without risking pipe
/// deadlocks.
///
/// Output is read concurrently while the child runs; `output_limit_bytes` bounds
/// what is kept in memory (the rest is drained and counted). With a `timeout`
/// the child is killed once it elapses; `None` waits indefinitely.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
pub fn run_command(
    cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    run_command_with_stream(cmd, stdin, timeout, output_limit_bytes, None)
}

/// Like [`run_command`], but when `stream_path` is `Some` every stdout line is
/// also appended to that file and flushed immediately.
#[instrument(skip_all, fields(output_limit_bytes, streaming = stream_path.is_some()))]
pub fn run_command_with_stream(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
    stream_path: Option<&Path>,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let stream_file = stream_path
        .map(open_stream_file)
        .transpose()?
        .map(BufWriter::new);

    debug!(program = ?cmd.get_program(), "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, program = ?cmd.get_program(), "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {:?}", cmd.get_program()));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || {
        read_lines_limited_with_tee(stdout, output_limit_bytes, stream_file)
    });
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        // A child that exits without reading its prompt closes the pipe early;
        // its exit status is the failure signal, not the broken pipe.
        if let Err(err) = child_stdin.write_all(input) {
            warn!(err = %err, "child closed stdin before reading all input");
        }
    }

    let (status, timed_out) = wait_for(&mut child, timeout)?;

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn wait_for(child: &mut Child, timeout: Option<Duration>) -> Result<(ExitStatus, bool)> {
    let Some(timeout) = timeout else {
        return Ok((child.wait().context("wait for command")?, false));
    };
    match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => Ok((status, false)),
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            child.kill().context("kill command")?;
            let status = child.wait().context("wait command after kill")?;
            Ok((status, true))
        }
    }
}

fn open_stream_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create stream dir {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("create stream file {}", path.display()))
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_lines_limited_with_tee<R: Read>(
    reader: R,
    limit: usize,
    mut stream_file: Option<BufWriter<File>>,
) -> Result<(Vec<u8>, usize)> {
    let mut buf_reader = BufReader::new(reader);
    let mut collected = Vec::new();
    let mut truncated = 0usize;

    loop {
        let mut line = Vec::new();
        let n = buf_reader
            .read_until(b'\n', &mut line)
            .context("read line")?;
        if n == 0 {
            break;
        }

        if let Some(writer) = stream_file.as_mut() {
            if let Err(e) = writer.write_all(&line) {
                warn!(err = %e, "failed to write to stream file");
            } else if let Err(e) = writer.flush() {
                warn!(err = %e, "failed to flush stream file");
            }
        }

        truncated += keep_within_limit(&mut collected, &line, limit);
    }

    Ok((collected, truncated))
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        truncated += keep_within_limit(&mut buf, &chunk[..n], limit);
    }

    Ok((buf, truncated))
}

/// Append as much of `data` as fits under `limit`; returns the bytes dropped.
fn keep_within_limit(buf: &mut Vec<u8>, data: &[u8], limit: usize) -> usize {
    let keep = data.len().min(limit.saturating_sub(buf.len()));
    buf.extend_from_slice(&data[..keep]);
    data.len() - keep
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_output_and_exit_status() {
        let out = run_command(sh("echo hello; echo oops >&2; exit 3"), None, None, 1000)
            .expect("run");
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(String::from_utf8_lossy(&out.stdout), "hello\n");
        assert_eq!(out.stderr_tail().as_deref(), Some("oops"));
        assert!(!out.timed_out);
    }

    #[test]
    fn feeds_stdin_and_truncates_beyond_limit() {
        let out = run_command(sh("cat"), Some(b"0123456789"), None, 4).expect("run");
        assert_eq!(out.stdout, b"0123");
        assert_eq!(out.stdout_truncated, 6);
        assert!(out.truncated_notice("agent").contains("stdout truncated 6 bytes"));
    }

    #[test]
    fn kills_child_after_timeout() {
        let out = run_command(sh("sleep 5"), None, Some(Duration::from_millis(100)), 100)
            .expect("run");
        assert!(out.timed_out);
        assert!(!out.status.success());
    }

    #[test]
    fn tees_stdout_lines_to_stream_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let stream = temp.path().join("logs/agent.log");
        let out = run_command_with_stream(
            sh("printf 'a\\nb\\n'"),
            None,
            None,
            1,
            Some(&stream),
        )
        .expect("run");
        assert_eq!(out.stdout, b"a");
        assert_eq!(std::fs::read_to_string(&stream).expect("read"), "a\nb\n");
    }

    #[test]
    fn spawn_failure_names_program() {
        let err = run_command(
            Command::new("definitely-not-a-real-binary-xyz"),
            None,
            None,
            10,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("definitely-not-a-real-binary-xyz"));
    }
}
