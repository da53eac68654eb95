//! CLI tests: spawn the `taskloop` binary and check output and exit codes.

use std::path::Path;
use std::process::{Command, Output};

use taskloop::backlog::TaskStatus;
use taskloop::exit_codes;
use taskloop::io::backlog_store::load_backlog;
use taskloop::io::init::ProjectPaths;

fn taskloop(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_taskloop"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("spawn taskloop")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn task_lifecycle_through_the_cli() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path();

    let init = taskloop(dir, &["init", "--name", "shop"]);
    assert_eq!(init.status.code(), Some(exit_codes::OK));
    assert!(stdout(&init).contains("Initialized shop (plain mode, claude, 0 task(s))"));

    let next = taskloop(dir, &["task", "next"]);
    assert_eq!(next.status.code(), Some(exit_codes::NOTHING_LEFT));

    let add = taskloop(dir, &["task", "add", "Write docs", "--priority", "high"]);
    assert_eq!(add.status.code(), Some(exit_codes::OK));
    assert!(stdout(&add).contains("task-1 pending: Write docs"));
    let child = taskloop(dir, &["task", "add", "Usage section", "--parent", "task-1"]);
    assert_eq!(child.status.code(), Some(exit_codes::OK));

    let list = taskloop(dir, &["task", "list"]);
    assert_eq!(
        stdout(&list),
        "[ ] task-1 Write docs (high)\n  [ ] task-2 Usage section\n"
    );

    let next = taskloop(dir, &["task", "next"]);
    assert_eq!(next.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&next), "task-1\tWrite docs\n");

    let complete = taskloop(
        dir,
        &["task", "complete", "task-1", "--commit", "abc123", "--iteration", "2"],
    );
    assert_eq!(complete.status.code(), Some(exit_codes::OK));

    let backlog = load_backlog(&ProjectPaths::new(dir).backlog_path).expect("load");
    assert_eq!(backlog.tasks[0].status, TaskStatus::Completed);
    assert_eq!(backlog.tasks[0].commit_sha.as_deref(), Some("abc123"));
    assert_eq!(backlog.tasks[0].iteration_completed, Some(2));
    assert_eq!(backlog.progress.completed_tasks, 1);

    let status = taskloop(dir, &["status"]);
    assert_eq!(status.status.code(), Some(exit_codes::OK));
    let report = stdout(&status);
    assert!(report.contains("Project: shop"));
    assert!(report.contains("Status: in_progress (1/2 completed)"));
    assert!(report.contains("Next: task-2 Usage section"));
}

#[test]
fn unknown_task_is_rejected() {
    let temp = tempfile::tempdir().expect("tempdir");
    taskloop(temp.path(), &["init"]);

    let output = taskloop(temp.path(), &["task", "skip", "nope"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("task `nope` not found"));
}

#[test]
fn commands_without_backlog_exit_not_initialized() {
    let temp = tempfile::tempdir().expect("tempdir");

    let commands: [&[&str]; 4] = [&["status"], &["task", "next"], &["run"], &["validate"]];
    for args in commands {
        let output = taskloop(temp.path(), args);
        assert_eq!(
            output.status.code(),
            Some(exit_codes::NOT_INITIALIZED),
            "{args:?}"
        );
        assert!(String::from_utf8_lossy(&output.stderr).contains("taskloop init"));
    }
}

#[test]
fn init_twice_needs_force() {
    let temp = tempfile::tempdir().expect("tempdir");
    assert_eq!(
        taskloop(temp.path(), &["init"]).status.code(),
        Some(exit_codes::OK)
    );

    let again = taskloop(temp.path(), &["init"]);
    assert_eq!(again.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&again.stderr).contains("--force"));

    let forced = taskloop(temp.path(), &["init", "--force"]);
    assert_eq!(forced.status.code(), Some(exit_codes::OK));
}

#[test]
fn validate_reports_health() {
    let temp = tempfile::tempdir().expect("tempdir");
    taskloop(temp.path(), &["pilot-init"]);

    let healthy = taskloop(temp.path(), &["validate"]);
    assert_eq!(healthy.status.code(), Some(exit_codes::OK));
    assert_eq!(stdout(&healthy), "ok\n");

    std::fs::remove_file(ProjectPaths::new(temp.path()).discover_prompt_path).expect("remove");
    let broken = taskloop(temp.path(), &["validate"]);
    assert_eq!(broken.status.code(), Some(exit_codes::INVALID));
    assert!(stdout(&broken).contains("discovery prompt"));
}

#[test]
fn run_with_nothing_pending_finishes_without_an_agent() {
    let temp = tempfile::tempdir().expect("tempdir");
    taskloop(temp.path(), &["init"]);

    let output = taskloop(temp.path(), &["run", "--iterations", "2", "--pause", "0"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let text = stdout(&output);
    assert!(text.contains("plain loop, up to 2 iteration(s)"));
    assert!(text.contains("All tasks done."));
    assert!(text.contains("0 iteration(s)"));
}
