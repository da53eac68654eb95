//! Quality-check detection from well-known project files.
//!
//! The commands end up in `config.qualityChecks` and in the rendered prompts;
//! the loop never runs them itself.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Recipe names worth surfacing from a justfile or Makefile.
const TASK_RUNNER_RECIPES: [&str; 4] = ["ci", "test", "lint", "check"];

/// npm scripts worth surfacing, in the order they are listed.
const NPM_SCRIPTS: [&str; 4] = ["test", "lint", "typecheck", "build"];

static RECIPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([A-Za-z][A-Za-z0-9_-]*)(?:[ \t]+[^:\n]*)?[ \t]*:(?:[^=]|$)")
        .expect("recipe regex should compile")
});

/// Detect quality-check commands for the project rooted at `root`.
///
/// A justfile or Makefile with matching recipes wins over per-language
/// defaults, since it usually wraps them.
pub fn detect_quality_checks(root: &Path) -> Vec<String> {
    let mut checks = task_runner_checks(root);
    if checks.is_empty() {
        checks = language_checks(root);
    }
    debug!(?checks, "detected quality checks");
    checks
}

fn task_runner_checks(root: &Path) -> Vec<String> {
    for (file, runner) in [
        ("justfile", "just"),
        ("Justfile", "just"),
        ("Makefile", "make"),
    ] {
        let Ok(contents) = fs::read_to_string(root.join(file)) else {
            continue;
        };
        let recipes = recipe_names(&contents);
        let checks: Vec<String> = TASK_RUNNER_RECIPES
            .iter()
            .filter(|name| recipes.iter().any(|recipe| recipe == *name))
            .map(|name| format!("{runner} {name}"))
            .collect();
        if !checks.is_empty() {
            return checks;
        }
    }
    Vec::new()
}

fn recipe_names(contents: &str) -> Vec<String> {
    RECIPE_RE
        .captures_iter(contents)
        .filter_map(|caps| caps.get(1))
        .map(|name| name.as_str().to_string())
        .collect()
}

fn language_checks(root: &Path) -> Vec<String> {
    let mut checks = Vec::new();
    if root.join("Cargo.toml").is_file() {
        checks.push("cargo test".to_string());
        checks.push("cargo clippy -- -D warnings".to_string());
    }
    if let Ok(contents) = fs::read_to_string(root.join("package.json")) {
        checks.extend(npm_checks(&contents));
    }
    if root.join("go.mod").is_file() {
        checks.push("go test ./...".to_string());
        checks.push("go vet ./...".to_string());
    }
    if root.join("pyproject.toml").is_file() {
        checks.push("pytest".to_string());
    }
    checks
}

fn npm_checks(package_json: &str) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<Value>(package_json) else {
        debug!("package.json is not valid JSON, skipping npm scripts");
        return Vec::new();
    };
    let Some(scripts) = value.get("scripts").and_then(Value::as_object) else {
        return Vec::new();
    };
    NPM_SCRIPTS
        .iter()
        .filter(|name| scripts.contains_key(**name))
        .map(|name| match *name {
            "test" => "npm test".to_string(),
            other => format!("npm run {other}"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_project_gets_cargo_checks() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("Cargo.toml"), "[package]\n").expect("write");
        assert_eq!(
            detect_quality_checks(temp.path()),
            vec!["cargo test", "cargo clippy -- -D warnings"]
        );
    }

    #[test]
    fn npm_scripts_follow_fixed_order() {
        let checks = npm_checks(r#"{"scripts":{"build":"tsc","test":"vitest","dev":"vite"}}"#);
        assert_eq!(checks, vec!["npm test", "npm run build"]);
    }

    #[test]
    fn justfile_recipes_win_over_language_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("Cargo.toml"), "[package]\n").expect("write");
        fs::write(
            temp.path().join("justfile"),
            "set shell := [\"bash\", \"-c\"]\n\nfmt:\n    cargo fmt\n\ntest filter='':\n    cargo test {{filter}}\n\nci: fmt test\n    echo ok\n",
        )
        .expect("write");
        assert_eq!(detect_quality_checks(temp.path()), vec!["just ci", "just test"]);
    }

    #[test]
    fn makefile_targets_ignore_variable_assignments() {
        let names = recipe_names("CC := gcc\nlint:\n\truff .\ncheck: lint\n\tpytest\n");
        assert_eq!(names, vec!["lint", "check"]);
    }

    #[test]
    fn empty_project_has_no_checks() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(detect_quality_checks(temp.path()).is_empty());
    }
}
