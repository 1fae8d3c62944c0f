//! CLI integration tests for the Corral command-line interface.
//!
//! Every test points `CORRAL_CONFIG_DIR` and the working directory at a
//! fresh temporary directory so the user's own configuration never leaks in.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the corral binary, isolated in `dir`.
fn corral(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("corral").unwrap();
    cmd.current_dir(dir)
        .env("CORRAL_CONFIG_DIR", dir.join("user"))
        .env_remove("CORRAL_PROJECT_DIR");
    cmd
}

fn workspace() -> TempDir {
    tempfile::tempdir().unwrap()
}

fn write_project_config(dir: &Path, contents: &str) {
    std::fs::write(dir.join("corral.toml"), contents).unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_displays() {
    let dir = workspace();
    corral(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Corral"))
        .stdout(predicate::str::contains("sandbox"));
}

#[test]
fn test_version_displays() {
    let dir = workspace();
    corral(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("corral"));
}

#[test]
fn test_help_lists_subcommands() {
    let dir = workspace();
    corral(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("capabilities"))
        .stdout(predicate::str::contains("tool-schema"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let dir = workspace();
    corral(dir.path())
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_file_and_code_conflict() {
    let dir = workspace();
    corral(dir.path())
        .args(["run", "script.rhai", "-e", "print(1);"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Run Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_run_inline_code() {
    let dir = workspace();
    corral(dir.path())
        .args(["run", "-e", r#"print("hello from corral");"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello from corral"));
}

#[test]
fn test_run_file() {
    let dir = workspace();
    std::fs::write(
        dir.path().join("sum.rhai"),
        "let total = sum([1, 2, 3]);\nprint(`total=${total}`);\n",
    )
    .unwrap();

    corral(dir.path())
        .args(["run", "sum.rhai"])
        .assert()
        .success()
        .stdout(predicate::str::contains("total=6"));
}

#[test]
fn test_run_stdin() {
    let dir = workspace();
    corral(dir.path())
        .arg("run")
        .write_stdin("print(40 + 2);")
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[test]
fn test_run_without_output() {
    let dir = workspace();
    corral(dir.path())
        .args(["run", "-e", "let x = 1;"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Code executed successfully but produced no output",
        ));
}

#[test]
fn test_run_failure_exits_one() {
    let dir = workspace();
    corral(dir.path())
        .args(["run", "-e", "print(undefined_name);"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error executing code"));
}

#[test]
fn test_run_timeout_exits_124() {
    let dir = workspace();
    corral(dir.path())
        .args(["run", "--timeout", "1", "-e", "loop { }"])
        .timeout(std::time::Duration::from_secs(10))
        .assert()
        .code(124)
        .stderr(predicate::str::contains("Code execution timed out after 1s"));
}

#[test]
fn test_run_json_output() {
    let dir = workspace();
    let output = corral(dir.path())
        .args(["--json", "run", "-e", "print(1);"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["status"], "success");
    assert_eq!(result["output"], "1\n");
}

#[test]
fn test_run_uses_configured_service() {
    let dir = workspace();
    write_project_config(dir.path(), "[services.notes]\nkind = \"memory\"\n");

    corral(dir.path())
        .args([
            "run",
            "-e",
            r#"notes.set(#{ key: "a", value: 7 }); print(notes.get("a"));"#,
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("7"));
}

#[test]
fn test_run_respects_capabilities() {
    let dir = workspace();
    write_project_config(dir.path(), "[sandbox]\ncapabilities = [\"arithmetic\", \"strings\"]\n");

    corral(dir.path())
        .args(["run", "-e", r#"print(json::dumps(#{ a: 1 }));"#])
        .assert()
        .code(1);
}

#[test]
fn test_invalid_capability_in_config_fails() {
    let dir = workspace();
    write_project_config(dir.path(), "[sandbox]\ncapabilities = [\"filesystem\"]\n");

    corral(dir.path())
        .args(["run", "-e", "print(1);"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("capabilities"));
}

#[test]
fn test_project_flag() {
    let dir = workspace();
    let project = dir.path().join("proj");
    std::fs::create_dir(&project).unwrap();
    write_project_config(&project, "[services.cache]\nkind = \"memory\"\n");

    corral(dir.path())
        .args(["--project", "proj", "run", "-e", "print(cache);"])
        .assert()
        .success()
        .stdout(predicate::str::contains("memory service 'cache'"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Check Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_check_valid_script() {
    let dir = workspace();
    corral(dir.path())
        .args(["check", "-e", "let x = 1 + 2;"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));
}

#[test]
fn test_check_syntax_error() {
    let dir = workspace();
    corral(dir.path())
        .args(["check", "-e", "let x = ;"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Capabilities and Tool Schema Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_capabilities_lists_groups() {
    let dir = workspace();
    write_project_config(dir.path(), "[services.kv]\nkind = \"memory\"\n");

    corral(dir.path())
        .arg("capabilities")
        .assert()
        .success()
        .stdout(predicate::str::contains("strings"))
        .stdout(predicate::str::contains("json"))
        .stdout(predicate::str::contains("kv"))
        .stdout(predicate::str::contains("import, eval"));
}

#[test]
fn test_tool_schema() {
    let dir = workspace();
    let output = corral(dir.path()).arg("tool-schema").output().unwrap();
    assert!(output.status.success());

    let definitions: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(definitions[0]["name"], "execute_script");
    assert_eq!(definitions[0]["input_schema"]["required"][0], "code");
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Subcommand Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_init_local() {
    let dir = workspace();
    corral(dir.path())
        .args(["config", "init", "--local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("corral.toml"));

    let written = std::fs::read_to_string(dir.path().join("corral.toml")).unwrap();
    assert!(written.contains("[sandbox]"));

    // Existing files are never overwritten.
    corral(dir.path())
        .args(["config", "init", "--local"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_config_init_user() {
    let dir = workspace();
    corral(dir.path())
        .args(["config", "init"])
        .assert()
        .success();
    assert!(dir.path().join("user").join("config.toml").exists());
}

#[test]
fn test_config_path() {
    let dir = workspace();
    corral(dir.path())
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_show_warns_on_plaintext_token() {
    let dir = workspace();
    write_project_config(
        dir.path(),
        "[services.api]\nkind = \"http\"\nbase_url = \"https://example.com\"\ntoken = \"secret\"\n",
    );

    corral(dir.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("api"))
        .stdout(predicate::str::contains("plaintext"));
}
