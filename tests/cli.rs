//! Runs the hgmirror binary and checks its observable behavior

mod common;

use common::{assert_contains_all, TestEnvironment};
use std::process::Command;

fn hgmirror() -> Command {
    Command::new(env!("CARGO_BIN_EXE_hgmirror"))
}

#[test]
fn test_cli_help_lists_commands() {
    let output = hgmirror().arg("--help").output().expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains_all(
        &stdout,
        &[
            "setup",
            "clone-all",
            "pull-all",
            "hg-to-git",
            "push-to-remotes",
            "create-missing",
            "reconcile",
            "exists",
            "shell",
        ],
    );
}

#[test]
fn test_cli_version() {
    let output = hgmirror().arg("--version").output().expect("Failed to execute command");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("hgmirror"));
}

#[test]
fn test_list_prints_registry() {
    let env = TestEnvironment::new();
    env.write_config(
        r#"
  - source_path: trytond
    destination_name: trytond
  - source_path: modules/party
    destination_name: party"#,
    );

    let output = env.run(&["list"]);

    assert!(output.status.success(), "{:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains_all(&stdout, &["Repositories (2)", "trytond -> trytond", "modules/party -> party"]);
}

#[test]
fn test_setup_with_empty_registry_creates_caches() {
    let env = TestEnvironment::new();
    env.write_config(" []");

    let output = env.run(&["setup"]);

    assert!(output.status.success(), "{:?}", output);
    assert!(env.hg_cache().is_dir());
    assert!(env.git_cache().is_dir());
}

#[test]
fn test_pull_without_clone_fails() {
    let env = TestEnvironment::new();
    env.write_config(
        r#"
  - source_path: trytond
    destination_name: trytond"#,
    );

    let output = env.run(&["pull-all"]);

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("working copy missing"), "{}", stdout);
}

#[test]
fn test_duplicate_destinations_are_rejected() {
    let env = TestEnvironment::new();
    env.write_config(
        r#"
  - source_path: party
    destination_name: party
  - source_path: modules/party
    destination_name: party"#,
    );

    let output = env.run(&["list"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("party"), "{}", stderr);
}

#[test]
fn test_invalid_config_is_reported() {
    let env = TestEnvironment::new();
    env.write_raw_config("repositories: [unterminated\n");

    let output = env.run(&["list"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to parse config file"), "{}", stderr);
}

#[test]
fn test_exists_requires_name() {
    let env = TestEnvironment::new();
    env.write_config(" []");

    let output = env.run(&["exists"]);

    assert!(!output.status.success());
}

#[test]
fn test_shell_reads_commands_until_eof() {
    use std::io::Write;
    use std::process::Stdio;

    let env = TestEnvironment::new();
    env.write_config(
        r#"
  - source_path: trytond
    destination_name: trytond"#,
    );

    let mut child = hgmirror()
        .arg("--config")
        .arg(&env.config_path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn hgmirror");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"list\nfrobnicate\nquit\n")
        .unwrap();

    let output = child.wait_with_output().unwrap();

    assert!(output.status.success(), "{:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains_all(&stdout, &["trytond -> trytond", "Unknown command"]);
}
