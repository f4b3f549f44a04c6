// Integration tests for CLI commands
// These run the built binary against a throwaway database.

use std::process::Command;
use tempfile::TempDir;

fn credstore() -> Command {
    Command::new(env!("CARGO_BIN_EXE_credstore"))
}

#[test]
fn test_cli_help() {
    let output = credstore()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Operator CLI"));
    assert!(stdout.contains("init"));
    assert!(stdout.contains("status"));
    assert!(stdout.contains("get-key"));
    assert!(stdout.contains("remove-key"));
    assert!(stdout.contains("version"));
}

#[test]
fn test_cli_version() {
    let output = credstore()
        .arg("version")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_init_then_status() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("auth.db");
    let db_arg = db_path.to_str().unwrap();

    let output = credstore()
        .args(["init", "--db-path", db_arg])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Created new identity"));
    assert!(temp_dir.path().join("config.toml").exists());

    let output = credstore()
        .args(["status", "--db-path", db_arg])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Identity stored"));

    // Second init keeps the stored identity
    let output = credstore()
        .args(["init", "--db-path", db_arg])
        .output()
        .expect("Failed to execute command");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("already initialized"));
}

#[test]
fn test_cli_status_leaves_missing_database_alone() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("auth.db");

    let output = credstore()
        .args(["status", "--db-path", db_path.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No database"));
    assert!(!db_path.exists());
    assert!(!temp_dir.path().join("config.toml").exists());
}

#[test]
fn test_cli_get_missing_key_fails() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("auth.db");

    let output = credstore()
        .args(["get-key", "pre-key", "1", "--db-path", db_path.to_str().unwrap()])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("pre-key-1"));
}

#[test]
fn test_cli_invalid_command() {
    let output = credstore()
        .arg("invalid-command")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
}
