use std::process::{Command, Output};
use tempfile::TempDir;

fn technotes_cmd() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_technotes"));
    cmd.env_remove("TECHNOTES_BACKEND").env_remove("PORT");
    cmd
}

fn run(dir: &TempDir, args: &[&str]) -> Output {
    technotes_cmd()
        .current_dir(dir.path())
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_init_creates_technotes_directory() {
    let tmp = TempDir::new().unwrap();

    let output = run(&tmp, &["init"]);

    assert!(output.status.success());
    assert!(tmp.path().join(".technotes").exists());
    assert!(tmp.path().join(".technotes/loro.db").exists());
    assert!(tmp.path().join(".technotes/config.yaml").exists());
}

#[test]
fn test_init_with_sqlite_backend() {
    let tmp = TempDir::new().unwrap();

    let output = run(&tmp, &["--backend", "sqlite", "init"]);

    assert!(output.status.success());
    assert!(tmp.path().join(".technotes/store.db").exists());
    let config = std::fs::read_to_string(tmp.path().join(".technotes/config.yaml")).unwrap();
    assert!(config.contains("backend: sqlite"));
}

#[test]
fn test_init_twice_fails() {
    let tmp = TempDir::new().unwrap();

    run(&tmp, &["init"]);
    let output = run(&tmp, &["init"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Already initialized"));
}

#[test]
fn test_unknown_backend_fails() {
    let tmp = TempDir::new().unwrap();

    let output = run(&tmp, &["--backend", "mongo", "init"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid backend"));
    assert!(!tmp.path().join(".technotes").exists());
}

#[test]
fn test_user_list_without_init_fails() {
    let tmp = TempDir::new().unwrap();

    let output = run(&tmp, &["user", "list"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Not in a technotes project"));
}

#[test]
fn test_empty_listings() {
    let tmp = TempDir::new().unwrap();
    run(&tmp, &["init"]);

    let output = run(&tmp, &["user", "list"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No users found."));

    let output = run(&tmp, &["note", "list", "--json"]);
    assert!(output.status.success());
    let notes: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(notes, serde_json::json!([]));
}

fn user_workflow(backend: &str) {
    let tmp = TempDir::new().unwrap();
    assert!(run(&tmp, &["--backend", backend, "init"]).status.success());

    let output = run(&tmp, &["user", "add", "alice", "--password", "pw"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("New user alice created"));

    let output = run(&tmp, &["user", "add", "alice", "--password", "other"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Duplicate username"));

    run(
        &tmp,
        &["user", "add", "bob", "--password", "pw", "--role", "Manager", "--role", "Admin"],
    );

    let output = run(&tmp, &["user", "list", "--json"]);
    assert!(output.status.success());
    let users: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let users = users.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[0]["username"], "alice");
    assert_eq!(users[0]["roles"], serde_json::json!(["Employee"]));
    assert_eq!(users[1]["roles"], serde_json::json!(["Manager", "Admin"]));
    assert!(users[0].get("password").is_none());

    let output = run(&tmp, &["user", "list"]);
    let text = stdout(&output);
    assert!(text.contains("Users:"));
    assert!(text.contains("[active] alice - Employee"));
}

#[test]
fn test_user_workflow_loro() {
    user_workflow("loro");
}

#[test]
fn test_user_workflow_sqlite() {
    user_workflow("sqlite");
}

#[test]
fn test_backend_from_config_is_used() {
    let tmp = TempDir::new().unwrap();
    run(&tmp, &["--backend", "sqlite", "init"]);

    // No --backend: the config file selects sqlite
    let output = run(&tmp, &["user", "add", "carol", "--password", "pw"]);
    assert!(output.status.success());

    let output = run(&tmp, &["--backend", "loro", "user", "list"]);
    assert!(stdout(&output).contains("No users found."));

    let output = run(&tmp, &["user", "list"]);
    assert!(stdout(&output).contains("carol"));
}

#[test]
fn test_commands_work_from_subdirectory() {
    let tmp = TempDir::new().unwrap();
    run(&tmp, &["init"]);

    let subdir = tmp.path().join("nested/deeper");
    std::fs::create_dir_all(&subdir).unwrap();

    let output = technotes_cmd()
        .current_dir(&subdir)
        .args(["user", "add", "dave", "--password", "pw"])
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let output = run(&tmp, &["user", "list"]);
    assert!(stdout(&output).contains("dave"));
}
