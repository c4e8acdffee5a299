mod common;
use assert_cmd::Command;
use common::*;

fn pgsafesync(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pgsafesync").unwrap();
    cmd.current_dir(dir)
        .env_remove("PGSAFESYNC_CONFIG")
        .env_remove("PGSAFESYNC_ENVIRONMENT")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn dry_run_succeeds_without_database() {
    let dir = TempDir::new().unwrap();
    write_scenario(dir.path());

    let assert = pgsafesync(dir.path())
        .args(["diff.json", "--dry-run"])
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();

    assert!(stdout.contains(
        "would create 0 sequence(s), create 1 table(s), add 1 column(s), create 1 index(es), create 0 constraint(s)"
    ));
    assert!(!dir.path().join("rollbacks").exists());

    let logs: Vec<_> = std::fs::read_dir(dir.path().join("logs"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].starts_with("pgsafesync_development_"));
    assert!(logs[0].ends_with(".log"));
}

#[test]
fn json_report_is_machine_readable() {
    let dir = TempDir::new().unwrap();
    write_scenario(dir.path());

    let assert = pgsafesync(dir.path())
        .args(["diff.json", "--json", "--no-indexes"])
        .assert()
        .success();
    let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();

    assert_eq!(report["state"], "REPORTED");
    assert_eq!(report["dryRun"], true);
    assert_eq!(report["counters"]["tablesCreated"], 1);
    assert_eq!(report["counters"]["indexesCreated"], 0);
}

#[test]
fn critical_differences_exit_non_zero() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "diff.json",
        r#"{"summary": {"critical_differences": 1}, "differences": {}}"#,
    );

    let assert = pgsafesync(dir.path()).arg("diff.json").assert().failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("Safety validation failed"));
}

#[test]
fn missing_document_exits_non_zero() {
    let dir = TempDir::new().unwrap();
    pgsafesync(dir.path()).arg("absent.json").assert().failure();
}

#[test]
fn apply_and_dry_run_are_exclusive() {
    let dir = TempDir::new().unwrap();
    write_scenario(dir.path());
    pgsafesync(dir.path())
        .args(["diff.json", "--apply", "--dry-run"])
        .assert()
        .failure();
}

#[test]
fn apply_with_unknown_environment_fails() {
    let dir = TempDir::new().unwrap();
    write_scenario(dir.path());
    write_file(
        dir.path(),
        "pgsafesync.toml",
        r#"
        [environments.production]
        database = "shop"
        "#,
    );

    let assert = pgsafesync(dir.path())
        .args(["diff.json", "--apply", "--environment", "staging"])
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("Unknown environment 'staging'"));
}
