use assert_cmd::Command;
use predicates::prelude::*;

fn atelier() -> Command {
    Command::cargo_bin("atelier").unwrap()
}

#[test]
fn help_lists_subcommands() {
    atelier()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("history"));
}

#[test]
fn plan_prints_the_decomposition() {
    let workspace = tempfile::tempdir().unwrap();
    atelier()
        .env("ATELIER_WORKSPACE", workspace.path())
        .env_remove("ATELIER_WORKER_CMD")
        .args(["plan", "A todo list app", "--name", "todo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Summary:"))
        .stdout(predicate::str::contains("[backend]"));
}

#[test]
fn run_completes_offline_and_records_history() {
    let workspace = tempfile::tempdir().unwrap();
    atelier()
        .env("ATELIER_WORKSPACE", workspace.path())
        .env_remove("ATELIER_WORKER_CMD")
        .args(["run", "A tiny notes app", "--name", "notes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Status: completed"));
    assert!(workspace.path().join("notes/src").is_dir());
    assert!(workspace.path().join("notes/README.md").exists());

    atelier()
        .env("ATELIER_WORKSPACE", workspace.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("A tiny notes app"));

    atelier()
        .env("ATELIER_WORKSPACE", workspace.path())
        .args(["history", "--clear"])
        .assert()
        .success();
    atelier()
        .env("ATELIER_WORKSPACE", workspace.path())
        .arg("history")
        .assert()
        .success()
        .stdout(predicate::str::contains("No recorded runs"));
}

#[test]
fn unknown_subcommand_fails() {
    atelier().arg("frobnicate").assert().failure();
}
