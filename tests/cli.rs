// Drives the compiled binary for the subcommands that need no TTY. HOME is
// pointed at a temp dir so settings and logs stay out of the real profile.

use assert_cmd::Command;

fn symtrain(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("symtrain").unwrap();
    cmd.env("HOME", home)
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("XDG_STATE_HOME")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn levels_lists_catalog_with_locks() {
    let home = tempfile::tempdir().unwrap();
    let db = home.path().join("progress.db");
    let out = symtrain(home.path())
        .arg("--db")
        .arg(&db)
        .arg("levels")
        .output()
        .unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("  basics"));
    assert!(lines[1].starts_with("# reflections"));
}

#[test]
fn progress_and_history_start_empty() {
    let home = tempfile::tempdir().unwrap();
    let db = home.path().join("progress.db");

    let out = symtrain(home.path())
        .args(["--user", "ada", "--db"])
        .arg(&db)
        .arg("progress")
        .output()
        .unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8(out.stdout)
        .unwrap()
        .starts_with("unlocked: basics"));

    let csv = home.path().join("history.csv");
    symtrain(home.path())
        .arg("--db")
        .arg(&db)
        .arg("history")
        .arg("--csv")
        .arg(&csv)
        .assert()
        .success();
    let text = std::fs::read_to_string(csv).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(text.starts_with("finished_at,level,score"));
}

#[test]
fn play_refuses_without_a_tty() {
    let home = tempfile::tempdir().unwrap();
    symtrain(home.path())
        .arg("--db")
        .arg(home.path().join("progress.db"))
        .arg("play")
        .assert()
        .failure();
}
