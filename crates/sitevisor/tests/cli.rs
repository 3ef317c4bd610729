use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A CLI invocation isolated in its own home directory
fn sitevisor(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sitevisor").unwrap();
    cmd.env("SITEVISOR_HOME", home.path())
        .env_remove("SITEVISOR_WEBHOOK_URL")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    sitevisor(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("site"))
        .stdout(predicate::str::contains("preview"))
        .stdout(predicate::str::contains("notify"));
}

#[test]
fn version_flag() {
    let home = TempDir::new().unwrap();
    sitevisor(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn invalid_reference_fails_without_daemon() {
    let home = TempDir::new().unwrap();
    sitevisor(&home)
        .args(["start", "not a ref"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid selector"));

    assert!(!home.path().join("daemon.sock").exists());
}

#[test]
fn ping_does_not_start_daemon() {
    let home = TempDir::new().unwrap();
    sitevisor(&home)
        .arg("ping")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not running"));

    assert!(!home.path().join("daemon.sock").exists());
}

#[test]
fn kill_without_daemon_is_ok() {
    let home = TempDir::new().unwrap();
    sitevisor(&home)
        .arg("kill")
        .assert()
        .success()
        .stdout(predicate::str::contains("not running"));
}

#[test]
fn site_edit_rejects_conflicting_prefix_flags() {
    let home = TempDir::new().unwrap();
    sitevisor(&home)
        .args(["site", "edit", "demo", "--prefix", "sudo", "--no-prefix"])
        .assert()
        .failure();
}

#[test]
fn logs_rejects_bad_regex_before_contacting_daemon() {
    let home = TempDir::new().unwrap();
    sitevisor(&home)
        .args(["logs", "demo/web", "--grep", "(unclosed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid regex pattern"));

    assert!(!home.path().join("daemon.sock").exists());
}

#[test]
fn notify_status_unconfigured() {
    let home = TempDir::new().unwrap();
    sitevisor(&home)
        .args(["notify", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Webhook: not configured"))
        .stdout(predicate::str::contains("Events: all"));
}

#[test]
fn notify_webhook_roundtrip() {
    let home = TempDir::new().unwrap();
    sitevisor(&home)
        .args([
            "notify",
            "webhook",
            "--url",
            "http://127.0.0.1:9/hook",
            "--timeout",
            "2",
        ])
        .assert()
        .success();

    assert!(home.path().join("notify.toml").exists());

    sitevisor(&home)
        .args(["notify", "events", "--set", "crash,gave_up"])
        .assert()
        .success();

    sitevisor(&home)
        .args(["notify", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://127.0.0.1:9/hook"))
        .stdout(predicate::str::contains("Timeout: 2s"))
        .stdout(predicate::str::contains("Events: crash, gave_up"));

    sitevisor(&home).args(["notify", "remove"]).assert().success();

    sitevisor(&home)
        .args(["notify", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Webhook: not configured"));
}

#[test]
fn notify_events_rejects_unknown_event() {
    let home = TempDir::new().unwrap();
    sitevisor(&home)
        .args(["notify", "events", "--set", "crash,explode"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("explode"));
}

#[test]
fn notify_test_requires_configuration() {
    let home = TempDir::new().unwrap();
    sitevisor(&home)
        .args(["notify", "test"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No notification channels configured"));
}
