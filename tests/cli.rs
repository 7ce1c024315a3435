use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn tps_bench(workdir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("tps-bench").unwrap();
    cmd.env("TPS_BENCH_DIR", workdir)
        .env_remove("TPS_BENCH_NATIVE_TARGET")
        .env_remove("TPS_BENCH_SANDBOX_MANIFEST")
        .env("RUST_LOG", "error");
    cmd
}

#[test]
fn test_help_exits_zero() {
    let dir = TempDir::new().unwrap();
    tps_bench(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("-t <TRANSFERS>"))
        .stdout(predicate::str::contains("-m <MODE>"));
}

#[test]
fn test_missing_transfer_count_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    let workdir = dir.path().join("session");
    tps_bench(&workdir)
        .args(["-i", "2"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("transfer count (-t) is required"))
        .stderr(predicate::str::contains("Usage"));
    assert!(!workdir.exists());
}

#[test]
fn test_native_without_static_aborts_before_side_effects() {
    let dir = TempDir::new().unwrap();
    let workdir = dir.path().join("session");
    tps_bench(&workdir)
        .args(["-t", "10", "-n", "--native-target", "x86_64-unknown-linux-gnu"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("requires static input-feed mode"));
    assert!(!workdir.exists());
}

#[test]
fn test_bogus_metrics_mode_creates_no_workload() {
    let dir = TempDir::new().unwrap();
    let workdir = dir.path().join("session");
    tps_bench(&workdir)
        .args(["-t", "10", "-m", "bogus"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid value 'bogus'"))
        .stderr(predicate::str::contains("jit-unsupported"));
    assert!(!workdir.join("inbox.json").exists());
    assert!(!workdir.exists());
}

#[test]
fn test_jit_without_sandbox_manifest_is_rejected() {
    let dir = TempDir::new().unwrap();
    let workdir = dir.path().join("session");
    tps_bench(&workdir)
        .args(["-t", "10", "-j"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("inline JIT (-j) is built into the sandbox"))
        .stderr(predicate::str::contains("Usage"));
    assert!(!workdir.exists());
}

#[test]
fn test_malformed_number_exits_one() {
    let dir = TempDir::new().unwrap();
    tps_bench(dir.path())
        .args(["-t", "many"])
        .assert()
        .code(1);
}

#[test]
fn test_generator_failure_exits_one() {
    let dir = TempDir::new().unwrap();
    tps_bench(dir.path())
        .args(["-t", "10", "--inbox-bench", "/nonexistent/inbox-bench"])
        .assert()
        .code(1);
    assert!(!dir.path().join("run-1.log").exists());
}

#[test]
fn test_inbox_bench_generate_and_results() {
    let dir = TempDir::new().unwrap();
    let inbox = dir.path().join("inbox.json");

    Command::cargo_bin("inbox-bench")
        .unwrap()
        .args(["generate", "--transfers", "4", "--inbox-file"])
        .arg(&inbox)
        .assert()
        .success();
    assert!(inbox.is_file());

    // 4 transfers -> 3 accounts minted, so 7 executes.
    let log = dir.path().join("run-1.log");
    let mut body = String::from("\"StartOfLevel\"\n\"Deploy\"\n");
    for _ in 0..7 {
        body.push_str("{\"Execute\":\"0x\"}\n");
    }
    body.push_str("\"EndOfLevel\"\nRun took 2s\n");
    std::fs::write(&log, body).unwrap();

    Command::cargo_bin("inbox-bench")
        .unwrap()
        .args(["results", "--expected-transfers", "4", "--inbox"])
        .arg(&inbox)
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::contains("Expected transfers: 4 (8 inbox messages)"))
        .stdout(predicate::str::contains("TPS mean 2.00"));
}

#[test]
fn test_inbox_bench_rejects_zero_transfers() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("inbox-bench")
        .unwrap()
        .args(["generate", "--transfers", "0", "--inbox-file"])
        .arg(dir.path().join("inbox.json"))
        .assert()
        .failure();
}
