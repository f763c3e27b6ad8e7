use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::PathBuf;
use std::process::Command;

fn trace_path(name: &str) -> String {
    let mut pathbuf = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    pathbuf.push("resources/test/traces");
    pathbuf.push(name);
    pathbuf.as_path().to_str().unwrap().to_string()
}

#[test]
fn replay_on_missing_trace_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("tagsim-replay")?;
    cmd.arg("bogus-file-path").assert().failure();
    Ok(())
}

#[test]
fn replay_reads_stdin_when_no_path_given() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("tagsim-replay")?;
    cmd.arg("--report-period")
        .arg("1")
        .write_stdin("")
        .assert()
        .success();
    Ok(())
}

#[test]
fn replay_reports_hit_rate_for_the_fixture_trace() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("tagsim-replay")?;
    cmd.arg(&trace_path("small.csv"))
        .arg("--report-period")
        .arg("1")
        .assert()
        .success()
        .stdout(predicate::str::contains("HitRate"))
        .stdout(predicate::str::contains("totalMemTransactions"));
    Ok(())
}

#[test]
fn replay_stops_after_the_requested_report_periods() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("tagsim-replay")?;
    cmd.arg(&trace_path("small.csv"))
        .arg("--report-period")
        .arg("1")
        .arg("--report-periods")
        .arg("0")
        .assert()
        .success();
    Ok(())
}

#[test]
fn sweep_on_missing_trace_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("tagsim-sweep")?;
    cmd.arg("bogus-file-path").assert().failure();
    Ok(())
}

#[test]
fn sweep_prints_one_row_per_configuration() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("tagsim-sweep")?;
    cmd.arg(&trace_path("small.csv"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "config,cacheHits,cacheMisses,cacheWritebacks,totalMemTransactions",
        ))
        .stdout(predicate::str::contains("baseline"))
        .stdout(predicate::str::contains("empty-leaf-opt"))
        .stdout(predicate::str::contains("non-dirty-writes"))
        .stdout(predicate::str::contains("both-opts"));
    Ok(())
}
