use std::fs::{self, File};

use assert_cmd::Command;
use bslice_trace::{
    header::{read_thread_header, write_thread_header},
    HeaderEntry, RegionId,
};
use predicates::prelude::*;
use tracing::info;

fn bslice() -> Command {
    let mut cmd = Command::cargo_bin("bslice").unwrap();
    cmd.env_remove("BSLICE_CONFIG");
    cmd
}

#[test]
fn test_help_command() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Testing CLI help command");

    bslice()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Backward Slicing Toolkit"));
}

#[test]
fn test_version_command() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");
    bslice().arg("--version").assert().success().stdout(predicate::str::contains("bslice"));
}

#[test]
fn test_missing_subcommand() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");
    bslice().assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_record_then_dump_most_recent_first() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();

    bslice()
        .arg("record")
        .arg(dir.path())
        .write_stdin("1 2\n3")
        .assert()
        .success()
        .stdout(predicate::str::contains("thread-0: 3 values, encoding raw"));

    bslice()
        .arg("dump")
        .arg(dir.path())
        .assert()
        .success()
        .stdout("# thread-0 sequence 0 (tag 0x02)\n3\n2\n1\n");

    bslice()
        .args(["dump", "--limit", "2"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::ends_with("3\n2\n"));
}

#[test]
fn test_inspect_compressed_trace() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();
    let values: Vec<String> = (0..1000).map(|v| v.to_string()).collect();

    bslice()
        .args(["record", "--kind", "long", "--thread", "7"])
        .arg(dir.path())
        .write_stdin(values.join("\n"))
        .assert()
        .success()
        .stdout(predicate::str::contains("spilled to storage"));

    bslice()
        .args(["inspect", "--count"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("thread-7: 1 sequences"))
        .stdout(predicate::str::contains("long compressed (tag 0x05)"))
        .stdout(predicate::str::contains("1000 values"));

    bslice()
        .args(["dump", "--thread", "7", "--limit", "1"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::ends_with("\n999\n"));
}

#[test]
fn test_record_refuses_existing_trace() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();

    bslice().arg("record").arg(dir.path()).write_stdin("5").assert().success();
    bslice()
        .arg("record")
        .arg(dir.path())
        .write_stdin("6")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already contains a trace"));
}

#[test]
fn test_record_rejects_out_of_range_int() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();

    bslice()
        .arg("record")
        .arg(dir.path())
        .write_stdin("1 99999999999")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid int value"));
}

#[test]
fn test_dump_unknown_thread() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();

    bslice().arg("record").arg(dir.path()).write_stdin("1").assert().success();
    bslice()
        .args(["dump", "--thread", "3"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("thread-3 is not recorded"));
}

#[test]
fn test_dump_skips_unsupported_sequence() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();

    bslice().arg("record").arg(dir.path()).write_stdin("10 20").assert().success();

    // Prepend an entry with a tag this version does not know
    let header = dir.path().join("thread-0.hdr");
    let mut entries = read_thread_header(&mut File::open(&header).unwrap()).unwrap();
    entries.insert(0, HeaderEntry::Unsupported { tag: 0x42, region: RegionId(99) });
    write_thread_header(&mut File::create(&header).unwrap(), &entries).unwrap();

    bslice()
        .arg("inspect")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("[0] unsupported (tag 0x42)"));

    bslice()
        .arg("dump")
        .arg(dir.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("# thread-0 sequence 1 (tag 0x02)\n20\n10\n"))
        .stderr(predicate::str::contains("1 sequence(s) could not be replayed"));
}

#[test]
fn test_inspect_missing_directory() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();

    bslice()
        .arg("inspect")
        .arg(dir.path().join("nope"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open trace directory"));
}

#[test]
fn test_config_from_env() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bslice.toml");
    fs::write(&path, "buffer_threshold = 7\n").unwrap();

    bslice()
        .arg("config")
        .env("BSLICE_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains("buffer_threshold = 7"))
        .stdout(predicate::str::contains("raw_threshold = 504"));

    fs::write(&path, "small_sequence_threshold = 10\nraw_threshold = 20\n").unwrap();
    bslice().arg("config").arg("--config").arg(&path).assert().failure();
}

#[test]
fn test_disabled_kind_records_empty_header() {
    bslice_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("bslice.toml");
    fs::write(&config, "disabled_kinds = [\"int\"]\n").unwrap();
    let trace = dir.path().join("trace");

    bslice()
        .arg("--config")
        .arg(&config)
        .arg("record")
        .arg(&trace)
        .write_stdin("1 2 3")
        .assert()
        .success();

    bslice()
        .arg("inspect")
        .arg(&trace)
        .assert()
        .success()
        .stdout(predicate::str::contains("[0] disabled (tag 0x00)"));
}
