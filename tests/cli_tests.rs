// CLI integration tests for the `glint` binary.
//
// These drive the compiled binary itself (via `CARGO_BIN_EXE_glint`,
// cargo's own test harness mechanism — no extra process-spawning crate
// needed) against fixture scripts under `tests/fixtures/`, asserting
// stdout and exit code the way the embedding contract in spec.md §6
// promises the `run` subcommand behaves.

use std::path::PathBuf;
use std::process::Command;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn run_script(name: &str) -> (i32, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_glint"))
        .arg("run")
        .arg(fixture(name))
        .output()
        .expect("glint binary should run");
    let stdout = String::from_utf8(output.stdout).expect("stdout is valid utf8");
    (output.status.code().unwrap_or(-1), stdout)
}

#[test]
fn run_subcommand_executes_arithmetic_fixture() {
    let (code, stdout) = run_script("arithmetic.glint");
    assert_eq!(code, 0);
    assert_eq!(stdout, "7\n15\n");
}

#[test]
fn run_subcommand_executes_closures_fixture() {
    let (code, stdout) = run_script("closures.glint");
    assert_eq!(code, 0);
    assert_eq!(stdout, "1\n2\n3\n");
}

#[test]
fn run_subcommand_exits_70_on_runtime_error() {
    let (code, _) = run_script("runtime_error.glint");
    assert_eq!(code, 70);
}

#[test]
fn run_subcommand_exits_74_on_missing_file() {
    let output = Command::new(env!("CARGO_BIN_EXE_glint"))
        .arg("run")
        .arg("tests/fixtures/does_not_exist.glint")
        .output()
        .expect("glint binary should run");
    assert_eq!(output.status.code().unwrap_or(-1), 74);
}

#[test]
fn disassemble_subcommand_compiles_without_running() {
    let output = Command::new(env!("CARGO_BIN_EXE_glint"))
        .arg("disassemble")
        .arg(fixture("arithmetic.glint"))
        .output()
        .expect("glint binary should run");
    assert_eq!(output.status.code().unwrap_or(-1), 0);
    let stdout = String::from_utf8(output.stdout).expect("stdout is valid utf8");
    assert!(stdout.contains("OP_PRINT"));
}
