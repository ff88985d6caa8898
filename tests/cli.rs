use std::fs;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

fn ocho() -> Command {
    Command::cargo_bin("ocho").unwrap()
}

#[test]
fn no_arguments_prints_banner_and_exits_with_usage_code() {
    ocho()
        .assert()
        .code(64)
        .stdout(predicate::str::contains("ocho"));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    ocho().arg("--frobnicate").assert().code(64);
}

#[test]
fn help_exits_cleanly() {
    ocho()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("toolchain"));
}

#[test]
fn check_accepts_a_valid_program() {
    ocho()
        .args(["check", "tests/files/add.cp8"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Success"));
}

#[test]
fn check_reports_unresolved_labels() {
    ocho()
        .args(["check", "tests/files/undefined.cp8"])
        .assert()
        .code(65)
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn check_reports_data_origin_collisions() {
    ocho()
        .args(["check", "tests/files/collide.cp8"])
        .assert()
        .code(65)
        .stderr(predicate::str::contains("origin"));
}

#[test]
fn check_rejects_non_source_files() {
    ocho()
        .args(["check", "tests/files/add.ch8"])
        .assert()
        .code(64);
}

#[test]
fn run_rejects_unknown_extensions() {
    ocho()
        .args(["run", "tests/files/program.rom"])
        .assert()
        .code(64)
        .stdout(predicate::str::contains("extension"));
}

#[test]
fn missing_input_file_is_an_io_error() {
    ocho()
        .args(["run", "tests/files/ghost.cp8"])
        .assert()
        .code(74);
}

#[test]
fn oversize_binary_image_is_an_io_error() {
    let path = std::env::temp_dir().join("ocho_oversize.ch8");
    fs::write(&path, vec![0u8; 0xE01]).unwrap();
    ocho().arg("run").arg(&path).assert().code(74);
    let _ = fs::remove_file(&path);
}

#[test]
fn compile_emits_the_expected_image() {
    let out = std::env::temp_dir().join("ocho_add.ch8");
    ocho()
        .arg("compile")
        .arg("tests/files/add.cp8")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved"));

    let image = fs::read(&out).unwrap();
    // forward label backpatched, data sitting two bytes past text
    assert_eq!(
        image,
        vec![
            0x60, 0x05, 0x61, 0x0A, 0x80, 0x14, 0x12, 0x0A, //
            0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x01, 0x02,
        ]
    );
    let _ = fs::remove_file(&out);
}
