// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Integration tests for the optiscan binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn cli() -> Command {
    Command::new(env!("CARGO_BIN_EXE_optiscan"))
}

const KEY: &str = r#"{
  "booklet": "B",
  "answers": { "1": "A", "2": "D", "3": "C", "4": "B", "5": "A", "6": "C" }
}"#;

#[test]
fn help_lists_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("self-test"));
}

#[test]
fn render_then_scan_with_key() {
    let dir = TempDir::new().unwrap();
    let key_path = dir.path().join("key.json");
    let sheet_path = dir.path().join("sheet.png");
    let overlay_path = dir.path().join("overlay.png");
    fs::write(&key_path, KEY).unwrap();

    cli()
        .args(["render", "--questions", "6", "--options", "4", "--student-code", "5550001234"])
        .arg("--key")
        .arg(&key_path)
        .arg(&sheet_path)
        .assert()
        .success();
    assert!(sheet_path.exists());

    cli()
        .args(["scan", "--questions", "6", "--options", "4", "--penalty", "0"])
        .arg("--key")
        .arg(&key_path)
        .arg("--overlay")
        .arg(&overlay_path)
        .arg(&sheet_path)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""studentCode": "5550001234""#))
        .stdout(predicate::str::contains(r#""booklet": "B""#))
        .stdout(predicate::str::contains(r#""correct": 6"#));
    assert!(overlay_path.exists());
}

#[test]
fn render_pdf_by_extension() {
    let dir = TempDir::new().unwrap();
    let pdf_path = dir.path().join("form.pdf");

    cli()
        .args(["render", "-q", "20", "--booklet", "c", "--paper", "letter", "--title", "Midterm"])
        .arg(&pdf_path)
        .assert()
        .success();

    let bytes = fs::read(&pdf_path).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[test]
fn locate_reports_markers() {
    let dir = TempDir::new().unwrap();
    let sheet_path = dir.path().join("blank.png");
    cli().args(["render", "-q", "10"]).arg(&sheet_path).assert().success();

    cli()
        .arg("locate")
        .arg(&sheet_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("topLeft"))
        .stdout(predicate::str::contains(r#""strategyIndex": 0"#));
}

#[test]
fn self_test_passes() {
    cli()
        .args(["self-test", "-q", "25", "--options", "4", "--booklet", "D"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""mismatchedQuestions": []"#));
}

#[test]
fn missing_image_fails_with_readable_error() {
    cli()
        .args(["scan", "-q", "10", "/nonexistent/sheet.jpg"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("could not be read"));
}

#[test]
fn invalid_shape_is_rejected() {
    let dir = TempDir::new().unwrap();
    cli()
        .args(["render", "-q", "10", "--options", "7"])
        .arg(dir.path().join("x.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("exam settings are not valid"));
}

#[test]
fn blank_image_reports_missing_markers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("paper.png");
    image::GrayImage::from_pixel(400, 560, image::Luma([240u8]))
        .save(&path)
        .unwrap();

    cli()
        .args(["scan", "-q", "10"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Corner markers not found"));
}
