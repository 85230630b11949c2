use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;

#[test]
fn new_bundle_then_info_round_trips_document_id() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let bundle = temp.path().join("bundle");

    let created_id = cargo_bin_cmd!("speedynote-canvas-cli")
        .arg("new-bundle")
        .arg(&bundle)
        .arg("--mode")
        .arg("paged")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let created_id = String::from_utf8(created_id).unwrap().trim().to_string();

    let output = cargo_bin_cmd!("speedynote-canvas-cli")
        .arg("info")
        .arg(&bundle)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["document_id"], Value::String(created_id));
    assert_eq!(value["mode"], Value::String("Paged".to_string()));
    assert_eq!(value["bookmark_count"], 0);
}

#[test]
fn new_bundle_refuses_to_overwrite_existing_metadata() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let bundle = temp.path().join("bundle");

    cargo_bin_cmd!("speedynote-canvas-cli").arg("new-bundle").arg(&bundle).assert().success();

    cargo_bin_cmd!("speedynote-canvas-cli")
        .arg("new-bundle")
        .arg(&bundle)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already has metadata"));
}

#[test]
fn info_fails_for_missing_bundle_directory() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let missing = temp.path().join("does-not-exist");

    cargo_bin_cmd!("speedynote-canvas-cli")
        .arg("info")
        .arg(&missing)
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn render_page_writes_a_png_for_a_fresh_bundle() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let bundle = temp.path().join("bundle");
    let output_path = temp.path().join("page0.png");

    cargo_bin_cmd!("speedynote-canvas-cli").arg("new-bundle").arg(&bundle).assert().success();

    cargo_bin_cmd!("speedynote-canvas-cli")
        .arg("render-page")
        .arg(&bundle)
        .arg("--page")
        .arg("0")
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    assert!(output_path.exists(), "rendered page should exist");
    let image = image::open(&output_path).expect("rendered page should be a readable image");
    assert!(image.width() > 0);
    assert!(image.height() > 0);
}

#[test]
fn tile_info_reports_an_empty_manifest_for_a_fresh_bundle() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let bundle = temp.path().join("bundle");

    cargo_bin_cmd!("speedynote-canvas-cli")
        .arg("new-bundle")
        .arg(&bundle)
        .arg("--mode")
        .arg("edgeless")
        .assert()
        .success();

    let output = cargo_bin_cmd!("speedynote-canvas-cli")
        .arg("tile-info")
        .arg(&bundle)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value, serde_json::json!([]));
}

#[test]
fn migrate_legacy_reports_when_nothing_to_migrate() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let bundle = temp.path().join("bundle");
    std::fs::create_dir_all(&bundle).unwrap();

    cargo_bin_cmd!("speedynote-canvas-cli")
        .arg("migrate-legacy")
        .arg(&bundle)
        .assert()
        .success()
        .stdout(predicate::str::contains("no legacy metadata found"));
}
