//! CLI integration tests

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const COMBINED_DATA: &str = r#"{
    "Estrogen Data": [{"Estrogen": 10}, {"Estrogen": 12}, {"Estrogen": 11},
                      {"Estrogen": 13}, {"Estrogen": 12}, {"Estrogen": 14}],
    "Cortisol Data": [{"Cortisol": 6.0}, {"Cortisol": 12.5}, {"Cortisol": 9.0}],
    "Immunity Data": [{"Immunity Score": 62}, {"Immunity Score": 70}, {"Immunity Score": 67}],
    "Health Data": [{"weight": 58}, {"weight": 57, "exercise_habit": true, "steps": 11000}]
}"#;

/// Run `bma` with an isolated home directory and store paths under `dir`
fn bma(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bma"))
        .args(args)
        .env("HOME", dir)
        .env("BMA_MODEL_DIR", dir.join("models"))
        .env("BMA_RESULTS_FILE", dir.join("analysis_results.json"))
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute bma")
}

fn write_data(dir: &Path) -> String {
    let path = dir.join("combined_data.json");
    fs::write(&path, COMBINED_DATA).unwrap();
    path.to_string_lossy().into_owned()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    let output = bma(dir.path(), &["--help"]);
    let stdout = stdout(&output);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Biomarker Analysis"), "Should show app name");
    assert!(stdout.contains("analyze"), "Should show analyze command");
    assert!(stdout.contains("show"), "Should show show command");
    assert!(stdout.contains("ledger"), "Should show ledger command");
    assert!(stdout.contains("models"), "Should show models command");
}

#[test]
fn test_cli_version() {
    let dir = TempDir::new().unwrap();
    let output = bma(dir.path(), &["--version"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("bma"), "Should show binary name");
}

#[test]
fn test_analyze_help() {
    let dir = TempDir::new().unwrap();
    let output = bma(dir.path(), &["analyze", "--help"]);
    let stdout = stdout(&output);

    assert!(output.status.success());
    assert!(stdout.contains("--data"), "Should show data option");
    assert!(stdout.contains("--phase"), "Should show phase option");
    assert!(stdout.contains("--no-save"), "Should show no-save option");
}

#[test]
fn test_analyze_saves_models_and_result() {
    let dir = TempDir::new().unwrap();
    let data = write_data(dir.path());

    let output = bma(dir.path(), &["analyze", "--data", &data, "--format", "json"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let result: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert!(result["estrogen_Level"].is_number());
    assert!(result["cortisol_Level"].is_number());
    assert!(result["immunity_Score"].is_number());

    assert!(dir.path().join("analysis_results.json").exists());
    assert!(dir.path().join("models").join("model_estrogen.json").exists());

    let output = bma(dir.path(), &["ledger", "--format", "json"]);
    assert!(output.status.success());
    let ledger: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(ledger.as_array().unwrap().len(), 3);
    assert_eq!(ledger[0]["model_key"], "estrogen");
    assert_eq!(ledger[0]["data_count"], 6);

    let output = bma(dir.path(), &["models"]);
    assert!(output.status.success());
    let table = stdout(&output);
    assert!(table.contains("linear"));
    assert!(table.contains("rbf"));

    let output = bma(dir.path(), &["show", "--format", "json"]);
    assert!(output.status.success());
    let shown: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(shown, result);
}

#[test]
fn test_analyze_no_save_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let data = write_data(dir.path());

    let output = bma(
        dir.path(),
        &["analyze", "--data", &data, "--phase", "ovulation", "--no-save"],
    );
    assert!(output.status.success());
    assert!(stdout(&output).contains("estrogen"));

    assert!(!dir.path().join("analysis_results.json").exists());
    assert!(!dir.path().join("models").join("model_last_trained.json").exists());
}

#[test]
fn test_analyze_rejects_unknown_phase() {
    let dir = TempDir::new().unwrap();
    let data = write_data(dir.path());

    let output = bma(dir.path(), &["analyze", "--data", &data, "--phase", "luteal"]);
    assert!(!output.status.success());
    assert!(!dir.path().join("analysis_results.json").exists());
}

#[test]
fn test_show_without_result_fails() {
    let dir = TempDir::new().unwrap();
    let output = bma(dir.path(), &["show", "--date", "2025-04-01"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("2025-04-01"));
}

#[test]
fn test_config_file_supplies_format() {
    let dir = TempDir::new().unwrap();
    let config_dir = dir.path().join(".config").join("bma");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.json"), r#"{"default_format": "json"}"#).unwrap();

    let output = bma(dir.path(), &["ledger"]);
    assert!(output.status.success());
    let ledger: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert!(ledger.as_array().unwrap().is_empty());
}
