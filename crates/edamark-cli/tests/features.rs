use assert_cmd::Command;
use serde_json::Value;
use std::{error::Error, fs, path::PathBuf};
use tempfile::tempdir;

fn sample_path(relative: &str) -> String {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .join(relative)
        .to_string_lossy()
        .to_string()
}

fn statuses(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).expect("json line"))
        .map(|v| v["status"].as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn features_are_cached_between_runs() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let cache = dir.path().join("pickled/feature_dicts.json");
    let config = sample_path("test_data/edamark.toml");
    let run = || -> Result<Vec<u8>, Box<dyn Error>> {
        Ok(Command::cargo_bin("edamark")?
            .args([
                "--config",
                &config,
                "features",
                "--cache",
                cache.to_str().expect("utf8 path"),
            ])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone())
    };
    let first = statuses(&run()?);
    assert_eq!(first, vec!["computed", "computed"]);
    assert!(cache.exists());
    let second = statuses(&run()?);
    assert_eq!(second, vec!["loaded", "loaded"]);
    Ok(())
}

#[test]
fn corrupt_cache_is_reported() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let cache = dir.path().join("feature_dicts.json");
    fs::write(&cache, "not a cache")?;
    let output = Command::cargo_bin("edamark")?
        .args([
            "--config",
            &sample_path("test_data/edamark.toml"),
            "features",
            "--cache",
            cache.to_str().expect("utf8 path"),
        ])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("failed to load cache"));
    Ok(())
}

#[test]
fn decompose_writes_components() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let output = Command::cargo_bin("edamark")?
        .args([
            "--config",
            &sample_path("test_data/edamark.toml"),
            "decompose",
            "--input",
            &sample_path("test_data/shimmer/20190320_trev_wrist_Session2_Shimmer.csv"),
            "--export-dir",
            dir.path().to_str().expect("utf8 path"),
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(summary["fs"], 4.0);
    assert_eq!(summary["samples"], 20);
    let written = dir
        .path()
        .join("20190320_trev_wrist_Session2_Shimmer_DECOMPOSED.csv");
    let text = fs::read_to_string(written)?;
    assert!(text.starts_with("sample,EDA_Tonic,EDA_Phasic"));
    assert_eq!(text.lines().count(), 21);
    Ok(())
}

#[test]
fn decompose_missing_input_is_not_found() -> Result<(), Box<dyn Error>> {
    let output = Command::cargo_bin("edamark")?
        .args(["decompose", "--input", "/no/such/recording.csv"])
        .write_stdin("")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&output).contains("file not found"));
    Ok(())
}
