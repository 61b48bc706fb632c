//! Binary smoke tests that need no engine library

use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn jsm(home: &TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_jsm"));
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env_remove("JEPATH");
    cmd
}

#[test]
fn test_print_config_reflects_overrides() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("jsm.toml");
    fs::write(&config, "[registry]\nchunk_size = 7\n").unwrap();

    let output = jsm(&home)
        .arg("--config")
        .arg(&config)
        .args(["--log-level", "debug", "--print-config"])
        .output()
        .expect("Failed to spawn jsm");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("chunk_size = 7"));
    assert!(stdout.contains("level = \"debug\""));
}

#[test]
fn test_missing_library_is_fatal() {
    let home = TempDir::new().unwrap();
    let output = jsm(&home)
        .args(["--engine", "/nonexistent/libj-missing.so", "-jprofile"])
        .output()
        .expect("Failed to spawn jsm");

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("libj-missing.so"));
}

#[test]
fn test_jepath_overrides_engine_flag() {
    let home = TempDir::new().unwrap();
    let output = jsm(&home)
        .env("JEPATH", "/nonexistent/from-env.so")
        .args(["--engine", "/nonexistent/from-flag.so"])
        .output()
        .expect("Failed to spawn jsm");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("from-env.so"));
    assert!(!stderr.contains("from-flag.so"));
}

#[test]
fn test_bad_config_file_is_fatal() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("broken.toml");
    fs::write(&config, "[registry\n").unwrap();

    let output = jsm(&home)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("Failed to spawn jsm");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Config parse error"));
}
