//! Tests for profile load/save through the CLI (non-interactive paths only)
use std::fs;
use std::process::Command;
use std::sync::Mutex;

use fleetwatch::profiles::{load_profiles, profiles_path};

// Global lock to serialize tests that mutate process-wide environment variables.
static ENV_LOCK: Mutex<()> = Mutex::new(());

fn run_fleetwatch(args: &[&str]) -> (bool, String) {
    let exe = env!("CARGO_BIN_EXE_fleetwatch");
    let output = Command::new(exe)
        .args(args)
        .env_remove("FLEETWATCH_API_URL")
        .output()
        .expect("run fleetwatch");
    let ok = output.status.success();
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    (ok, text)
}

// Point config and log dirs at a fresh temp dir; keep the guard alive
fn isolate() -> tempfile::TempDir {
    let td = tempfile::tempdir().unwrap();
    std::env::set_var("XDG_CONFIG_HOME", td.path());
    std::env::set_var("XDG_STATE_HOME", td.path());
    td
}

#[test]
fn profile_created_on_first_use() {
    let _guard = ENV_LOCK.lock().unwrap();
    let _td = isolate();
    let (ok, out) = run_fleetwatch(&["--profile", "unittest", "--api", "http://example:1", "--dry-run"]);
    assert!(ok, "{out}");
    let data = fs::read_to_string(profiles_path()).expect("profiles.json created");
    assert!(data.contains("unittest"), "profiles.json missing profile entry: {data}");

    let loaded = load_profiles();
    assert_eq!(loaded.profiles["unittest"].api_url, "http://example:1");
    assert_eq!(loaded.profiles["unittest"].push_url, None);
}

#[test]
fn profile_overwrite_only_when_changed() {
    let _guard = ENV_LOCK.lock().unwrap();
    let _td = isolate();
    run_fleetwatch(&["--profile", "prod", "--api", "http://one:8000", "--dry-run"]);
    let first = fs::read_to_string(profiles_path()).unwrap();

    run_fleetwatch(&["--profile", "prod", "--api", "http://one:8000", "--dry-run"]);
    let second = fs::read_to_string(profiles_path()).unwrap();
    assert_eq!(first, second, "Profile file changed despite identical input");

    // --save skips the overwrite prompt
    run_fleetwatch(&["--profile", "prod", "--save", "--api", "http://two:8000", "--dry-run"]);
    let third = fs::read_to_string(profiles_path()).unwrap();
    assert!(third.contains("two"), "Updated URL not written: {third}");
}

#[test]
fn stored_profile_is_used_by_name() {
    let _guard = ENV_LOCK.lock().unwrap();
    let _td = isolate();
    run_fleetwatch(&[
        "--profile",
        "edge",
        "--api",
        "https://edge.example:8443",
        "--push",
        "wss://edge.example:9443/live",
        "--dry-run",
    ]);
    let (ok, out) = run_fleetwatch(&["--profile", "edge", "--dry-run"]);
    assert!(ok, "{out}");
    assert!(out.contains("wss://edge.example:9443/live"), "{out}");
}

#[test]
fn profile_tls_ca_persisted() {
    let _guard = ENV_LOCK.lock().unwrap();
    let td = isolate();
    let ca = td.path().join("cert.pem");
    fs::write(&ca, "not really a cert").unwrap();
    let ca = ca.to_string_lossy().into_owned();
    run_fleetwatch(&[
        "--profile",
        "secureX",
        "--tls-ca",
        &ca,
        "--api",
        "https://host",
        "--dry-run",
    ]);
    let data = fs::read_to_string(profiles_path()).unwrap();
    assert!(data.contains("secureX"));
    assert!(data.contains("cert.pem"));
}
