//! Integration tests for CLI commands.
//!
//! None of these reach the network: they cover local commands and the
//! failures that must happen before any request is sent.

#![allow(deprecated)]

use std::path::PathBuf;
use std::process::Command;

use assert_cmd::{assert::OutputAssertExt, cargo::CommandCargoExt};
use predicates::prelude::*;
use tempfile::TempDir;

/// A scratch plugins directory and an empty configuration file.
struct Workspace {
    temp: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("trellis.toml"), "").unwrap();
        Self { temp }
    }

    fn plugins_dir(&self) -> PathBuf {
        self.temp.path().join("plugins")
    }

    fn config_path(&self) -> PathBuf {
        self.temp.path().join("trellis.toml")
    }

    fn trellis(&self) -> Command {
        let mut cmd = Command::cargo_bin("trellis").unwrap();
        cmd.env_remove("RUST_LOG")
            .arg("--config")
            .arg(self.config_path())
            .arg("--dir")
            .arg(self.plugins_dir());
        cmd
    }

    fn write_plugin(&self, folder: &str, manifest: &str) -> PathBuf {
        let dir = self.plugins_dir().join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("package.json"), manifest).unwrap();
        std::fs::write(dir.join("main.js"), "export {}").unwrap();
        dir
    }
}

fn managed_manifest(name: &str) -> String {
    format!(
        r#"{{
            "name": "{name}",
            "version": "1.2.0",
            "managedFlag": true,
            "provenance": {{
                "name": "{name}",
                "title": "Title of {name}",
                "url": "https://artifacthub.io/packages/trellis/repo/{name}",
                "version": "1.2.0",
                "repoName": "repo",
                "author": "someone"
            }}
        }}"#
    )
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("trellis").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("uninstall"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("info"));
}

#[test]
fn test_version_command() {
    let mut cmd = Command::cargo_bin("trellis").unwrap();
    cmd.arg("--version");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("trellis 0.1.0"));
}

#[test]
fn test_list_empty() {
    let ws = Workspace::new();

    ws.trellis()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No plugins installed."));
}

#[test]
fn test_list_json_empty() {
    let ws = Workspace::new();

    ws.trellis()
        .args(["list", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));
}

#[test]
fn test_list_shows_only_managed_plugins() {
    let ws = Workspace::new();
    ws.write_plugin("pod-counter", &managed_manifest("pod-counter"));
    ws.write_plugin("hand-copied", r#"{"name": "hand-copied"}"#);

    ws.trellis()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("pod-counter v1.2.0"))
        .stdout(predicate::str::contains("Title of pod-counter"))
        .stdout(predicate::str::contains("hand-copied").not());
}

#[test]
fn test_list_json_is_parseable() {
    let ws = Workspace::new();
    ws.write_plugin("pod-counter", &managed_manifest("pod-counter"));

    let output = ws.trellis().args(["list", "--json"]).output().unwrap();
    assert!(output.status.success());

    let listing: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listing[0]["name"], "pod-counter");
    assert_eq!(listing[0]["provenance"]["repoName"], "repo");
}

#[test]
fn test_uninstall_managed_plugin() {
    let ws = Workspace::new();
    let dir = ws.write_plugin("pod-counter", &managed_manifest("pod-counter"));

    ws.trellis()
        .args(["uninstall", "pod-counter"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Uninstalled pod-counter"));

    assert!(!dir.exists());
}

#[test]
fn test_uninstall_refuses_unmanaged_folder() {
    let ws = Workspace::new();
    let dir = ws.write_plugin("hand-copied", r#"{"name": "hand-copied"}"#);

    ws.trellis()
        .args(["uninstall", "hand-copied"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid plugin folder"));

    assert!(dir.join("package.json").exists());
}

#[test]
fn test_uninstall_missing_plugin() {
    let ws = Workspace::new();

    ws.trellis()
        .args(["uninstall", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("plugin not found: ghost"));
}

#[test]
fn test_uninstall_rejects_traversal_name() {
    let ws = Workspace::new();
    let outside = ws.temp.path().join("victim");
    std::fs::create_dir_all(&outside).unwrap();

    ws.trellis()
        .args(["uninstall", "../victim"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid plugin name"));

    assert!(outside.exists());
}

#[test]
fn test_install_rejects_url_outside_registry() {
    let ws = Workspace::new();

    ws.trellis()
        .args(["install", "https://example.com/packages/repo/pod-counter"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid package URL"));

    assert!(!ws.plugins_dir().exists());
}

#[test]
fn test_update_all_with_nothing_installed() {
    let ws = Workspace::new();

    ws.trellis()
        .arg("update")
        .assert()
        .success()
        .stdout(predicate::str::contains("No plugins installed."));
}

#[test]
fn test_update_unknown_plugin() {
    let ws = Workspace::new();

    ws.trellis()
        .args(["update", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("plugin not found: ghost"));
}

#[test]
fn test_invalid_config_is_reported() {
    let ws = Workspace::new();
    std::fs::write(
        ws.config_path(),
        "[plugins]\nhost_version = \"not-a-version\"\n",
    )
    .unwrap();

    ws.trellis()
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load configuration"));
}

#[test]
fn test_missing_explicit_config_is_reported() {
    let ws = Workspace::new();

    let mut cmd = Command::cargo_bin("trellis").unwrap();
    cmd.arg("--config")
        .arg(ws.temp.path().join("missing.toml"))
        .arg("--dir")
        .arg(ws.plugins_dir())
        .arg("list");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn test_config_directory_is_used_without_dir_flag() {
    let ws = Workspace::new();
    let configured = ws.temp.path().join("configured-plugins");
    std::fs::write(
        ws.config_path(),
        format!("[plugins]\ndirectory = {:?}\n", configured.display().to_string()),
    )
    .unwrap();

    let dir = configured.join("pod-counter");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("package.json"), managed_manifest("pod-counter")).unwrap();
    std::fs::write(dir.join("main.js"), "").unwrap();

    let mut cmd = Command::cargo_bin("trellis").unwrap();
    cmd.env_remove("TRELLIS_PLUGINS_DIR")
        .arg("--config")
        .arg(ws.config_path())
        .arg("list");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("pod-counter v1.2.0"));
}
