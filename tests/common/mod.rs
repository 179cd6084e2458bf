//! Shared helpers for hgmirror integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Temporary caches plus a config file pointing at them
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");
        Self {
            temp_dir,
            config_path,
        }
    }

    pub fn hg_cache(&self) -> PathBuf {
        self.temp_dir.path().join("hg")
    }

    pub fn git_cache(&self) -> PathBuf {
        self.temp_dir.path().join("git")
    }

    /// Write a config with the temp caches and the given repository list
    pub fn write_config(&self, repositories_yaml: &str) -> &Path {
        let content = format!(
            "hg_cache: \"{}\"\ngit_cache: \"{}\"\nrepositories:{}\ngithub:\n  organization: tryton-test\n",
            self.hg_cache().display(),
            self.git_cache().display(),
            repositories_yaml
        );
        std::fs::write(&self.config_path, content).expect("Failed to write test config");
        &self.config_path
    }

    pub fn write_raw_config(&self, content: &str) -> &Path {
        std::fs::write(&self.config_path, content).expect("Failed to write test config");
        &self.config_path
    }

    /// Run the binary against this environment's config
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_hgmirror"))
            .arg("--config")
            .arg(&self.config_path)
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .expect("Failed to execute hgmirror")
    }
}

/// Assertion helper for multi-item output checks
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
