//! Common test utilities for CLI integration tests

#![allow(dead_code)]

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tempfile::TempDir;

/// Isolated settings file, database and home directory for one test
pub struct CliTestContext {
    pub test_dir: TempDir,
    pub berth_binary: PathBuf,
}

impl CliTestContext {
    /// Create a context whose runs use `/bin/sh` without profile sourcing
    pub fn new() -> Result<Self> {
        let ctx = Self {
            test_dir: TempDir::new()?,
            berth_binary: PathBuf::from(env!("CARGO_BIN_EXE_berth")),
        };
        std::fs::create_dir_all(ctx.work_dir())?;
        ctx.run_cli_command(&[
            "config",
            "set",
            "--default-shell",
            "sh",
            "--source-profiles",
            "false",
        ])?
        .assert_success();
        Ok(ctx)
    }

    /// Scratch directory to use as a project root
    pub fn work_dir(&self) -> PathBuf {
        self.test_dir.path().join("work")
    }

    pub fn config_path(&self) -> PathBuf {
        self.test_dir.path().join("config.yaml")
    }

    /// Run a CLI command against this context and return its output
    pub fn run_cli_command(&self, args: &[&str]) -> Result<CliOutput> {
        let output = Command::new(&self.berth_binary)
            .env("HOME", self.test_dir.path())
            .arg("--config")
            .arg(self.config_path())
            .arg("--data-dir")
            .arg(self.test_dir.path().join("data"))
            .args(args)
            .output()?;

        Ok(CliOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            exit_code: output.status.code(),
        })
    }

    /// Start a CLI command with piped output, leaving the caller to drive it
    pub fn spawn_cli_command(&self, args: &[&str]) -> Result<Child> {
        let child = Command::new(&self.berth_binary)
            .env("HOME", self.test_dir.path())
            .arg("--config")
            .arg(self.config_path())
            .arg("--data-dir")
            .arg(self.test_dir.path().join("data"))
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        Ok(child)
    }

    /// Add a project rooted at `root`
    pub fn add_project(&self, name: &str, root: &Path) -> Result<()> {
        let root = root.to_string_lossy();
        self.run_cli_command(&["project", "add", name, "--root", &root])?
            .assert_success();
        Ok(())
    }
}

#[derive(Debug)]
pub struct CliOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: Option<i32>,
}

impl CliOutput {
    pub fn assert_success(&self) -> &Self {
        if !self.success {
            panic!(
                "Command failed with exit code {:?}\nSTDOUT:\n{}\nSTDERR:\n{}",
                self.exit_code, self.stdout, self.stderr
            );
        }
        self
    }

    pub fn assert_failure(&self) -> &Self {
        if self.success {
            panic!(
                "Command succeeded but was expected to fail\nSTDOUT:\n{}\nSTDERR:\n{}",
                self.stdout, self.stderr
            );
        }
        self
    }

    pub fn assert_contains(&self, text: &str) -> &Self {
        if !self.stdout.contains(text) && !self.stderr.contains(text) {
            panic!(
                "Output does not contain '{}'\nSTDOUT:\n{}\nSTDERR:\n{}",
                text, self.stdout, self.stderr
            );
        }
        self
    }

    pub fn assert_not_contains(&self, text: &str) -> &Self {
        if self.stdout.contains(text) || self.stderr.contains(text) {
            panic!(
                "Output unexpectedly contains '{}'\nSTDOUT:\n{}\nSTDERR:\n{}",
                text, self.stdout, self.stderr
            );
        }
        self
    }
}
