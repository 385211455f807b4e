//! Service manager access
//!
//! The narrow slice of systemd d3guard needs: unit-file state queries,
//! mask/unmask, enable/disable, is-active, stop and restart. Everything runs
//! through `systemctl` via a `CommandRunner`.
//!
//! When the target root is not `/` (an offline image or chroot), unit-file
//! operations use `systemctl --root=<dir>`; runtime operations (is-active,
//! restart, daemon-reload) have nothing to talk to and degrade as
//! documented on each method.

use crate::command::CommandRunner;
use crate::error::CommandError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

// =============================================================================
// Unit File State
// =============================================================================

/// Unit file state as reported by `systemctl is-enabled`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitFileState {
    Enabled,
    Disabled,
    Static,
    Masked,
    Indirect,
    Generated,
    NotFound,
    Other(String),
}

impl UnitFileState {
    /// Parse the first stdout line of `systemctl is-enabled`
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "enabled" | "enabled-runtime" => UnitFileState::Enabled,
            "disabled" => UnitFileState::Disabled,
            "static" => UnitFileState::Static,
            "masked" | "masked-runtime" => UnitFileState::Masked,
            "indirect" => UnitFileState::Indirect,
            "generated" => UnitFileState::Generated,
            "not-found" | "" => UnitFileState::NotFound,
            other => UnitFileState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            UnitFileState::Enabled => "enabled",
            UnitFileState::Disabled => "disabled",
            UnitFileState::Static => "static",
            UnitFileState::Masked => "masked",
            UnitFileState::Indirect => "indirect",
            UnitFileState::Generated => "generated",
            UnitFileState::NotFound => "not-found",
            UnitFileState::Other(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for UnitFileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalize service name to include .service suffix
pub fn normalize_unit_name(name: &str) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        format!("{}.service", name)
    }
}

// =============================================================================
// Service Manager
// =============================================================================

/// Query and change unit state
pub trait ServiceManager: Send + Sync {
    fn unit_file_state(&self, unit: &str) -> Result<UnitFileState, CommandError>;
    fn is_active(&self, unit: &str) -> Result<bool, CommandError>;
    fn mask(&self, unit: &str) -> Result<(), CommandError>;
    fn unmask(&self, unit: &str) -> Result<(), CommandError>;
    fn enable(&self, unit: &str) -> Result<(), CommandError>;
    fn disable(&self, unit: &str) -> Result<(), CommandError>;
    fn stop(&self, unit: &str) -> Result<(), CommandError>;
    fn restart(&self, unit: &str) -> Result<(), CommandError>;
    fn daemon_reload(&self) -> Result<(), CommandError>;
}

/// `systemctl`-backed service manager
pub struct Systemctl {
    runner: Arc<dyn CommandRunner>,
    /// Offline root for unit-file operations; None means the running system
    root: Option<PathBuf>,
}

impl Systemctl {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner, root: None }
    }

    pub fn with_root(runner: Arc<dyn CommandRunner>, root: PathBuf) -> Self {
        Self {
            runner,
            root: Some(root),
        }
    }

    fn unit_file_args<'a>(&'a self, root_arg: &'a str, args: &[&'a str]) -> Vec<&'a str> {
        let mut full = Vec::with_capacity(args.len() + 1);
        if self.root.is_some() {
            full.push(root_arg);
        }
        full.extend_from_slice(args);
        full
    }

    fn root_arg(&self) -> String {
        self.root
            .as_ref()
            .map(|r| format!("--root={}", r.display()))
            .unwrap_or_default()
    }

    fn unit_file_op(&self, verb: &str, unit: &str) -> Result<(), CommandError> {
        let root_arg = self.root_arg();
        let args = self.unit_file_args(&root_arg, &[verb, unit]);
        self.runner.run_checked("systemctl", &args).map(|_| ())
    }
}

impl ServiceManager for Systemctl {
    fn unit_file_state(&self, unit: &str) -> Result<UnitFileState, CommandError> {
        let root_arg = self.root_arg();
        let args = self.unit_file_args(&root_arg, &["is-enabled", unit]);
        let output = self.runner.run("systemctl", &args)?;

        // is-enabled exits non-zero for anything but enabled; the state is on
        // stdout. Unknown units print nothing there and complain on stderr.
        let first = output.stdout.lines().next().unwrap_or("").trim();
        if first.is_empty() {
            if output.stderr.contains("No such file or directory")
                || output.stderr.contains("not found")
                || output.stderr.contains("does not exist")
            {
                return Ok(UnitFileState::NotFound);
            }
            if !output.success() {
                return Err(CommandError::Failed {
                    program: "systemctl".to_string(),
                    code: output.code,
                    stderr: output.stderr.trim().to_string(),
                });
            }
        }
        Ok(UnitFileState::parse(first))
    }

    /// Offline roots have no running units: always `false`
    fn is_active(&self, unit: &str) -> Result<bool, CommandError> {
        if self.root.is_some() {
            return Ok(false);
        }
        let output = self.runner.run("systemctl", &["is-active", "--quiet", unit])?;
        Ok(output.success())
    }

    fn mask(&self, unit: &str) -> Result<(), CommandError> {
        self.unit_file_op("mask", unit)
    }

    fn unmask(&self, unit: &str) -> Result<(), CommandError> {
        self.unit_file_op("unmask", unit)
    }

    fn enable(&self, unit: &str) -> Result<(), CommandError> {
        self.unit_file_op("enable", unit)
    }

    fn disable(&self, unit: &str) -> Result<(), CommandError> {
        self.unit_file_op("disable", unit)
    }

    /// Nothing runs inside an offline root: a no-op
    fn stop(&self, unit: &str) -> Result<(), CommandError> {
        if self.root.is_some() {
            return Ok(());
        }
        self.runner
            .run_checked("systemctl", &["stop", unit])
            .map(|_| ())
    }

    /// Offline roots cannot restart anything: always an error
    fn restart(&self, unit: &str) -> Result<(), CommandError> {
        if let Some(root) = &self.root {
            return Err(CommandError::Io {
                program: "systemctl".to_string(),
                message: format!("cannot restart {} inside offline root {}", unit, root.display()),
            });
        }
        self.runner
            .run_checked("systemctl", &["restart", unit])
            .map(|_| ())
    }

    /// Offline roots are picked up on next boot: a no-op
    fn daemon_reload(&self) -> Result<(), CommandError> {
        if self.root.is_some() {
            return Ok(());
        }
        self.runner
            .run_checked("systemctl", &["daemon-reload"])
            .map(|_| ())
    }
}

// =============================================================================
// Tests
// =============================================================================
