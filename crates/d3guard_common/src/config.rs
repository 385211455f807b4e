//! d3guard Configuration
//!
//! Config file: `<root>/etc/d3guard/config.toml`, or the path given with
//! `--config`. Every section and key is optional; missing ones fall back to
//! the defaults below.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Location of the system config, relative to the target root
pub const SYSTEM_CONFIG_PATH: &str = "/etc/d3guard/config.toml";

/// Drift monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Timer period written into the monitor timer unit
    pub interval_minutes: u32,

    /// Lower bound between two timer-triggered runs
    pub min_interval_secs: u64,

    /// Send desktop notifications to logged-in users on drift
    pub notify_users: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            min_interval_secs: 300,
            notify_users: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Per external command
    pub timeout_secs: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: crate::command::DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    /// Setting ids excluded from every catalog
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UninstallConfig {
    /// Also unmask sleep targets and drop the sleep drop-ins
    pub restore_suspend: bool,
}

/// Absolute paths as seen from inside the target root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub state_dir: String,
    pub event_log: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: "/var/lib/d3guard".to_string(),
            event_log: "/var/log/d3guard/events.jsonl".to_string(),
        }
    }
}

/// Main d3guard configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct D3Config {
    pub monitor: MonitorConfig,
    pub commands: CommandsConfig,
    pub settings: SettingsConfig,
    pub uninstall: UninstallConfig,
    pub paths: PathsConfig,
}

impl D3Config {
    /// System config path under `root`
    pub fn system_config_path(root: &Path) -> PathBuf {
        root.join(SYSTEM_CONFIG_PATH.trim_start_matches('/'))
    }

    /// Load configuration (explicit path first, then system, then defaults)
    ///
    /// An explicit path that does not exist is an error; a missing system
    /// config is not.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let system_path = Self::system_config_path(root);
        if system_path.exists() {
            return Self::load_from(&system_path);
        }

        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: D3Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.monitor.interval_minutes == 0 {
            anyhow::bail!("monitor.interval_minutes must be at least 1");
        }
        if self.commands.timeout_secs == 0 {
            anyhow::bail!("commands.timeout_secs must be at least 1");
        }
        for (key, value) in [
            ("paths.state_dir", &self.paths.state_dir),
            ("paths.event_log", &self.paths.event_log),
        ] {
            if !value.starts_with('/') {
                anyhow::bail!("{} must be an absolute path, got '{}'", key, value);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = D3Config::default();
        assert_eq!(config.monitor.interval_minutes, 30);
        assert_eq!(config.monitor.min_interval_secs, 300);
        assert!(config.monitor.notify_users);
        assert_eq!(config.commands.timeout_secs, 20);
        assert!(config.settings.disabled.is_empty());
        assert!(!config.uninstall.restore_suspend);
        assert_eq!(config.paths.state_dir, "/var/lib/d3guard");
    }

    #[test]
    fn test_missing_system_config_uses_defaults() {
        let root = TempDir::new().unwrap();
        let config = D3Config::load(root.path(), None).unwrap();
        assert_eq!(config, D3Config::default());
    }

    #[test]
    fn test_partial_system_config() {
        let root = TempDir::new().unwrap();
        let path = D3Config::system_config_path(root.path());
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            &path,
            "[monitor]\ninterval_minutes = 10\n\n[settings]\ndisabled = [\"xorg-dpms\"]\n",
        )
        .unwrap();

        let config = D3Config::load(root.path(), None).unwrap();
        assert_eq!(config.monitor.interval_minutes, 10);
        assert_eq!(config.monitor.min_interval_secs, 300);
        assert_eq!(config.settings.disabled, vec!["xorg-dpms".to_string()]);
    }

    #[test]
    fn test_explicit_missing_path_is_error() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("nope.toml");
        assert!(D3Config::load(root.path(), Some(&missing)).is_err());
    }

    #[test]
    fn test_relative_state_dir_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[paths]\nstate_dir = \"var/lib/d3guard\"\n").unwrap();
        let err = D3Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("paths.state_dir"));
    }
}
