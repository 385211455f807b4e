//! CLI - Command-line argument parsing
//!
//! Keeps argument parsing separate from execution logic.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use d3guard_common::monitor::Trigger;
use std::path::PathBuf;

/// d3guard CLI
#[derive(Parser, Debug)]
#[command(name = "d3guardctl")]
#[command(about = "Keep NVIDIA GPUs out of D3cold and repair the settings when they drift", long_about = None)]
#[command(version = env!("D3GUARD_VERSION"))]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Config file (default: <root>/etc/d3guard/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Operate on an offline root instead of the running system
    #[arg(long, global = true, env = "D3GUARD_ROOT", default_value = "/")]
    pub root: PathBuf,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print the report as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Report which settings are in place (read-only)
    Diagnose,

    /// Apply every missing or drifted setting
    Fix,

    /// Drift check run by the timer and package hooks
    Monitor {
        /// What started this run
        #[arg(long, value_enum, default_value_t = TriggerArg::Manual)]
        trigger: TriggerArg,
    },

    /// Install the monitor timer and package-manager hooks
    InstallMonitor {
        /// d3guardctl path written into the units and hooks
        /// (default: this executable)
        #[arg(long)]
        exe: Option<PathBuf>,
    },

    /// Remove everything fix and install-monitor wrote
    Uninstall {
        /// Also unmask sleep targets and drop the sleep drop-ins
        #[arg(long)]
        restore_suspend: bool,
    },

    /// Restart the display manager of a hung graphical session
    Recover,

    /// Show host, monitor installation and last drift event
    Status,
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Diagnose => "diagnose",
            Commands::Fix => "fix",
            Commands::Monitor { .. } => "monitor",
            Commands::InstallMonitor { .. } => "install-monitor",
            Commands::Uninstall { .. } => "uninstall",
            Commands::Recover => "recover",
            Commands::Status => "status",
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerArg {
    Timer,
    Package,
    Manual,
}

impl From<TriggerArg> for Trigger {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Timer => Trigger::Timer,
            TriggerArg::Package => Trigger::Package,
            TriggerArg::Manual => Trigger::Manual,
        }
    }
}
