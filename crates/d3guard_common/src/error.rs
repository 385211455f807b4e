//! Error types for d3guard.
//!
//! Per-setting problems never travel as `D3Error` past the Reconciler: they
//! are folded into the RunReport as text. Only whole-run preconditions
//! (privilege, catalog construction, lock) surface to the CLI.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum D3Error {
    #[error("Insufficient privilege: {0}")]
    PermissionDenied(String),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Apply failed: {0}")]
    ApplyFailed(String),

    #[error("Explicit confirmation required: {0}")]
    ConsentRequired(String),

    #[error("Another d3guard run holds {0}")]
    LockBusy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl D3Error {
    /// Short machine-friendly tag, used in event records
    pub fn kind(&self) -> &'static str {
        match self {
            D3Error::PermissionDenied(_) => "permission_denied",
            D3Error::ResourceUnavailable(_) => "resource_unavailable",
            D3Error::ApplyFailed(_) => "apply_failed",
            D3Error::ConsentRequired(_) => "consent_required",
            D3Error::LockBusy(_) => "lock_busy",
            D3Error::Config(_) => "config",
            D3Error::Catalog(_) => "catalog",
            D3Error::Command(_) => "command",
            D3Error::Io(_) => "io",
            D3Error::Json(_) => "json",
        }
    }
}

/// Failure to run an external tool (systemctl, dconf, loginctl, ...)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0}: command not found")]
    NotFound(String),

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{program} exited with status {code}: {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("{program}: {message}")]
    Io { program: String, message: String },
}

impl CommandError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, D3Error>;
