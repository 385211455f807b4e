//! Resource primitives
//!
//! A resource is one thing on the OS that d3guard reads and writes: a whole
//! file, some lines or keys inside a shared file, a unit file state, or a
//! set of sysfs attributes. Settings are built from one or more resources.
//!
//! Every resource:
//! - Has a stable `key` (path or unit name). No two Settings share a key.
//! - Probes without side effects
//! - Applies idempotently: applying a Satisfied resource changes nothing
//! - Reverts only what it changed: a replaced file comes back from its
//!   backup, a shared file loses just the lines, block or keys d3guard put
//!   there, and edits made after the fix stay

pub mod backup;
mod file;
mod ini;
mod pci;
mod unit;

pub use file::{ManagedBlock, ManagedFile, RequiredLines};
pub use ini::IniKeys;
pub use pci::{nvidia_display_functions, PciPowerAttrs};
pub use unit::{DesiredUnitState, UnitState};

use crate::error::D3Error;
use crate::state::ProbeState;
use crate::target::Target;
use std::fs;
use std::io;
use std::path::Path;

pub trait Resource: Send + Sync {
    /// Stable identity: absolute path, `unit:<name>` or `sysfs:<what>`
    fn key(&self) -> String;

    /// `Err(ResourceUnavailable)` when the backing subsystem is missing
    fn available(&self, _target: &Target) -> Result<(), D3Error> {
        Ok(())
    }

    fn probe(&self, target: &Target) -> ProbeState;

    fn apply(&self, target: &Target) -> Result<(), D3Error>;

    fn revert(&self, target: &Target) -> Result<(), D3Error>;
}

/// Fold sub-resource probes into one state
///
/// Any Unknown wins, then all-Satisfied, then all-Absent; anything else is
/// Drifted with the differing keys listed.
pub fn combine(states: &[(String, ProbeState)]) -> ProbeState {
    if states.is_empty() {
        return ProbeState::Satisfied;
    }

    let unknown: Vec<String> = states
        .iter()
        .filter_map(|(key, state)| match state {
            ProbeState::Unknown(reason) => Some(format!("{}: {}", key, reason)),
            _ => None,
        })
        .collect();
    if !unknown.is_empty() {
        return ProbeState::Unknown(unknown.join("; "));
    }

    if states.iter().all(|(_, s)| s.is_satisfied()) {
        return ProbeState::Satisfied;
    }
    if states.iter().all(|(_, s)| *s == ProbeState::Absent) {
        return ProbeState::Absent;
    }

    let differing: Vec<String> = states
        .iter()
        .filter(|(_, s)| !s.is_satisfied())
        .map(|(key, state)| match state.detail() {
            Some(detail) => format!("{}: {}", key, detail),
            None => format!("{}: {}", key, state.as_str()),
        })
        .collect();
    ProbeState::Drifted(differing.join("; "))
}

// =============================================================================
// File helpers
// =============================================================================

/// Read a file; `Ok(None)` when it does not exist
pub(crate) fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write through a temp file in the same directory, then rename over
pub(crate) fn atomic_write(path: &Path, contents: &[u8], mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let parent = path
        .parent()
        .ok_or_else(|| io::Error::other("no parent directory"))?;
    fs::create_dir_all(parent)?;

    let tmp_path = parent.join(format!(".tmp.{}.d3guard", uuid::Uuid::new_v4()));
    fs::write(&tmp_path, contents)?;
    fs::set_permissions(&tmp_path, fs::Permissions::from_mode(mode))?;

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        e
    })
}

pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

pub(crate) fn write_failed(path: &str, e: io::Error) -> D3Error {
    D3Error::ApplyFailed(format!("write {}: {}", path, e))
}

/// Probe result for a file that could not be read
pub(crate) fn unreadable(path: &str, e: io::Error) -> ProbeState {
    ProbeState::Unknown(format!("cannot read {}: {}", path, e))
}

/// Fails with `ResourceUnavailable` unless `requires` exists under the root
pub(crate) fn require_path(target: &Target, requires: Option<&str>) -> Result<(), D3Error> {
    if let Some(required) = requires {
        if !target.path(required).exists() {
            return Err(D3Error::ResourceUnavailable(format!(
                "{} not present",
                required
            )));
        }
    }
    Ok(())
}
