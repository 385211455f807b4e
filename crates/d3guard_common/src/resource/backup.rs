//! Pre-change backups under `<state_dir>/backups/`
//!
//! One record per resource key, taken before the first change d3guard makes
//! and consumed by `revert`. Later applies never overwrite it, so the record
//! always holds the host's original state. Whole-file copies are only kept
//! for files d3guard replaces outright; shared files record just what
//! d3guard itself changed so edits made afterwards survive a revert.

use crate::target::Target;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `/etc/xdg/powerdevilrc` → `%2Fetc%2Fxdg%2Fpowerdevilrc`
fn escape_key(key: &str) -> String {
    key.replace('%', "%25").replace('/', "%2F")
}

pub fn backup_path(target: &Target, key: &str) -> PathBuf {
    target.state_path("backups").join(escape_key(key))
}

pub fn has_backup(target: &Target, key: &str) -> bool {
    backup_path(target, key).exists()
}

/// Copy `live` aside unless a backup for `key` exists or `live` is missing
pub fn save_file_once(target: &Target, key: &str, live: &Path) -> io::Result<()> {
    let backup = backup_path(target, key);
    if backup.exists() || !live.exists() {
        return Ok(());
    }
    if let Some(dir) = backup.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::copy(live, &backup)?;
    debug!("backed up {} to {}", key, backup.display());
    Ok(())
}

/// Store a small value (such as a prior unit state) unless one is recorded
pub fn record_once(target: &Target, key: &str, value: &str) -> io::Result<()> {
    let backup = backup_path(target, key);
    if backup.exists() {
        return Ok(());
    }
    if let Some(dir) = backup.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&backup, value)
}

/// Add `lines` to the newline-separated record for `key`, skipping any
/// already listed
pub fn append_record(target: &Target, key: &str, lines: &[&str]) -> io::Result<()> {
    let backup = backup_path(target, key);
    let mut recorded = match fs::read_to_string(&backup) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    let mut changed = false;
    for line in lines {
        if !recorded.lines().any(|l| l == *line) {
            recorded.push_str(line);
            recorded.push('\n');
            changed = true;
        }
    }
    if !changed {
        return Ok(());
    }
    if let Some(dir) = backup.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&backup, recorded)
}

/// Read and delete the backup for `key`
pub fn take(target: &Target, key: &str) -> io::Result<Option<Vec<u8>>> {
    let backup = backup_path(target, key);
    match fs::read(&backup) {
        Ok(contents) => {
            fs::remove_file(&backup)?;
            Ok(Some(contents))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Put the backup for `key` back at `live`; false when there was none
pub fn restore(target: &Target, key: &str, live: &Path, mode: u32) -> io::Result<bool> {
    match take(target, key)? {
        Some(contents) => {
            super::atomic_write(live, &contents, mode)?;
            debug!("restored {} from backup", key);
            Ok(true)
        }
        None => Ok(false),
    }
}
