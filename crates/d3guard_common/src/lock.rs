//! Run lock
//!
//! Repair runs from the timer, a package hook and an operator may overlap.
//! An exclusive `flock` on `<state_dir>/run.lock` serialises them; the lock
//! is released when the guard drops.

use crate::error::D3Error;
use crate::target::Target;
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const LOCK_FILE: &str = "run.lock";

pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    fn open(path: &Path) -> Result<File, D3Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?)
    }

    /// Wait until the lock is free
    pub fn acquire(target: &Target) -> Result<Self, D3Error> {
        let path = target.state_path(LOCK_FILE);
        let file = Self::open(&path)?;
        debug!("waiting for {}", path.display());
        file.lock_exclusive()?;
        Ok(Self { file, path })
    }

    /// `Err(LockBusy)` when another run holds the lock
    pub fn try_acquire(target: &Target) -> Result<Self, D3Error> {
        let path = target.state_path(LOCK_FILE);
        let file = Self::open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file, path }),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(D3Error::LockBusy(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
