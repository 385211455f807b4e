//! The OS surface every probe and apply goes through.
//!
//! A `Target` bundles the filesystem root, the service manager and the
//! command runner. Production uses `/` with `systemctl`; tests use a
//! temporary directory with in-memory fakes; `--root` points it at an
//! offline image.

use crate::command::{CommandRunner, SystemRunner};
use crate::config::D3Config;
use crate::error::D3Error;
use crate::systemd::{ServiceManager, Systemctl};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub struct Target {
    root: PathBuf,
    /// Absolute path inside `root`
    state_dir: PathBuf,
    services: Box<dyn ServiceManager>,
    commands: Arc<dyn CommandRunner>,
}

impl Target {
    pub fn new(
        root: PathBuf,
        state_dir: &str,
        services: Box<dyn ServiceManager>,
        commands: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            root,
            state_dir: PathBuf::from(state_dir),
            services,
            commands,
        }
    }

    /// Real processes and `systemctl`, rooted at `root`
    pub fn system(root: &Path, config: &D3Config) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new(Duration::from_secs(
            config.commands.timeout_secs,
        )));
        let services: Box<dyn ServiceManager> = if root == Path::new("/") {
            Box::new(Systemctl::new(runner.clone()))
        } else {
            Box::new(Systemctl::with_root(runner.clone(), root.to_path_buf()))
        };
        Self::new(root.to_path_buf(), &config.paths.state_dir, services, runner)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an absolute host path under the root
    pub fn path(&self, abs: impl AsRef<Path>) -> PathBuf {
        let abs = abs.as_ref();
        match abs.strip_prefix("/") {
            Ok(rel) => self.root.join(rel),
            Err(_) => self.root.join(abs),
        }
    }

    /// Resolve a path inside the state directory
    pub fn state_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.path(&self.state_dir).join(rel)
    }

    pub fn services(&self) -> &dyn ServiceManager {
        self.services.as_ref()
    }

    pub fn commands(&self) -> &dyn CommandRunner {
        self.commands.as_ref()
    }

    pub fn command_runner(&self) -> Arc<dyn CommandRunner> {
        self.commands.clone()
    }

    /// True when operating on the running system rather than an image
    pub fn is_live_root(&self) -> bool {
        self.root == Path::new("/")
    }

    /// Writing to the running system needs root; offline roots are left to
    /// filesystem permissions
    pub fn require_privilege(&self, operation: &str) -> Result<(), D3Error> {
        if self.is_live_root() && !nix::unistd::geteuid().is_root() {
            return Err(D3Error::PermissionDenied(format!(
                "{} must be run as root (try: sudo d3guardctl {})",
                operation, operation
            )));
        }
        Ok(())
    }
}
