//! File-backed resources: whole files, required lines, marker blocks.

use super::{
    atomic_write, backup, read_optional, remove_if_exists, require_path, unreadable,
    write_failed, Resource,
};
use crate::error::D3Error;
use crate::state::ProbeState;
use crate::target::Target;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

pub(crate) const DEFAULT_MODE: u32 = 0o644;

/// Current mode of `path`, defaulting when it cannot be read
pub(crate) fn current_mode(path: &Path) -> u32 {
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o7777)
        .unwrap_or(DEFAULT_MODE)
}

fn with_trailing_newline(mut text: String) -> String {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

// =============================================================================
// ManagedFile
// =============================================================================

/// A whole file with exact contents and mode
#[derive(Debug, Clone)]
pub struct ManagedFile {
    path: String,
    contents: String,
    mode: u32,
    /// d3guard's own file (name carries `d3guard`): never backed up
    owned: bool,
    requires: Option<String>,
}

impl ManagedFile {
    /// A file only d3guard writes
    pub fn new(path: &str, contents: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            contents: with_trailing_newline(contents.into()),
            mode: DEFAULT_MODE,
            owned: true,
            requires: None,
        }
    }

    /// A file the distro or user may also own; backed up before replacing
    pub fn replacing(path: &str, contents: impl Into<String>) -> Self {
        Self {
            owned: false,
            ..Self::new(path, contents)
        }
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Only available when `path` exists under the root
    pub fn requires(mut self, path: &str) -> Self {
        self.requires = Some(path.to_string());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }
}

impl Resource for ManagedFile {
    fn key(&self) -> String {
        self.path.clone()
    }

    fn available(&self, target: &Target) -> Result<(), D3Error> {
        require_path(target, self.requires.as_deref())
    }

    fn probe(&self, target: &Target) -> ProbeState {
        let live = target.path(&self.path);
        match read_optional(&live) {
            Ok(None) => ProbeState::Absent,
            Ok(Some(current)) if current == self.contents => {
                let mode = current_mode(&live);
                if mode == self.mode {
                    ProbeState::Satisfied
                } else {
                    ProbeState::Drifted(format!("mode {:04o}, want {:04o}", mode, self.mode))
                }
            }
            Ok(Some(_)) => ProbeState::Drifted("contents differ".to_string()),
            Err(e) => unreadable(&self.path, e),
        }
    }

    fn apply(&self, target: &Target) -> Result<(), D3Error> {
        let live = target.path(&self.path);
        if !self.owned {
            backup::save_file_once(target, &self.path, &live)
                .map_err(|e| write_failed(&self.path, e))?;
        }
        atomic_write(&live, self.contents.as_bytes(), self.mode)
            .map_err(|e| write_failed(&self.path, e))
    }

    fn revert(&self, target: &Target) -> Result<(), D3Error> {
        let live = target.path(&self.path);
        let restored = backup::restore(target, &self.path, &live, self.mode)
            .map_err(|e| write_failed(&self.path, e))?;
        if !restored {
            remove_if_exists(&live).map_err(|e| write_failed(&self.path, e))?;
        }
        Ok(())
    }
}

// =============================================================================
// RequiredLines
// =============================================================================

/// A shared file that must contain some lines; everything else is kept
#[derive(Debug, Clone)]
pub struct RequiredLines {
    path: String,
    lines: Vec<String>,
    requires: Option<String>,
}

impl RequiredLines {
    pub fn new(path: &str, lines: &[&str]) -> Self {
        Self {
            path: path.to_string(),
            lines: lines.iter().map(|l| l.to_string()).collect(),
            requires: None,
        }
    }

    pub fn requires(mut self, path: &str) -> Self {
        self.requires = Some(path.to_string());
        self
    }

    fn missing<'a>(&'a self, contents: &str) -> Vec<&'a str> {
        self.lines
            .iter()
            .filter(|wanted| !contents.lines().any(|l| l.trim() == wanted.as_str()))
            .map(String::as_str)
            .collect()
    }
}

impl Resource for RequiredLines {
    fn key(&self) -> String {
        self.path.clone()
    }

    fn available(&self, target: &Target) -> Result<(), D3Error> {
        require_path(target, self.requires.as_deref())
    }

    fn probe(&self, target: &Target) -> ProbeState {
        match read_optional(&target.path(&self.path)) {
            Ok(None) => ProbeState::Absent,
            Ok(Some(contents)) => {
                let missing = self.missing(&contents);
                if missing.is_empty() {
                    ProbeState::Satisfied
                } else {
                    ProbeState::Drifted(format!("missing {}", missing.join(", ")))
                }
            }
            Err(e) => unreadable(&self.path, e),
        }
    }

    fn apply(&self, target: &Target) -> Result<(), D3Error> {
        let live = target.path(&self.path);
        let current = read_optional(&live)
            .map_err(|e| write_failed(&self.path, e))?
            .unwrap_or_default();
        let missing = self.missing(&current);
        if missing.is_empty() {
            return Ok(());
        }

        // Only lines d3guard added are taken back out on revert
        backup::append_record(target, &self.path, &missing)
            .map_err(|e| write_failed(&self.path, e))?;
        let mut updated = with_trailing_newline(current);
        for line in missing {
            updated.push_str(line);
            updated.push('\n');
        }
        atomic_write(&live, updated.as_bytes(), current_mode(&live))
            .map_err(|e| write_failed(&self.path, e))
    }

    fn revert(&self, target: &Target) -> Result<(), D3Error> {
        let live = target.path(&self.path);
        let Some(recorded) =
            backup::take(target, &self.path).map_err(|e| write_failed(&self.path, e))?
        else {
            return Ok(());
        };
        let recorded = String::from_utf8_lossy(&recorded).into_owned();
        let ours: Vec<&str> = recorded.lines().filter(|l| !l.is_empty()).collect();

        let Some(current) = read_optional(&live).map_err(|e| write_failed(&self.path, e))? else {
            return Ok(());
        };
        let mode = current_mode(&live);
        let kept: Vec<&str> = current
            .lines()
            .filter(|l| !ours.contains(&l.trim()))
            .collect();
        if kept.iter().all(|l| l.trim().is_empty()) {
            remove_if_exists(&live).map_err(|e| write_failed(&self.path, e))
        } else {
            let text = with_trailing_newline(kept.join("\n"));
            atomic_write(&live, text.as_bytes(), mode).map_err(|e| write_failed(&self.path, e))
        }
    }
}

// =============================================================================
// ManagedBlock
// =============================================================================

/// A `# BEGIN d3guard <id>` ... `# END d3guard <id>` block inside a shared
/// file
#[derive(Debug, Clone)]
pub struct ManagedBlock {
    path: String,
    id: String,
    body: String,
    requires: Option<String>,
}

impl ManagedBlock {
    pub fn new(path: &str, id: &str, body: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            id: id.to_string(),
            body: body.into().trim_end_matches('\n').to_string(),
            requires: None,
        }
    }

    /// Available only when the file itself exists
    pub fn in_existing_file(mut self) -> Self {
        self.requires = Some(self.path.clone());
        self
    }

    fn begin(&self) -> String {
        format!("# BEGIN d3guard {}", self.id)
    }

    fn end(&self) -> String {
        format!("# END d3guard {}", self.id)
    }

    fn render(&self) -> String {
        format!("{}\n{}\n{}\n", self.begin(), self.body, self.end())
    }

    /// Line range of the block (begin..=end) if present
    fn locate(&self, lines: &[&str]) -> Option<(usize, usize)> {
        let begin = self.begin();
        let end = self.end();
        let start = lines.iter().position(|l| l.trim() == begin)?;
        let stop = lines[start..].iter().position(|l| l.trim() == end)? + start;
        Some((start, stop))
    }

    /// File contents with the block removed
    fn strip(&self, contents: &str) -> String {
        let lines: Vec<&str> = contents.lines().collect();
        match self.locate(&lines) {
            Some((start, stop)) => {
                let kept: Vec<&str> = lines[..start]
                    .iter()
                    .chain(lines[stop + 1..].iter())
                    .copied()
                    .collect();
                with_trailing_newline(kept.join("\n"))
            }
            None => contents.to_string(),
        }
    }
}

impl Resource for ManagedBlock {
    fn key(&self) -> String {
        format!("{}#{}", self.path, self.id)
    }

    fn available(&self, target: &Target) -> Result<(), D3Error> {
        require_path(target, self.requires.as_deref())
    }

    fn probe(&self, target: &Target) -> ProbeState {
        match read_optional(&target.path(&self.path)) {
            Ok(None) => ProbeState::Absent,
            Ok(Some(contents)) => {
                let lines: Vec<&str> = contents.lines().collect();
                match self.locate(&lines) {
                    None => ProbeState::Absent,
                    Some((start, stop)) => {
                        let body = lines[start + 1..stop].join("\n");
                        if body == self.body {
                            ProbeState::Satisfied
                        } else {
                            ProbeState::Drifted("block contents differ".to_string())
                        }
                    }
                }
            }
            Err(e) => unreadable(&self.path, e),
        }
    }

    fn apply(&self, target: &Target) -> Result<(), D3Error> {
        let live = target.path(&self.path);
        let current = read_optional(&live).map_err(|e| write_failed(&self.path, e))?;
        let mut updated = with_trailing_newline(self.strip(current.as_deref().unwrap_or("")));
        updated.push_str(&self.render());
        atomic_write(&live, updated.as_bytes(), current_mode(&live))
            .map_err(|e| write_failed(&self.path, e))
    }

    fn revert(&self, target: &Target) -> Result<(), D3Error> {
        let live = target.path(&self.path);
        let Some(current) = read_optional(&live).map_err(|e| write_failed(&self.path, e))? else {
            return Ok(());
        };
        if self.locate(&current.lines().collect::<Vec<_>>()).is_none() {
            return Ok(());
        }
        let mode = current_mode(&live);
        let stripped = self.strip(&current);
        if stripped.trim().is_empty() {
            remove_if_exists(&live).map_err(|e| write_failed(&self.path, e))
        } else {
            atomic_write(&live, stripped.as_bytes(), mode).map_err(|e| write_failed(&self.path, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::fake_target;
    use tempfile::TempDir;

    fn seed(target: &Target, path: &str, contents: &str) {
        let live = target.path(path);
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        fs::write(live, contents).unwrap();
    }

    #[test]
    fn test_managed_file_converges_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let file = ManagedFile::new("/etc/modprobe.d/90-d3guard-nvidia.conf", "options nvidia X=1");

        assert_eq!(file.probe(&target), ProbeState::Absent);
        file.apply(&target).unwrap();
        assert_eq!(file.probe(&target), ProbeState::Satisfied);
        let first = fs::read(target.path(file.path())).unwrap();
        file.apply(&target).unwrap();
        assert_eq!(fs::read(target.path(file.path())).unwrap(), first);
        assert_eq!(file.probe(&target), ProbeState::Satisfied);
    }

    #[test]
    fn test_managed_file_detects_mode_drift() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let file = ManagedFile::new("/etc/d3guard-test.conf", "x\n");
        file.apply(&target).unwrap();
        fs::set_permissions(target.path(file.path()), fs::Permissions::from_mode(0o600)).unwrap();
        assert_eq!(
            file.probe(&target),
            ProbeState::Drifted("mode 0600, want 0644".to_string())
        );
    }

    #[test]
    fn test_replacing_file_restores_original_on_revert() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        seed(&target, "/etc/xdg/shared.xml", "<distro/>\n");
        let file = ManagedFile::replacing("/etc/xdg/shared.xml", "<d3guard/>");

        assert_eq!(
            file.probe(&target),
            ProbeState::Drifted("contents differ".to_string())
        );
        file.apply(&target).unwrap();
        file.apply(&target).unwrap();
        file.revert(&target).unwrap();
        assert_eq!(
            fs::read_to_string(target.path("/etc/xdg/shared.xml")).unwrap(),
            "<distro/>\n"
        );
    }

    #[test]
    fn test_owned_file_revert_removes_it() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let file = ManagedFile::new("/etc/udev/rules.d/80-d3guard.rules", "rule");
        file.apply(&target).unwrap();
        file.revert(&target).unwrap();
        assert_eq!(file.probe(&target), ProbeState::Absent);
    }

    #[test]
    fn test_required_lines_preserve_existing_content() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        seed(&target, "/etc/dconf/profile/user", "user-db:user");
        let lines = RequiredLines::new("/etc/dconf/profile/user", &["user-db:user", "system-db:local"]);

        assert_eq!(
            lines.probe(&target),
            ProbeState::Drifted("missing system-db:local".to_string())
        );
        lines.apply(&target).unwrap();
        lines.apply(&target).unwrap();
        assert_eq!(
            fs::read_to_string(target.path("/etc/dconf/profile/user")).unwrap(),
            "user-db:user\nsystem-db:local\n"
        );
        assert_eq!(lines.probe(&target), ProbeState::Satisfied);

        lines.revert(&target).unwrap();
        assert_eq!(
            fs::read_to_string(target.path("/etc/dconf/profile/user")).unwrap(),
            "user-db:user\n"
        );
    }

    #[test]
    fn test_required_lines_revert_keeps_later_edits() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        seed(&target, "/etc/dconf/profile/user", "user-db:user\n");
        let lines = RequiredLines::new("/etc/dconf/profile/user", &["user-db:user", "system-db:local"]);
        lines.apply(&target).unwrap();

        let live = target.path("/etc/dconf/profile/user");
        let mut text = fs::read_to_string(&live).unwrap();
        text.push_str("system-db:site\n");
        fs::write(&live, text).unwrap();

        lines.revert(&target).unwrap();
        assert_eq!(
            fs::read_to_string(&live).unwrap(),
            "user-db:user\nsystem-db:site\n"
        );
    }

    #[test]
    fn test_required_lines_revert_without_record_leaves_file() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        seed(&target, "/etc/dconf/profile/user", "user-db:user\nsystem-db:local\n");
        let lines = RequiredLines::new("/etc/dconf/profile/user", &["user-db:user", "system-db:local"]);
        assert_eq!(lines.probe(&target), ProbeState::Satisfied);
        lines.revert(&target).unwrap();
        assert_eq!(
            fs::read_to_string(target.path("/etc/dconf/profile/user")).unwrap(),
            "user-db:user\nsystem-db:local\n"
        );
    }

    #[test]
    fn test_required_lines_revert_removes_created_file() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let lines = RequiredLines::new("/etc/dconf/profile/gdm", &["user-db:user", "system-db:gdm"]);
        assert_eq!(lines.probe(&target), ProbeState::Absent);
        lines.apply(&target).unwrap();
        lines.revert(&target).unwrap();
        assert!(!target.path("/etc/dconf/profile/gdm").exists());
    }

    #[test]
    fn test_block_replaced_in_place() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        seed(&target, "/etc/gdm3/greeter.dconf-defaults", "[org/gnome/desktop/interface]\nfoo=1\n");
        let old = ManagedBlock::new("/etc/gdm3/greeter.dconf-defaults", "power", "sleep=1");
        let new = ManagedBlock::new("/etc/gdm3/greeter.dconf-defaults", "power", "sleep=0");

        old.apply(&target).unwrap();
        assert_eq!(new.probe(&target), ProbeState::Drifted("block contents differ".into()));
        new.apply(&target).unwrap();
        new.apply(&target).unwrap();
        let text = fs::read_to_string(target.path("/etc/gdm3/greeter.dconf-defaults")).unwrap();
        assert_eq!(text.matches("# BEGIN d3guard power").count(), 1);
        assert!(text.contains("sleep=0"));
        assert!(text.starts_with("[org/gnome/desktop/interface]\nfoo=1\n"));
        assert_eq!(new.probe(&target), ProbeState::Satisfied);
    }

    #[test]
    fn test_block_revert_keeps_edits_made_after_fix() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        seed(&target, "/etc/default/grub", "GRUB_TIMEOUT=5\n");
        let block = ManagedBlock::new(
            "/etc/default/grub",
            "pcie_port_pm",
            "GRUB_CMDLINE_LINUX_DEFAULT=\"$GRUB_CMDLINE_LINUX_DEFAULT pcie_port_pm=off\"",
        )
        .in_existing_file();
        block.apply(&target).unwrap();

        let live = target.path("/etc/default/grub");
        let mut text = fs::read_to_string(&live).unwrap();
        text.push_str("GRUB_CMDLINE_LINUX=\"nvidia-drm.modeset=1\"\n");
        fs::write(&live, text).unwrap();

        block.revert(&target).unwrap();
        assert_eq!(
            fs::read_to_string(&live).unwrap(),
            "GRUB_TIMEOUT=5\nGRUB_CMDLINE_LINUX=\"nvidia-drm.modeset=1\"\n"
        );
        assert_eq!(block.probe(&target), ProbeState::Absent);
    }

    #[test]
    fn test_block_revert_without_block_leaves_file() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        seed(&target, "/etc/default/grub", "");
        let block = ManagedBlock::new("/etc/default/grub", "pcie_port_pm", "x");
        block.revert(&target).unwrap();
        assert!(target.path("/etc/default/grub").exists());
    }

    #[test]
    fn test_block_in_existing_file_unavailable_without_it() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let block = ManagedBlock::new("/etc/gdm3/greeter.dconf-defaults", "power", "x")
            .in_existing_file();
        assert!(matches!(
            block.available(&target),
            Err(D3Error::ResourceUnavailable(_))
        ));
    }
}
