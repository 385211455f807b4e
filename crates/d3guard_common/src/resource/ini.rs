//! INI-style keys in KDE `/etc/xdg` files.
//!
//! Sections are matched as literal header lines, so KDE nested groups such
//! as `[AC][SuspendSession]` work unchanged. Keys d3guard does not manage
//! are preserved in place.

use super::file::current_mode;
use super::{
    atomic_write, backup, read_optional, remove_if_exists, require_path, unreadable,
    write_failed, Resource,
};
use crate::error::D3Error;
use crate::state::ProbeState;
use crate::target::Target;

#[derive(Debug, Clone)]
pub struct IniKeys {
    path: String,
    /// (section header without brackets, key, value)
    entries: Vec<(String, String, String)>,
    requires: Option<String>,
}

impl IniKeys {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            entries: Vec::new(),
            requires: None,
        }
    }

    /// `section` is written as `[section]`; pass `AC][SuspendSession` for a
    /// nested KDE group
    pub fn set(mut self, section: &str, key: &str, value: &str) -> Self {
        self.entries
            .push((section.to_string(), key.to_string(), value.to_string()));
        self
    }

    pub fn requires(mut self, path: &str) -> Self {
        self.requires = Some(path.to_string());
        self
    }

    /// Entries whose current value differs, with what was found
    fn differing(&self, contents: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|(section, key, value)| {
                match lookup(contents, section, key) {
                    Some(found) if found == *value => None,
                    Some(found) => Some(format!("[{}] {}={}", section, key, found)),
                    None => Some(format!("[{}] {} unset", section, key)),
                }
            })
            .collect()
    }

    fn entry_key(&self, section: &str, key: &str) -> String {
        format!("{}#[{}]{}", self.path, section, key)
    }
}

/// What a key looked like before d3guard first set it
#[derive(Debug, Clone, PartialEq, Eq)]
enum Prior {
    Value(String),
    Unset,
    /// The whole section was added by d3guard
    UnsetSection,
}

impl Prior {
    fn of(contents: &str, section: &str, key: &str) -> Self {
        match lookup(contents, section, key) {
            Some(value) => Prior::Value(value),
            None if section_range(contents, section).is_some() => Prior::Unset,
            None => Prior::UnsetSection,
        }
    }

    fn encode(&self) -> String {
        match self {
            Prior::Value(value) => format!("set:{}", value),
            Prior::Unset => "unset".to_string(),
            Prior::UnsetSection => "unset-section".to_string(),
        }
    }

    fn decode(text: &str) -> Option<Self> {
        match text {
            "unset" => Some(Prior::Unset),
            "unset-section" => Some(Prior::UnsetSection),
            other => other.strip_prefix("set:").map(|v| Prior::Value(v.to_string())),
        }
    }
}

const CREATED: &str = "created";

fn header(section: &str) -> String {
    format!("[{}]", section)
}

fn is_header(line: &str) -> bool {
    line.trim_start().starts_with('[')
}

fn key_of(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') || trimmed.starts_with(';') {
        return None;
    }
    let (key, _) = trimmed.split_once('=')?;
    Some(key.trim())
}

/// Value of `key` inside `[section]`
fn lookup(contents: &str, section: &str, key: &str) -> Option<String> {
    let wanted = header(section);
    let mut in_section = false;
    let mut found = None;
    for line in contents.lines() {
        if is_header(line) {
            in_section = line.trim() == wanted;
            continue;
        }
        if in_section && key_of(line) == Some(key) {
            found = line.split_once('=').map(|(_, v)| v.trim().to_string());
        }
    }
    found
}

/// Header index and end (exclusive) of `[section]`
fn section_range(contents: &str, section: &str) -> Option<(usize, usize)> {
    let wanted = header(section);
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.iter().position(|l| l.trim() == wanted)?;
    let end = lines[start + 1..]
        .iter()
        .position(|l| is_header(l))
        .map(|p| p + start + 1)
        .unwrap_or(lines.len());
    Some((start, end))
}

/// Drop `key` from `[section]`; with `drop_empty_section` the header goes
/// too once nothing but blank lines is left under it
fn remove_key(contents: &str, section: &str, key: &str, drop_empty_section: bool) -> String {
    let Some((start, end)) = section_range(contents, section) else {
        return contents.to_string();
    };
    let lines: Vec<&str> = contents.lines().collect();
    let body: Vec<&str> = lines[start + 1..end]
        .iter()
        .copied()
        .filter(|l| key_of(l) != Some(key))
        .collect();

    let mut kept: Vec<&str> = lines[..start].to_vec();
    if drop_empty_section && body.iter().all(|l| l.trim().is_empty()) {
        if kept.last().is_some_and(|l| l.trim().is_empty()) {
            kept.pop();
        }
    } else {
        kept.push(lines[start]);
        kept.extend(body);
    }
    kept.extend_from_slice(&lines[end..]);

    if kept.is_empty() {
        String::new()
    } else {
        kept.join("\n") + "\n"
    }
}

/// Set `key=value` in `[section]`, adding the section at the end if needed
fn upsert(contents: &str, section: &str, key: &str, value: &str) -> String {
    let wanted = header(section);
    let mut lines: Vec<String> = contents.lines().map(str::to_string).collect();
    let entry = format!("{}={}", key, value);

    let Some(start) = lines.iter().position(|l| l.trim() == wanted) else {
        if lines.last().is_some_and(|l| !l.trim().is_empty()) {
            lines.push(String::new());
        }
        lines.push(wanted);
        lines.push(entry);
        return lines.join("\n") + "\n";
    };

    let end = lines[start + 1..]
        .iter()
        .position(|l| is_header(l))
        .map(|p| p + start + 1)
        .unwrap_or(lines.len());

    match (start + 1..end).find(|&i| key_of(&lines[i]) == Some(key)) {
        Some(i) => lines[i] = entry,
        None => {
            // Keep the entry above trailing blank lines of the section
            let mut insert_at = end;
            while insert_at > start + 1 && lines[insert_at - 1].trim().is_empty() {
                insert_at -= 1;
            }
            lines.insert(insert_at, entry);
        }
    }
    lines.join("\n") + "\n"
}

impl Resource for IniKeys {
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
                let differing = self.differing(&contents);
                if differing.is_empty() {
                    ProbeState::Satisfied
                } else {
                    ProbeState::Drifted(differing.join(", "))
                }
            }
            Err(e) => unreadable(&self.path, e),
        }
    }

    fn apply(&self, target: &Target) -> Result<(), D3Error> {
        let live = target.path(&self.path);
        let existing = read_optional(&live).map_err(|e| write_failed(&self.path, e))?;
        let created = existing.is_none();
        let current = existing.unwrap_or_default();
        if self.differing(&current).is_empty() && !created {
            return Ok(());
        }

        let record = |key: &str, value: &str| {
            backup::record_once(target, key, value).map_err(|e| write_failed(&self.path, e))
        };
        if created {
            record(&self.path, CREATED)?;
        }
        let mut updated = current;
        for (section, key, value) in &self.entries {
            if lookup(&updated, section, key).as_deref() != Some(value.as_str()) {
                let prior = Prior::of(&updated, section, key);
                record(&self.entry_key(section, key), &prior.encode())?;
                updated = upsert(&updated, section, key, value);
            }
        }
        atomic_write(&live, updated.as_bytes(), current_mode(&live))
            .map_err(|e| write_failed(&self.path, e))
    }

    fn revert(&self, target: &Target) -> Result<(), D3Error> {
        let live = target.path(&self.path);
        let take = |key: &str| -> Result<Option<String>, D3Error> {
            let recorded = backup::take(target, key).map_err(|e| write_failed(&self.path, e))?;
            Ok(recorded.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
        };

        let existing = read_optional(&live).map_err(|e| write_failed(&self.path, e))?;
        let mut text = existing.clone().unwrap_or_default();
        for (section, key, value) in self.entries.iter().rev() {
            let Some(prior) = take(&self.entry_key(section, key))? else {
                continue;
            };
            // Someone else changed it since; theirs wins
            if lookup(&text, section, key).as_deref() != Some(value.as_str()) {
                continue;
            }
            text = match Prior::decode(&prior) {
                Some(Prior::Value(old)) => upsert(&text, section, key, &old),
                Some(Prior::Unset) => remove_key(&text, section, key, false),
                Some(Prior::UnsetSection) => remove_key(&text, section, key, true),
                None => text,
            };
        }
        let created = take(&self.path)?.as_deref() == Some(CREATED);

        let Some(original) = existing else {
            return Ok(());
        };
        if created && text.trim().is_empty() {
            return remove_if_exists(&live).map_err(|e| write_failed(&self.path, e));
        }
        if text == original {
            return Ok(());
        }
        atomic_write(&live, text.as_bytes(), current_mode(&live))
            .map_err(|e| write_failed(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::fake_target;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_lookup_respects_sections() {
        let text = "[General]\nAutolock=true\n\n[Daemon]\nAutolock=false\nTimeout=5\n";
        assert_eq!(lookup(text, "Daemon", "Autolock").as_deref(), Some("false"));
        assert_eq!(lookup(text, "General", "Autolock").as_deref(), Some("true"));
        assert_eq!(lookup(text, "Daemon", "Missing"), None);
    }

    #[test]
    fn test_upsert_nested_kde_group() {
        let text = "[AC][SuspendSession]\nsuspendType=1\nidleTime=600000\n\n[Battery]\nx=1\n";
        let updated = upsert(text, "AC][SuspendSession", "suspendType", "0");
        assert_eq!(
            updated,
            "[AC][SuspendSession]\nsuspendType=0\nidleTime=600000\n\n[Battery]\nx=1\n"
        );
        let added = upsert(&updated, "AC][DPMSControl", "idleTime", "0");
        assert!(added.ends_with("\n[AC][DPMSControl]\nidleTime=0\n"));
    }

    #[test]
    fn test_upsert_adds_key_inside_existing_section() {
        let text = "[Daemon]\nTimeout=5\n\n[Other]\nk=v\n";
        let updated = upsert(text, "Daemon", "Autolock", "false");
        assert_eq!(updated, "[Daemon]\nTimeout=5\nAutolock=false\n\n[Other]\nk=v\n");
    }

    #[test]
    fn test_ini_keys_apply_probe_revert() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let live = target.path("/etc/xdg/kscreenlockerrc");
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        fs::write(&live, "[Daemon]\nAutolock=true\nLockGrace=5\n").unwrap();

        let keys = IniKeys::new("/etc/xdg/kscreenlockerrc")
            .set("Daemon", "Autolock", "false")
            .set("Daemon", "LockOnResume", "false");
        assert_eq!(
            keys.probe(&target),
            ProbeState::Drifted(
                "[Daemon] Autolock=true, [Daemon] LockOnResume unset".to_string()
            )
        );
        keys.apply(&target).unwrap();
        assert_eq!(keys.probe(&target), ProbeState::Satisfied);
        assert!(fs::read_to_string(&live).unwrap().contains("LockGrace=5"));

        keys.revert(&target).unwrap();
        assert_eq!(
            fs::read_to_string(&live).unwrap(),
            "[Daemon]\nAutolock=true\nLockGrace=5\n"
        );
    }

    #[test]
    fn test_remove_key_drops_section_it_emptied() {
        let text = "[General]\nx=1\n\n[Daemon]\nAutolock=false\n";
        assert_eq!(remove_key(text, "Daemon", "Autolock", true), "[General]\nx=1\n");
        assert_eq!(
            remove_key(text, "Daemon", "Autolock", false),
            "[General]\nx=1\n\n[Daemon]\n"
        );
    }

    #[test]
    fn test_ini_keys_revert_keeps_later_edits() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let live = target.path("/etc/xdg/kscreenlockerrc");
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        fs::write(&live, "[Daemon]\nAutolock=true\nLockGrace=5\n").unwrap();

        let keys = IniKeys::new("/etc/xdg/kscreenlockerrc")
            .set("Daemon", "Autolock", "false")
            .set("Daemon", "LockOnResume", "false");
        keys.apply(&target).unwrap();

        let mut text = fs::read_to_string(&live).unwrap();
        text.push_str("\n[Greeter]\nTheme=breeze\n");
        fs::write(&live, text).unwrap();

        keys.revert(&target).unwrap();
        assert_eq!(
            fs::read_to_string(&live).unwrap(),
            "[Daemon]\nAutolock=true\nLockGrace=5\n\n[Greeter]\nTheme=breeze\n"
        );
    }

    #[test]
    fn test_ini_keys_revert_leaves_values_changed_by_others() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let live = target.path("/etc/xdg/kscreenlockerrc");
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        fs::write(&live, "[Daemon]\nAutolock=true\n").unwrap();

        let keys = IniKeys::new("/etc/xdg/kscreenlockerrc").set("Daemon", "Autolock", "false");
        keys.apply(&target).unwrap();
        fs::write(&live, "[Daemon]\nAutolock=maybe\n").unwrap();

        keys.revert(&target).unwrap();
        assert_eq!(fs::read_to_string(&live).unwrap(), "[Daemon]\nAutolock=maybe\n");
    }

    #[test]
    fn test_ini_keys_revert_removes_file_it_created() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let keys = IniKeys::new("/etc/xdg/powerdevilrc")
            .set("AC][SuspendSession", "suspendType", "0")
            .set("AC][SuspendSession", "idleTime", "0");
        assert_eq!(keys.probe(&target), ProbeState::Absent);
        keys.apply(&target).unwrap();
        assert_eq!(keys.probe(&target), ProbeState::Satisfied);
        keys.revert(&target).unwrap();
        assert!(!target.path("/etc/xdg/powerdevilrc").exists());
    }

    #[test]
    fn test_ini_keys_apply_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let live = target.path("/etc/xdg/kscreenlockerrc");
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        fs::write(&live, "[Daemon]\nAutolock=true\n").unwrap();
        fs::set_permissions(&live, fs::Permissions::from_mode(0o600)).unwrap();

        IniKeys::new("/etc/xdg/kscreenlockerrc")
            .set("Daemon", "Autolock", "false")
            .apply(&target)
            .unwrap();
        let mode = fs::metadata(&live).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o600);
    }
}
