//! Durable drift log
//!
//! One JSON object per line in `paths.event_log`. A record is written
//! whenever a monitor run re-applied or failed to re-apply something.
//! Once the log reaches `MAX_LOG_BYTES` it is moved to `<path>.1` (replacing
//! any older one) and a fresh log is started, so at most two generations
//! are kept.

use crate::report::RunReport;
use crate::target::Target;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Size at which the log is rotated
pub const MAX_LOG_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Drift found and repaired
    Warning,
    /// At least one Setting could not be repaired
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSetting {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftEvent {
    pub ts: DateTime<Utc>,
    pub run_id: String,
    /// What started the run: timer, package or manual
    pub trigger: String,
    pub severity: EventSeverity,
    pub message: String,
    pub reapplied: Vec<String>,
    #[serde(default)]
    pub failed: Vec<FailedSetting>,
    pub detail: RunReport,
}

impl DriftEvent {
    /// `None` when the run neither applied nor failed anything
    pub fn from_report(report: &RunReport, trigger: &str) -> Option<Self> {
        let reapplied: Vec<String> = report.applied().iter().map(|e| e.id.clone()).collect();
        let failed: Vec<FailedSetting> = report
            .failed()
            .iter()
            .map(|e| FailedSetting {
                id: e.id.clone(),
                error: e.error.clone().unwrap_or_default(),
            })
            .collect();
        if reapplied.is_empty() && failed.is_empty() {
            return None;
        }

        let mut message = match reapplied.len() {
            0 => String::new(),
            1 => "1 setting was reverted and re-applied".to_string(),
            n => format!("{} settings were reverted and re-applied", n),
        };
        if !failed.is_empty() {
            if !message.is_empty() {
                message.push_str("; ");
            }
            message.push_str(&format!("{} could not be repaired", failed.len()));
        }

        Some(Self {
            ts: report.timestamp,
            run_id: report.run_id.clone(),
            trigger: trigger.to_string(),
            severity: if failed.is_empty() {
                EventSeverity::Warning
            } else {
                EventSeverity::Error
            },
            message,
            reapplied,
            failed,
            detail: report.clone(),
        })
    }
}

pub struct EventLog {
    path: PathBuf,
    max_bytes: u64,
}

impl EventLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            max_bytes: MAX_LOG_BYTES,
        }
    }

    /// The configured log path under the target root
    pub fn for_target(target: &Target, event_log: &str) -> Self {
        Self::new(target.path(event_log))
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where the previous generation lives
    pub fn rotated_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".1");
        PathBuf::from(name)
    }

    fn rotate_if_full(&self) -> std::io::Result<()> {
        match fs::metadata(&self.path) {
            Ok(meta) if meta.len() >= self.max_bytes => {
                fs::rename(&self.path, self.rotated_path())?;
                debug!("rotated {}", self.path.display());
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn append(&self, event: &DriftEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(event)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.rotate_if_full()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }

    /// Most recent parseable event, if any; looks at the previous generation
    /// when the current log has none
    pub fn last(&self) -> std::io::Result<Option<DriftEvent>> {
        match last_in(&self.path)? {
            Some(event) => Ok(Some(event)),
            None => last_in(&self.rotated_path()),
        }
    }
}

fn last_in(path: &Path) -> std::io::Result<Option<DriftEvent>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(contents
        .lines()
        .rev()
        .find_map(|line| serde_json::from_str(line).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostContext;
    use crate::report::{Action, Entry, Mode};
    use crate::state::{EffectiveAfter, ProbeState, SettingClass, Severity};
    use tempfile::TempDir;

    fn report_with(actions: &[(&str, Action)]) -> RunReport {
        let mut report = RunReport::new(Mode::Repair, &HostContext::empty());
        for (id, action) in actions {
            report.push(Entry {
                id: id.to_string(),
                description: String::new(),
                class: SettingClass::DesktopIdle,
                severity: Severity::Warning,
                effective_after: EffectiveAfter::Live,
                before: Some(ProbeState::Absent),
                action: *action,
                after: None,
                error: (*action == Action::Failed).then(|| "write denied".to_string()),
                note: None,
            });
        }
        report
    }

    #[test]
    fn test_clean_run_produces_no_event() {
        let report = report_with(&[("a", Action::None)]);
        assert!(DriftEvent::from_report(&report, "timer").is_none());
    }

    #[test]
    fn test_event_message_counts_reapplied() {
        let report = report_with(&[("a", Action::Applied), ("b", Action::Applied)]);
        let event = DriftEvent::from_report(&report, "package").unwrap();
        assert_eq!(event.message, "2 settings were reverted and re-applied");
        assert_eq!(event.severity, EventSeverity::Warning);
        assert_eq!(event.reapplied, vec!["a", "b"]);

        let report = report_with(&[("a", Action::Applied), ("b", Action::Failed)]);
        let event = DriftEvent::from_report(&report, "timer").unwrap();
        assert_eq!(
            event.message,
            "1 setting was reverted and re-applied; 1 could not be repaired"
        );
        assert_eq!(event.severity, EventSeverity::Error);
        assert_eq!(event.failed[0].error, "write denied");
    }

    #[test]
    fn test_append_then_last() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::new(dir.path().join("log/events.jsonl"));
        assert!(log.last().unwrap().is_none());

        let first = DriftEvent::from_report(&report_with(&[("a", Action::Applied)]), "timer");
        let second = DriftEvent::from_report(&report_with(&[("b", Action::Applied)]), "manual");
        log.append(&first.unwrap()).unwrap();
        log.append(&second.unwrap()).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        let last = log.last().unwrap().unwrap();
        assert_eq!(last.trigger, "manual");
        assert_eq!(last.reapplied, vec!["b"]);
    }

    #[test]
    fn test_full_log_is_rotated() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl")).with_max_bytes(1);
        let first = DriftEvent::from_report(&report_with(&[("a", Action::Applied)]), "timer");
        let second = DriftEvent::from_report(&report_with(&[("b", Action::Applied)]), "package");
        let third = DriftEvent::from_report(&report_with(&[("c", Action::Applied)]), "manual");

        log.append(&first.unwrap()).unwrap();
        log.append(&second.unwrap()).unwrap();
        log.append(&third.unwrap()).unwrap();

        let current = fs::read_to_string(log.path()).unwrap();
        assert_eq!(current.lines().count(), 1);
        assert!(current.contains("\"manual\""));
        let previous = fs::read_to_string(log.rotated_path()).unwrap();
        assert_eq!(previous.lines().count(), 1);
        assert!(previous.contains("\"package\""));
        assert_eq!(log.last().unwrap().unwrap().trigger, "manual");
    }

    #[test]
    fn test_last_falls_back_to_rotated_log() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl")).with_max_bytes(1);
        let event = DriftEvent::from_report(&report_with(&[("a", Action::Applied)]), "timer");
        log.append(&event.unwrap()).unwrap();
        fs::rename(log.path(), log.rotated_path()).unwrap();

        assert_eq!(log.last().unwrap().unwrap().trigger, "timer");
    }

    #[test]
    fn test_small_log_is_not_rotated() {
        let dir = TempDir::new().unwrap();
        let log = EventLog::new(dir.path().join("events.jsonl"));
        for _ in 0..3 {
            let event = DriftEvent::from_report(&report_with(&[("a", Action::Applied)]), "timer");
            log.append(&event.unwrap()).unwrap();
        }
        assert_eq!(fs::read_to_string(log.path()).unwrap().lines().count(), 3);
        assert!(!log.rotated_path().exists());
    }
}
