//! RunReport: what one reconciliation run saw and did.
//!
//! Built fresh per run and handed to the caller. The CLI renders it, the
//! drift monitor turns it into an event; nothing here persists it.

use crate::host::HostContext;
use crate::state::{EffectiveAfter, ProbeState, SettingClass, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Probe only
    CheckOnly,
    /// Probe, apply what is drifted or absent, confirm
    Repair,
    /// Remove what d3guard wrote
    Revert,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::CheckOnly => "check_only",
            Mode::Repair => "repair",
            Mode::Revert => "revert",
        }
    }
}

/// What the run did with one Setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Probed, nothing written
    None,
    Applied,
    Reverted,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub description: String,
    pub class: SettingClass,
    pub severity: Severity,
    pub effective_after: EffectiveAfter,
    /// Absent for Settings skipped before probing
    pub before: Option<ProbeState>,
    pub action: Action,
    /// Re-probe after an apply or revert
    pub after: Option<ProbeState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Entry {
    /// Latest known state of the resource
    pub fn state(&self) -> Option<&ProbeState> {
        self.after.as_ref().or(self.before.as_ref())
    }

    /// Critical Setting left drifted or absent
    pub fn is_critical_drift(&self) -> bool {
        self.severity == Severity::Critical
            && self.action != Action::Skipped
            && self.state().map(|s| s.needs_apply()).unwrap_or(false)
    }
}

/// Exact tallies over the entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub satisfied: usize,
    /// Drifted or absent after the run
    pub drifted: usize,
    pub unknown: usize,
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub mode: Mode,
    pub host: HostContext,
    pub entries: Vec<Entry>,
    pub counts: Counts,
}

impl RunReport {
    pub fn new(mode: Mode, host: &HostContext) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            mode,
            host: host.clone(),
            entries: Vec::new(),
            counts: Counts::default(),
        }
    }

    pub fn push(&mut self, entry: Entry) {
        match entry.action {
            Action::Skipped => self.counts.skipped += 1,
            action => {
                match entry.state() {
                    Some(ProbeState::Satisfied) => self.counts.satisfied += 1,
                    Some(ProbeState::Drifted(_)) | Some(ProbeState::Absent) => {
                        self.counts.drifted += 1
                    }
                    Some(ProbeState::Unknown(_)) => self.counts.unknown += 1,
                    None => {}
                }
                match action {
                    Action::Applied | Action::Reverted => self.counts.applied += 1,
                    Action::Failed => self.counts.failed += 1,
                    _ => {}
                }
            }
        }
        self.entries.push(entry);
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn critical_drift(&self) -> Vec<&Entry> {
        self.entries.iter().filter(|e| e.is_critical_drift()).collect()
    }

    pub fn applied(&self) -> Vec<&Entry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.action, Action::Applied | Action::Reverted))
            .collect()
    }

    pub fn failed(&self) -> Vec<&Entry> {
        self.entries
            .iter()
            .filter(|e| e.action == Action::Failed)
            .collect()
    }

    /// Settings whose probe said something other than Satisfied before the
    /// run touched them
    pub fn drifted_before(&self) -> Vec<&Entry> {
        self.entries
            .iter()
            .filter(|e| e.before.as_ref().map(|s| s.needs_apply()).unwrap_or(false))
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.counts.failed > 0
    }
}
