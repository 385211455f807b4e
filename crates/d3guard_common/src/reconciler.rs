//! Reconciler
//!
//! Drives every Setting of a Catalog through probe and, depending on the
//! mode, apply or revert. One Setting failing never stops the run: each
//! outcome lands in the RunReport and the caller decides what the tally
//! means.

use crate::catalog::Catalog;
use crate::host::HostContext;
use crate::report::{Action, Entry, Mode, RunReport};
use crate::setting::Setting;
use crate::state::{ApplyOutcome, EffectiveAfter, ProbeState, SettingClass};
use crate::target::Target;
use tracing::{debug, info, warn};

const NOT_APPLICABLE: &str = "not applicable on this host";

pub struct Reconciler<'a> {
    target: &'a Target,
    host: &'a HostContext,
    /// Classes a revert run leaves in place
    keep: Vec<SettingClass>,
}

impl<'a> Reconciler<'a> {
    pub fn new(target: &'a Target, host: &'a HostContext) -> Self {
        Self {
            target,
            host,
            keep: Vec::new(),
        }
    }

    /// Leave Settings of `class` alone in revert mode
    pub fn keeping(mut self, class: SettingClass) -> Self {
        self.keep.push(class);
        self
    }

    pub fn run(&self, catalog: &Catalog, mode: Mode) -> RunReport {
        let mut report = RunReport::new(mode, self.host);
        info!(
            "{} run over {} settings ({})",
            mode.as_str(),
            catalog.len(),
            self.host
        );
        for setting in catalog.settings() {
            let entry = match mode {
                Mode::CheckOnly | Mode::Repair => self.reconcile(setting.as_ref(), mode),
                Mode::Revert => self.revert(setting.as_ref()),
            };
            match entry.action {
                Action::Failed => warn!(
                    "{}: {}",
                    entry.id,
                    entry.error.as_deref().unwrap_or("failed")
                ),
                Action::Skipped => debug!(
                    "{}: skipped ({})",
                    entry.id,
                    entry.note.as_deref().unwrap_or("")
                ),
                _ => debug!("{}: {:?}", entry.id, entry.action),
            }
            report.push(entry);
        }
        info!(
            "{} run done: {} satisfied, {} drifted, {} applied, {} failed, {} skipped",
            mode.as_str(),
            report.counts.satisfied,
            report.counts.drifted,
            report.counts.applied,
            report.counts.failed,
            report.counts.skipped
        );
        report
    }

    fn reconcile(&self, setting: &dyn Setting, mode: Mode) -> Entry {
        let mut entry = blank(setting);
        if !setting.applies_to(self.host) {
            return skipped(entry, NOT_APPLICABLE.to_string());
        }
        if let Err(e) = setting.check_available(self.target) {
            return skipped(entry, e.to_string());
        }

        let before = setting.probe(self.target);
        entry.before = Some(before.clone());
        if mode == Mode::CheckOnly || !before.needs_apply() {
            return entry;
        }

        let outcome = setting.apply(self.target);
        let after = setting.probe(self.target);
        match outcome {
            ApplyOutcome::Failed(reason) => {
                entry.action = Action::Failed;
                entry.error = Some(reason);
            }
            ApplyOutcome::Applied if after.is_satisfied() => {
                entry.action = Action::Applied;
            }
            ApplyOutcome::Applied if setting.effective_after() != EffectiveAfter::Live => {
                entry.action = Action::Applied;
                entry.note = Some(format!(
                    "takes effect after {}",
                    setting.effective_after()
                ));
            }
            ApplyOutcome::Applied => {
                entry.action = Action::Failed;
                entry.error = Some(format!("did not take effect: {}", after));
            }
        }
        entry.after = Some(after);
        entry
    }

    fn revert(&self, setting: &dyn Setting) -> Entry {
        let mut entry = blank(setting);
        if self.keep.contains(&setting.class()) {
            return skipped(entry, format!("{} settings are kept", setting.class()));
        }
        if let Err(e) = setting.check_available(self.target) {
            return skipped(entry, e.to_string());
        }

        let before = setting.probe(self.target);
        entry.before = Some(before.clone());
        let ours_present = matches!(before, ProbeState::Satisfied | ProbeState::Drifted(_));
        let applicable = setting.applies_to(self.host);
        if !ours_present && !applicable {
            return skipped(entry, NOT_APPLICABLE.to_string());
        }
        if matches!(before, ProbeState::Unknown(_)) {
            return entry;
        }

        match setting.revert(self.target) {
            ApplyOutcome::Applied => entry.action = Action::Reverted,
            ApplyOutcome::Failed(reason) => {
                entry.action = Action::Failed;
                entry.error = Some(reason);
            }
        }
        entry.after = Some(setting.probe(self.target));
        entry
    }
}

fn blank(setting: &dyn Setting) -> Entry {
    Entry {
        id: setting.id().to_string(),
        description: setting.description().to_string(),
        class: setting.class(),
        severity: setting.severity(),
        effective_after: setting.effective_after(),
        before: None,
        action: Action::None,
        after: None,
        error: None,
        note: None,
    }
}

fn skipped(mut entry: Entry, note: String) -> Entry {
    entry.action = Action::Skipped;
    entry.note = Some(note);
    entry
}
