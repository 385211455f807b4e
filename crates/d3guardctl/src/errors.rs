//! Exit codes for d3guardctl
//!
//! Automation (the monitor unit, package hooks, scripts) tells outcomes
//! apart by status alone.

use d3guard_common::recovery::{RecoveryFailure, RecoveryRun, RecoveryState};
use d3guard_common::{D3Error, RunReport};

/// Exit code for success
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for fatal errors (bad config, catalog, I/O)
pub const EXIT_GENERAL_ERROR: i32 = 1;

/// `diagnose` found critical Settings drifted or absent
pub const EXIT_CRITICAL_DRIFT: i32 = 2;

/// Run finished but at least one Setting failed
pub const EXIT_PARTIAL_FAILURE: i32 = 3;

/// Recovery could not restart a display manager
pub const EXIT_RECOVERY_FAILED: i32 = 4;

/// Recovery needs, or was refused, confirmation
pub const EXIT_CONSENT_REQUIRED: i32 = 5;

/// Another run holds the run lock (EX_TEMPFAIL)
pub const EXIT_LOCK_BUSY: i32 = 75;

/// Not running as root (EX_NOPERM)
pub const EXIT_PERMISSION_DENIED: i32 = 77;

/// Exit code for a fatal error
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<D3Error>() {
        Some(D3Error::PermissionDenied(_)) => EXIT_PERMISSION_DENIED,
        Some(D3Error::LockBusy(_)) => EXIT_LOCK_BUSY,
        Some(D3Error::ConsentRequired(_)) => EXIT_CONSENT_REQUIRED,
        _ => EXIT_GENERAL_ERROR,
    }
}

pub fn diagnose_exit(report: &RunReport) -> i32 {
    if report.critical_drift().is_empty() {
        EXIT_SUCCESS
    } else {
        EXIT_CRITICAL_DRIFT
    }
}

/// `fix`, `monitor`, `install-monitor` and `uninstall`
pub fn repair_exit(reports: &[&RunReport]) -> i32 {
    if reports.iter().any(|r| r.has_failures()) {
        EXIT_PARTIAL_FAILURE
    } else {
        EXIT_SUCCESS
    }
}

pub fn recovery_exit(run: &RecoveryRun) -> i32 {
    match run.outcome() {
        RecoveryState::Succeeded(_) => EXIT_SUCCESS,
        RecoveryState::Failed(RecoveryFailure::ConsentRequired(_))
        | RecoveryState::Failed(RecoveryFailure::Declined(_)) => EXIT_CONSENT_REQUIRED,
        _ => EXIT_RECOVERY_FAILED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use d3guard_common::report::{Action, Entry, Mode};
    use d3guard_common::state::{EffectiveAfter, SettingClass};
    use d3guard_common::{HostContext, ProbeState, Severity};

    fn report(severity: Severity, before: ProbeState, action: Action) -> RunReport {
        let mut report = RunReport::new(Mode::Repair, &HostContext::empty());
        report.push(Entry {
            id: "x".to_string(),
            description: String::new(),
            class: SettingClass::GpuPower,
            severity,
            effective_after: EffectiveAfter::Live,
            before: Some(before),
            action,
            after: None,
            error: None,
            note: None,
        });
        report
    }

    #[test]
    fn test_fatal_errors_map_to_distinct_codes() {
        let denied = anyhow::Error::new(D3Error::PermissionDenied("fix".to_string()));
        assert_eq!(exit_code_for(&denied), EXIT_PERMISSION_DENIED);
        let busy = anyhow::Error::new(D3Error::LockBusy("/var/lib/d3guard/run.lock".into()));
        assert_eq!(exit_code_for(&busy), EXIT_LOCK_BUSY);
        let other = anyhow::anyhow!("bad config");
        assert_eq!(exit_code_for(&other), EXIT_GENERAL_ERROR);
    }

    #[test]
    fn test_diagnose_exit_only_counts_critical() {
        let warning = report(Severity::Warning, ProbeState::Absent, Action::None);
        assert_eq!(diagnose_exit(&warning), EXIT_SUCCESS);
        let critical = report(Severity::Critical, ProbeState::Absent, Action::None);
        assert_eq!(diagnose_exit(&critical), EXIT_CRITICAL_DRIFT);
    }

    #[test]
    fn test_repair_exit_distinguishes_partial_failure() {
        let ok = report(Severity::Warning, ProbeState::Absent, Action::Applied);
        let failed = report(Severity::Warning, ProbeState::Absent, Action::Failed);
        assert_eq!(repair_exit(&[&ok]), EXIT_SUCCESS);
        assert_eq!(repair_exit(&[&ok, &failed]), EXIT_PARTIAL_FAILURE);
    }

    #[test]
    fn test_recovery_exit_codes() {
        let run = |state| RecoveryRun {
            states: vec![RecoveryState::Detecting, state],
        };
        assert_eq!(
            recovery_exit(&run(RecoveryState::Succeeded("gdm.service".into()))),
            EXIT_SUCCESS
        );
        assert_eq!(
            recovery_exit(&run(RecoveryState::Failed(RecoveryFailure::NoCandidateFound))),
            EXIT_RECOVERY_FAILED
        );
        assert_eq!(
            recovery_exit(&run(RecoveryState::Failed(RecoveryFailure::ConsentRequired(
                "gdm.service".into()
            )))),
            EXIT_CONSENT_REQUIRED
        );
    }
}
