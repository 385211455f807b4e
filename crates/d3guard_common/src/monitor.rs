//! Drift Monitor
//!
//! Re-runs the remediation catalog in repair mode when the timer or a
//! package-manager hook fires. A run that re-applied anything leaves a
//! `DriftEvent` in the event log, a warning in the journal and, if users
//! are logged in, a desktop notification.
//!
//! Timer and hook may fire together; the run lock keeps their writes from
//! interleaving. A timer run that finds the lock held backs off, since the
//! timer fires again. Package and manual runs wait their turn: the package
//! transaction that fired the hook may have just undone a setting, and no
//! later event would catch it before the next timer tick.

use crate::catalog::Catalog;
use crate::config::D3Config;
use crate::error::D3Error;
use crate::event_log::{DriftEvent, EventLog};
use crate::host::HostContext;
use crate::lock::RunLock;
use crate::notifier::{Notifier, Urgency};
use crate::reconciler::Reconciler;
use crate::report::{Mode, RunReport};
use crate::resource::atomic_write;
use crate::target::Target;
use chrono::{DateTime, Duration, Utc};
use std::fs;
use tracing::{debug, info, warn};

pub const LAST_RUN_FILE: &str = "last-run";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    Package,
    Manual,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Timer => "timer",
            Trigger::Package => "package",
            Trigger::Manual => "manual",
        }
    }
}

#[derive(Debug)]
pub enum MonitorOutcome {
    /// Another run holds the lock (timer trigger only)
    Busy,
    /// Timer fired within `min_interval_secs` of the previous run
    Throttled { last_run: DateTime<Utc> },
    Completed(RunReport),
}

pub struct DriftMonitor<'a> {
    target: &'a Target,
    host: &'a HostContext,
    catalog: &'a Catalog,
    config: &'a D3Config,
    notifier: Option<&'a dyn Notifier>,
}

impl<'a> DriftMonitor<'a> {
    pub fn new(
        target: &'a Target,
        host: &'a HostContext,
        catalog: &'a Catalog,
        config: &'a D3Config,
    ) -> Self {
        Self {
            target,
            host,
            catalog,
            config,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: &'a dyn Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn run(&self, trigger: Trigger) -> Result<MonitorOutcome, D3Error> {
        self.run_at(trigger, Utc::now())
    }

    pub fn run_at(&self, trigger: Trigger, now: DateTime<Utc>) -> Result<MonitorOutcome, D3Error> {
        let acquired = match trigger {
            Trigger::Timer => RunLock::try_acquire(self.target),
            Trigger::Package | Trigger::Manual => RunLock::acquire(self.target),
        };
        let _lock = match acquired {
            Ok(lock) => lock,
            Err(D3Error::LockBusy(path)) => {
                info!("{} trigger: another run holds {}, nothing to do", trigger.as_str(), path);
                return Ok(MonitorOutcome::Busy);
            }
            Err(e) => return Err(e),
        };

        if trigger == Trigger::Timer {
            if let Some(last_run) = last_run(self.target) {
                let min = Duration::seconds(self.config.monitor.min_interval_secs as i64);
                if now.signed_duration_since(last_run) < min {
                    debug!("last run at {}, within minimum interval", last_run);
                    return Ok(MonitorOutcome::Throttled { last_run });
                }
            }
        }

        info!("drift check started by {} trigger", trigger.as_str());
        let report = Reconciler::new(self.target, self.host).run(self.catalog, Mode::Repair);
        if let Err(e) = record_last_run(self.target, now) {
            warn!("cannot record last run: {}", e);
        }

        if let Some(event) = DriftEvent::from_report(&report, trigger.as_str()) {
            warn!(
                run_id = %event.run_id,
                reapplied = ?event.reapplied,
                "{}",
                event.message
            );
            let log = EventLog::for_target(self.target, &self.config.paths.event_log);
            if let Err(e) = log.append(&event) {
                warn!("cannot write {}: {}", log.path().display(), e);
            }
            self.notify(&event);
        } else {
            info!("no drift");
        }

        Ok(MonitorOutcome::Completed(report))
    }

    fn notify(&self, event: &DriftEvent) {
        if !self.config.monitor.notify_users {
            return;
        }
        let Some(notifier) = self.notifier else {
            return;
        };

        let urgency = if event.failed.is_empty() {
            Urgency::Normal
        } else {
            Urgency::Critical
        };
        let mut body = event.message.clone();
        let names: Vec<&str> = event
            .reapplied
            .iter()
            .map(String::as_str)
            .chain(event.failed.iter().map(|f| f.id.as_str()))
            .take(5)
            .collect();
        body.push_str(&format!(":\n{}", names.join("\n")));
        if !event.failed.is_empty() {
            body.push_str("\n\nRun 'd3guardctl diagnose' for details.");
        }

        match notifier.notify("GPU power settings drifted", &body, urgency) {
            Ok(0) => debug!("no graphical session to notify"),
            Ok(n) => debug!("notified {} session(s)", n),
            Err(e) => warn!("desktop notification failed: {}", e),
        }
    }
}

/// Time of the previous monitor run, if recorded and readable
pub fn last_run(target: &Target) -> Option<DateTime<Utc>> {
    let raw = fs::read_to_string(target.state_path(LAST_RUN_FILE)).ok()?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn record_last_run(target: &Target, now: DateTime<Utc>) -> std::io::Result<()> {
    let stamp = format!("{}\n", now.to_rfc3339());
    atomic_write(&target.state_path(LAST_RUN_FILE), stamp.as_bytes(), 0o644)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{fake_target, FakeNotifier, FakeSetting};
    use crate::setting::Setting;
    use tempfile::TempDir;

    fn catalog_of(settings: Vec<FakeSetting>) -> Catalog {
        Catalog::new(
            settings
                .into_iter()
                .map(|s| Box::new(s) as Box<dyn Setting>)
                .collect(),
        )
        .unwrap()
    }

    fn events(target: &Target, config: &D3Config) -> Vec<String> {
        fs::read_to_string(target.path(&config.paths.event_log))
            .map(|c| c.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_drift_is_repaired_logged_and_notified() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let host = HostContext::empty();
        let config = D3Config::default();
        let catalog = catalog_of(vec![
            FakeSetting::new("kept").with_value("on"),
            FakeSetting::new("reverted").with_value("off"),
        ]);
        let notifier = FakeNotifier::default();

        let outcome = DriftMonitor::new(&target, &host, &catalog, &config)
            .with_notifier(&notifier)
            .run(Trigger::Package)
            .unwrap();
        let MonitorOutcome::Completed(report) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(report.counts.applied, 1);

        let lines = events(&target, &config);
        assert_eq!(lines.len(), 1);
        let event: DriftEvent = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(event.trigger, "package");
        assert_eq!(event.reapplied, vec!["reverted"]);
        assert_eq!(event.message, "1 setting was reverted and re-applied");

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("reverted"));
        assert!(last_run(&target).is_some());
    }

    #[test]
    fn test_clean_run_writes_no_event() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let host = HostContext::empty();
        let config = D3Config::default();
        let catalog = catalog_of(vec![FakeSetting::new("kept").with_value("on")]);
        let notifier = FakeNotifier::default();

        DriftMonitor::new(&target, &host, &catalog, &config)
            .with_notifier(&notifier)
            .run(Trigger::Manual)
            .unwrap();
        assert!(events(&target, &config).is_empty());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_timer_respects_minimum_interval() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let host = HostContext::empty();
        let config = D3Config::default();
        let catalog = catalog_of(vec![FakeSetting::new("a")]);
        let monitor = DriftMonitor::new(&target, &host, &catalog, &config);

        let start = Utc::now();
        assert!(matches!(
            monitor.run_at(Trigger::Timer, start).unwrap(),
            MonitorOutcome::Completed(_)
        ));
        assert!(matches!(
            monitor.run_at(Trigger::Timer, start + Duration::seconds(60)).unwrap(),
            MonitorOutcome::Throttled { .. }
        ));
        // Package hooks are never throttled
        assert!(matches!(
            monitor.run_at(Trigger::Package, start + Duration::seconds(61)).unwrap(),
            MonitorOutcome::Completed(_)
        ));
        assert!(matches!(
            monitor.run_at(Trigger::Timer, start + Duration::seconds(400)).unwrap(),
            MonitorOutcome::Completed(_)
        ));
    }

    #[test]
    fn test_busy_when_another_run_holds_the_lock() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let host = HostContext::empty();
        let config = D3Config::default();
        let setting = FakeSetting::new("a");
        let catalog = catalog_of(vec![setting]);

        let _held = RunLock::acquire(&target).unwrap();
        let outcome = DriftMonitor::new(&target, &host, &catalog, &config)
            .run(Trigger::Timer)
            .unwrap();
        assert!(matches!(outcome, MonitorOutcome::Busy));
        assert!(last_run(&target).is_none());
    }

    #[test]
    fn test_package_trigger_waits_for_the_lock() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let host = HostContext::empty();
        let config = D3Config::default();
        let catalog = catalog_of(vec![FakeSetting::new("a").with_value("off")]);

        let held = RunLock::try_acquire(&target).unwrap();
        let wait = std::time::Duration::from_millis(200);
        let started = std::time::Instant::now();
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(wait);
            drop(held);
        });

        let outcome = DriftMonitor::new(&target, &host, &catalog, &config)
            .run(Trigger::Package)
            .unwrap();
        releaser.join().unwrap();

        assert!(started.elapsed() >= wait);
        let MonitorOutcome::Completed(report) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(report.counts.applied, 1);
        assert!(last_run(&target).is_some());
        assert_eq!(events(&target, &config).len(), 1);
    }

    #[test]
    fn test_notification_failure_does_not_change_outcome() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let host = HostContext::empty();
        let config = D3Config::default();
        let catalog = catalog_of(vec![FakeSetting::new("a"), FakeSetting::new("b").failing()]);
        let notifier = FakeNotifier {
            fail: true,
            ..Default::default()
        };

        let outcome = DriftMonitor::new(&target, &host, &catalog, &config)
            .with_notifier(&notifier)
            .run(Trigger::Manual)
            .unwrap();
        let MonitorOutcome::Completed(report) = outcome else {
            panic!("expected a completed run");
        };
        assert_eq!(report.counts.applied, 1);
        assert_eq!(report.counts.failed, 1);
        let event: DriftEvent = serde_json::from_str(&events(&target, &config)[0]).unwrap();
        assert_eq!(event.failed[0].id, "b");
    }

    #[test]
    fn test_notify_users_off_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let (target, _, _) = fake_target(dir.path());
        let host = HostContext::empty();
        let mut config = D3Config::default();
        config.monitor.notify_users = false;
        let catalog = catalog_of(vec![FakeSetting::new("a")]);
        let notifier = FakeNotifier::default();

        DriftMonitor::new(&target, &host, &catalog, &config)
            .with_notifier(&notifier)
            .run(Trigger::Manual)
            .unwrap();
        assert!(notifier.sent.lock().unwrap().is_empty());
        assert_eq!(events(&target, &config).len(), 1);
    }
}
