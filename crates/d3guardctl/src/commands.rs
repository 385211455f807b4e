//! Command implementations
//!
//! Each command loads config, builds the Target and Host Context once, runs
//! the engine and returns the process exit code. Fatal preconditions come
//! back as errors and are mapped in `main`.

use crate::cli::{Cli, Commands};
use crate::consent::TerminalConsent;
use crate::errors;
use crate::output;
use anyhow::{Context as _, Result};
use chrono::Local;
use d3guard_common::catalog::monitor::MONITOR_TIMER;
use d3guard_common::event_log::EventLog;
use d3guard_common::lock::RunLock;
use d3guard_common::monitor::{self, DriftMonitor, MonitorOutcome, Trigger};
use d3guard_common::notifier::DesktopNotifier;
use d3guard_common::reconciler::Reconciler;
use d3guard_common::recovery::RecoveryController;
use d3guard_common::report::{Action, Mode};
use d3guard_common::state::{EffectiveAfter, SettingClass};
use d3guard_common::{Catalog, CatalogKind, D3Config, D3Error, HostContext, Target};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Written into units and hooks when the running executable cannot be
/// resolved
pub const DEFAULT_EXE: &str = "/usr/bin/d3guardctl";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

/// Everything a command needs, built once per invocation
pub struct Context {
    pub root: PathBuf,
    pub config: D3Config,
    pub target: Target,
    pub host: HostContext,
    pub json: bool,
}

impl Context {
    pub fn load(cli: &Cli) -> Result<Self> {
        let config = D3Config::load(&cli.root, cli.config.as_deref())?;
        let target = Target::system(&cli.root, &config);
        let host = HostContext::detect(&target);
        info!("host: {}", host);
        Ok(Self {
            root: cli.root.clone(),
            config,
            target,
            host,
            json: cli.json,
        })
    }

    fn catalog(&self, kind: CatalogKind, exe: &str) -> Result<Catalog> {
        Ok(Catalog::load(kind, &self.config, exe)?)
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(&self.target, &self.host)
    }
}

pub fn dispatch(cli: &Cli) -> Result<i32> {
    let ctx = Context::load(cli)?;
    match &cli.command {
        Commands::Diagnose => diagnose(&ctx),
        Commands::Fix => fix(&ctx),
        Commands::Monitor { trigger } => run_monitor(&ctx, (*trigger).into()),
        Commands::InstallMonitor { exe } => install_monitor(&ctx, exe.as_deref()),
        Commands::Uninstall { restore_suspend } => uninstall(&ctx, *restore_suspend),
        Commands::Recover => recover(&ctx),
        Commands::Status => status(&ctx),
    }
}

/// Absolute path of the binary the monitor units should call
fn exe_path(explicit: Option<&Path>) -> Result<String> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match std::env::current_exe() {
            Ok(path) => path,
            Err(e) => {
                warn!("cannot resolve current executable ({}), using {}", e, DEFAULT_EXE);
                PathBuf::from(DEFAULT_EXE)
            }
        },
    };
    if !path.is_absolute() {
        anyhow::bail!("executable path must be absolute, got {}", path.display());
    }
    Ok(path.display().to_string())
}

pub fn diagnose(ctx: &Context) -> Result<i32> {
    // Unprivileged diagnose still works; some probes may come back Unknown
    if let Err(e) = ctx.target.require_privilege("diagnose") {
        warn!("{}", e);
        if !ctx.json {
            output::display_warning("not running as root; some probes may report UNKNOWN");
        }
    }

    let catalog = ctx.catalog(CatalogKind::Remediation, &exe_path(None)?)?;
    let report = ctx.reconciler().run(&catalog, Mode::CheckOnly);

    if ctx.json {
        output::print_json(&report)?;
    } else {
        output::render_report(&report, "DIAGNOSE");
        let critical = report.critical_drift();
        if !critical.is_empty() {
            output::display_warning(&format!(
                "{} critical setting(s) missing; run 'd3guardctl fix'",
                critical.len()
            ));
        }
    }
    Ok(errors::diagnose_exit(&report))
}

pub fn fix(ctx: &Context) -> Result<i32> {
    ctx.target.require_privilege("fix")?;
    let catalog = ctx.catalog(CatalogKind::Remediation, &exe_path(None)?)?;

    let _lock = RunLock::acquire(&ctx.target)?;
    let report = ctx.reconciler().run(&catalog, Mode::Repair);

    if ctx.json {
        output::print_json(&report)?;
    } else {
        output::render_report(&report, "FIX");
        if report
            .applied()
            .iter()
            .any(|e| e.effective_after != EffectiveAfter::Live)
        {
            output::display_info("some changes take effect after a service restart or reboot");
        }
    }
    Ok(errors::repair_exit(&[&report]))
}

pub fn run_monitor(ctx: &Context, trigger: Trigger) -> Result<i32> {
    ctx.target.require_privilege("monitor")?;
    let catalog = ctx.catalog(CatalogKind::Remediation, &exe_path(None)?)?;

    let notifier = DesktopNotifier::new(ctx.target.command_runner());
    let mut drift_monitor = DriftMonitor::new(&ctx.target, &ctx.host, &catalog, &ctx.config);
    // Sessions on the running system have nothing to do with an offline image
    if ctx.target.is_live_root() {
        drift_monitor = drift_monitor.with_notifier(&notifier);
    }

    match drift_monitor.run(trigger)? {
        MonitorOutcome::Busy => {
            if !ctx.json {
                output::display_info("another d3guard run is in progress; skipping");
            }
            Ok(errors::EXIT_SUCCESS)
        }
        MonitorOutcome::Throttled { last_run } => {
            if !ctx.json {
                output::display_info(&format!("last check at {}; skipping", last_run.to_rfc3339()));
            }
            Ok(errors::EXIT_SUCCESS)
        }
        MonitorOutcome::Completed(report) => {
            if ctx.json {
                output::print_json(&report)?;
            } else {
                output::render_report(&report, "MONITOR");
            }
            Ok(errors::repair_exit(&[&report]))
        }
    }
}

pub fn install_monitor(ctx: &Context, exe: Option<&Path>) -> Result<i32> {
    ctx.target.require_privilege("install-monitor")?;
    let exe = exe_path(exe)?;
    let catalog = ctx.catalog(CatalogKind::Monitor, &exe)?;

    let _lock = RunLock::acquire(&ctx.target)?;
    let report = ctx.reconciler().run(&catalog, Mode::Repair);

    // Enabling only arms the timer for the next boot
    let timer_ready = report
        .get("monitor-timer")
        .map(|e| e.action != Action::Skipped && e.action != Action::Failed)
        .unwrap_or(false);
    if timer_ready && ctx.target.is_live_root() {
        if let Err(e) = ctx.target.services().restart(MONITOR_TIMER) {
            warn!("cannot start {}: {}", MONITOR_TIMER, e);
        }
    }

    if ctx.json {
        output::print_json(&report)?;
    } else {
        output::render_report(&report, "INSTALL MONITOR");
        if report.entries.iter().all(|e| e.action == Action::Skipped) {
            output::display_warning("no timer or package hook applies to this host");
        }
    }
    Ok(errors::repair_exit(&[&report]))
}

pub fn uninstall(ctx: &Context, restore_suspend: bool) -> Result<i32> {
    ctx.target.require_privilege("uninstall")?;
    let exe = exe_path(None)?;
    let monitor_catalog = ctx.catalog(CatalogKind::Monitor, &exe)?;
    let remediation = ctx.catalog(CatalogKind::Remediation, &exe)?;

    let _lock = RunLock::acquire(&ctx.target)?;
    let monitor_report = ctx.reconciler().run(&monitor_catalog, Mode::Revert);

    let mut reconciler = ctx.reconciler();
    if !(restore_suspend || ctx.config.uninstall.restore_suspend) {
        reconciler = reconciler.keeping(SettingClass::SleepDeny);
    }
    let remediation_report = reconciler.run(&remediation, Mode::Revert);

    if ctx.json {
        output::print_json(&[&monitor_report, &remediation_report])?;
    } else {
        output::render_report(&monitor_report, "UNINSTALL MONITOR");
        output::render_report(&remediation_report, "UNINSTALL SETTINGS");
        if remediation_report
            .entries
            .iter()
            .any(|e| e.class == SettingClass::SleepDeny && e.action == Action::Skipped)
        {
            output::display_info(
                "suspend stays disabled; run 'd3guardctl uninstall --restore-suspend' to re-enable it",
            );
        }
    }
    Ok(errors::repair_exit(&[&monitor_report, &remediation_report]))
}

pub fn recover(ctx: &Context) -> Result<i32> {
    if !ctx.target.is_live_root() {
        return Err(D3Error::Config(format!(
            "recover acts on the running system; --root {} is not supported",
            ctx.root.display()
        ))
        .into());
    }
    ctx.target.require_privilege("recover")?;

    let consent = TerminalConsent::new();
    let run = RecoveryController::new(&ctx.target, &ctx.host, &consent).run();
    output::render_recovery(&run);
    Ok(errors::recovery_exit(&run))
}

pub fn status(ctx: &Context) -> Result<i32> {
    let catalog = ctx.catalog(CatalogKind::Monitor, &exe_path(None)?)?;
    let report = ctx.reconciler().run(&catalog, Mode::CheckOnly);
    let last_run = monitor::last_run(&ctx.target);
    let log = EventLog::for_target(&ctx.target, &ctx.config.paths.event_log);
    let last_event = log
        .last()
        .with_context(|| format!("Failed to read {}", log.path().display()))?;

    if ctx.json {
        output::print_json(&serde_json::json!({
            "version": env!("D3GUARD_VERSION"),
            "host": &ctx.host,
            "monitor": &report,
            "last_run": last_run,
            "last_event": last_event,
        }))?;
        return Ok(errors::EXIT_SUCCESS);
    }

    println!("d3guard {}", env!("D3GUARD_VERSION"));
    println!("[HOST]");
    println!("  {}", ctx.host);
    output::render_report(&report, "MONITOR");
    match last_run {
        Some(t) => println!("Last check: {}", t.with_timezone(&Local).format(TIME_FORMAT)),
        None => println!("Last check: never"),
    }
    match last_event {
        Some(event) => println!(
            "Last drift: {} ({} trigger) {}",
            event.ts.with_timezone(&Local).format(TIME_FORMAT),
            event.trigger,
            event.message
        ),
        None => println!("Last drift: none recorded"),
    }
    Ok(errors::EXIT_SUCCESS)
}
