//! The monitor table: what `install-monitor` registers with the service
//! manager and package managers.

use super::templates as t;
use crate::host::DistroFamily;
use crate::resource::{ManagedFile, UnitState};
use crate::setting::{Condition, PostAction, ResourceSetting, Setting};
use crate::state::{EffectiveAfter, SettingClass, Severity};

pub const MONITOR_SERVICE: &str = "d3guard-monitor.service";
pub const MONITOR_TIMER: &str = "d3guard-monitor.timer";
pub const UNIT_DIR: &str = "/etc/systemd/system";

/// Parameters baked into the monitor units and hooks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorUnits {
    /// Absolute path of the d3guardctl binary
    pub exe: String,
    pub interval_minutes: u32,
}

pub fn settings(units: &MonitorUnits) -> Vec<Box<dyn Setting>> {
    let mut settings: Vec<Box<dyn Setting>> = Vec::new();

    // One Setting: enabling the timer depends on both unit files existing
    settings.push(Box::new(
        ResourceSetting::new(
            "monitor-timer",
            "periodic drift check timer installed and enabled",
            SettingClass::Monitor,
        )
        .when(Condition::Systemd)
        .resource(ManagedFile::new(
            &format!("{}/{}", UNIT_DIR, MONITOR_SERVICE),
            t::monitor_service(&units.exe),
        ))
        .resource(ManagedFile::new(
            &format!("{}/{}", UNIT_DIR, MONITOR_TIMER),
            t::monitor_timer(units.interval_minutes),
        ))
        .resource(UnitState::enabled(MONITOR_TIMER))
        .then(PostAction::DaemonReload),
    ));

    for (manager, family, path, requires, contents) in [
        (
            "pacman",
            DistroFamily::Arch,
            "/etc/pacman.d/hooks/95-d3guard.hook",
            "/etc/pacman.d",
            t::pacman_hook(&units.exe),
        ),
        (
            "apt",
            DistroFamily::Debian,
            "/etc/apt/apt.conf.d/95-d3guard",
            "/etc/apt/apt.conf.d",
            t::apt_hook(&units.exe),
        ),
        (
            "dnf",
            DistroFamily::Fedora,
            "/etc/dnf/libdnf5-plugins/actions.d/d3guard.actions",
            "/etc/dnf/libdnf5-plugins/actions.d",
            t::dnf_actions(&units.exe),
        ),
    ] {
        settings.push(Box::new(
            ResourceSetting::new(
                format!("monitor-hook:{}", manager),
                format!("{} post-transaction hook runs the drift check", manager),
                SettingClass::Monitor,
            )
            .severity(Severity::Info)
            .effective(EffectiveAfter::Live)
            .when(Condition::Distro(family))
            .resource(ManagedFile::new(path, contents).requires(requires)),
        ));
    }

    settings
}
