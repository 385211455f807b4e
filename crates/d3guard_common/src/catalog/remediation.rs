//! The remediation table: every Setting `fix` converges and `diagnose`
//! reports on.

use super::templates as t;
use crate::host::{Desktop, DisplayManager, GpuVendor};
use crate::resource::{
    IniKeys, ManagedBlock, ManagedFile, PciPowerAttrs, RequiredLines, UnitState,
};
use crate::setting::{Condition, PostAction, ResourceSetting, Setting};
use crate::state::{EffectiveAfter, SettingClass, Severity};

pub const SLEEP_TARGETS: &[&str] = &[
    "sleep.target",
    "suspend.target",
    "hibernate.target",
    "hybrid-sleep.target",
    "suspend-then-hibernate.target",
];

const DCONF_LOCAL_DB: &str = "/etc/dconf/db/local.d";

pub fn settings() -> Vec<Box<dyn Setting>> {
    let mut settings: Vec<Box<dyn Setting>> = Vec::new();

    // Sleep deny
    for target in SLEEP_TARGETS {
        settings.push(Box::new(
            ResourceSetting::new(
                format!("systemd-sleep-target-mask:{}", target),
                format!("{} masked", target),
                SettingClass::SleepDeny,
            )
            .severity(Severity::Critical)
            .when(Condition::Systemd)
            .resource(UnitState::masked(target)),
        ));
    }

    settings.push(Box::new(
        ResourceSetting::new(
            "systemd-sleep-conf",
            "systemd-sleep refuses suspend and hibernate",
            SettingClass::SleepDeny,
        )
        .severity(Severity::Critical)
        .when(Condition::Systemd)
        .resource(ManagedFile::new("/etc/systemd/sleep.conf.d/90-d3guard.conf", t::SLEEP_CONF)),
    ));

    settings.push(Box::new(
        ResourceSetting::new(
            "logind-handlers",
            "logind ignores suspend keys, lid switch and idle",
            SettingClass::SleepDeny,
        )
        .effective(EffectiveAfter::ServiceRestart)
        .when(Condition::Systemd)
        .resource(ManagedFile::new("/etc/systemd/logind.conf.d/90-d3guard.conf", t::LOGIND_CONF)),
    ));

    // GPU power
    settings.push(Box::new(
        ResourceSetting::new(
            "udev-nvidia-d3cold-rule",
            "udev rule keeps NVIDIA GPUs out of D3cold",
            SettingClass::GpuPower,
        )
        .severity(Severity::Critical)
        .effective(EffectiveAfter::Reboot)
        .when(Condition::Gpu(GpuVendor::Nvidia))
        .resource(
            ManagedFile::new(
                "/etc/udev/rules.d/80-d3guard-nvidia-d3cold.rules",
                t::UDEV_D3COLD_RULE,
            )
            .requires("/etc/udev"),
        )
        .then(PostAction::UdevReload),
    ));

    settings.push(Box::new(
        ResourceSetting::new(
            "pci-nvidia-runtime-power",
            "NVIDIA GPU runtime power management disabled now",
            SettingClass::GpuPower,
        )
        .severity(Severity::Critical)
        .when(Condition::Gpu(GpuVendor::Nvidia))
        .resource(PciPowerAttrs::new()),
    ));

    settings.push(Box::new(
        ResourceSetting::new(
            "modprobe-nvidia-power",
            "NVIDIA driver dynamic power management off",
            SettingClass::GpuPower,
        )
        .effective(EffectiveAfter::Reboot)
        .when(Condition::Gpu(GpuVendor::Nvidia))
        .resource(
            ManagedFile::new("/etc/modprobe.d/90-d3guard-nvidia.conf", t::MODPROBE_NVIDIA)
                .requires("/etc/modprobe.d"),
        ),
    ));

    settings.push(Box::new(
        ResourceSetting::new(
            "nvidia-persistenced",
            "nvidia-persistenced enabled",
            SettingClass::GpuPower,
        )
        .effective(EffectiveAfter::ServiceRestart)
        .when(Condition::Gpu(GpuVendor::Nvidia))
        .when(Condition::Systemd)
        .resource(UnitState::enabled("nvidia-persistenced.service").require_installed()),
    ));

    // Kernel parameters (host-agnostic)
    settings.push(Box::new(
        ResourceSetting::new(
            "kernel-param:pcie_port_pm",
            "pcie_port_pm=off on the kernel command line",
            SettingClass::KernelParam,
        )
        .severity(Severity::Info)
        .effective(EffectiveAfter::Reboot)
        .resource(
            ManagedBlock::new("/etc/default/grub", "pcie_port_pm", t::GRUB_PCIE_PORT_PM)
                .in_existing_file(),
        )
        .then(PostAction::GrubMkconfig),
    ));

    // Desktop idle
    let dconf_desktops = vec![
        Desktop::Gnome,
        Desktop::Budgie,
        Desktop::Cinnamon,
        Desktop::Mate,
    ];
    settings.push(Box::new(
        ResourceSetting::new(
            "dconf-profile:user",
            "dconf user profile reads the local system database",
            SettingClass::DesktopIdle,
        )
        .effective(EffectiveAfter::ServiceRestart)
        .when(Condition::AnyDesktop(dconf_desktops))
        .resource(
            RequiredLines::new("/etc/dconf/profile/user", t::DCONF_PROFILE_USER)
                .requires("/etc/dconf"),
        )
        .then(PostAction::DconfUpdate),
    ));

    for (name, desktops, keyfile) in [
        ("gnome", vec![Desktop::Gnome, Desktop::Budgie], t::DCONF_GNOME),
        ("cinnamon", vec![Desktop::Cinnamon], t::DCONF_CINNAMON),
        ("mate", vec![Desktop::Mate], t::DCONF_MATE),
    ] {
        settings.push(Box::new(
            ResourceSetting::new(
                format!("dconf-idle:{}", name),
                format!("{} idle suspend, blanking and lock disabled (locked)", name),
                SettingClass::DesktopIdle,
            )
            .effective(EffectiveAfter::ServiceRestart)
            .when(Condition::AnyDesktop(desktops))
            .resource(
                ManagedFile::new(&format!("{}/90-d3guard-{}", DCONF_LOCAL_DB, name), keyfile)
                    .requires("/etc/dconf"),
            )
            .resource(ManagedFile::new(
                &format!("{}/locks/90-d3guard-{}", DCONF_LOCAL_DB, name),
                t::dconf_locks(keyfile),
            ))
            .then(PostAction::DconfUpdate),
        ));
    }

    settings.push(Box::new(
        ResourceSetting::new(
            "gdm-greeter-power",
            "GDM login screen never suspends",
            SettingClass::DesktopIdle,
        )
        .effective(EffectiveAfter::ServiceRestart)
        .when(Condition::DisplayManager(DisplayManager::Gdm))
        .resource(
            RequiredLines::new("/etc/dconf/profile/gdm", t::DCONF_PROFILE_GDM)
                .requires("/etc/dconf"),
        )
        .resource(ManagedFile::new("/etc/dconf/db/gdm.d/90-d3guard", t::DCONF_GDM_GREETER))
        .optional_resource(
            ManagedBlock::new(
                "/etc/gdm3/greeter.dconf-defaults",
                "greeter-power",
                t::GDM3_GREETER_DEFAULTS,
            )
            .in_existing_file(),
        )
        .then(PostAction::DconfUpdate),
    ));

    settings.push(Box::new(
        ResourceSetting::new(
            "kde-powerdevil",
            "KDE PowerDevil never suspends or blanks on AC",
            SettingClass::DesktopIdle,
        )
        .effective(EffectiveAfter::ServiceRestart)
        .when(Condition::Desktop(Desktop::Kde))
        // Plasma 6
        .resource(
            IniKeys::new("/etc/xdg/powerdevilrc")
                .set("AC][SuspendAndShutdown", "AutoSuspendAction", "0")
                .set("AC][Display", "TurnOffDisplayWhenIdle", "false")
                .set("AC][Display", "DimDisplayWhenIdle", "false")
                .requires("/etc/xdg"),
        )
        // Plasma 5
        .resource(
            IniKeys::new("/etc/xdg/powermanagementprofilesrc")
                .set("AC][SuspendSession", "suspendType", "0")
                .set("AC][SuspendSession", "idleTime", "0")
                .set("AC][DPMSControl", "idleTime", "0")
                .set("AC][DimDisplay", "idleTime", "0"),
        ),
    ));

    settings.push(Box::new(
        ResourceSetting::new(
            "kde-screenlocker",
            "KDE screen locker does not auto-lock",
            SettingClass::DesktopIdle,
        )
        .severity(Severity::Info)
        .effective(EffectiveAfter::ServiceRestart)
        .when(Condition::Desktop(Desktop::Kde))
        .resource(
            IniKeys::new("/etc/xdg/kscreenlockerrc")
                .set("Daemon", "Autolock", "false")
                .set("Daemon", "LockOnResume", "false")
                .set("Daemon", "Timeout", "0")
                .requires("/etc/xdg"),
        ),
    ));

    settings.push(Box::new(
        ResourceSetting::new(
            "xfce-power-manager",
            "xfce4-power-manager defaults never blank or suspend",
            SettingClass::DesktopIdle,
        )
        .effective(EffectiveAfter::ServiceRestart)
        .when(Condition::Desktop(Desktop::Xfce))
        .resource(
            ManagedFile::replacing(
                "/etc/xdg/xfce4/xfconf/xfce-perchannel-xml/xfce4-power-manager.xml",
                t::XFCE_POWER_MANAGER,
            )
            .requires("/etc/xdg"),
        ),
    ));

    // DPMS
    settings.push(Box::new(
        ResourceSetting::new(
            "xorg-dpms",
            "X server never blanks or powers down the display",
            SettingClass::Dpms,
        )
        .effective(EffectiveAfter::ServiceRestart)
        .when(Condition::Graphical)
        .resource(
            ManagedFile::new("/etc/X11/xorg.conf.d/90-d3guard-dpms.conf", t::XORG_DPMS)
                .requires("/etc/X11"),
        ),
    ));

    settings
}
