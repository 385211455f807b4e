//! File contents written by the catalogs.

pub const HEADER: &str = "# Managed by d3guard. Changes here are reverted by the drift monitor.";

pub const SLEEP_CONF: &str = "\
# Managed by d3guard. Changes here are reverted by the drift monitor.
[Sleep]
AllowSuspend=no
AllowHibernation=no
AllowSuspendThenHibernate=no
AllowHybridSleep=no
";

pub const LOGIND_CONF: &str = "\
# Managed by d3guard. Changes here are reverted by the drift monitor.
[Login]
HandleSuspendKey=ignore
HandleHibernateKey=ignore
HandleLidSwitch=ignore
HandleLidSwitchExternalPower=ignore
HandleLidSwitchDocked=ignore
IdleAction=ignore
";

pub const UDEV_D3COLD_RULE: &str = "\
# Managed by d3guard. Changes here are reverted by the drift monitor.
# Keep NVIDIA display functions out of D3cold and runtime suspend.
ACTION==\"add|bind\", SUBSYSTEM==\"pci\", ATTR{vendor}==\"0x10de\", ATTR{class}==\"0x03*\", ATTR{d3cold_allowed}=\"0\", ATTR{power/control}=\"on\"
";

pub const MODPROBE_NVIDIA: &str = "\
# Managed by d3guard. Changes here are reverted by the drift monitor.
options nvidia NVreg_DynamicPowerManagement=0x00
";

/// Appended to `/etc/default/grub`, which every distro's grub-mkconfig sources
pub const GRUB_PCIE_PORT_PM: &str =
    "GRUB_CMDLINE_LINUX_DEFAULT=\"${GRUB_CMDLINE_LINUX_DEFAULT} pcie_port_pm=off\"";

pub const DCONF_PROFILE_USER: &[&str] = &["user-db:user", "system-db:local"];

pub const DCONF_PROFILE_GDM: &[&str] = &[
    "user-db:user",
    "system-db:gdm",
    "file-db:/usr/share/gdm/greeter-dconf-defaults",
];

pub const DCONF_GNOME: &str = "\
# Managed by d3guard. Changes here are reverted by the drift monitor.
[org/gnome/settings-daemon/plugins/power]
sleep-inactive-ac-type='nothing'
sleep-inactive-ac-timeout=0
sleep-inactive-battery-type='nothing'
sleep-inactive-battery-timeout=0
idle-dim=false
power-button-action='nothing'

[org/gnome/desktop/session]
idle-delay=uint32 0

[org/gnome/desktop/screensaver]
idle-activation-enabled=false
lock-enabled=false
";

pub const DCONF_CINNAMON: &str = "\
# Managed by d3guard. Changes here are reverted by the drift monitor.
[org/cinnamon/settings-daemon/plugins/power]
sleep-inactive-ac-timeout=0
sleep-inactive-battery-timeout=0
sleep-display-ac=0
sleep-display-battery=0
idle-dim-battery=false

[org/cinnamon/desktop/session]
idle-delay=uint32 0

[org/cinnamon/desktop/screensaver]
lock-enabled=false
";

pub const DCONF_MATE: &str = "\
# Managed by d3guard. Changes here are reverted by the drift monitor.
[org/mate/power-manager]
sleep-computer-ac=0
sleep-computer-battery=0
sleep-display-ac=0
sleep-display-battery=0
action-sleep-type-ac='nothing'

[org/mate/screensaver]
idle-activation-enabled=false
lock-enabled=false

[org/mate/desktop/session]
idle-delay=0
";

pub const DCONF_GDM_GREETER: &str = "\
# Managed by d3guard. Changes here are reverted by the drift monitor.
[org/gnome/settings-daemon/plugins/power]
sleep-inactive-ac-type='nothing'
sleep-inactive-ac-timeout=0
sleep-inactive-battery-type='nothing'
sleep-inactive-battery-timeout=0

[org/gnome/desktop/session]
idle-delay=uint32 0
";

/// Legacy Debian/Ubuntu greeter defaults block
pub const GDM3_GREETER_DEFAULTS: &str = "\
[org/gnome/settings-daemon/plugins/power]
sleep-inactive-ac-type='nothing'
sleep-inactive-ac-timeout=0
sleep-inactive-battery-type='nothing'
sleep-inactive-battery-timeout=0";

pub const XFCE_POWER_MANAGER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- Managed by d3guard. Changes here are reverted by the drift monitor. -->
<channel name="xfce4-power-manager" version="1.0">
  <property name="xfce4-power-manager" type="empty">
    <property name="dpms-enabled" type="bool" value="false"/>
    <property name="blank-on-ac" type="int" value="0"/>
    <property name="dpms-on-ac-sleep" type="uint" value="0"/>
    <property name="dpms-on-ac-off" type="uint" value="0"/>
    <property name="inactivity-on-ac" type="uint" value="14"/>
    <property name="inactivity-on-battery" type="uint" value="14"/>
    <property name="lock-screen-suspend-hibernate" type="bool" value="false"/>
  </property>
</channel>
"#;

pub const XORG_DPMS: &str = "\
# Managed by d3guard. Changes here are reverted by the drift monitor.
Section \"ServerFlags\"
    Option \"BlankTime\" \"0\"
    Option \"StandbyTime\" \"0\"
    Option \"SuspendTime\" \"0\"
    Option \"OffTime\" \"0\"
EndSection
";

// =============================================================================
// Monitor units and hooks
// =============================================================================

pub fn monitor_service(exe: &str) -> String {
    format!(
        "{HEADER}
[Unit]
Description=d3guard drift check for GPU power settings
After=local-fs.target

[Service]
Type=oneshot
ExecStart={exe} monitor --trigger timer
"
    )
}

pub fn monitor_timer(interval_minutes: u32) -> String {
    format!(
        "{HEADER}
[Unit]
Description=Periodic d3guard drift check

[Timer]
OnBootSec=2min
OnUnitActiveSec={interval_minutes}min
Unit=d3guard-monitor.service

[Install]
WantedBy=timers.target
"
    )
}

pub fn pacman_hook(exe: &str) -> String {
    format!(
        "{HEADER}
[Trigger]
Operation = Install
Operation = Upgrade
Operation = Remove
Type = Package
Target = *

[Action]
Description = Checking d3guard GPU power settings...
When = PostTransaction
Exec = {exe} monitor --trigger package
"
    )
}

pub fn apt_hook(exe: &str) -> String {
    format!(
        "{HEADER}
DPkg::Post-Invoke {{ \"if [ -x {exe} ]; then {exe} monitor --trigger package || true; fi\"; }};
"
    )
}

pub fn dnf_actions(exe: &str) -> String {
    format!(
        "{HEADER}
post_transaction::::{exe} monitor --trigger package
"
    )
}

/// Lock file listing every key in a dconf keyfile
pub fn dconf_locks(keyfile: &str) -> String {
    let mut locks = vec![HEADER.to_string()];
    let mut section = "";
    for line in keyfile.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            section = name;
        } else if let Some((key, _)) = line.split_once('=') {
            locks.push(format!("/{}/{}", section, key.trim()));
        }
    }
    locks.join("\n") + "\n"
}
