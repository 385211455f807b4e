//! Host Context
//!
//! Facts about the machine that decide which Settings apply. Detected once
//! per run, through the `Target` root, and never mutated afterwards.
//!
//! Detection layers:
//! - Desktop: session environment (live root only), running processes,
//!   installed session files
//! - Display manager: `display-manager.service` alias, then
//!   `/etc/X11/default-display-manager`
//! - GPU vendors: PCI display-class functions in sysfs
//! - Init system: systemd runtime or binary
//! - Distro family: `/etc/os-release` ID and ID_LIKE

use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Desktop {
    Gnome,
    Kde,
    Xfce,
    Cinnamon,
    Mate,
    Budgie,
    Lxqt,
    Other(String),
    None,
}

impl Desktop {
    /// Map XDG_CURRENT_DESKTOP / DESKTOP_SESSION / session file stems
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        // XDG_CURRENT_DESKTOP may be a colon list ("ubuntu:GNOME")
        for part in lower.split(':') {
            let desktop = match part.trim() {
                "gnome" | "gnome-xorg" | "gnome-wayland" | "gnome-classic" | "ubuntu"
                | "ubuntu-wayland" | "ubuntu-xorg" | "pop" => Desktop::Gnome,
                "kde" | "plasma" | "plasmawayland" | "plasmax11" | "kde-plasma" => Desktop::Kde,
                "xfce" | "xfce4" | "xfce session" => Desktop::Xfce,
                "cinnamon" | "x-cinnamon" | "cinnamon2d" | "cinnamon-wayland" => {
                    Desktop::Cinnamon
                }
                "mate" => Desktop::Mate,
                "budgie" | "budgie-desktop" => Desktop::Budgie,
                "lxqt" => Desktop::Lxqt,
                _ => continue,
            };
            return desktop;
        }
        match lower.trim() {
            "" | "unknown" => Desktop::None,
            other => Desktop::Other(other.to_string()),
        }
    }

    /// Desktops whose idle settings live in the system dconf database
    pub fn uses_dconf(&self) -> bool {
        matches!(
            self,
            Desktop::Gnome | Desktop::Cinnamon | Desktop::Mate | Desktop::Budgie
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            Desktop::Gnome => "gnome",
            Desktop::Kde => "kde",
            Desktop::Xfce => "xfce",
            Desktop::Cinnamon => "cinnamon",
            Desktop::Mate => "mate",
            Desktop::Budgie => "budgie",
            Desktop::Lxqt => "lxqt",
            Desktop::Other(name) => name.as_str(),
            Desktop::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayManager {
    Gdm,
    Sddm,
    Lightdm,
    Lxdm,
    Xdm,
    Ly,
    Other(String),
    None,
}

impl DisplayManager {
    /// Map a unit name or binary path (`gdm3.service`, `/usr/sbin/gdm3`)
    pub fn from_name(name: &str) -> Self {
        let base = name.rsplit('/').next().unwrap_or(name);
        let base = base.trim_end_matches(".service").trim();
        match base {
            "gdm" | "gdm3" => DisplayManager::Gdm,
            "sddm" => DisplayManager::Sddm,
            "lightdm" => DisplayManager::Lightdm,
            "lxdm" => DisplayManager::Lxdm,
            "xdm" => DisplayManager::Xdm,
            "ly" => DisplayManager::Ly,
            "" => DisplayManager::None,
            other => DisplayManager::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DisplayManager::Gdm => "gdm",
            DisplayManager::Sddm => "sddm",
            DisplayManager::Lightdm => "lightdm",
            DisplayManager::Lxdm => "lxdm",
            DisplayManager::Xdm => "xdm",
            DisplayManager::Ly => "ly",
            DisplayManager::Other(name) => name.as_str(),
            DisplayManager::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Other(String),
}

impl GpuVendor {
    /// From a sysfs `vendor` attribute such as `0x10de`
    pub fn from_pci_id(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "0x10de" => GpuVendor::Nvidia,
            "0x1002" | "0x1022" => GpuVendor::Amd,
            "0x8086" => GpuVendor::Intel,
            other => GpuVendor::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GpuVendor::Nvidia => "nvidia",
            GpuVendor::Amd => "amd",
            GpuVendor::Intel => "intel",
            GpuVendor::Other(id) => id.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitSystem {
    Systemd,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistroFamily {
    Arch,
    Debian,
    Fedora,
    Suse,
    Unknown,
}

impl DistroFamily {
    /// Map os-release ID / ID_LIKE tokens
    pub fn from_ids(ids: &[&str]) -> Self {
        for id in ids {
            let family = match *id {
                "arch" | "manjaro" | "endeavouros" | "garuda" | "cachyos" => DistroFamily::Arch,
                "debian" | "ubuntu" | "linuxmint" | "pop" | "elementary" => DistroFamily::Debian,
                "fedora" | "rhel" | "centos" | "nobara" => DistroFamily::Fedora,
                "suse" | "opensuse" | "opensuse-tumbleweed" | "opensuse-leap" => {
                    DistroFamily::Suse
                }
                _ => continue,
            };
            return family;
        }
        DistroFamily::Unknown
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistroFamily::Arch => "arch",
            DistroFamily::Debian => "debian",
            DistroFamily::Fedora => "fedora",
            DistroFamily::Suse => "suse",
            DistroFamily::Unknown => "unknown",
        }
    }
}

// =============================================================================
// Host Context
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostContext {
    pub desktop: Desktop,
    pub display_manager: DisplayManager,
    /// Unit the display manager runs as (`gdm3.service` on Debian)
    pub display_manager_unit: Option<String>,
    pub gpu_vendors: BTreeSet<GpuVendor>,
    pub init_system: InitSystem,
    pub distro_family: DistroFamily,
}

impl HostContext {
    /// Nothing detected: no desktop, no display manager, no GPU
    pub fn empty() -> Self {
        Self {
            desktop: Desktop::None,
            display_manager: DisplayManager::None,
            display_manager_unit: None,
            gpu_vendors: BTreeSet::new(),
            init_system: InitSystem::Unknown,
            distro_family: DistroFamily::Unknown,
        }
    }

    pub fn detect(target: &Target) -> Self {
        let (display_manager, display_manager_unit) = detect_display_manager(target);
        let host = Self {
            desktop: detect_desktop(target),
            display_manager,
            display_manager_unit,
            gpu_vendors: detect_gpu_vendors(target),
            init_system: detect_init_system(target),
            distro_family: detect_distro_family(target),
        };
        debug!("host context: {}", host);
        host
    }

    pub fn has_gpu(&self, vendor: &GpuVendor) -> bool {
        self.gpu_vendors.contains(vendor)
    }

    pub fn has_systemd(&self) -> bool {
        self.init_system == InitSystem::Systemd
    }

    /// A desktop or a display manager was found
    pub fn is_graphical(&self) -> bool {
        self.desktop != Desktop::None || self.display_manager != DisplayManager::None
    }
}

impl fmt::Display for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gpus: Vec<&str> = self.gpu_vendors.iter().map(|g| g.as_str()).collect();
        write!(
            f,
            "desktop={} display_manager={} gpu={} init={} distro={}",
            self.desktop.as_str(),
            self.display_manager.as_str(),
            if gpus.is_empty() {
                "none".to_string()
            } else {
                gpus.join(",")
            },
            match self.init_system {
                InitSystem::Systemd => "systemd",
                InitSystem::Unknown => "unknown",
            },
            self.distro_family.as_str()
        )
    }
}

// =============================================================================
// Detection
// =============================================================================

/// Processes that identify a running desktop session
const DESKTOP_PROCESSES: &[(&str, &str)] = &[
    ("gnome-shell", "gnome"),
    ("plasmashell", "kde"),
    ("kwin_wayland", "kde"),
    ("kwin_x11", "kde"),
    ("xfce4-session", "xfce"),
    ("cinnamon", "cinnamon"),
    ("cinnamon-session", "cinnamon"),
    ("mate-session", "mate"),
    ("budgie-panel", "budgie"),
    ("lxqt-session", "lxqt"),
];

/// Installed session files, in preference order
const SESSION_FILES: &[&str] = &[
    "gnome",
    "ubuntu",
    "plasma",
    "plasmawayland",
    "plasmax11",
    "cinnamon",
    "mate",
    "xfce",
    "budgie-desktop",
    "lxqt",
];

fn detect_desktop(target: &Target) -> Desktop {
    // Environment only describes the machine we are running on
    if target.is_live_root() {
        for var in ["XDG_CURRENT_DESKTOP", "DESKTOP_SESSION"] {
            if let Ok(value) = std::env::var(var) {
                let desktop = Desktop::from_name(&value);
                if desktop != Desktop::None {
                    return desktop;
                }
            }
        }
    }

    if let Some(desktop) = desktop_from_processes(&target.path("/proc")) {
        return desktop;
    }

    for dir in ["/usr/share/xsessions", "/usr/share/wayland-sessions"] {
        let dir = target.path(dir);
        for stem in SESSION_FILES {
            if dir.join(format!("{}.desktop", stem)).exists() {
                return Desktop::from_name(stem);
            }
        }
    }

    Desktop::None
}

fn desktop_from_processes(proc_dir: &Path) -> Option<Desktop> {
    let entries = fs::read_dir(proc_dir).ok()?;
    let mut running = BTreeSet::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        if !name.to_string_lossy().chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if let Ok(comm) = fs::read_to_string(entry.path().join("comm")) {
            running.insert(comm.trim().to_string());
        }
    }

    DESKTOP_PROCESSES
        .iter()
        .find(|(process, _)| running.contains(*process))
        .map(|(_, desktop)| Desktop::from_name(desktop))
}

fn detect_display_manager(target: &Target) -> (DisplayManager, Option<String>) {
    // systemd: display-manager.service is an alias symlink to the real unit
    let alias = target.path("/etc/systemd/system/display-manager.service");
    if let Ok(link) = fs::read_link(&alias) {
        if let Some(unit) = link.file_name().map(|n| n.to_string_lossy().to_string()) {
            let dm = DisplayManager::from_name(&unit);
            if dm != DisplayManager::None {
                return (dm, Some(unit));
            }
        }
    }

    // Debian keeps the chosen binary here
    if let Ok(contents) = fs::read_to_string(target.path("/etc/X11/default-display-manager")) {
        let binary = contents.trim();
        let dm = DisplayManager::from_name(binary);
        if dm != DisplayManager::None {
            let unit = binary.rsplit('/').next().map(|b| format!("{}.service", b));
            return (dm, unit);
        }
    }

    (DisplayManager::None, None)
}

fn detect_gpu_vendors(target: &Target) -> BTreeSet<GpuVendor> {
    let mut vendors = BTreeSet::new();
    let Ok(entries) = fs::read_dir(target.path("/sys/bus/pci/devices")) else {
        return vendors;
    };
    for entry in entries.flatten() {
        let dir = entry.path();
        let class = fs::read_to_string(dir.join("class")).unwrap_or_default();
        // PCI base class 0x03: display controller
        if !class.trim().starts_with("0x03") {
            continue;
        }
        if let Ok(vendor) = fs::read_to_string(dir.join("vendor")) {
            vendors.insert(GpuVendor::from_pci_id(&vendor));
        }
    }
    vendors
}

fn detect_init_system(target: &Target) -> InitSystem {
    if target.path("/run/systemd/system").is_dir()
        || target.path("/usr/lib/systemd/systemd").exists()
        || target.path("/lib/systemd/systemd").exists()
    {
        InitSystem::Systemd
    } else {
        InitSystem::Unknown
    }
}

fn detect_distro_family(target: &Target) -> DistroFamily {
    let contents = fs::read_to_string(target.path("/etc/os-release"))
        .or_else(|_| fs::read_to_string(target.path("/usr/lib/os-release")))
        .unwrap_or_default();
    distro_family_from_os_release(&contents)
}

fn distro_family_from_os_release(contents: &str) -> DistroFamily {
    let mut ids = Vec::new();
    for key in ["ID", "ID_LIKE"] {
        for line in contents.lines() {
            if let Some(value) = line.strip_prefix(&format!("{}=", key)) {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                ids.extend(value.split_whitespace().map(str::to_string));
            }
        }
    }
    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    DistroFamily::from_ids(&refs)
}
