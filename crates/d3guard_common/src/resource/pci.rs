//! Runtime power attributes of NVIDIA display functions in sysfs.
//!
//! For every PCI function with vendor 0x10de and base class 0x03:
//! - `d3cold_allowed` = 0 (device may not enter D3cold)
//! - `power/control` = on (runtime PM disabled)
//!
//! Attributes the kernel does not expose for a function are skipped.

use super::{unreadable, Resource};
use crate::error::D3Error;
use crate::state::ProbeState;
use crate::target::Target;
use std::fs;
use std::io;
use std::path::PathBuf;

const PCI_DEVICES: &str = "/sys/bus/pci/devices";
const NVIDIA_VENDOR: &str = "0x10de";

/// (attribute relative to the function, desired, kernel default)
type Attr = (&'static str, &'static str, &'static str);

const ATTRS: &[Attr] = &[
    ("d3cold_allowed", "0", "1"),
    ("power/control", "on", "auto"),
];

/// sysfs directories of NVIDIA display-class functions under the root
pub fn nvidia_display_functions(target: &Target) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(target.path(PCI_DEVICES)) else {
        return Vec::new();
    };
    let mut functions: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|dir| {
            let vendor = fs::read_to_string(dir.join("vendor")).unwrap_or_default();
            let class = fs::read_to_string(dir.join("class")).unwrap_or_default();
            vendor.trim().eq_ignore_ascii_case(NVIDIA_VENDOR) && class.trim().starts_with("0x03")
        })
        .collect();
    functions.sort();
    functions
}

#[derive(Debug, Clone, Default)]
pub struct PciPowerAttrs;

impl PciPowerAttrs {
    pub fn new() -> Self {
        Self
    }

    fn write_all(&self, target: &Target, pick: fn(&Attr) -> &'static str) -> Result<(), D3Error> {
        for function in nvidia_display_functions(target) {
            for attr in ATTRS {
                let path = function.join(attr.0);
                if !path.exists() {
                    continue;
                }
                fs::write(&path, pick(attr)).map_err(|e| {
                    D3Error::ApplyFailed(format!("write {}: {}", path.display(), e))
                })?;
            }
        }
        Ok(())
    }
}

fn function_name(dir: &std::path::Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl Resource for PciPowerAttrs {
    fn key(&self) -> String {
        format!("sysfs:{}/*/nvidia-power", PCI_DEVICES)
    }

    fn available(&self, target: &Target) -> Result<(), D3Error> {
        if nvidia_display_functions(target).is_empty() {
            return Err(D3Error::ResourceUnavailable(
                "no NVIDIA display function in sysfs".to_string(),
            ));
        }
        Ok(())
    }

    fn probe(&self, target: &Target) -> ProbeState {
        let functions = nvidia_display_functions(target);
        if functions.is_empty() {
            return ProbeState::Absent;
        }

        let mut differing = Vec::new();
        for function in &functions {
            for (attr, desired, _) in ATTRS {
                let path = function.join(attr);
                match fs::read_to_string(&path) {
                    Ok(value) if value.trim() == *desired => {}
                    Ok(value) => differing.push(format!(
                        "{} {}={}",
                        function_name(function),
                        attr,
                        value.trim()
                    )),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return unreadable(&path.display().to_string(), e),
                }
            }
        }

        if differing.is_empty() {
            ProbeState::Satisfied
        } else {
            ProbeState::Drifted(differing.join(", "))
        }
    }

    fn apply(&self, target: &Target) -> Result<(), D3Error> {
        self.write_all(target, |attr| attr.1)
    }

    fn revert(&self, target: &Target) -> Result<(), D3Error> {
        self.write_all(target, |attr| attr.2)
    }
}
