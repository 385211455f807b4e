//! Probe and apply vocabulary shared by every Setting.

use serde::{Deserialize, Serialize};

// =============================================================================
// Probe State
// =============================================================================

/// What a probe observed about one Setting's resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum ProbeState {
    /// Resource matches the desired value exactly
    Satisfied,
    /// Resource exists but differs; carries what was observed
    Drifted(String),
    /// Resource, file or unit does not exist
    Absent,
    /// The probe itself could not run (tool missing, permission, timeout)
    Unknown(String),
}

impl ProbeState {
    pub fn unknown(reason: impl std::fmt::Display) -> Self {
        ProbeState::Unknown(reason.to_string())
    }

    pub fn is_satisfied(&self) -> bool {
        matches!(self, ProbeState::Satisfied)
    }

    /// Drifted and Absent are the states a repair run acts on
    pub fn needs_apply(&self) -> bool {
        matches!(self, ProbeState::Drifted(_) | ProbeState::Absent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeState::Satisfied => "satisfied",
            ProbeState::Drifted(_) => "drifted",
            ProbeState::Absent => "absent",
            ProbeState::Unknown(_) => "unknown",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            ProbeState::Drifted(d) | ProbeState::Unknown(d) => Some(d.as_str()),
            ProbeState::Satisfied | ProbeState::Absent => None,
        }
    }
}

impl std::fmt::Display for ProbeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{} ({})", self.as_str(), detail),
            None => write!(f, "{}", self.as_str()),
        }
    }
}

// =============================================================================
// Apply Outcome
// =============================================================================

/// Result of one `apply()` or `revert()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied,
    Failed(String),
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }
}

// =============================================================================
// Classification
// =============================================================================

/// How bad it is when a Setting is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// When an applied change starts to matter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EffectiveAfter {
    Live,
    ServiceRestart,
    Reboot,
}

impl EffectiveAfter {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveAfter::Live => "live",
            EffectiveAfter::ServiceRestart => "service-restart",
            EffectiveAfter::Reboot => "reboot",
        }
    }
}

impl std::fmt::Display for EffectiveAfter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Family a Setting belongs to; uninstall treats `SleepDeny` specially
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettingClass {
    SleepDeny,
    GpuPower,
    KernelParam,
    DesktopIdle,
    Dpms,
    Monitor,
}

impl SettingClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingClass::SleepDeny => "sleep-deny",
            SettingClass::GpuPower => "gpu-power",
            SettingClass::KernelParam => "kernel-param",
            SettingClass::DesktopIdle => "desktop-idle",
            SettingClass::Dpms => "dpms",
            SettingClass::Monitor => "monitor",
        }
    }
}

impl std::fmt::Display for SettingClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
