//! Recovery Controller
//!
//! Gets a user out of a hung graphical session by restarting the display
//! manager. Restarting it kills every graphical application, so the
//! controller never restarts without an explicit yes from a human.
//!
//! States:
//! ```text
//! Detecting -> Confirmed(unit) -> AwaitingConsent(unit) -> Restarting(unit) -> Succeeded(unit)
//!     |               |                   |                       |
//!     +-> Failed(no candidate)            +-> Failed(declined)    +-> Failed(restart error)
//!                     +-> Failed(consent required, non-interactive)
//! ```

use crate::host::HostContext;
use crate::systemd::normalize_unit_name;
use crate::target::Target;
use std::fmt;
use tracing::{debug, info, warn};

/// Known display-manager units, probed in order after the host's own
pub const DISPLAY_MANAGER_UNITS: &[&str] = &[
    "gdm.service",
    "gdm3.service",
    "sddm.service",
    "lightdm.service",
    "lxdm.service",
    "xdm.service",
    "ly.service",
    "display-manager.service",
];

/// Source of the human confirmation
pub trait Consent {
    /// False when nobody can answer (no terminal on stdin)
    fn is_interactive(&self) -> bool;

    /// Ask whether `service` may be restarted
    fn confirm(&self, service: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryFailure {
    NoCandidateFound,
    ConsentRequired(String),
    Declined(String),
    RestartError { service: String, message: String },
}

impl fmt::Display for RecoveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryFailure::NoCandidateFound => {
                write!(f, "no active display manager found; nothing was restarted")
            }
            RecoveryFailure::ConsentRequired(service) => write!(
                f,
                "restarting {} needs confirmation; run from a terminal",
                service
            ),
            RecoveryFailure::Declined(service) => {
                write!(f, "restart of {} declined; nothing was restarted", service)
            }
            RecoveryFailure::RestartError { service, message } => write!(
                f,
                "restarting {} failed: {}. Reboot the machine to recover the display",
                service, message
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryState {
    Detecting,
    Confirmed(String),
    AwaitingConsent(String),
    Restarting(String),
    Succeeded(String),
    Failed(RecoveryFailure),
}

impl RecoveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecoveryState::Succeeded(_) | RecoveryState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            RecoveryState::Detecting => "detecting",
            RecoveryState::Confirmed(_) => "confirmed",
            RecoveryState::AwaitingConsent(_) => "awaiting-consent",
            RecoveryState::Restarting(_) => "restarting",
            RecoveryState::Succeeded(_) => "succeeded",
            RecoveryState::Failed(_) => "failed",
        }
    }
}

/// Every state the controller passed through, last one terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryRun {
    pub states: Vec<RecoveryState>,
}

impl RecoveryRun {
    pub fn outcome(&self) -> &RecoveryState {
        // A run always holds at least `Detecting`
        &self.states[self.states.len() - 1]
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome(), RecoveryState::Succeeded(_))
    }
}

pub struct RecoveryController<'a> {
    target: &'a Target,
    host: &'a HostContext,
    consent: &'a dyn Consent,
}

impl<'a> RecoveryController<'a> {
    pub fn new(target: &'a Target, host: &'a HostContext, consent: &'a dyn Consent) -> Self {
        Self {
            target,
            host,
            consent,
        }
    }

    /// Units to probe: the detected display manager first, then the known list
    pub fn candidates(&self) -> Vec<String> {
        let mut units: Vec<String> = Vec::new();
        if let Some(unit) = &self.host.display_manager_unit {
            units.push(normalize_unit_name(unit));
        }
        for unit in DISPLAY_MANAGER_UNITS {
            if !units.iter().any(|u| u == unit) {
                units.push(unit.to_string());
            }
        }
        units
    }

    pub fn run(&self) -> RecoveryRun {
        let mut state = RecoveryState::Detecting;
        let mut states = vec![state.clone()];
        while !state.is_terminal() {
            state = self.step(state);
            info!("recovery: {}", state.name());
            states.push(state.clone());
        }
        if let RecoveryState::Failed(reason) = &state {
            warn!("recovery failed: {}", reason);
        }
        RecoveryRun { states }
    }

    fn step(&self, state: RecoveryState) -> RecoveryState {
        match state {
            RecoveryState::Detecting => match self.detect() {
                Some(unit) => RecoveryState::Confirmed(unit),
                None => RecoveryState::Failed(RecoveryFailure::NoCandidateFound),
            },
            RecoveryState::Confirmed(unit) => {
                if self.consent.is_interactive() {
                    RecoveryState::AwaitingConsent(unit)
                } else {
                    RecoveryState::Failed(RecoveryFailure::ConsentRequired(unit))
                }
            }
            RecoveryState::AwaitingConsent(unit) => {
                if self.consent.confirm(&unit) {
                    RecoveryState::Restarting(unit)
                } else {
                    RecoveryState::Failed(RecoveryFailure::Declined(unit))
                }
            }
            RecoveryState::Restarting(unit) => match self.target.services().restart(&unit) {
                Ok(()) => RecoveryState::Succeeded(unit),
                Err(e) => RecoveryState::Failed(RecoveryFailure::RestartError {
                    service: unit,
                    message: e.to_string(),
                }),
            },
            terminal => terminal,
        }
    }

    fn detect(&self) -> Option<String> {
        for unit in self.candidates() {
            match self.target.services().is_active(&unit) {
                Ok(true) => return Some(unit),
                Ok(false) => debug!("{} not active", unit),
                Err(e) => debug!("{}: {}", unit, e),
            }
        }
        None
    }
}
