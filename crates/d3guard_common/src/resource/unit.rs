//! Desired systemd unit file state (masked or enabled).

use super::{backup, Resource};
use crate::error::D3Error;
use crate::state::ProbeState;
use crate::systemd::UnitFileState;
use crate::target::Target;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredUnitState {
    Masked,
    Enabled,
}

#[derive(Debug, Clone)]
pub struct UnitState {
    unit: String,
    desired: DesiredUnitState,
    /// Unavailable when the unit is not installed
    require_installed: bool,
}

impl UnitState {
    pub fn masked(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            desired: DesiredUnitState::Masked,
            require_installed: false,
        }
    }

    pub fn enabled(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            desired: DesiredUnitState::Enabled,
            require_installed: false,
        }
    }

    pub fn require_installed(mut self) -> Self {
        self.require_installed = true;
        self
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    fn wanted(&self) -> UnitFileState {
        match self.desired {
            DesiredUnitState::Masked => UnitFileState::Masked,
            DesiredUnitState::Enabled => UnitFileState::Enabled,
        }
    }
}

impl Resource for UnitState {
    fn key(&self) -> String {
        format!("unit:{}", self.unit)
    }

    fn available(&self, target: &Target) -> Result<(), D3Error> {
        if !self.require_installed {
            return Ok(());
        }
        match target.services().unit_file_state(&self.unit) {
            Ok(UnitFileState::NotFound) => Err(D3Error::ResourceUnavailable(format!(
                "{} is not installed",
                self.unit
            ))),
            // Probe reports the reason as Unknown
            _ => Ok(()),
        }
    }

    fn probe(&self, target: &Target) -> ProbeState {
        match target.services().unit_file_state(&self.unit) {
            Ok(state) if state == self.wanted() => ProbeState::Satisfied,
            Ok(UnitFileState::NotFound) => ProbeState::Absent,
            Ok(state) => ProbeState::Drifted(state.to_string()),
            Err(e) => ProbeState::unknown(e),
        }
    }

    fn apply(&self, target: &Target) -> Result<(), D3Error> {
        let services = target.services();
        let current = services.unit_file_state(&self.unit)?;
        if current == self.wanted() {
            return Ok(());
        }

        backup::record_once(target, &self.key(), current.as_str())
            .map_err(|e| D3Error::ApplyFailed(format!("record {}: {}", self.key(), e)))?;

        match self.desired {
            DesiredUnitState::Masked => services.mask(&self.unit)?,
            DesiredUnitState::Enabled => {
                // Freshly written unit files are unknown until reloaded
                services.daemon_reload()?;
                services.enable(&self.unit)?;
            }
        }
        Ok(())
    }

    fn revert(&self, target: &Target) -> Result<(), D3Error> {
        let services = target.services();
        let prior = backup::take(target, &self.key())
            .map_err(|e| D3Error::ApplyFailed(format!("read {}: {}", self.key(), e)))?
            .map(|raw| UnitFileState::parse(&String::from_utf8_lossy(&raw)));

        // Only a recorded prior state means d3guard changed the unit
        let Some(prior) = prior else {
            return Ok(());
        };
        if prior == self.wanted() {
            return Ok(());
        }

        let current = services.unit_file_state(&self.unit)?;
        if current != self.wanted() {
            return Ok(());
        }
        debug!("reverting {} (was {:?})", self.unit, prior);
        match self.desired {
            DesiredUnitState::Masked => services.unmask(&self.unit)?,
            DesiredUnitState::Enabled => {
                // Disabling alone leaves a started timer firing until reboot
                services.stop(&self.unit)?;
                services.disable(&self.unit)?;
            }
        }
        Ok(())
    }
}
