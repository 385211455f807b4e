//! In-memory stand-ins for the OS collaborators, used by unit tests.

use crate::command::{CommandOutput, CommandRunner};
use crate::error::{CommandError, D3Error};
use crate::host::HostContext;
use crate::notifier::{Notifier, Urgency};
use crate::recovery::Consent;
use crate::setting::Setting;
use crate::state::{ApplyOutcome, EffectiveAfter, ProbeState, SettingClass, Severity};
use crate::systemd::{ServiceManager, UnitFileState};
use crate::target::Target;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

// =============================================================================
// Commands
// =============================================================================

/// Records every call; answers from a script, success with empty output
/// otherwise
#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<HashMap<String, Result<CommandOutput, CommandError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, cmdline: &str, code: i32, stdout: &str, stderr: &str) {
        self.responses.lock().unwrap().insert(
            cmdline.to_string(),
            Ok(CommandOutput {
                code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        );
    }

    pub fn fail_with(&self, cmdline: &str, err: CommandError) {
        self.responses
            .lock()
            .unwrap()
            .insert(cmdline.to_string(), Err(err));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let mut cmdline = program.to_string();
        for arg in args {
            cmdline.push(' ');
            cmdline.push_str(arg);
        }
        self.calls.lock().unwrap().push(cmdline.clone());
        match self.responses.lock().unwrap().get(&cmdline) {
            Some(response) => response.clone(),
            None => Ok(CommandOutput::default()),
        }
    }
}

// =============================================================================
// Services
// =============================================================================

/// Unit states held in memory
#[derive(Default)]
pub struct FakeServices {
    states: Mutex<HashMap<String, UnitFileState>>,
    active: Mutex<HashSet<String>>,
    broken: Mutex<HashSet<String>>,
    unreachable: Mutex<bool>,
    restarted: Mutex<Vec<String>>,
    stopped: Mutex<Vec<String>>,
    reloads: Mutex<usize>,
}

impl FakeServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_state(&self, unit: &str, state: UnitFileState) {
        self.states.lock().unwrap().insert(unit.to_string(), state);
    }

    pub fn state(&self, unit: &str) -> UnitFileState {
        self.states
            .lock()
            .unwrap()
            .get(unit)
            .cloned()
            .unwrap_or(UnitFileState::NotFound)
    }

    pub fn set_active(&self, unit: &str) {
        self.active.lock().unwrap().insert(unit.to_string());
    }

    /// Every mutating call on `unit` fails
    pub fn break_unit(&self, unit: &str) {
        self.broken.lock().unwrap().insert(unit.to_string());
    }

    /// Every call fails as if systemctl were missing
    pub fn make_unreachable(&self) {
        *self.unreachable.lock().unwrap() = true;
    }

    pub fn restarted(&self) -> Vec<String> {
        self.restarted.lock().unwrap().clone()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.stopped.lock().unwrap().clone()
    }

    pub fn is_running(&self, unit: &str) -> bool {
        self.active.lock().unwrap().contains(unit)
    }

    pub fn reloads(&self) -> usize {
        *self.reloads.lock().unwrap()
    }

    fn check(&self, unit: &str) -> Result<(), CommandError> {
        if *self.unreachable.lock().unwrap() {
            return Err(CommandError::NotFound("systemctl".to_string()));
        }
        if self.broken.lock().unwrap().contains(unit) {
            return Err(CommandError::Failed {
                program: "systemctl".to_string(),
                code: 1,
                stderr: format!("Failed to change {}", unit),
            });
        }
        Ok(())
    }
}

impl ServiceManager for FakeServices {
    fn unit_file_state(&self, unit: &str) -> Result<UnitFileState, CommandError> {
        if *self.unreachable.lock().unwrap() {
            return Err(CommandError::NotFound("systemctl".to_string()));
        }
        Ok(self.state(unit))
    }

    fn is_active(&self, unit: &str) -> Result<bool, CommandError> {
        if *self.unreachable.lock().unwrap() {
            return Err(CommandError::NotFound("systemctl".to_string()));
        }
        Ok(self.active.lock().unwrap().contains(unit))
    }

    fn mask(&self, unit: &str) -> Result<(), CommandError> {
        self.check(unit)?;
        self.set_state(unit, UnitFileState::Masked);
        Ok(())
    }

    fn unmask(&self, unit: &str) -> Result<(), CommandError> {
        self.check(unit)?;
        self.set_state(unit, UnitFileState::Static);
        Ok(())
    }

    fn enable(&self, unit: &str) -> Result<(), CommandError> {
        self.check(unit)?;
        self.set_state(unit, UnitFileState::Enabled);
        Ok(())
    }

    fn disable(&self, unit: &str) -> Result<(), CommandError> {
        self.check(unit)?;
        self.set_state(unit, UnitFileState::Disabled);
        Ok(())
    }

    fn stop(&self, unit: &str) -> Result<(), CommandError> {
        self.check(unit)?;
        self.active.lock().unwrap().remove(unit);
        self.stopped.lock().unwrap().push(unit.to_string());
        Ok(())
    }

    fn restart(&self, unit: &str) -> Result<(), CommandError> {
        self.check(unit)?;
        self.restarted.lock().unwrap().push(unit.to_string());
        Ok(())
    }

    fn daemon_reload(&self) -> Result<(), CommandError> {
        *self.reloads.lock().unwrap() += 1;
        Ok(())
    }
}

/// Shares one `FakeServices` between the test and the `Target`
pub struct SharedServices(pub Arc<FakeServices>);

impl ServiceManager for SharedServices {
    fn unit_file_state(&self, unit: &str) -> Result<UnitFileState, CommandError> {
        self.0.unit_file_state(unit)
    }
    fn is_active(&self, unit: &str) -> Result<bool, CommandError> {
        self.0.is_active(unit)
    }
    fn mask(&self, unit: &str) -> Result<(), CommandError> {
        self.0.mask(unit)
    }
    fn unmask(&self, unit: &str) -> Result<(), CommandError> {
        self.0.unmask(unit)
    }
    fn enable(&self, unit: &str) -> Result<(), CommandError> {
        self.0.enable(unit)
    }
    fn disable(&self, unit: &str) -> Result<(), CommandError> {
        self.0.disable(unit)
    }
    fn stop(&self, unit: &str) -> Result<(), CommandError> {
        self.0.stop(unit)
    }
    fn restart(&self, unit: &str) -> Result<(), CommandError> {
        self.0.restart(unit)
    }
    fn daemon_reload(&self) -> Result<(), CommandError> {
        self.0.daemon_reload()
    }
}

/// A target rooted at `root` with fake services and a scripted runner
pub fn fake_target(root: &Path) -> (Target, Arc<FakeServices>, Arc<ScriptedRunner>) {
    let services = Arc::new(FakeServices::new());
    let runner = Arc::new(ScriptedRunner::new());
    let target = Target::new(
        root.to_path_buf(),
        "/var/lib/d3guard",
        Box::new(SharedServices(services.clone())),
        runner.clone(),
    );
    (target, services, runner)
}

// =============================================================================
// Notification and consent
// =============================================================================

#[derive(Default)]
pub struct FakeNotifier {
    pub sent: Mutex<Vec<String>>,
    pub fail: bool,
}

impl Notifier for FakeNotifier {
    fn notify(&self, title: &str, body: &str, _urgency: Urgency) -> Result<usize, D3Error> {
        if self.fail {
            return Err(D3Error::Command(CommandError::NotFound(
                "loginctl".to_string(),
            )));
        }
        self.sent.lock().unwrap().push(format!("{}: {}", title, body));
        Ok(1)
    }
}

pub struct FakeConsent {
    pub interactive: bool,
    pub answer: bool,
    pub asked: Mutex<Vec<String>>,
}

impl FakeConsent {
    pub fn new(interactive: bool, answer: bool) -> Self {
        Self {
            interactive,
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }
}

impl Consent for FakeConsent {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn confirm(&self, service: &str) -> bool {
        self.asked.lock().unwrap().push(service.to_string());
        self.answer
    }
}

// =============================================================================
// Settings
// =============================================================================

/// A setting whose resource is a single in-memory value
pub struct FakeSetting {
    pub id: String,
    pub severity: Severity,
    pub value: Mutex<Option<String>>,
    pub desired: String,
    pub fail_apply: bool,
    pub applicable: bool,
    pub applies: Mutex<usize>,
}

impl FakeSetting {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            severity: Severity::Warning,
            value: Mutex::new(None),
            desired: "on".to_string(),
            fail_apply: false,
            applicable: true,
            applies: Mutex::new(0),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_apply = true;
        self
    }

    pub fn not_applicable(mut self) -> Self {
        self.applicable = false;
        self
    }

    pub fn critical(mut self) -> Self {
        self.severity = Severity::Critical;
        self
    }

    pub fn with_value(self, value: &str) -> Self {
        *self.value.lock().unwrap() = Some(value.to_string());
        self
    }

    pub fn applies(&self) -> usize {
        *self.applies.lock().unwrap()
    }
}

impl Setting for FakeSetting {
    fn id(&self) -> &str {
        &self.id
    }
    fn description(&self) -> &str {
        "in-memory test setting"
    }
    fn class(&self) -> SettingClass {
        SettingClass::DesktopIdle
    }
    fn severity(&self) -> Severity {
        self.severity
    }
    fn effective_after(&self) -> EffectiveAfter {
        EffectiveAfter::Live
    }
    fn applies_to(&self, _host: &HostContext) -> bool {
        self.applicable
    }
    fn resource_keys(&self) -> Vec<String> {
        vec![format!("memory:{}", self.id)]
    }
    fn check_available(&self, _target: &Target) -> Result<(), D3Error> {
        Ok(())
    }
    fn probe(&self, _target: &Target) -> ProbeState {
        match self.value.lock().unwrap().as_deref() {
            None => ProbeState::Absent,
            Some(v) if v == self.desired => ProbeState::Satisfied,
            Some(v) => ProbeState::Drifted(v.to_string()),
        }
    }
    fn apply(&self, _target: &Target) -> ApplyOutcome {
        *self.applies.lock().unwrap() += 1;
        if self.fail_apply {
            return ApplyOutcome::Failed("forced failure".to_string());
        }
        *self.value.lock().unwrap() = Some(self.desired.clone());
        ApplyOutcome::Applied
    }
    fn revert(&self, _target: &Target) -> ApplyOutcome {
        *self.value.lock().unwrap() = None;
        ApplyOutcome::Applied
    }
}
