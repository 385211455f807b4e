//! Setting contract
//!
//! A Setting is the unit of reconciliation: identity, applicability, a
//! probe and an apply. Most Settings are a `ResourceSetting`: a list of
//! resource primitives plus the commands that make a change visible
//! (`dconf update`, `udevadm control --reload-rules`, `update-grub`).
//!
//! Apply is retry-safe, not transactional. Sub-writes run in order and stop
//! at the first failure; earlier sub-writes stay, and the next apply
//! finishes the rest.

use crate::error::{CommandError, D3Error};
use crate::host::{Desktop, DisplayManager, DistroFamily, GpuVendor, HostContext};
use crate::resource::{combine, Resource};
use crate::state::{ApplyOutcome, EffectiveAfter, ProbeState, SettingClass, Severity};
use crate::target::Target;
use tracing::{debug, info};

pub trait Setting: Send + Sync {
    fn id(&self) -> &str;
    fn description(&self) -> &str;
    fn class(&self) -> SettingClass;
    fn severity(&self) -> Severity;
    fn effective_after(&self) -> EffectiveAfter;

    /// Does this Setting matter on `host`?
    fn applies_to(&self, host: &HostContext) -> bool;

    /// Keys of every resource this Setting writes
    fn resource_keys(&self) -> Vec<String>;

    /// `Err(ResourceUnavailable)` when the backing subsystem is absent
    fn check_available(&self, target: &Target) -> Result<(), D3Error>;

    fn probe(&self, target: &Target) -> ProbeState;
    fn apply(&self, target: &Target) -> ApplyOutcome;
    fn revert(&self, target: &Target) -> ApplyOutcome;
}

// =============================================================================
// Applicability
// =============================================================================

/// One applicability predicate; a Setting applies when all of its hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Systemd,
    Gpu(GpuVendor),
    Desktop(Desktop),
    AnyDesktop(Vec<Desktop>),
    DisplayManager(DisplayManager),
    /// A desktop or display manager was detected
    Graphical,
    Distro(DistroFamily),
}

impl Condition {
    pub fn holds(&self, host: &HostContext) -> bool {
        match self {
            Condition::Systemd => host.has_systemd(),
            Condition::Gpu(vendor) => host.has_gpu(vendor),
            Condition::Desktop(desktop) => host.desktop == *desktop,
            Condition::AnyDesktop(desktops) => desktops.contains(&host.desktop),
            Condition::DisplayManager(dm) => host.display_manager == *dm,
            Condition::Graphical => host.is_graphical(),
            Condition::Distro(family) => host.distro_family == *family,
        }
    }
}

// =============================================================================
// Post-apply actions
// =============================================================================

/// Command that makes written configuration visible to its consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    DaemonReload,
    DconfUpdate,
    UdevReload,
    /// Regenerate grub.cfg from `/etc/default/grub`
    GrubMkconfig,
}

/// Tried in order; a missing program moves on to the next
const GRUB_GENERATORS: &[(&str, &[&str], Option<&str>)] = &[
    ("update-grub", &[], None),
    ("grub2-mkconfig", &["-o", "/boot/grub2/grub.cfg"], Some("/boot/grub2")),
    ("grub-mkconfig", &["-o", "/boot/grub/grub.cfg"], None),
];

fn regenerate_grub(target: &Target) -> Result<(), D3Error> {
    for (program, args, needs_dir) in GRUB_GENERATORS {
        if needs_dir.is_some_and(|dir| !target.path(dir).is_dir()) {
            continue;
        }
        match target.commands().run_checked(program, args) {
            Ok(_) => {
                info!("regenerated grub.cfg with {}", program);
                return Ok(());
            }
            Err(CommandError::NotFound(_)) => debug!("{} not installed", program),
            Err(e) => return Err(e.into()),
        }
    }
    Err(D3Error::ApplyFailed(
        "no update-grub or grub-mkconfig found".to_string(),
    ))
}

impl PostAction {
    pub fn describe(&self) -> &'static str {
        match self {
            PostAction::DaemonReload => "systemctl daemon-reload",
            PostAction::DconfUpdate => "dconf update",
            PostAction::UdevReload => "udevadm control --reload-rules",
            PostAction::GrubMkconfig => "grub-mkconfig",
        }
    }

    pub fn run(&self, target: &Target) -> Result<(), D3Error> {
        match self {
            PostAction::DaemonReload => target.services().daemon_reload()?,
            // These act on the running system only; an offline image picks
            // the files up on boot or at its next bootloader update
            PostAction::DconfUpdate | PostAction::UdevReload | PostAction::GrubMkconfig
                if !target.is_live_root() =>
            {
                debug!("skipping '{}' for offline root", self.describe());
            }
            PostAction::DconfUpdate => {
                target.commands().run_checked("dconf", &["update"])?;
            }
            PostAction::UdevReload => {
                target
                    .commands()
                    .run_checked("udevadm", &["control", "--reload-rules"])?;
            }
            PostAction::GrubMkconfig => regenerate_grub(target)?,
        }
        Ok(())
    }
}

// =============================================================================
// ResourceSetting
// =============================================================================

struct Part {
    resource: Box<dyn Resource>,
    /// Skipped silently when unavailable instead of making the Setting
    /// unavailable
    optional: bool,
}

/// A Setting made of resource primitives
pub struct ResourceSetting {
    id: String,
    description: String,
    class: SettingClass,
    severity: Severity,
    effective_after: EffectiveAfter,
    conditions: Vec<Condition>,
    parts: Vec<Part>,
    post: Vec<PostAction>,
}

impl ResourceSetting {
    pub fn new(id: impl Into<String>, description: impl Into<String>, class: SettingClass) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            class,
            severity: Severity::Warning,
            effective_after: EffectiveAfter::Live,
            conditions: Vec::new(),
            parts: Vec::new(),
            post: Vec::new(),
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn effective(mut self, effective_after: EffectiveAfter) -> Self {
        self.effective_after = effective_after;
        self
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn resource(mut self, resource: impl Resource + 'static) -> Self {
        self.parts.push(Part {
            resource: Box::new(resource),
            optional: false,
        });
        self
    }

    pub fn optional_resource(mut self, resource: impl Resource + 'static) -> Self {
        self.parts.push(Part {
            resource: Box::new(resource),
            optional: true,
        });
        self
    }

    pub fn then(mut self, action: PostAction) -> Self {
        self.post.push(action);
        self
    }

    /// Parts that take part in this run
    fn active_parts<'a>(&'a self, target: &'a Target) -> impl Iterator<Item = &'a Part> + 'a {
        self.parts
            .iter()
            .filter(move |part| !part.optional || part.resource.available(target).is_ok())
    }

    fn run_post(&self, target: &Target) -> Result<(), String> {
        for action in &self.post {
            action
                .run(target)
                .map_err(|e| format!("{}: {}", action.describe(), reason(&e)))?;
        }
        Ok(())
    }
}

/// Error text without the variant prefix for apply failures
fn reason(e: &D3Error) -> String {
    match e {
        D3Error::ApplyFailed(msg) => msg.clone(),
        other => other.to_string(),
    }
}

impl Setting for ResourceSetting {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn class(&self) -> SettingClass {
        self.class
    }

    fn severity(&self) -> Severity {
        self.severity
    }

    fn effective_after(&self) -> EffectiveAfter {
        self.effective_after
    }

    fn applies_to(&self, host: &HostContext) -> bool {
        self.conditions.iter().all(|c| c.holds(host))
    }

    fn resource_keys(&self) -> Vec<String> {
        self.parts.iter().map(|p| p.resource.key()).collect()
    }

    fn check_available(&self, target: &Target) -> Result<(), D3Error> {
        for part in self.parts.iter().filter(|p| !p.optional) {
            part.resource.available(target)?;
        }
        Ok(())
    }

    fn probe(&self, target: &Target) -> ProbeState {
        let states: Vec<(String, ProbeState)> = self
            .active_parts(target)
            .map(|part| (part.resource.key(), part.resource.probe(target)))
            .collect();
        combine(&states)
    }

    fn apply(&self, target: &Target) -> ApplyOutcome {
        for part in self.active_parts(target) {
            if let Err(e) = part.resource.apply(target) {
                return ApplyOutcome::Failed(format!("{}: {}", part.resource.key(), reason(&e)));
            }
        }
        if let Err(e) = self.run_post(target) {
            return ApplyOutcome::Failed(e);
        }
        info!("applied {}", self.id);
        ApplyOutcome::Applied
    }

    fn revert(&self, target: &Target) -> ApplyOutcome {
        let parts: Vec<&Part> = self.active_parts(target).collect();
        for part in parts.into_iter().rev() {
            if let Err(e) = part.resource.revert(target) {
                return ApplyOutcome::Failed(format!("{}: {}", part.resource.key(), reason(&e)));
            }
        }
        if let Err(e) = self.run_post(target) {
            return ApplyOutcome::Failed(e);
        }
        info!("reverted {}", self.id);
        ApplyOutcome::Applied
    }
}
