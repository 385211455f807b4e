//! Catalog: the ordered Setting tables
//!
//! Two tables share one engine:
//! - `remediation`: what `diagnose`, `fix` and `monitor` reconcile
//! - `monitor`: the timer and package hooks `install-monitor` registers
//!
//! Order is presentation only. Construction checks that ids are unique and
//! that no two Settings write the same resource.

pub mod monitor;
pub mod remediation;
pub mod templates;

pub use monitor::MonitorUnits;

use crate::config::D3Config;
use crate::error::D3Error;
use crate::setting::Setting;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Remediation,
    Monitor,
}

pub struct Catalog {
    settings: Vec<Box<dyn Setting>>,
}

impl Catalog {
    pub fn new(settings: Vec<Box<dyn Setting>>) -> Result<Self, D3Error> {
        let mut ids: HashMap<&str, ()> = HashMap::new();
        let mut keys: HashMap<String, &str> = HashMap::new();
        for setting in &settings {
            let id = setting.id();
            if id.is_empty() {
                return Err(D3Error::Catalog("setting with empty id".to_string()));
            }
            if ids.insert(id, ()).is_some() {
                return Err(D3Error::Catalog(format!("duplicate setting id '{}'", id)));
            }
            for key in setting.resource_keys() {
                if let Some(owner) = keys.insert(key.clone(), id) {
                    return Err(D3Error::Catalog(format!(
                        "resource {} claimed by both '{}' and '{}'",
                        key, owner, id
                    )));
                }
            }
        }
        Ok(Self { settings })
    }

    pub fn remediation() -> Result<Self, D3Error> {
        Self::new(remediation::settings())
    }

    pub fn monitor(units: &MonitorUnits) -> Result<Self, D3Error> {
        Self::new(monitor::settings(units))
    }

    /// Build `kind` with `settings.disabled` removed
    ///
    /// An id in `settings.disabled` that neither table knows is a
    /// configuration error.
    pub fn load(kind: CatalogKind, config: &D3Config, exe: &str) -> Result<Self, D3Error> {
        let units = MonitorUnits {
            exe: exe.to_string(),
            interval_minutes: config.monitor.interval_minutes,
        };
        let remediation = Self::remediation()?;
        let monitor = Self::monitor(&units)?;

        let disabled = &config.settings.disabled;
        for id in disabled {
            if remediation.get(id).is_none() && monitor.get(id).is_none() {
                return Err(D3Error::Catalog(format!(
                    "unknown setting id '{}' in settings.disabled",
                    id
                )));
            }
        }

        let catalog = match kind {
            CatalogKind::Remediation => remediation,
            CatalogKind::Monitor => monitor,
        };
        Ok(catalog.without(disabled))
    }

    /// Drop the listed ids
    pub fn without(self, disabled: &[String]) -> Self {
        Self {
            settings: self
                .settings
                .into_iter()
                .filter(|s| !disabled.iter().any(|d| d == s.id()))
                .collect(),
        }
    }

    pub fn settings(&self) -> &[Box<dyn Setting>] {
        &self.settings
    }

    pub fn get(&self, id: &str) -> Option<&dyn Setting> {
        self.settings
            .iter()
            .find(|s| s.id() == id)
            .map(|s| s.as_ref())
    }

    pub fn ids(&self) -> Vec<&str> {
        self.settings.iter().map(|s| s.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}
