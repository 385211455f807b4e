//! d3guard Common - detection and repair engine for the NVIDIA D3cold hang
//!
//! Host detection, the Setting catalog, the reconciler that probes and
//! applies it, the drift monitor and the display-manager recovery.

pub mod catalog;
pub mod command;
pub mod config;
pub mod error;
pub mod event_log;
pub mod host;
pub mod lock;
pub mod monitor;
pub mod notifier;
pub mod reconciler;
pub mod recovery;
pub mod report;
pub mod resource;
pub mod setting;
pub mod state;
pub mod systemd;
pub mod target;

#[cfg(test)]
pub(crate) mod fakes;

pub use catalog::{Catalog, CatalogKind};
pub use config::D3Config;
pub use error::{CommandError, D3Error};
pub use host::HostContext;
pub use report::{Action, Mode, RunReport};
pub use state::{ApplyOutcome, ProbeState, Severity};
pub use target::Target;
