//! d3guardctl library - exposes the command layer for integration tests

pub mod cli;
pub mod commands;
pub mod consent;
pub mod errors;
pub mod logging;
pub mod output;
