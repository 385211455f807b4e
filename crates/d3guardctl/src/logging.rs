//! Diagnostic logging for d3guardctl
//!
//! Reports go to stdout; tracing records go to stderr, where systemd picks
//! them up into the journal for monitor runs.
//!
//! Filter priority:
//! 1. `$D3GUARD_LOG`
//! 2. `$RUST_LOG`
//! 3. `-v` / `-vv`, with `info` as the floor for monitor runs

use tracing_subscriber::EnvFilter;

/// Directive used when no environment override is set
pub fn default_directive(verbose: u8, monitor: bool) -> &'static str {
    match verbose {
        0 if monitor => "info",
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn filter(verbose: u8, monitor: bool) -> EnvFilter {
    for var in ["D3GUARD_LOG", "RUST_LOG"] {
        if let Ok(filter) = EnvFilter::try_from_env(var) {
            return filter;
        }
    }
    EnvFilter::new(default_directive(verbose, monitor))
}

/// Install the global subscriber; a second call is a no-op
pub fn init(verbose: u8, monitor: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(verbose, monitor))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_levels() {
        assert_eq!(default_directive(0, false), "warn");
        assert_eq!(default_directive(0, true), "info");
        assert_eq!(default_directive(1, false), "info");
        assert_eq!(default_directive(3, true), "debug");
    }
}
