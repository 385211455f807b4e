//! d3guardctl - keep NVIDIA GPUs out of D3cold
//!
//! Parses arguments, sets up logging and hands off to the command layer.
//! Every failure ends here and is turned into an exit code.

use clap::Parser;
use d3guardctl::cli::{Cli, Commands};
use d3guardctl::{commands, errors, logging, output};
use tracing::debug;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, matches!(cli.command, Commands::Monitor { .. }));
    debug!("d3guardctl {} {}", env!("D3GUARD_VERSION"), cli.command.name());

    let code = match commands::dispatch(&cli) {
        Ok(code) => code,
        Err(e) => {
            output::display_error(&format!("{:#}", e));
            errors::exit_code_for(&e)
        }
    };
    std::process::exit(code);
}
