//! `psvd` binary entry point.

use std::process::ExitCode;

use clap::Parser;

use plugin_supervisor::cli_app::{self, Cli};
use plugin_supervisor::logger;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli_app::run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if logger::is_initialized() {
                tracing::error!(code = err.code(), class = ?err.class(), "fatal: {err}");
            } else {
                eprintln!("psvd: {err}");
            }
            ExitCode::FAILURE
        }
    }
}
