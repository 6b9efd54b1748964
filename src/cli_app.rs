//! Top-level CLI definition and dispatch.

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::core::config::{IniDocument, SupervisorConfig};
use crate::core::context::ProcessOptions;
use crate::core::errors::{PsvError, Result};
use crate::daemon;
use crate::plugin::registry::PluginRegistry;

/// Plugin supervisor: keeps one worker thread per monitoring plugin alive.
#[derive(Parser, Debug)]
#[command(name = "psvd", version, about)]
pub struct Cli {
    /// Configuration file.
    #[arg(long = "conf", value_name = "FILE", default_value = "/etc/psvd/psvd.conf")]
    pub conf: PathBuf,
    /// Log directory (ignored with --no-daemon).
    #[arg(long = "log", value_name = "DIR", default_value = "/var/log/psvd")]
    pub log: PathBuf,
    /// Pid file written after detaching.
    #[arg(long = "pid", value_name = "FILE", default_value = "/var/run/psvd.pid")]
    pub pid: PathBuf,
    /// Stay attached to the terminal and log to stdout.
    #[arg(long = "no-daemon")]
    pub no_daemon: bool,
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|err| PsvError::io(path, err))
}

impl Cli {
    /// Process options with every path made absolute, since the daemon
    /// changes directory to `/`.
    pub fn process_options(&self, debug: bool) -> Result<ProcessOptions> {
        Ok(ProcessOptions {
            conf_path: absolute(&self.conf)?,
            log_dir: absolute(&self.log)?,
            pid_path: absolute(&self.pid)?,
            foreground: self.no_daemon,
            debug,
        })
    }
}

/// Load the configuration and run the daemon until it is told to stop.
pub fn run(cli: &Cli) -> Result<()> {
    let doc = IniDocument::load(&cli.conf)?;
    let config = SupervisorConfig::from_document(&doc)?;
    let options = cli.process_options(config.debug)?;
    let registry = PluginRegistry::builtin()?;

    let report = daemon::start(options, &doc, &config, &registry)?;
    tracing::info!(
        completed = report.completed.len(),
        joined = report.joined,
        abandoned = report.abandoned.len(),
        "supervisor exiting"
    );
    Ok(())
}
