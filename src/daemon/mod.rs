//! Daemon subsystem: detachment, pid file, signal handling, main loop.

#[cfg(unix)]
pub mod detach;
pub mod loop_main;
#[cfg(unix)]
pub mod pidfile;
#[cfg(feature = "daemon")]
pub mod signals;

use std::sync::Arc;

use crate::core::cancel::CancellationToken;
use crate::core::config::{IniDocument, SupervisorConfig};
use crate::core::context::ProcessOptions;
use crate::core::errors::Result;
use crate::logger::{self, LogSink};
use crate::plugin::registry::PluginRegistry;
use crate::plugin::runtime::RuntimeEnv;
use loop_main::{ShutdownReport, Supervisor, SupervisorSettings};

/// Run the daemon to completion: detach (unless foreground), start logging,
/// resolve plugins, supervise until SIGINT/SIGTERM, drain.
///
/// `doc` and `config` are read by the caller before detaching so that relative
/// paths and syntax errors are reported against the launching terminal.
#[cfg(all(unix, feature = "daemon"))]
pub fn start(
    options: ProcessOptions,
    doc: &IniDocument,
    config: &SupervisorConfig,
    registry: &PluginRegistry,
) -> Result<ShutdownReport> {
    let pid_file = if options.daemonized() {
        Some(detach::daemonize(&options.pid_path)?)
    } else {
        None
    };

    let sink = if options.foreground {
        LogSink::Stdout
    } else {
        LogSink::Directory(options.log_dir.clone())
    };
    logger::init(&sink, config.debug)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        conf = %options.conf_path.display(),
        "supervisor starting"
    );

    let cancel = CancellationToken::new();
    let _signals = signals::SignalListener::install(cancel.clone())?;

    let plans = registry.plan(doc, &config.plugins)?;
    let env = RuntimeEnv {
        process: Arc::new(options),
        cancel,
    };
    Supervisor::new(env, SupervisorSettings::from(config), pid_file).run(plans)
}
