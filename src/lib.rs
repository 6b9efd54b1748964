//! Plugin supervisor: loads the plugins named in an ini file, runs each on its
//! own long-lived worker thread, and shuts them down cooperatively on SIGINT
//! or SIGTERM.
//!
//! Startup order: optional double-fork detachment with a pid-file guard, log
//! setup, plugin option resolution, one pool worker per enabled plugin, then
//! the liveness loop in [`daemon::loop_main`] until the shared
//! [`core::cancel::CancellationToken`] is set.

#[cfg(feature = "cli")]
pub mod cli_app;
pub mod core;
pub mod daemon;
pub mod logger;
pub mod plugin;
pub mod pool;
