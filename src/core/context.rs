//! Immutable process-wide options, built once at startup and shared by `Arc`.

use std::path::PathBuf;

/// Options every component and plugin may read. Never mutated after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Absolute path of the ini file.
    pub conf_path: PathBuf,
    /// Directory for `psvd.log` and the per-plugin logs.
    pub log_dir: PathBuf,
    /// Pid file written after detaching.
    pub pid_path: PathBuf,
    /// `--no-daemon`: stay attached and log to stdout.
    pub foreground: bool,
    /// Main section `debug`.
    pub debug: bool,
}

impl ProcessOptions {
    /// Whether the process detaches and owns a pid file.
    #[must_use]
    pub fn daemonized(&self) -> bool {
        !self.foreground
    }
}
