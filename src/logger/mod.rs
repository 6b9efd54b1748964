//! Line-oriented logging: `<timestamp> <LEVEL> <message> <fields>` to stdout in
//! the foreground, or to `<log dir>/psvd.log` once detached. A detached daemon
//! also keeps one file per plugin (see [`plugin_files`]).

pub mod plugin_files;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;

use crate::core::errors::{PsvError, Result};
use plugin_files::PluginFileLayer;

/// File name of the daemon log inside the log directory.
pub const LOG_FILE_NAME: &str = "psvd.log";

/// Environment variable that overrides the level filter.
pub const LOG_ENV: &str = "PSVD_LOG";

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    /// Foreground runs.
    Stdout,
    /// Detached runs: `psvd.log` plus per-plugin files under this directory.
    Directory(PathBuf),
}

impl LogSink {
    /// Full path of the log file, if logging to a file.
    #[must_use]
    pub fn file_path(&self) -> Option<PathBuf> {
        match self {
            Self::Stdout => None,
            Self::Directory(dir) => Some(dir.join(LOG_FILE_NAME)),
        }
    }
}

/// `chrono` format shared by every log line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Local wall-clock timestamps, millisecond precision.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl FormatTime for LocalClock {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", Local::now().format(TIMESTAMP_FORMAT))
    }
}

fn default_directive(debug: bool) -> &'static str {
    if debug { "debug" } else { "info" }
}

/// Non-rotating appender for `dir/file_name`, creating `dir` first.
pub(crate) fn appender(dir: &Path, file_name: &str) -> Result<RollingFileAppender> {
    fs::create_dir_all(dir).map_err(|err| PsvError::io(dir, err))?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)
        .map_err(|err| PsvError::Logging {
            details: format!("{}: {err}", dir.display()),
        })
}

fn file_writer(dir: &Path) -> Result<BoxMakeWriter> {
    Ok(BoxMakeWriter::new(appender(dir, LOG_FILE_NAME)?))
}

/// Install the global subscriber. Call once, after daemonizing.
///
/// `debug` sets the daemon log's level; each plugin's own file follows that
/// plugin's `debug` option instead.
pub fn init(sink: &LogSink, debug: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));
    let (writer, plugin_files) = match sink {
        LogSink::Stdout => (BoxMakeWriter::new(std::io::stdout), None),
        LogSink::Directory(dir) => (
            file_writer(dir)?,
            Some(PluginFileLayer::new(dir).with_filter(LevelFilter::DEBUG)),
        ),
    };

    let main_log = tracing_subscriber::fmt::layer()
        .with_timer(LocalClock)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(main_log)
        .with(plugin_files)
        .try_init()
        .map_err(|err| PsvError::Logging {
            details: err.to_string(),
        })
}

/// Whether [`init`] has already installed a subscriber.
#[must_use]
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_follows_debug_flag() {
        assert_eq!(default_directive(true), "debug");
        assert_eq!(default_directive(false), "info");
    }

    #[test]
    fn file_sink_path_is_inside_log_dir() {
        let sink = LogSink::Directory(PathBuf::from("/var/log/psvd"));
        assert_eq!(sink.file_path(), Some(PathBuf::from("/var/log/psvd/psvd.log")));
        assert_eq!(LogSink::Stdout.file_path(), None);
    }

    #[test]
    fn file_writer_creates_log_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("nested/logs");
        file_writer(&nested).expect("writer");
        assert!(nested.is_dir());
    }

    #[test]
    fn appender_writes_the_named_file() {
        use std::io::Write as _;

        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("heartbeat");
        let mut file = appender(&nested, "heartbeat.log").expect("appender");
        file.write_all(b"beat\n").expect("write");
        assert_eq!(
            fs::read_to_string(nested.join("heartbeat.log")).expect("read"),
            "beat\n"
        );
    }

    #[test]
    fn clock_renders_date_and_time() {
        let mut out = String::new();
        LocalClock
            .format_time(&mut Writer::new(&mut out))
            .expect("format");
        assert_eq!(out.len(), "2024-01-01 00:00:00.000".len());
        assert_eq!(&out[4..5], "-");
    }
}
