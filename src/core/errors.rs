//! PSV-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, PsvError>;

/// How a failure propagates through the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Configuration-wide problem; the process shuts down before any worker runs.
    ConfigFatal,
    /// Confined to one plugin; its slot is dismissed and the rest keep running.
    PluginLoadRecoverable,
    /// A live instance already owns the pid file.
    DuplicateInstance,
    /// Detaching from the terminal failed.
    ForkFailure,
    /// Anything else raised at runtime.
    Runtime,
}

/// Top-level error type for the plugin supervisor.
#[derive(Debug, Error)]
pub enum PsvError {
    #[error("[PSV-1001] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[PSV-1002] configuration parse failure in {context}: {details}")]
    ConfigParse { context: String, details: String },

    #[error("[PSV-1003] section [{section}] does not declare a `plugins` list")]
    MissingPluginList { section: String },

    #[error("[PSV-1004] plugin {plugin}: required option `{option}` is missing")]
    MissingRequiredOption { plugin: String, option: String },

    #[error("[PSV-1005] plugin {plugin}: option `{option}` expects {expected}, got {value:?}")]
    InvalidOptionType {
        plugin: String,
        option: String,
        expected: &'static str,
        value: String,
    },

    #[error("[PSV-1006] invalid supervisor setting `{key}`: {details}")]
    InvalidSetting { key: String, details: String },

    #[error("[PSV-1007] none of the enabled plugins can run: {details}")]
    NoRunnablePlugins { details: String },

    #[error("[PSV-2001] unknown plugin: {name}")]
    UnknownPlugin { name: String },

    #[error("[PSV-2002] plugin {plugin} declares an invalid option contract: {details}")]
    InvalidPluginContract { plugin: String, details: String },

    #[error("[PSV-2003] plugin {name} is registered twice")]
    DuplicatePlugin { name: String },

    #[error("[PSV-2101] plugin {plugin} failed: {details}")]
    PluginFailed { plugin: String, details: String },

    #[error("[PSV-3001] another instance is running with pid {pid} (pid file {path})")]
    DuplicateInstance { pid: i32, path: PathBuf },

    #[error("[PSV-3002] fork failed during {stage}: {details}")]
    Fork { stage: &'static str, details: String },

    #[error("[PSV-3003] daemonization step {step} failed: {details}")]
    Daemonize { step: &'static str, details: String },

    #[error("[PSV-3101] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[PSV-3102] logging setup failed: {details}")]
    Logging { details: String },

    #[error("[PSV-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl PsvError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingConfig { .. } => "PSV-1001",
            Self::ConfigParse { .. } => "PSV-1002",
            Self::MissingPluginList { .. } => "PSV-1003",
            Self::MissingRequiredOption { .. } => "PSV-1004",
            Self::InvalidOptionType { .. } => "PSV-1005",
            Self::InvalidSetting { .. } => "PSV-1006",
            Self::NoRunnablePlugins { .. } => "PSV-1007",
            Self::UnknownPlugin { .. } => "PSV-2001",
            Self::InvalidPluginContract { .. } => "PSV-2002",
            Self::DuplicatePlugin { .. } => "PSV-2003",
            Self::PluginFailed { .. } => "PSV-2101",
            Self::DuplicateInstance { .. } => "PSV-3001",
            Self::Fork { .. } => "PSV-3002",
            Self::Daemonize { .. } => "PSV-3003",
            Self::Io { .. } => "PSV-3101",
            Self::Logging { .. } => "PSV-3102",
            Self::Runtime { .. } => "PSV-3900",
        }
    }

    /// Propagation class of this failure.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::MissingConfig { .. }
            | Self::ConfigParse { .. }
            | Self::MissingPluginList { .. }
            | Self::MissingRequiredOption { .. }
            | Self::InvalidOptionType { .. }
            | Self::InvalidSetting { .. }
            | Self::NoRunnablePlugins { .. }
            | Self::DuplicatePlugin { .. } => ErrorClass::ConfigFatal,
            Self::UnknownPlugin { .. }
            | Self::InvalidPluginContract { .. }
            | Self::PluginFailed { .. } => ErrorClass::PluginLoadRecoverable,
            Self::DuplicateInstance { .. } => ErrorClass::DuplicateInstance,
            Self::Fork { .. } | Self::Daemonize { .. } => ErrorClass::ForkFailure,
            Self::Io { .. } | Self::Logging { .. } | Self::Runtime { .. } => ErrorClass::Runtime,
        }
    }

    /// Whether the failure must take the whole process down.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self.class(), ErrorClass::PluginLoadRecoverable)
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
