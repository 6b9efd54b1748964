//! Options every plugin inherits, and their defaults.

use std::time::Duration;

use crate::core::options::{OptionDecl, OptionKind, PluginConfig};

/// Optional options declared on behalf of every plugin. A plugin that
/// declares one of these names itself takes precedence.
pub const COMMON_OPTIONS: &[OptionDecl] = &[
    OptionDecl::new("distant_url", OptionKind::Str),
    OptionDecl::new("debug", OptionKind::Bool),
    OptionDecl::new("ssl_cert", OptionKind::Str),
    OptionDecl::new("ssl_key", OptionKind::Str),
    OptionDecl::new("importer_retry_timeout", OptionKind::Int),
    OptionDecl::new("max_parallel_checks", OptionKind::Int),
    OptionDecl::new("max_checks_queue", OptionKind::Int),
    OptionDecl::new("check_poll", OptionKind::Int),
    OptionDecl::new("check_timeout", OptionKind::Int),
    OptionDecl::new("result_threshold", OptionKind::Int),
    OptionDecl::new("limit_group", OptionKind::Str),
    OptionDecl::new("limit_check", OptionKind::Str),
    OptionDecl::new("limit_commit", OptionKind::Int),
];

/// Common parameters with defaults applied. Fields mirror [`COMMON_OPTIONS`];
/// durations are whole seconds in the config.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct CommonParams {
    pub distant_url: Option<String>,
    pub debug: bool,
    pub ssl_cert: Option<String>,
    pub ssl_key: Option<String>,
    pub importer_retry_timeout: Duration,
    pub max_parallel_checks: u32,
    pub max_checks_queue: u32,
    pub check_poll: Duration,
    pub check_timeout: Option<Duration>,
    pub result_threshold: u32,
    pub limit_group: Vec<String>,
    pub limit_check: Vec<String>,
    pub limit_commit: u32,
}

impl Default for CommonParams {
    fn default() -> Self {
        Self {
            distant_url: None,
            debug: false,
            ssl_cert: None,
            ssl_key: None,
            importer_retry_timeout: Duration::from_secs(10),
            max_parallel_checks: 3,
            max_checks_queue: 9,
            check_poll: Duration::from_secs(60),
            check_timeout: None,
            result_threshold: 5,
            limit_group: Vec::new(),
            limit_check: Vec::new(),
            limit_commit: 40,
        }
    }
}

impl CommonParams {
    /// Overlay resolved options on the defaults. Non-positive numbers keep the default.
    #[must_use]
    pub fn from_config(config: &PluginConfig) -> Self {
        let defaults = Self::default();
        let secs = |name: &str| positive(config, name).map(Duration::from_secs);
        let count = |name: &str, fallback: u32| {
            positive(config, name)
                .and_then(|value| u32::try_from(value).ok())
                .unwrap_or(fallback)
        };

        Self {
            distant_url: non_empty(config.get_str("distant_url")),
            debug: config.get_bool("debug").unwrap_or(defaults.debug),
            ssl_cert: non_empty(config.get_str("ssl_cert")),
            ssl_key: non_empty(config.get_str("ssl_key")),
            importer_retry_timeout: secs("importer_retry_timeout")
                .unwrap_or(defaults.importer_retry_timeout),
            max_parallel_checks: count("max_parallel_checks", defaults.max_parallel_checks),
            max_checks_queue: count("max_checks_queue", defaults.max_checks_queue),
            check_poll: secs("check_poll").unwrap_or(defaults.check_poll),
            check_timeout: secs("check_timeout"),
            result_threshold: count("result_threshold", defaults.result_threshold),
            limit_group: split_limit(config.get_str("limit_group")),
            limit_check: split_limit(config.get_str("limit_check")),
            limit_commit: count("limit_commit", defaults.limit_commit),
        }
    }

    /// TLS client auth is on only when both halves are configured.
    #[must_use]
    pub fn ssl_enabled(&self) -> bool {
        self.ssl_cert.is_some() && self.ssl_key.is_some()
    }
}

fn positive(config: &PluginConfig, name: &str) -> Option<u64> {
    config
        .get_int(name)
        .and_then(|value| u64::try_from(value).ok())
        .filter(|value| *value > 0)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Comma-separated limit list, blanks dropped.
fn split_limit(value: Option<&str>) -> Vec<String> {
    value
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
