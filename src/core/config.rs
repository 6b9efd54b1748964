//! Two-tier ini configuration: a `[supervisor]` main section plus one
//! `[plugin:<name>]` section per plugin that overrides the main section.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use ini::{Ini, ParseOption};

use crate::core::errors::{PsvError, Result};
use crate::core::options::{OptionKind, OptionValue};

/// Name of the main section.
pub const MAIN_SECTION: &str = "supervisor";

/// Prefix of per-plugin sections (`plugin:<name>`).
pub const PLUGIN_NAMESPACE: &str = "plugin";

/// Default interval between liveness reports.
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(10);

/// Default interval at which an idle worker rechecks its dismissal flag.
pub const DEFAULT_WORKER_POLL: Duration = Duration::from_millis(500);

/// One `[section]` worth of key/value pairs. Keys are stored lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    name: String,
    entries: BTreeMap<String, String>,
}

impl Section {
    /// Empty section with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Section header as written, without brackets.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw value for `key` (case-insensitive).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Insert or replace a value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(key.to_ascii_lowercase(), value.into());
    }

    /// Stored (lower-cased) keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// Parsed ini document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: Vec<Section>,
}

/// Raw values are kept verbatim: no quote stripping, no backslash escapes.
fn parse_option() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    }
}

impl IniDocument {
    /// Read and parse an ini file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => PsvError::MissingConfig {
                path: path.to_path_buf(),
            },
            _ => PsvError::io(path, err),
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parse ini text. `context` names the source in error messages.
    ///
    /// Every pair must sit under a `[section]` header. Keys are folded to
    /// lower case, and a section or key given twice is rejected.
    pub fn parse(text: &str, context: &str) -> Result<Self> {
        let parse_error = |details: String| PsvError::ConfigParse {
            context: context.to_string(),
            details,
        };
        let ini = Ini::load_from_str_opt(text, parse_option())
            .map_err(|err| parse_error(format!("line {err}")))?;

        let mut doc = Self::default();
        for (name, properties) in ini.iter() {
            let Some(name) = name.map(str::trim) else {
                if properties.iter().next().is_some() {
                    return Err(parse_error("key/value pair before any section header".to_string()));
                }
                continue;
            };
            if name.is_empty() {
                return Err(parse_error("empty section name".to_string()));
            }
            if doc.section(name).is_some() {
                return Err(parse_error(format!("duplicate section [{name}]")));
            }

            let mut section = Section::new(name);
            for (key, value) in properties.iter() {
                let key = key.trim();
                if key.is_empty() {
                    return Err(parse_error(format!("empty option name in [{name}]")));
                }
                if section.get(key).is_some() {
                    return Err(parse_error(format!(
                        "duplicate option `{}` in [{name}]",
                        key.to_ascii_lowercase()
                    )));
                }
                section.set(key, value.trim());
            }
            doc.sections.push(section);
        }
        Ok(doc)
    }

    /// Section by exact header name.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.name == name)
    }

    /// The `[supervisor]` section, if present.
    #[must_use]
    pub fn main_section(&self) -> Option<&Section> {
        self.section(MAIN_SECTION)
    }

    /// The `[plugin:<name>]` section, if present.
    #[must_use]
    pub fn plugin_section(&self, plugin: &str) -> Option<&Section> {
        self.section(&plugin_section_name(plugin))
    }

    /// Sections in file order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }
}

/// Conventional section name for a plugin.
#[must_use]
pub fn plugin_section_name(plugin: &str) -> String {
    format!("{PLUGIN_NAMESPACE}:{plugin}")
}

/// Ordered, de-duplicated list of plugin names enabled in the main section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnabledPlugins(Vec<String>);

impl EnabledPlugins {
    /// Split a comma/whitespace separated list, dropping empties and repeats.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        let mut names: Vec<String> = Vec::new();
        for name in list.split(|c: char| c == ',' || c.is_whitespace()) {
            if !name.is_empty() && !names.iter().any(|seen| seen == name) {
                names.push(name.to_string());
            }
        }
        Self(names)
    }

    /// Number of distinct names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for `plugins =` with nothing after it.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names in the order they were listed.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Supervisor-wide settings read from the main section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// The `plugins` list.
    pub plugins: EnabledPlugins,
    /// Daemon log at DEBUG instead of INFO.
    pub debug: bool,
    /// Pause between liveness reports.
    pub liveness_interval: Duration,
    /// How often an idle worker rechecks its dismissal flag.
    pub worker_poll: Duration,
    /// `None` waits for plugins forever at shutdown.
    pub join_timeout: Option<Duration>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            plugins: EnabledPlugins::default(),
            debug: false,
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            worker_poll: DEFAULT_WORKER_POLL,
            join_timeout: None,
        }
    }
}

impl SupervisorConfig {
    /// Read the main section. A missing section or `plugins` key is fatal.
    pub fn from_document(doc: &IniDocument) -> Result<Self> {
        let main = doc
            .main_section()
            .ok_or_else(|| PsvError::MissingPluginList {
                section: MAIN_SECTION.to_string(),
            })?;
        let plugins = main
            .get("plugins")
            .map(EnabledPlugins::parse)
            .ok_or_else(|| PsvError::MissingPluginList {
                section: MAIN_SECTION.to_string(),
            })?;

        let defaults = Self::default();
        let debug = main
            .get("debug")
            .is_some_and(|raw| matches!(OptionKind::Bool.parse(raw), Ok(OptionValue::Bool(true))));
        let liveness_interval = seconds_setting(main, "liveness_interval")?
            .unwrap_or(defaults.liveness_interval);
        let worker_poll = match positive_int_setting(main, "worker_poll")? {
            Some(ms) => Duration::from_millis(ms),
            None => defaults.worker_poll,
        };
        let join_timeout = seconds_setting(main, "join_timeout")?;

        Ok(Self {
            plugins,
            debug,
            liveness_interval,
            worker_poll,
            join_timeout,
        })
    }
}

fn positive_int_setting(section: &Section, key: &str) -> Result<Option<u64>> {
    let Some(raw) = section.get(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => Err(PsvError::InvalidSetting {
            key: key.to_string(),
            details: format!("expected a positive integer, got {raw:?}"),
        }),
        Ok(value) => Ok(Some(value)),
    }
}

fn seconds_setting(section: &Section, key: &str) -> Result<Option<Duration>> {
    Ok(positive_int_setting(section, key)?.map(Duration::from_secs))
}
