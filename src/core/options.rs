//! Option resolution: per-plugin section first, main section second, each raw
//! value converted by the parser registered for the option's kind.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::config::{IniDocument, Section};
use crate::core::errors::{PsvError, Result};

/// Tokens that parse to `true` for boolean options (compared case-insensitively).
pub const TRUTHY_TOKENS: &[&str] = &["1", "true", "yes", "on"];

/// Value types an option can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionKind {
    /// Raw text, never fails.
    Str,
    /// Signed decimal integer.
    Int,
    /// Truthy token or `false`, never fails.
    Bool,
}

/// A converted option value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum OptionValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

type Parser = fn(&str) -> std::result::Result<OptionValue, String>;

/// Named parsers, one per kind. Required and optional options share them.
const PARSERS: &[(OptionKind, &str, Parser)] = &[
    (OptionKind::Str, "string", parse_str),
    (OptionKind::Int, "integer", parse_int),
    (OptionKind::Bool, "boolean", parse_bool),
];

fn parse_str(raw: &str) -> std::result::Result<OptionValue, String> {
    Ok(OptionValue::Str(raw.to_string()))
}

fn parse_int(raw: &str) -> std::result::Result<OptionValue, String> {
    raw.trim()
        .parse::<i64>()
        .map(OptionValue::Int)
        .map_err(|err| err.to_string())
}

#[allow(clippy::unnecessary_wraps)]
fn parse_bool(raw: &str) -> std::result::Result<OptionValue, String> {
    let token = raw.trim();
    Ok(OptionValue::Bool(
        TRUTHY_TOKENS
            .iter()
            .any(|truthy| truthy.eq_ignore_ascii_case(token)),
    ))
}

impl OptionKind {
    fn entry(self) -> (&'static str, Parser) {
        PARSERS
            .iter()
            .find(|(kind, _, _)| *kind == self)
            .map(|(_, name, parser)| (*name, *parser))
            .unwrap_or(("string", parse_str as Parser))
    }

    /// Human-readable type name used in error messages.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.entry().0
    }

    /// Convert a raw config value. Booleans never fail.
    pub fn parse(self, raw: &str) -> std::result::Result<OptionValue, String> {
        (self.entry().1)(raw)
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(value) => f.write_str(value),
            Self::Int(value) => write!(f, "{value}"),
            Self::Bool(value) => write!(f, "{value}"),
        }
    }
}

/// A declared option: name plus kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionDecl {
    /// Key looked up in the ini sections.
    pub name: &'static str,
    /// Parser applied to the raw value.
    pub kind: OptionKind,
}

impl OptionDecl {
    /// Declare option `name` of type `kind`.
    #[must_use]
    pub const fn new(name: &'static str, kind: OptionKind) -> Self {
        Self { name, kind }
    }
}

/// The option schema a plugin declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSpec {
    /// Plugin name; also selects the `[plugin:<name>]` section.
    pub name: String,
    /// Options whose absence aborts startup.
    pub required: Vec<OptionDecl>,
    /// Options left out of the config when absent.
    pub optional: Vec<OptionDecl>,
}

impl PluginSpec {
    /// Reject schemas that cannot be resolved unambiguously.
    pub fn validate(&self) -> Result<()> {
        let contract_error = |details: String| PsvError::InvalidPluginContract {
            plugin: self.name.clone(),
            details,
        };
        if self.name.trim().is_empty() {
            return Err(contract_error("plugin name is empty".to_string()));
        }
        let mut seen: Vec<&str> = Vec::new();
        for decl in self.required.iter().chain(&self.optional) {
            if decl.name.trim().is_empty() {
                return Err(contract_error("option with an empty name".to_string()));
            }
            if seen.contains(&decl.name) {
                return Err(contract_error(format!(
                    "option `{}` is declared more than once",
                    decl.name
                )));
            }
            seen.push(decl.name);
        }
        Ok(())
    }
}

/// Resolved, typed options for one plugin instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginConfig {
    values: BTreeMap<String, OptionValue>,
}

impl PluginConfig {
    /// Converted value of `name`, if it was set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    /// String value of `name`; `None` when unset or of another kind.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(OptionValue::Str(value)) => Some(value),
            _ => None,
        }
    }

    /// Integer value of `name`.
    #[must_use]
    pub fn get_int(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(OptionValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    /// Boolean value of `name`.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(OptionValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    /// Number of options that were set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// No option was set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Options in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl FromIterator<(String, OptionValue)> for PluginConfig {
    fn from_iter<I: IntoIterator<Item = (String, OptionValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Look up `name` in the plugin section, falling back to the main section.
fn lookup<'a>(plugin: Option<&'a Section>, main: Option<&'a Section>, name: &str) -> Option<&'a str> {
    plugin
        .and_then(|section| section.get(name))
        .or_else(|| main.and_then(|section| section.get(name)))
}

fn convert(spec: &PluginSpec, decl: &OptionDecl, raw: &str) -> Result<OptionValue> {
    decl.kind.parse(raw).map_err(|_| PsvError::InvalidOptionType {
        plugin: spec.name.clone(),
        option: decl.name.to_string(),
        expected: decl.kind.name(),
        value: raw.to_string(),
    })
}

/// Build the [`PluginConfig`] for `spec` from the document.
///
/// Missing required options and conversion failures are fatal; missing
/// optional options are simply left out.
pub fn resolve_plugin_config(doc: &IniDocument, spec: &PluginSpec) -> Result<PluginConfig> {
    let main = doc.main_section();
    let plugin = doc.plugin_section(&spec.name);
    let mut values = BTreeMap::new();

    for decl in &spec.required {
        let raw = lookup(plugin, main, decl.name).ok_or_else(|| PsvError::MissingRequiredOption {
            plugin: spec.name.clone(),
            option: decl.name.to_string(),
        })?;
        values.insert(decl.name.to_string(), convert(spec, decl, raw)?);
    }

    for decl in &spec.optional {
        if let Some(raw) = lookup(plugin, main, decl.name) {
            values.insert(decl.name.to_string(), convert(spec, decl, raw)?);
        }
    }

    Ok(PluginConfig { values })
}
