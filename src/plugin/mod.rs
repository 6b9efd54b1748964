//! Plugin capability interface and the per-run context handed to plugins.

pub mod heartbeat;
pub mod params;
pub mod registry;
pub mod runtime;

use std::fmt;
use std::sync::Arc;

use crate::core::cancel::CancellationToken;
use crate::core::context::ProcessOptions;
use crate::core::errors::Result;
use crate::core::options::{OptionDecl, PluginConfig, PluginSpec};
use params::{COMMON_OPTIONS, CommonParams};

/// A unit of monitoring logic the supervisor keeps running.
///
/// `run` owns its worker thread for as long as it likes. It must return once
/// `cancel` is set; the supervisor has no way to stop it otherwise.
pub trait Plugin: Send + Sync {
    /// Registry key, also used for the `[plugin:<name>]` section.
    fn name(&self) -> &str;

    /// Options that must resolve, or startup aborts.
    fn required_options(&self) -> Vec<OptionDecl> {
        Vec::new()
    }

    /// Options read when present, on top of the common ones.
    fn optional_options(&self) -> Vec<OptionDecl> {
        Vec::new()
    }

    /// Blocking body of the plugin. Errors are logged and end this plugin only.
    fn run(&self, ctx: &PluginContext, cancel: &CancellationToken, config: &PluginConfig) -> Result<()>;
}

/// Full option schema for `plugin`: its own declarations plus the common
/// optional options it does not already declare.
#[must_use]
pub fn plugin_spec(plugin: &dyn Plugin) -> PluginSpec {
    let required = plugin.required_options();
    let mut optional = plugin.optional_options();
    for common in COMMON_OPTIONS {
        let declared = required
            .iter()
            .chain(&optional)
            .any(|decl| decl.name == common.name);
        if !declared {
            optional.push(*common);
        }
    }
    PluginSpec {
        name: plugin.name().to_string(),
        required,
        optional,
    }
}

/// Everything a plugin receives besides its config and the cancellation token.
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Name the plugin was enabled under.
    pub name: String,
    /// Daemon-wide options.
    pub process: Arc<ProcessOptions>,
    /// Resolved `distant_url`; `None` means the local default.
    pub remote_target: Option<String>,
    /// Common options with defaults applied.
    pub params: CommonParams,
}

impl PluginContext {
    /// Context for `name`, reading the common options out of `config`.
    #[must_use]
    pub fn new(name: impl Into<String>, process: Arc<ProcessOptions>, config: &PluginConfig) -> Self {
        let params = CommonParams::from_config(config);
        Self {
            name: name.into(),
            process,
            remote_target: params.distant_url.clone(),
            params,
        }
    }
}

impl fmt::Display for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<plugin name={} ssl={} url={}>",
            self.name,
            if self.params.ssl_enabled() { "on" } else { "off" },
            self.remote_target.as_deref().unwrap_or("localhost"),
        )
    }
}
