//! Name → plugin lookup, and turning the enabled list into per-plugin plans.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::config::{EnabledPlugins, IniDocument};
use crate::core::errors::{PsvError, Result};
use crate::core::options::{PluginConfig, resolve_plugin_config};

use super::heartbeat::Heartbeat;
use super::{Plugin, plugin_spec};

/// Explicit registry of plugin implementations.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the plugins shipped with the daemon.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(Heartbeat))?;
        Ok(registry)
    }

    /// Add a plugin. Names must be unique.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(PsvError::DuplicatePlugin { name });
        }
        self.plugins.insert(name, plugin);
        Ok(())
    }

    /// Shared handle to the plugin registered as `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    /// Build one plan per enabled plugin, in order.
    ///
    /// Unknown plugins and broken option contracts are recorded on the plan
    /// and surface when its work item runs. Missing required options and
    /// conversion failures abort the whole resolution, as does a non-empty
    /// list in which no plugin loads at all.
    pub fn plan(&self, doc: &IniDocument, enabled: &EnabledPlugins) -> Result<Vec<PluginPlan>> {
        let mut plans = Vec::with_capacity(enabled.len());
        for name in enabled.iter() {
            let load = match self.get(name) {
                None => Err(PsvError::UnknownPlugin {
                    name: name.to_string(),
                }),
                Some(plugin) => {
                    let spec = plugin_spec(plugin.as_ref());
                    match spec.validate() {
                        Err(err) => Err(err),
                        Ok(()) => {
                            let config = resolve_plugin_config(doc, &spec)?;
                            Ok(LoadedPlugin { plugin, config })
                        }
                    }
                }
            };
            plans.push(PluginPlan {
                name: name.to_string(),
                load,
            });
        }

        if !plans.is_empty() && plans.iter().all(|plan| plan.load.is_err()) {
            let details = plans
                .iter()
                .filter_map(|plan| plan.load.as_ref().err())
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PsvError::NoRunnablePlugins { details });
        }
        Ok(plans)
    }
}

/// A plugin implementation paired with its resolved config.
#[derive(Clone)]
pub struct LoadedPlugin {
    /// Implementation to run.
    pub plugin: Arc<dyn Plugin>,
    /// Options resolved against its declared contract.
    pub config: PluginConfig,
}

/// Everything needed to start one worker's item.
pub struct PluginPlan {
    /// Name as listed in `plugins`.
    pub name: String,
    /// `Err` holds a recoverable load failure for this plugin only.
    pub load: Result<LoadedPlugin>,
}

impl fmt::Debug for PluginPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginPlan")
            .field("name", &self.name)
            .field("loaded", &self.load.is_ok())
            .finish()
    }
}
