//! Turns a [`PluginPlan`] into a pool work item that blocks for the plugin's
//! whole run.

use std::sync::{Arc, Weak};

use crate::core::cancel::CancellationToken;
use crate::core::context::ProcessOptions;
use crate::logger::plugin_files::PLUGIN_SPAN;
use crate::pool::{WorkItem, WorkOutcome, WorkResult, WorkerPool};

use super::PluginContext;
use super::params::CommonParams;
use super::registry::PluginPlan;

/// What every plugin run shares.
#[derive(Debug, Clone)]
pub struct RuntimeEnv {
    /// Process-wide options, shared read-only.
    pub process: Arc<ProcessOptions>,
    /// Set once shutdown starts.
    pub cancel: CancellationToken,
}

/// Build the work item for `plan`.
///
/// A plan that failed to load is logged once, its worker slot is dismissed,
/// and the item completes with a failure. Nothing escapes to the pool.
pub fn plugin_work_item(plan: PluginPlan, env: RuntimeEnv, pool: Weak<WorkerPool>) -> WorkItem {
    let id = plan.name.clone();
    WorkItem::new(id, move || run_plugin(plan, &env, &pool)).on_complete(log_completion)
}

fn run_plugin(plan: PluginPlan, env: &RuntimeEnv, pool: &Weak<WorkerPool>) -> WorkOutcome {
    let verbose = plan
        .load
        .as_ref()
        .is_ok_and(|loaded| CommonParams::from_config(&loaded.config).debug);
    let span = tracing::info_span!(PLUGIN_SPAN, name = %plan.name, debug = verbose);
    let _entered = span.enter();

    let loaded = match plan.load {
        Ok(loaded) => loaded,
        Err(err) => {
            tracing::error!(code = err.code(), "cannot load plugin {}: {err}", plan.name);
            if let Some(pool) = pool.upgrade() {
                pool.dismiss_current();
            }
            return Err(err.to_string());
        }
    };

    let ctx = PluginContext::new(plan.name, Arc::clone(&env.process), &loaded.config);
    tracing::info!("{ctx}");
    loaded
        .plugin
        .run(&ctx, &env.cancel, &loaded.config)
        .map_err(|err| {
            tracing::warn!(code = err.code(), "plugin returned an error: {err}");
            err.to_string()
        })
}

fn log_completion(result: &WorkResult) {
    match &result.outcome {
        Ok(()) => tracing::info!(worker = %result.worker, "request for plugin {} finished", result.id),
        Err(_) => tracing::info!(
            worker = %result.worker,
            "request for plugin {} finished without running",
            result.id
        ),
    }
}
