//! Built-in liveness plugin: logs a beat every `check_poll` seconds.

use crate::core::cancel::CancellationToken;
use crate::core::errors::Result;
use crate::core::options::{OptionDecl, OptionKind, PluginConfig};

use super::{Plugin, PluginContext};

const DEFAULT_MESSAGE: &str = "alive";

/// Logs `message` (default `alive`) until cancelled or `max_beats` is reached.
#[derive(Debug, Clone, Copy, Default)]
pub struct Heartbeat;

impl Plugin for Heartbeat {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn optional_options(&self) -> Vec<OptionDecl> {
        vec![
            OptionDecl::new("message", OptionKind::Str),
            OptionDecl::new("max_beats", OptionKind::Int),
        ]
    }

    fn run(&self, ctx: &PluginContext, cancel: &CancellationToken, config: &PluginConfig) -> Result<()> {
        let message = config.get_str("message").unwrap_or(DEFAULT_MESSAGE);
        let max_beats = config
            .get_int("max_beats")
            .and_then(|n| u64::try_from(n).ok())
            .filter(|n| *n > 0);

        tracing::info!(plugin = %ctx.name, "plugin started");
        let mut beats: u64 = 0;
        while !cancel.is_cancelled() {
            beats += 1;
            tracing::info!(plugin = %ctx.name, beat = beats, "{message}");
            if ctx.params.debug {
                tracing::debug!(plugin = %ctx.name, poll = ?ctx.params.check_poll, "next beat scheduled");
            }
            if max_beats.is_some_and(|max| beats >= max) {
                break;
            }
            cancel.wait_timeout(ctx.params.check_poll);
        }
        tracing::info!(plugin = %ctx.name, beats, "plugin stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::options::OptionValue;
    use crate::plugin::tests::process;
    use std::thread;
    use std::time::{Duration, Instant};

    fn config(pairs: &[(&str, OptionValue)]) -> PluginConfig {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn stops_after_max_beats() {
        let config = config(&[
            ("max_beats", OptionValue::Int(3)),
            ("check_poll", OptionValue::Int(1)),
        ]);
        let mut ctx = PluginContext::new("heartbeat", process(), &config);
        ctx.params.check_poll = Duration::from_millis(1);
        Heartbeat
            .run(&ctx, &CancellationToken::new(), &config)
            .expect("run");
    }

    #[test]
    fn returns_promptly_on_cancel() {
        let config = PluginConfig::default();
        let ctx = PluginContext::new("heartbeat", process(), &config);
        let token = CancellationToken::new();
        let remote = token.clone();
        let runner = thread::spawn(move || Heartbeat.run(&ctx, &remote, &config));
        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        token.cancel();
        runner.join().expect("join").expect("run");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
