//! Main supervision loop and the shutdown state machine.
//!
//! `Running → ShutdownRequested → Draining → Terminated`, forward only. The
//! signal listener merely sets the token; this loop is the one place that
//! notices and walks the remaining transitions, so they happen once.

use std::sync::Arc;
use std::time::Duration;

use crate::core::config::SupervisorConfig;
use crate::core::errors::Result;
use crate::plugin::registry::PluginPlan;
use crate::plugin::runtime::{RuntimeEnv, plugin_work_item};
use crate::pool::{PollOutcome, WorkResult, WorkerPool};

use super::pidfile::PidFile;

/// Shutdown coordinator states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShutdownPhase {
    /// Plugins running, liveness reports every interval.
    Running,
    /// The token was observed set.
    ShutdownRequested,
    /// Workers dismissed; waiting for plugins to return.
    Draining,
    /// Pool joined and pid file gone.
    Terminated,
}

impl ShutdownPhase {
    /// The only state reachable from `self`.
    #[must_use]
    pub const fn successor(self) -> Option<Self> {
        match self {
            Self::Running => Some(Self::ShutdownRequested),
            Self::ShutdownRequested => Some(Self::Draining),
            Self::Draining => Some(Self::Terminated),
            Self::Terminated => None,
        }
    }
}

/// Timing knobs for the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Pause between liveness reports.
    pub liveness_interval: Duration,
    /// Idle worker dismissal recheck.
    pub worker_poll: Duration,
    /// Upper bound on the drain; `None` waits forever.
    pub join_timeout: Option<Duration>,
}

impl From<&SupervisorConfig> for SupervisorSettings {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            liveness_interval: config.liveness_interval,
            worker_poll: config.worker_poll,
            join_timeout: config.join_timeout,
        }
    }
}

/// What happened between startup and `Terminated`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ShutdownReport {
    pub pool_size: usize,
    /// Results observed by the loop, in completion order.
    pub completed: Vec<WorkResult>,
    pub dismissed: usize,
    pub joined: usize,
    /// Worker names still running at the join timeout.
    pub abandoned: Vec<String>,
    pub pid_file_removed: bool,
    /// Every phase entered, in order, starting with `Running`.
    pub phases: Vec<ShutdownPhase>,
}

/// Owns the pool for one run of the daemon.
pub struct Supervisor {
    env: RuntimeEnv,
    settings: SupervisorSettings,
    pid_file: Option<PidFile>,
    phases: Vec<ShutdownPhase>,
}

impl Supervisor {
    /// Supervisor that will remove `pid_file` once terminated.
    #[must_use]
    pub fn new(env: RuntimeEnv, settings: SupervisorSettings, pid_file: Option<PidFile>) -> Self {
        Self {
            env,
            settings,
            pid_file,
            phases: vec![ShutdownPhase::Running],
        }
    }

    /// Current shutdown phase.
    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        self.phases
            .last()
            .copied()
            .unwrap_or(ShutdownPhase::Running)
    }

    fn advance(&mut self, next: ShutdownPhase) -> bool {
        if self.phase().successor() != Some(next) {
            return false;
        }
        tracing::info!(phase = ?next, "shutdown phase");
        self.phases.push(next);
        true
    }

    /// Start one worker per plan and supervise until cancellation, then drain.
    pub fn run(mut self, plans: Vec<PluginPlan>) -> Result<ShutdownReport> {
        let plugin_count = plans.len();
        if plugin_count == 0 {
            tracing::error!("no plugin enabled; the supervisor will idle until shutdown");
        }

        let pool = Arc::new(WorkerPool::new(plugin_count, self.settings.worker_poll)?);
        tracing::info!(workers = pool.size(), "worker pool started");
        for plan in plans {
            let item = plugin_work_item(plan, self.env.clone(), Arc::downgrade(&pool));
            tracing::debug!(plugin = item.id(), "queueing plugin request");
            pool.enqueue(item);
        }

        let mut completed = Vec::new();
        loop {
            match pool.poll() {
                PollOutcome::NothingPending => tracing::debug!("no plugin request pending"),
                PollOutcome::Progress(results) => completed.extend(results),
            }
            log_liveness(&pool);
            if self.env.cancel.wait_timeout(self.settings.liveness_interval) {
                break;
            }
        }

        self.advance(ShutdownPhase::ShutdownRequested);
        self.advance(ShutdownPhase::Draining);
        let dismissed = pool.dismiss(plugin_count);
        tracing::info!(dismissed, "dismissing workers and waiting for plugins to stop");
        let join = pool.join_dismissed(self.settings.join_timeout);
        if !join.abandoned.is_empty() {
            tracing::error!(abandoned = ?join.abandoned, "plugins ignored cancellation; abandoning them");
        }
        if let PollOutcome::Progress(results) = pool.poll() {
            completed.extend(results);
        }

        let pid_file_removed = self.pid_file.as_mut().is_some_and(PidFile::remove);
        self.advance(ShutdownPhase::Terminated);
        tracing::info!("shutdown complete");

        Ok(ShutdownReport {
            pool_size: pool.size(),
            completed,
            dismissed,
            joined: join.joined,
            abandoned: join.abandoned,
            pid_file_removed,
            phases: self.phases,
        })
    }
}

fn log_liveness(pool: &WorkerPool) {
    for worker in pool.workers().into_iter().filter(|worker| worker.alive) {
        tracing::info!(
            thread = %worker.label(),
            worker = %worker.name,
            dismissed = worker.dismissed,
            plugin = worker.current.as_deref().unwrap_or("-"),
            "thread alive"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cancel::CancellationToken;
    use crate::core::context::ProcessOptions;
    use crate::core::errors::{PsvError, Result as PsvResult};
    use crate::core::options::PluginConfig;
    use crate::plugin::registry::LoadedPlugin;
    use crate::plugin::{Plugin, PluginContext};
    use std::path::PathBuf;
    use std::thread;
    use std::time::Instant;

    /// Runs until cancelled.
    struct Patient;

    impl Plugin for Patient {
        fn name(&self) -> &str {
            "patient"
        }

        fn run(&self, _: &PluginContext, cancel: &CancellationToken, _: &PluginConfig) -> PsvResult<()> {
            while !cancel.wait_timeout(Duration::from_millis(5)) {}
            Ok(())
        }
    }

    /// Returns immediately.
    struct Quick;

    impl Plugin for Quick {
        fn name(&self) -> &str {
            "quick"
        }

        fn run(&self, _: &PluginContext, _: &CancellationToken, _: &PluginConfig) -> PsvResult<()> {
            Ok(())
        }
    }

    fn env() -> RuntimeEnv {
        RuntimeEnv {
            process: Arc::new(ProcessOptions {
                conf_path: PathBuf::from("psvd.conf"),
                log_dir: PathBuf::from("log"),
                pid_path: PathBuf::from("psvd.pid"),
                foreground: true,
                debug: false,
            }),
            cancel: CancellationToken::new(),
        }
    }

    fn settings() -> SupervisorSettings {
        SupervisorSettings {
            liveness_interval: Duration::from_millis(20),
            worker_poll: Duration::from_millis(10),
            join_timeout: None,
        }
    }

    fn loaded(name: &str, plugin: Arc<dyn Plugin>) -> PluginPlan {
        PluginPlan {
            name: name.to_string(),
            load: Ok(LoadedPlugin {
                plugin,
                config: PluginConfig::default(),
            }),
        }
    }

    fn cancel_after(cancel: &CancellationToken, delay: Duration, times: usize) -> thread::JoinHandle<()> {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            for _ in 0..times {
                cancel.cancel();
            }
        })
    }

    #[test]
    fn phases_only_move_forward() {
        let mut supervisor = Supervisor::new(env(), settings(), None);
        assert!(!supervisor.advance(ShutdownPhase::Draining));
        assert!(supervisor.advance(ShutdownPhase::ShutdownRequested));
        assert!(!supervisor.advance(ShutdownPhase::ShutdownRequested));
        assert_eq!(supervisor.phase(), ShutdownPhase::ShutdownRequested);
        assert_eq!(ShutdownPhase::Terminated.successor(), None);
    }

    #[test]
    fn known_and_unknown_plugins_scenario() {
        let env = env();
        let canceller = cancel_after(&env.cancel, Duration::from_millis(200), 1);
        let plans = vec![
            loaded("A", Arc::new(Quick)),
            PluginPlan {
                name: "B".to_string(),
                load: Err(PsvError::UnknownPlugin {
                    name: "B".to_string(),
                }),
            },
        ];

        let report = Supervisor::new(env, settings(), None).run(plans).expect("run");
        canceller.join().expect("canceller");

        assert_eq!(report.pool_size, 2);
        let a_results: Vec<_> = report.completed.iter().filter(|r| r.id == "A").collect();
        assert_eq!(a_results.len(), 1);
        assert!(a_results[0].outcome.is_ok());
        assert!(report.completed.iter().any(|r| r.id == "B" && r.outcome.is_err()));
        assert_eq!(report.joined, 2);
        assert!(report.abandoned.is_empty());
    }

    #[test]
    fn repeated_cancellation_terminates_once_and_removes_pid_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pid_path = dir.path().join("psvd.pid");
        let pid_file = PidFile::write_current(&pid_path).expect("pid file");

        let env = env();
        let canceller = cancel_after(&env.cancel, Duration::from_millis(50), 3);
        let plans = vec![loaded("p1", Arc::new(Patient)), loaded("p2", Arc::new(Patient))];

        let started = Instant::now();
        let report = Supervisor::new(env, settings(), Some(pid_file))
            .run(plans)
            .expect("run");
        canceller.join().expect("canceller");

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(
            report.phases,
            [
                ShutdownPhase::Running,
                ShutdownPhase::ShutdownRequested,
                ShutdownPhase::Draining,
                ShutdownPhase::Terminated,
            ]
        );
        assert!(report.pid_file_removed);
        assert!(!pid_path.exists());
        assert_eq!(report.dismissed, 2);
        assert_eq!(report.joined, 2);
        assert_eq!(report.completed.len(), 2);
    }

    #[test]
    fn zero_plugins_still_runs_the_loop() {
        let env = env();
        let canceller = cancel_after(&env.cancel, Duration::from_millis(60), 1);
        let report = Supervisor::new(env, settings(), None)
            .run(Vec::new())
            .expect("run");
        canceller.join().expect("canceller");
        assert_eq!(report.pool_size, 0);
        assert!(report.completed.is_empty());
        assert_eq!(report.phases.last(), Some(&ShutdownPhase::Terminated));
    }
}
