//! Fixed roster of worker threads, one per enabled plugin.
//!
//! This is not a task pool: every item is expected to occupy its worker for
//! the whole process lifetime. Items start in enqueue order; completions are
//! observed only through [`WorkerPool::poll`]. Retirement is cooperative:
//! [`WorkerPool::dismiss`] marks workers, [`WorkerPool::join_dismissed`] waits
//! for them to finish their current item and exit.

mod worker;

use std::collections::BTreeMap;
use std::mem;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use parking_lot::Mutex;

use crate::core::errors::{PsvError, Result};
use worker::{WorkerChannels, WorkerHandle};

/// Outcome of one work item: `Err` carries a printable failure.
pub type WorkOutcome = std::result::Result<(), String>;

/// Invoked once, on the polling thread, when an item's result is observed.
pub type CompletionCallback = Box<dyn FnOnce(&WorkResult) + Send>;

type JobFn = Box<dyn FnOnce() -> WorkOutcome + Send>;

/// A unit of work: identifier, the blocking callable, optional callback.
pub struct WorkItem {
    id: String,
    run: JobFn,
    callback: Option<CompletionCallback>,
}

impl WorkItem {
    /// Item running `run` on whichever worker picks it up.
    pub fn new(id: impl Into<String>, run: impl FnOnce() -> WorkOutcome + Send + 'static) -> Self {
        Self {
            id: id.into(),
            run: Box::new(run),
            callback: None,
        }
    }

    /// Run `callback` from [`WorkerPool::poll`] once the result is observed.
    #[must_use]
    pub fn on_complete(mut self, callback: impl FnOnce(&WorkResult) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Identifier reported back in [`WorkResult::id`].
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// The part of a [`WorkItem`] that travels to a worker.
pub(crate) struct Job {
    seq: u64,
    id: String,
    run: JobFn,
}

/// A completed item as reported by [`WorkerPool::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkResult {
    /// Enqueue sequence number.
    pub seq: u64,
    /// Item id given to [`WorkItem::new`].
    pub id: String,
    /// Name of the worker thread that ran the item.
    pub worker: String,
    /// What the item returned, or its panic message.
    pub outcome: WorkOutcome,
}

/// What a non-blocking poll found.
#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// No item is queued or running; nothing will ever complete.
    NothingPending,
    /// Items are outstanding. Holds whatever finished since the last poll (possibly none).
    Progress(Vec<WorkResult>),
}

/// Suffix of the label a worker carries while it runs a plugin.
pub const PLUGIN_THREAD_SUFFIX: &str = "-base";

/// Liveness snapshot of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
    /// OS thread name, `worker-<n>`.
    pub name: String,
    /// Thread has not returned yet.
    pub alive: bool,
    /// Marked for retirement.
    pub dismissed: bool,
    /// Id of the item being run, if any.
    pub current: Option<String>,
}

impl WorkerStatus {
    /// `<item>-base` while an item runs, the thread name otherwise.
    #[must_use]
    pub fn label(&self) -> String {
        self.current.as_ref().map_or_else(
            || self.name.clone(),
            |id| format!("{id}{PLUGIN_THREAD_SUFFIX}"),
        )
    }
}

/// What [`WorkerPool::join_dismissed`] managed to collect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinReport {
    /// Workers that exited and were joined.
    pub joined: usize,
    /// Workers still running when the timeout expired.
    pub abandoned: Vec<String>,
}

#[derive(Default)]
struct PoolState {
    workers: Vec<WorkerHandle>,
    dismissed: Vec<WorkerHandle>,
    pending: BTreeMap<u64, Option<CompletionCallback>>,
    next_seq: u64,
}

/// Bounded, internally synchronized worker pool.
pub struct WorkerPool {
    size: usize,
    jobs_tx: Sender<Job>,
    results_rx: Receiver<WorkResult>,
    exits_rx: Receiver<String>,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    /// Spawn `size` workers named `worker-<n>`. Idle workers recheck their
    /// dismissal flag every `poll_timeout`.
    pub fn new(size: usize, poll_timeout: Duration) -> Result<Self> {
        let (jobs_tx, jobs_rx) = unbounded();
        let (results_tx, results_rx) = unbounded();
        let (exits_tx, exits_rx) = unbounded();

        let mut workers = Vec::with_capacity(size);
        for idx in 0..size {
            let name = format!("worker-{idx}");
            let channels = WorkerChannels {
                jobs_rx: jobs_rx.clone(),
                jobs_tx: jobs_tx.clone(),
                results_tx: results_tx.clone(),
                exits_tx: exits_tx.clone(),
            };
            let handle = WorkerHandle::spawn(name.clone(), channels, poll_timeout).map_err(|err| {
                PsvError::Runtime {
                    details: format!("spawning {name}: {err}"),
                }
            })?;
            workers.push(handle);
        }

        Ok(Self {
            size,
            jobs_tx,
            results_rx,
            exits_rx,
            state: Mutex::new(PoolState {
                workers,
                ..PoolState::default()
            }),
        })
    }

    /// Roster size fixed at construction.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue an item. Never blocks.
    pub fn enqueue(&self, item: WorkItem) -> u64 {
        let WorkItem { id, run, callback } = item;
        let seq = {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.pending.insert(seq, callback);
            seq
        };
        // The pool owns a receiver clone, so the channel cannot be disconnected here.
        let _ = self.jobs_tx.send(Job { seq, id, run });
        seq
    }

    /// Drain completed results without blocking and fire their callbacks.
    pub fn poll(&self) -> PollOutcome {
        let mut finished = Vec::new();
        {
            let mut state = self.state.lock();
            if state.pending.is_empty() {
                return PollOutcome::NothingPending;
            }
            loop {
                match self.results_rx.try_recv() {
                    Ok(result) => {
                        let callback = state.pending.remove(&result.seq).flatten();
                        finished.push((result, callback));
                    }
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
                }
            }
        }

        // Callbacks run without the roster lock so they may call back into the pool.
        let mut results = Vec::with_capacity(finished.len());
        for (result, callback) in finished {
            if let Some(callback) = callback {
                callback(&result);
            }
            results.push(result);
        }
        PollOutcome::Progress(results)
    }

    /// Mark up to `n` workers for retirement, idle workers first.
    /// Returns how many were marked.
    pub fn dismiss(&self, n: usize) -> usize {
        let mut state = self.state.lock();
        let mut marked = 0;
        while marked < n && !state.workers.is_empty() {
            let idx = state
                .workers
                .iter()
                .rposition(WorkerHandle::is_idle)
                .unwrap_or(state.workers.len() - 1);
            let worker = state.workers.remove(idx);
            worker.flags.dismiss();
            tracing::debug!(worker = %worker.name, "worker dismissed");
            state.dismissed.push(worker);
            marked += 1;
        }
        marked
    }

    /// Dismiss the worker running on the calling thread, if it belongs to this pool.
    pub fn dismiss_current(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock();
        let Some(idx) = state
            .workers
            .iter()
            .position(|worker| worker.thread.thread().id() == me)
        else {
            return false;
        };
        let worker = state.workers.remove(idx);
        worker.flags.dismiss();
        tracing::debug!(worker = %worker.name, "worker dismissed itself");
        state.dismissed.push(worker);
        true
    }

    /// Wait for every dismissed worker to exit.
    ///
    /// With `timeout = None` this blocks until the plugins cooperate, however
    /// long that takes. With a timeout, workers still running at the deadline
    /// are detached and listed in [`JoinReport::abandoned`].
    pub fn join_dismissed(&self, timeout: Option<Duration>) -> JoinReport {
        let dismissed = mem::take(&mut self.state.lock().dismissed);
        let mut report = JoinReport::default();

        let Some(timeout) = timeout else {
            for worker in dismissed {
                let _ = worker.thread.join();
                report.joined += 1;
            }
            return report;
        };

        let deadline = Instant::now() + timeout;
        for worker in dismissed {
            while !worker.thread.is_finished() {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                // Exit notices only wake us up early; `is_finished` decides.
                let _ = self
                    .exits_rx
                    .recv_timeout((deadline - now).min(Duration::from_millis(100)));
            }
            if worker.thread.is_finished() {
                let _ = worker.thread.join();
                report.joined += 1;
            } else {
                tracing::warn!(worker = %worker.name, "worker did not exit before join timeout; abandoning it");
                report.abandoned.push(worker.name);
            }
        }
        report
    }

    /// Snapshot of every worker, active roster first, then dismissed ones.
    #[must_use]
    pub fn workers(&self) -> Vec<WorkerStatus> {
        let state = self.state.lock();
        state
            .workers
            .iter()
            .chain(&state.dismissed)
            .map(|worker| WorkerStatus {
                name: worker.name.clone(),
                alive: !worker.thread.is_finished(),
                dismissed: worker.flags.is_dismissed(),
                current: worker.flags.current(),
            })
            .collect()
    }

    /// Number of workers still on the active roster.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.state.lock().workers.len()
    }
}
