//! Worker thread body: take one item at a time, run it to completion, report.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use super::{Job, WorkResult};

/// State a worker shares with the pool.
#[derive(Debug, Default)]
pub(crate) struct WorkerFlags {
    dismissed: AtomicBool,
    current: Mutex<Option<String>>,
}

impl WorkerFlags {
    pub(crate) fn dismiss(&self) {
        self.dismissed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_dismissed(&self) -> bool {
        self.dismissed.load(Ordering::SeqCst)
    }

    pub(crate) fn current(&self) -> Option<String> {
        self.current.lock().clone()
    }
}

/// Channels a worker needs. Cloned once per thread.
pub(crate) struct WorkerChannels {
    pub jobs_rx: Receiver<Job>,
    pub jobs_tx: Sender<Job>,
    pub results_tx: Sender<WorkResult>,
    pub exits_tx: Sender<String>,
}

/// Pool-side handle on a running worker.
pub(crate) struct WorkerHandle {
    pub name: String,
    pub flags: Arc<WorkerFlags>,
    pub thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn spawn(
        name: String,
        channels: WorkerChannels,
        poll_timeout: Duration,
    ) -> std::io::Result<Self> {
        let flags = Arc::new(WorkerFlags::default());
        let thread = thread::Builder::new().name(name.clone()).spawn({
            let flags = Arc::clone(&flags);
            let name = name.clone();
            move || worker_loop(&name, &flags, &channels, poll_timeout)
        })?;
        Ok(Self {
            name,
            flags,
            thread,
        })
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.flags.current.lock().is_none()
    }
}

fn worker_loop(name: &str, flags: &WorkerFlags, channels: &WorkerChannels, poll_timeout: Duration) {
    tracing::debug!(worker = name, "worker started");
    while !flags.is_dismissed() {
        let job = match channels.jobs_rx.recv_timeout(poll_timeout) {
            Ok(job) => job,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if flags.is_dismissed() {
            // Hand the item back so a live worker can take it.
            let _ = channels.jobs_tx.send(job);
            break;
        }

        *flags.current.lock() = Some(job.id.clone());
        let Job { seq, id, run } = job;
        let outcome = panic::catch_unwind(AssertUnwindSafe(run))
            .unwrap_or_else(|payload| Err(format!("panicked: {}", panic_message(payload.as_ref()))));
        *flags.current.lock() = None;

        let result = WorkResult {
            seq,
            id,
            worker: name.to_string(),
            outcome,
        };
        if channels.results_tx.send(result).is_err() {
            break;
        }
    }
    tracing::debug!(worker = name, "worker exiting");
    let _ = channels.exits_tx.send(name.to_string());
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
