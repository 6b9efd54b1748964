//! SIGINT/SIGTERM handling. The listener thread does two things per signal:
//! log its number and set the cancellation token.

use std::thread::{self, JoinHandle};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};

use crate::core::cancel::CancellationToken;
use crate::core::errors::{PsvError, Result};

/// Signals that request shutdown.
pub const SHUTDOWN_SIGNALS: [i32; 2] = [SIGINT, SIGTERM];

/// Keeps the listener alive; dropping it unregisters and joins the thread.
pub struct SignalListener {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalListener {
    /// Register the handlers and start the listener thread.
    pub fn install(cancel: CancellationToken) -> Result<Self> {
        let mut signals = Signals::new(SHUTDOWN_SIGNALS).map_err(|err| PsvError::Runtime {
            details: format!("registering signal handlers: {err}"),
        })?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name("signal-listener".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    tracing::info!(signal, "received signal, requesting shutdown");
                    cancel.cancel();
                }
            })
            .map_err(|err| PsvError::Runtime {
                details: format!("spawning signal listener: {err}"),
            })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for SignalListener {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
