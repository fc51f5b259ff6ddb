//! Platform event sources.
//!
//! Worker-thread backends report readiness through a one-shot channel so that
//! `start()` returns only once the backend is live, or with the error that
//! stopped it from getting there.

pub(crate) mod polling;

#[cfg(target_os = "linux")]
pub(crate) mod kernel;

#[cfg(target_os = "macos")]
pub(crate) mod iokit;

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use tracing::error;

use crate::error::{MonitorError, MonitorResult};

/// Startup handshake from a worker thread back to `start()`.
pub(crate) struct Readiness(std_mpsc::Sender<MonitorResult<()>>);

impl Readiness {
    /// The backend is live; `start()` may return.
    pub(crate) fn ready(self) {
        // The receiver only goes away if start() itself is gone.
        let _ = self.0.send(Ok(()));
    }

    /// The backend could not start; the worker should return right after.
    pub(crate) fn failed(self, error: MonitorError) {
        let _ = self.0.send(Err(error));
    }
}

/// Spawn a named worker and block until it reports readiness.
pub(crate) fn spawn_worker<F>(name: &str, body: F) -> MonitorResult<JoinHandle<()>>
where
    F: FnOnce(Readiness) + Send + 'static,
{
    let (ready_tx, ready_rx) = std_mpsc::channel();

    let handle = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || body(Readiness(ready_tx)))
        .map_err(MonitorError::WorkerSpawn)?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => {
            join_worker(handle);
            Err(e)
        }
        Err(_) => {
            join_worker(handle);
            Err(MonitorError::WorkerPanicked)
        }
    }
}

/// Join a worker, logging instead of propagating a panic.
pub(crate) fn join_worker(handle: JoinHandle<()>) {
    let name = handle.thread().name().unwrap_or("usbwatch-worker").to_string();
    if handle.join().is_err() {
        error!(thread = %name, "Monitor worker panicked");
    }
}
