//! Shared fixtures for monitor tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use usbwatch_core::{CoreError, CoreResult, DeviceEvent, DeviceRecord, DeviceSource};

use crate::dispatcher::EventDispatcher;

pub(crate) fn record(name: &str, vendor_id: &str, product_id: &str) -> DeviceRecord {
    DeviceRecord::new(name, vendor_id, product_id).unwrap()
}

/// Plays back a fixed sequence of listings; `None` is a failed listing.
///
/// The last entry repeats once the script runs out.
pub(crate) struct ScriptedSource {
    script: Mutex<VecDeque<Option<Vec<DeviceRecord>>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub(crate) fn new(script: Vec<Option<Vec<DeviceRecord>>>) -> Self {
        Self { script: Mutex::new(script.into()), calls: AtomicUsize::new(0) }
    }

    /// Number of listings taken so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DeviceSource for ScriptedSource {
    fn list_devices(&self) -> CoreResult<Vec<DeviceRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let step = if script.len() > 1 {
            script.pop_front().flatten()
        } else {
            script.front().cloned().flatten()
        };
        step.ok_or_else(|| CoreError::CommandIo {
            command: "scripted".to_string(),
            source: std::io::Error::other("scripted failure"),
        })
    }
}

/// Collects every event a dispatcher delivers.
#[derive(Clone, Default)]
pub(crate) struct Recorded {
    inner: Arc<(Mutex<Vec<DeviceEvent>>, Condvar)>,
}

impl Recorded {
    pub(crate) fn snapshot(&self) -> Vec<DeviceEvent> {
        self.inner.0.lock().unwrap().clone()
    }

    /// Wait until at least `count` events arrived, or `timeout` passed.
    pub(crate) fn wait_for(&self, count: usize, timeout: Duration) -> Vec<DeviceEvent> {
        let deadline = Instant::now() + timeout;
        let (events, arrived) = &*self.inner;
        let mut guard = events.lock().unwrap();
        while guard.len() < count {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            guard = arrived.wait_timeout(guard, remaining).unwrap().0;
        }
        guard.clone()
    }

    fn push(&self, event: &DeviceEvent) {
        let (events, arrived) = &*self.inner;
        events.lock().unwrap().push(event.clone());
        arrived.notify_all();
    }
}

/// Handler closure feeding a [`Recorded`].
pub(crate) fn handler(recorded: &Recorded) -> impl FnMut(&DeviceEvent) + Send + 'static {
    let sink = recorded.clone();
    move |event: &DeviceEvent| sink.push(event)
}

pub(crate) fn recorder() -> (EventDispatcher, Recorded) {
    let recorded = Recorded::default();
    let dispatcher = EventDispatcher::new(Box::new(handler(&recorded)));
    (dispatcher, recorded)
}

/// Raises a flag when dropped, i.e. when whoever owns it is torn down.
pub(crate) struct DropFlag(Arc<AtomicBool>);

impl DropFlag {
    pub(crate) fn new() -> (Self, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (Self(Arc::clone(&flag)), flag)
    }
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
