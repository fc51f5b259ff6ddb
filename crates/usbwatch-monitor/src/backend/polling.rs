//! Snapshot-diffing backend for platforms without a usable event source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use usbwatch_core::{diff_snapshots, DeviceRecord, DeviceSource};

use crate::backend::{spawn_worker, Readiness};
use crate::dispatcher::EventDispatcher;
use crate::error::MonitorResult;

/// Longest sleep between checks of the stop flag.
const STOP_CHECK_SLICE: Duration = Duration::from_millis(50);

/// One polling cycle's worth of state. Owned by the worker thread.
pub(crate) struct PollingLoop {
    source: Arc<dyn DeviceSource>,
    interval: Duration,
    previous: Option<Vec<DeviceRecord>>,
    dispatcher: EventDispatcher,
}

impl PollingLoop {
    pub(crate) fn new(
        source: Arc<dyn DeviceSource>,
        interval: Duration,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self { source, interval, previous: None, dispatcher }
    }

    /// Take the initial snapshot. Devices present at start are not reported.
    fn prime(&mut self) {
        match self.source.list_devices() {
            Ok(devices) => {
                debug!(count = devices.len(), "Initial USB snapshot taken");
                self.previous = Some(devices);
            }
            Err(e) => {
                warn!(error = %e, "Initial USB listing failed; baseline deferred");
                self.dispatcher.error(format!("device listing failed: {e}"));
            }
        }
    }

    /// List once, emit the difference against the previous snapshot, then replace it.
    pub(crate) fn poll_once(&mut self) {
        let current = match self.source.list_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "USB listing failed during polling cycle");
                self.dispatcher.error(format!("device listing failed: {e}"));
                return;
            }
        };

        let Some(previous) = self.previous.as_deref() else {
            debug!(count = current.len(), "USB baseline established");
            self.previous = Some(current);
            return;
        };

        let diff = diff_snapshots(previous, &current);
        if !diff.is_empty() {
            debug!(
                connected = diff.connected.len(),
                disconnected = diff.disconnected.len(),
                "USB snapshot changed"
            );
        }
        for device in diff.connected {
            self.dispatcher.connected(device);
        }
        for device in diff.disconnected {
            self.dispatcher.disconnected(device);
        }

        self.previous = Some(current);
    }

    fn run(mut self, should_stop: &AtomicBool) {
        while !should_stop.load(Ordering::Acquire) {
            self.poll_once();
            sleep_unless_stopped(self.interval, should_stop);
        }
        info!(delivered = self.dispatcher.delivered(), "USB polling loop stopped");
    }
}

/// Sleep for `total`, waking early once `should_stop` is set.
fn sleep_unless_stopped(total: Duration, should_stop: &AtomicBool) {
    let deadline = Instant::now() + total;
    loop {
        if should_stop.load(Ordering::Acquire) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(STOP_CHECK_SLICE));
    }
}

/// Start the polling worker. Returns once the baseline snapshot has been attempted.
pub(crate) fn spawn(
    mut polling: PollingLoop,
    should_stop: Arc<AtomicBool>,
) -> MonitorResult<JoinHandle<()>> {
    spawn_worker("usbwatch-poll", move |ready: Readiness| {
        polling.prime();
        info!(interval_ms = polling.interval.as_millis(), "USB polling loop started");
        ready.ready();
        sleep_unless_stopped(polling.interval, &should_stop);
        polling.run(&should_stop);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record, recorder, ScriptedSource};
    use usbwatch_core::DeviceEventKind;

    fn widget() -> DeviceRecord {
        record("Widget", "04d2", "0005")
    }

    fn keyboard() -> DeviceRecord {
        record("Keyboard", "046d", "c31c")
    }

    #[test]
    fn test_poll_emits_connect_and_disconnect_from_diff() {
        let source = ScriptedSource::new(vec![
            Some(vec![keyboard()]),
            Some(vec![widget()]),
        ]);
        let (dispatcher, events) = recorder();
        let mut polling = PollingLoop::new(Arc::new(source), Duration::from_millis(10), dispatcher);

        polling.prime();
        polling.poll_once();

        let events = events.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, DeviceEventKind::Connected);
        assert_eq!(events[0].device.as_ref(), Some(&widget()));
        assert_eq!(events[1].kind, DeviceEventKind::Disconnected);
        assert_eq!(events[1].device.as_ref(), Some(&keyboard()));
    }

    #[test]
    fn test_unchanged_snapshot_emits_nothing() {
        let source = ScriptedSource::new(vec![Some(vec![widget()])]);
        let (dispatcher, events) = recorder();
        let mut polling = PollingLoop::new(Arc::new(source), Duration::from_millis(10), dispatcher);

        polling.prime();
        polling.poll_once();
        polling.poll_once();

        assert!(events.snapshot().is_empty());
    }

    #[test]
    fn test_failed_listing_emits_error_and_keeps_snapshot() {
        let source = ScriptedSource::new(vec![
            Some(vec![widget()]),
            None,
            Some(vec![widget(), keyboard()]),
        ]);
        let (dispatcher, events) = recorder();
        let mut polling = PollingLoop::new(Arc::new(source), Duration::from_millis(10), dispatcher);

        polling.prime();
        polling.poll_once();
        polling.poll_once();

        let events = events.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, DeviceEventKind::Error);
        assert!(events[0].device.is_none());
        assert_eq!(events[1].kind, DeviceEventKind::Connected);
        assert_eq!(events[1].device.as_ref(), Some(&keyboard()));
    }

    #[test]
    fn test_failed_prime_defers_baseline() {
        let source = ScriptedSource::new(vec![None, Some(vec![widget()]), Some(vec![widget()])]);
        let (dispatcher, events) = recorder();
        let mut polling = PollingLoop::new(Arc::new(source), Duration::from_millis(10), dispatcher);

        polling.prime();
        polling.poll_once();
        polling.poll_once();

        let kinds: Vec<_> = events.snapshot().iter().map(|event| event.kind).collect();
        assert_eq!(kinds, vec![DeviceEventKind::Error]);
    }

    #[test]
    fn test_sleep_returns_early_when_stopped() {
        let should_stop = AtomicBool::new(true);
        let started = Instant::now();

        sleep_unless_stopped(Duration::from_secs(5), &should_stop);

        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
