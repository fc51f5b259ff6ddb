//! Suppression of duplicate native notifications.
//!
//! Some notification subsystems report one physical plug or unplug as more
//! than one matched/terminated batch. A batch arriving within the window of
//! the last emitted connect or disconnect is drained without producing events.

use std::time::{Duration, Instant};

use crate::device::DeviceEventKind;

/// Debounce state for one monitor.
#[derive(Debug, Clone)]
pub struct Debouncer {
    last_connect: Option<Instant>,
    last_disconnect: Option<Instant>,
    window: Duration,
    /// False until the initial drain of pre-existing devices is done
    settled: bool,
}

impl Debouncer {
    /// Create an unsettled debouncer with the given window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self { last_connect: None, last_disconnect: None, window, settled: false }
    }

    /// Mark the initial drain as finished; batches may produce events from now on.
    pub fn settle(&mut self) {
        self.settled = true;
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide whether a batch of `kind` notifications seen at `now` may emit events.
    ///
    /// Admitted batches record `now` as the last time of their kind.
    pub fn admit(&mut self, kind: DeviceEventKind, now: Instant) -> bool {
        if !self.settled || self.within_window(now) {
            return false;
        }

        match kind {
            DeviceEventKind::Connected => self.last_connect = Some(now),
            DeviceEventKind::Disconnected => self.last_disconnect = Some(now),
            DeviceEventKind::Error => {}
        }
        true
    }

    fn within_window(&self, now: Instant) -> bool {
        [self.last_connect, self.last_disconnect]
            .into_iter()
            .flatten()
            .any(|last| now.saturating_duration_since(last) < self.window)
    }
}
