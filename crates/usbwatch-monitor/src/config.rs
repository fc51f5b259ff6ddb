//! Monitor timing settings.

use std::time::Duration;

/// Timing knobs shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Interval between listings for the polling backend
    pub poll_interval: Duration,
    /// Run-loop slice for native notifications before the stop flag is rechecked
    pub native_poll_timeout: Duration,
    /// Wait on the kernel event socket before the stop flag is rechecked
    pub kernel_poll_timeout: Duration,
    /// Duplicate-notification window for native notifications
    pub debounce_window: Duration,
    /// Use the polling backend regardless of platform
    pub force_polling: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            native_poll_timeout: Duration::from_millis(100),
            kernel_poll_timeout: Duration::from_secs(1),
            debounce_window: Duration::from_millis(300),
            force_polling: false,
        }
    }
}
