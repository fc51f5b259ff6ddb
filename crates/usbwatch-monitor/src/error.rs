//! Monitor error types.

use thiserror::Error;
use usbwatch_core::{CoreError, Platform};

/// Errors returned by [`crate::DeviceMonitor::start`].
///
/// All of them are fatal to that call; nothing acquired by it is left behind.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Monitor is already running")]
    AlreadyRunning,

    #[error("Monitor has been shut down")]
    ShutDown,

    #[error("USB monitoring is not supported on platform '{0}'")]
    PlatformNotSupported(Platform),

    #[error("Device notification subsystem unavailable: {0}")]
    SubsystemUnavailable(String),

    #[error("Failed to spawn monitor thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("Monitor thread exited before reporting readiness")]
    WorkerPanicked,

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for monitor operations.
pub type MonitorResult<T> = Result<T, MonitorError>;
