//! Monitor lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a [`crate::DeviceMonitor`] is in its lifecycle.
///
/// `Stopped -> Starting -> Running -> Stopping -> Stopped`. A failed start
/// goes straight from `Starting` back to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    #[default]
    Stopped,
    /// Acquiring platform resources
    Starting,
    /// Delivering events
    Running,
    /// Waiting for the event loop to exit
    Stopping,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        };
        f.write_str(label)
    }
}
