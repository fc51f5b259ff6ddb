//! usbwatch monitor - live USB connect/disconnect events.
//!
//! This crate turns each platform's notion of "a USB device changed" into
//! one event stream:
//! - macOS: IOKit matched/terminated notifications, serviced cooperatively
//!   on the thread that calls [`DeviceMonitor::start`]
//! - Linux: udev kernel events read on a dedicated worker thread
//! - Windows: periodic re-listing through the collector, diffed per cycle

mod backend;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod monitor;
pub mod state;

#[cfg(test)]
mod test_support;

pub use config::MonitorConfig;
pub use dispatcher::{EventDispatcher, EventHandler};
pub use error::{MonitorError, MonitorResult};
pub use monitor::{DeviceMonitor, Strategy};
pub use state::MonitorState;
