//! usbwatch core - USB device records and enumeration parsing.
//!
//! This crate contains the platform-independent pieces shared by the
//! monitor and the daemon:
//! - The normalized [`DeviceRecord`] and [`DeviceEvent`] types
//! - Platform detection and the per-platform enumeration command
//! - One output grammar per platform (`ioreg`, `lsusb`, `wmic`)
//! - The [`Collector`] that runs the command and parses its output
//! - Snapshot diffing and notification debouncing

pub mod collector;
pub mod debounce;
pub mod device;
pub mod diff;
pub mod error;
pub mod parse;
pub mod platform;

pub use collector::{Collector, CollectorConfig, CommandRunner, DeviceSource, ShellRunner};
pub use debounce::Debouncer;
pub use device::{DeviceEvent, DeviceEventKind, DeviceKey, DeviceRecord, PartialDevice};
pub use diff::{SnapshotDiff, diff_snapshots};
pub use error::{CoreError, CoreResult};
pub use parse::Parser;
pub use platform::Platform;
