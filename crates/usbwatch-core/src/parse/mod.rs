//! Enumeration output grammars.
//!
//! Each platform prints USB devices differently. The grammars here turn that
//! text into [`DeviceRecord`]s in order of appearance. They never fail:
//! a device block that is malformed or misses a required field is dropped.

pub mod linux;
pub mod mac;
pub mod windows;

use crate::device::{DeviceRecord, PartialDevice};
use crate::platform::Platform;

/// Grammar selection, fixed once per platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parser {
    /// `ioreg -l` registry dump
    Mac,
    /// `lsusb -v`
    Linux,
    /// `wmic ... /format:list`
    Windows,
    /// Unsupported platform, always yields nothing
    Empty,
}

impl Parser {
    /// Grammar for the given platform.
    #[must_use]
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Mac => Self::Mac,
            Platform::Linux => Self::Linux,
            Platform::Windows => Self::Windows,
            Platform::Unknown => Self::Empty,
        }
    }

    /// Parse raw command output.
    #[must_use]
    pub fn parse(self, output: &str) -> Vec<DeviceRecord> {
        match self {
            Self::Mac => mac::parse(output),
            Self::Linux => linux::parse(output),
            Self::Windows => windows::parse(output),
            Self::Empty => Vec::new(),
        }
    }
}

/// Emit a finished device if it satisfies the required-fields predicate.
fn flush(device: Option<PartialDevice>, devices: &mut Vec<DeviceRecord>) {
    if let Some(record) = device.and_then(PartialDevice::build) {
        devices.push(record);
    }
}
