//! Grammar for `ioreg -p IOUSB -l` output.
//!
//! The registry dump nests property dictionaries in braces. A device block
//! starts at the first recognized device property and lives at the brace
//! depth where it was seen; it closes when the depth falls below that.
//!
//! ```text
//! +-o Widget@14100000  <class IOUSBHostDevice, ...>
//!   {
//!     "idProduct" = 5
//!     "USB Product Name" = "Widget"
//!     "idVendor" = 1234
//!   }
//! ```

use crate::device::{DeviceRecord, PartialDevice};

const PRODUCT_NAME_KEY: &str = "\"USB Product Name\" = ";
const VENDOR_ID_KEY: &str = "\"idVendor\" = ";
const PRODUCT_ID_KEY: &str = "\"idProduct\" = ";
const SERIAL_NUMBER_KEY: &str = "\"USB Serial Number\" = ";
const LOCATION_ID_KEY: &str = "\"locationID\" = ";

/// Properties that open a device block.
const BLOCK_MARKERS: [&str; 4] =
    [PRODUCT_NAME_KEY, VENDOR_ID_KEY, PRODUCT_ID_KEY, SERIAL_NUMBER_KEY];

struct Block {
    depth: usize,
    device: PartialDevice,
}

/// Parse an IORegistry dump into device records.
#[must_use]
pub fn parse(output: &str) -> Vec<DeviceRecord> {
    let mut devices = Vec::new();
    let mut depth = 0usize;
    let mut active: Option<Block> = None;

    for line in output.lines() {
        depth += line.matches('{').count();

        if BLOCK_MARKERS.iter().any(|marker| line.contains(marker)) {
            let supersede = active.as_ref().is_none_or(|block| block.depth != depth);
            if supersede {
                super::flush(active.take().map(|block| block.device), &mut devices);
                active = Some(Block { depth, device: PartialDevice::default() });
            }
        }

        if let Some(block) = active.as_mut() {
            apply_property(&mut block.device, line);
        }

        depth = depth.saturating_sub(line.matches('}').count());
        if active.as_ref().is_some_and(|block| depth < block.depth) {
            super::flush(active.take().map(|block| block.device), &mut devices);
        }
    }

    super::flush(active.map(|block| block.device), &mut devices);
    devices
}

fn apply_property(device: &mut PartialDevice, line: &str) {
    if line.contains(PRODUCT_NAME_KEY) {
        if let Some(name) = string_value(line) {
            device.product_name = Some(name.clone());
            device.name = Some(name);
        }
    } else if line.contains(VENDOR_ID_KEY) {
        device.vendor_id = id_value(line);
    } else if line.contains(PRODUCT_ID_KEY) {
        device.product_id = id_value(line);
    } else if line.contains(SERIAL_NUMBER_KEY) {
        device.serial_number = string_value(line);
    } else if line.contains(LOCATION_ID_KEY) {
        device.device_id = raw_value(line)
            .and_then(|value| value.parse::<u32>().ok())
            .map(|location| format!("0x{location:08x}"));
    }
}

/// Text after the `" = "` separator.
fn raw_value(line: &str) -> Option<&str> {
    line.split_once(" = ").map(|(_, value)| value.trim())
}

/// Quoted string value, without the quotes.
fn string_value(line: &str) -> Option<String> {
    let value = raw_value(line)?.strip_prefix('"')?;
    let end = value.rfind('"')?;
    Some(value[..end].to_string())
}

/// Decimal id rendered as four lowercase hex digits.
fn id_value(line: &str) -> Option<String> {
    raw_value(line)?.parse::<u16>().ok().map(|id| format!("{id:04x}"))
}
