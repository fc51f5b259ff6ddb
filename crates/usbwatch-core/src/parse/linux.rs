//! Grammar for `lsusb -v` output.
//!
//! Every device starts with a header line, optionally followed by indented
//! descriptor detail lines:
//!
//! ```text
//! Bus 003 Device 037: ID 18d1:4ee7 Google Inc. Widget
//!   iProduct                2 Widget
//!   iSerial                 3 ABC123
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::device::{DeviceRecord, PartialDevice};

static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Bus (\S+) Device (\S+): ID ([^:\s]+):(\S+)(?:\s+(.*))?$")
        .expect("lsusb header pattern is valid")
});

const SERIAL_LABEL: &str = "iSerial";
const PRODUCT_LABEL: &str = "iProduct";
const ID_LEN: usize = 4;

/// Parse `lsusb` output into device records.
#[must_use]
pub fn parse(output: &str) -> Vec<DeviceRecord> {
    let mut devices = Vec::new();
    let mut current: Option<PartialDevice> = None;

    for line in output.lines() {
        let line = line.trim_end();

        if let Some(header) = parse_header(line) {
            super::flush(current.replace(header), &mut devices);
            continue;
        }

        let Some(device) = current.as_mut() else {
            continue;
        };

        if line.contains(SERIAL_LABEL) {
            if let Some(serial) = line.split_whitespace().nth(2) {
                device.serial_number = Some(serial.to_string());
            }
        } else if line.contains(PRODUCT_LABEL) {
            let product: Vec<&str> = line.split_whitespace().skip(2).collect();
            if !product.is_empty() {
                device.product_name = Some(product.join(" "));
            }
        }
    }

    super::flush(current, &mut devices);
    devices
}

/// Start a new device from a `Bus .. Device ..: ID vvvv:pppp name` line.
fn parse_header(line: &str) -> Option<PartialDevice> {
    let captures = HEADER.captures(line)?;
    let bus = &captures[1];
    let device = captures[2].trim_end_matches(':');
    let vendor = &captures[3];
    let product = &captures[4];

    if vendor.len() != ID_LEN || product.len() != ID_LEN {
        return None;
    }

    let name = captures.get(5).map(|m| m.as_str().trim()).filter(|name| !name.is_empty());

    Some(PartialDevice {
        name: name.map(str::to_string),
        vendor_id: Some(vendor.to_ascii_lowercase()),
        product_id: Some(product.to_ascii_lowercase()),
        device_id: Some(format!("{bus}:{device}")),
        ..PartialDevice::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "\
Bus 002 Device 001: ID 1d6b:0003 Linux Foundation 3.0 root hub
Device Descriptor:
  bLength                18
  idVendor           0x1d6b Linux Foundation
  idProduct          0x0003 3.0 root hub
  iManufacturer           3 Linux 6.1.0 xhci-hcd
  iProduct                2 xHCI Host Controller
  iSerial                 1 0000:00:14.0
Couldn't open device, some information will be missing

Bus 003 Device 037: ID 18d1:4ee7 Google Inc. Widget
Device Descriptor:
  iProduct                2 Pixel 7
  iSerial                 3 ABC123
Bus 001 Device 004: ID 046d:c52b
  iSerial                 0
";

    #[test]
    fn test_scenario_header_with_serial() {
        let output = "Bus 003 Device 037: ID 18d1:4ee7 Google Inc. Widget\n  iSerial  3 ABC123\n";
        let devices = parse(output);

        assert_eq!(devices.len(), 1);
        let widget = &devices[0];
        assert_eq!(widget.name(), "Google Inc. Widget");
        assert_eq!(widget.vendor_id(), "18d1");
        assert_eq!(widget.product_id(), "4ee7");
        assert_eq!(widget.device_id(), Some("003:037"));
        assert_eq!(widget.serial_number(), Some("ABC123"));
    }

    #[test]
    fn test_parses_verbose_listing() {
        let devices = parse(SAMPLE);

        // The last header has no name and is dropped.
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].name(), "Linux Foundation 3.0 root hub");
        assert_eq!(devices[0].product_name(), Some("xHCI Host Controller"));
        assert_eq!(devices[0].serial_number(), Some("0000:00:14.0"));
        assert_eq!(devices[1].device_id(), Some("003:037"));
        assert_eq!(devices[1].product_name(), Some("Pixel 7"));
        assert_eq!(devices[1].serial_number(), Some("ABC123"));
    }

    #[test]
    fn test_plain_listing_without_details() {
        let output = "Bus 001 Device 002: ID 8087:0024 Intel Corp. Integrated Rate Matching Hub\nBus 001 Device 003: ID 04f2:b2ea Chicony Electronics Co., Ltd Integrated Camera\n";
        let devices = parse(output);

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].vendor_id(), "04f2");
        assert_eq!(devices[1].serial_number(), None);
    }

    #[test]
    fn test_later_serial_overwrites_earlier() {
        let output = "Bus 001 Device 002: ID aaaa:bbbb Thing\n  iSerial 1 FIRST\n  iSerial 2 SECOND\n";
        let devices = parse(output);

        assert_eq!(devices[0].serial_number(), Some("SECOND"));
    }

    #[test]
    fn test_wrong_id_width_is_not_a_header() {
        let output = "Bus 001 Device 002: ID 123:4567 Short Vendor\n  iSerial 3 LOST\nBus 001 Device 003: ID 1234:5678 Kept\n";
        let devices = parse(output);

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name(), "Kept");
        assert_eq!(devices[0].serial_number(), None);
    }

    #[test]
    fn test_detail_lines_before_any_header_are_ignored() {
        assert!(parse("  iSerial 3 NOBODY\n").is_empty());
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            name in "[A-Za-z0-9][A-Za-z0-9 .,_-]{0,30}",
            bus in 1u16..128,
            address in 1u16..128,
            vendor in any::<u16>(),
            product in any::<u16>(),
        ) {
            let output = format!("Bus {bus:03} Device {address:03}: ID {vendor:04x}:{product:04x} {name}\n");
            let devices = parse(&output);

            prop_assert_eq!(devices.len(), 1);
            prop_assert_eq!(devices[0].name(), name.trim());
            prop_assert_eq!(devices[0].vendor_id(), format!("{vendor:04x}"));
            prop_assert_eq!(devices[0].product_id(), format!("{product:04x}"));
            let expected_id = format!("{bus:03}:{address:03}");
            prop_assert_eq!(devices[0].device_id(), Some(expected_id.as_str()));
        }
    }
}
