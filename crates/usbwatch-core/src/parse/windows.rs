//! Grammar for `wmic ... get /format:list` output.
//!
//! Each device is a group of `Key=Value` lines. Properties are listed in
//! alphabetical order, so every group begins with `Availability=`; that line
//! is what separates groups, not the blank lines WMIC scatters around.

use crate::device::{DeviceRecord, PartialDevice};

const GROUP_MARKER: &str = "Availability";
const VENDOR_MARKER: &str = "VID_";
const PRODUCT_MARKER: &str = "PID_";
const ID_LEN: usize = 4;

/// Parse WMIC list output into device records.
#[must_use]
pub fn parse(output: &str) -> Vec<DeviceRecord> {
    let mut devices = Vec::new();
    let mut current: Option<PartialDevice> = None;

    for line in output.lines() {
        let line = line.trim();

        if line.starts_with(GROUP_MARKER) {
            super::flush(current.take().filter(|device| !device.is_empty()), &mut devices);
            current = Some(PartialDevice::default());
            continue;
        }

        let Some(device) = current.as_mut() else {
            continue;
        };

        if let Some(name) = line.strip_prefix("Name=") {
            device.name = non_empty(name);
        } else if let Some(description) = line.strip_prefix("Description=") {
            device.product_name = non_empty(description);
        } else if let Some(device_id) = line.strip_prefix("DeviceID=") {
            apply_device_id(device, device_id);
        }
    }

    super::flush(current.filter(|device| !device.is_empty()), &mut devices);
    devices
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Pull vendor, product and serial out of a PnP id such as
/// `USB\VID_04D2&PID_0005\SERIAL1`.
fn apply_device_id(device: &mut PartialDevice, raw: &str) {
    let decoded = raw.replace("&amp;", "&");

    device.vendor_id = hex_after(&decoded, VENDOR_MARKER).map(|(id, _)| id);
    if let Some((product_id, end)) = hex_after(&decoded, PRODUCT_MARKER) {
        device.product_id = Some(product_id);
        // Best effort: only a plain `\SERIAL` tail is a serial, composite
        // interfaces (`&MI_00\...`) and generated instance ids carry `&`.
        if let Some(serial) = decoded[end..].strip_prefix('\\')
            && !serial.is_empty()
            && !serial.contains('&')
        {
            device.serial_number = Some(serial.to_string());
        }
    }

    let normalized = decoded.strip_prefix("USB\\").unwrap_or(&decoded);
    device.device_id = non_empty(normalized);
}

/// The four hex digits following `marker`, as `0x`-prefixed lowercase, plus
/// the byte offset just past them.
fn hex_after(value: &str, marker: &str) -> Option<(String, usize)> {
    let start = value.find(marker)? + marker.len();
    let digits = value.get(start..start + ID_LEN)?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some((format!("0x{}", digits.to_ascii_lowercase()), start + ID_LEN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SAMPLE: &str = "\r\r\n\r\r\nAvailability=\r\r\nCaption=USB Composite Device\r\r\nDescription=USB Composite Device\r\r\nDeviceID=USB\\VID_046D&amp;PID_C52B\\5&amp;2A2B3C4D&amp;0&amp;2\r\r\nName=USB Composite Device\r\r\nPNPDeviceID=USB\\VID_046D&amp;PID_C52B\\5&amp;2A2B3C4D&amp;0&amp;2\r\r\n\r\r\n\r\r\nAvailability=\r\r\nCaption=Widget\r\r\nDescription=Widget Storage\r\r\nDeviceID=USB\\VID_04D2&amp;PID_0005\\SERIAL1\r\r\nName=Widget\r\r\n\r\r\n";

    #[test]
    fn test_scenario_widget_with_serial() {
        let output = "Availability=\nDeviceID=USB\\VID_04D2&PID_0005\\SERIAL1\nName=Widget\n";
        let devices = parse(output);

        assert_eq!(devices.len(), 1);
        let widget = &devices[0];
        assert_eq!(widget.name(), "Widget");
        assert_eq!(widget.vendor_id(), "0x04d2");
        assert_eq!(widget.product_id(), "0x0005");
        assert_eq!(widget.serial_number(), Some("SERIAL1"));
        assert_eq!(widget.device_id(), Some("VID_04D2&PID_0005\\SERIAL1"));
    }

    #[test]
    fn test_parses_wmic_output_with_entities_and_crlf() {
        let devices = parse(SAMPLE);

        assert_eq!(devices.len(), 2);

        let composite = &devices[0];
        assert_eq!(composite.vendor_id(), "0x046d");
        assert_eq!(composite.product_id(), "0xc52b");
        assert_eq!(composite.serial_number(), None);
        assert_eq!(composite.device_id(), Some("VID_046D&PID_C52B\\5&2A2B3C4D&0&2"));

        assert_eq!(devices[1].name(), "Widget");
        assert_eq!(devices[1].product_name(), Some("Widget Storage"));
        assert_eq!(devices[1].serial_number(), Some("SERIAL1"));
    }

    #[test]
    fn test_composite_interface_has_no_serial() {
        let output = "Availability=\nDeviceID=USB\\VID_1234&PID_ABCD&MI_00\\6&1F&0&0000\nName=Interface\n";
        let devices = parse(output);

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].product_id(), "0xabcd");
        assert_eq!(devices[0].serial_number(), None);
    }

    #[test]
    fn test_group_without_ids_is_dropped() {
        let output = "Availability=\nDeviceID=ROOT\\HUB\\0000\nName=Root Hub\nAvailability=\nDeviceID=USB\\VID_0001&PID_0002\\X\nName=Kept\n";
        let devices = parse(output);

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name(), "Kept");
    }

    #[test]
    fn test_group_without_name_is_dropped() {
        let output = "Availability=\nDeviceID=USB\\VID_0001&PID_0002\\X\nName=\n";
        assert!(parse(output).is_empty());
    }

    #[test]
    fn test_short_hex_is_rejected() {
        let output = "Availability=\nDeviceID=USB\\VID_12&PID_0002\nName=Short\n";
        assert!(parse(output).is_empty());
    }

    #[test]
    fn test_lines_before_first_group_are_ignored() {
        let output = "Name=Orphan\nDeviceID=USB\\VID_0001&PID_0002\n";
        assert!(parse(output).is_empty());
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            name in "[A-Za-z0-9][A-Za-z0-9 ()._-]{0,30}",
            vendor in any::<u16>(),
            product in any::<u16>(),
        ) {
            let output = format!(
                "\r\nAvailability=\r\nDeviceID=USB\\VID_{vendor:04X}&amp;PID_{product:04X}\\SN0001\r\nName={name}\r\n"
            );
            let devices = parse(&output);

            prop_assert_eq!(devices.len(), 1);
            prop_assert_eq!(devices[0].name(), name.trim());
            prop_assert_eq!(devices[0].vendor_id(), format!("0x{vendor:04x}"));
            prop_assert_eq!(devices[0].product_id(), format!("0x{product:04x}"));
        }
    }
}
