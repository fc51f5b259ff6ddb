//! Normalized USB device records and the events that carry them.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Name used when a device's properties could not be read.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown USB Device";

/// Vendor/product id used when a device's ids could not be read.
pub const UNKNOWN_ID: &str = "0000";

/// A platform-independent description of one USB device.
///
/// `name`, `vendor_id` and `product_id` are always non-empty. Ids keep the
/// formatting of the platform they came from: bare four-digit lowercase hex
/// on Linux and macOS (`04d2`), `0x`-prefixed on Windows (`0x04d2`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceRecord {
    name: String,
    vendor_id: String,
    product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,
}

impl DeviceRecord {
    /// Create a record from its required fields.
    ///
    /// Returns `None` if any of them is empty.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        vendor_id: impl Into<String>,
        product_id: impl Into<String>,
    ) -> Option<Self> {
        let record = Self {
            name: name.into(),
            vendor_id: vendor_id.into(),
            product_id: product_id.into(),
            product_name: None,
            serial_number: None,
            device_id: None,
        };

        if record.name.is_empty() || record.vendor_id.is_empty() || record.product_id.is_empty() {
            return None;
        }
        Some(record)
    }

    /// Placeholder for a device whose properties could not be read.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            name: UNKNOWN_DEVICE_NAME.to_string(),
            vendor_id: UNKNOWN_ID.to_string(),
            product_id: UNKNOWN_ID.to_string(),
            product_name: None,
            serial_number: None,
            device_id: None,
        }
    }

    #[must_use]
    pub fn with_product_name(mut self, product_name: Option<String>) -> Self {
        self.product_name = product_name;
        self
    }

    #[must_use]
    pub fn with_serial_number(mut self, serial_number: Option<String>) -> Self {
        self.serial_number = serial_number;
        self
    }

    #[must_use]
    pub fn with_device_id(mut self, device_id: Option<String>) -> Self {
        self.device_id = device_id;
        self
    }

    /// Display name of the device.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn vendor_id(&self) -> &str {
        &self.vendor_id
    }

    #[must_use]
    pub fn product_id(&self) -> &str {
        &self.product_id
    }

    #[must_use]
    pub fn product_name(&self) -> Option<&str> {
        self.product_name.as_deref()
    }

    #[must_use]
    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    /// Platform-specific identifier (`bus:device` on Linux, the normalized
    /// PnP id on Windows, the location id on macOS).
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Identity used when comparing snapshots.
    #[must_use]
    pub fn key(&self) -> DeviceKey<'_> {
        DeviceKey { vendor_id: &self.vendor_id, product_id: &self.product_id, name: &self.name }
    }

    /// Whether two records describe the same device.
    ///
    /// Only vendor id, product id and name take part; two units of the same
    /// model are indistinguishable here even if their serials differ.
    #[must_use]
    pub fn same_device(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.vendor_id, self.product_id, self.name)?;
        if let Some(serial) = &self.serial_number {
            write!(f, " [{serial}]")?;
        }
        Ok(())
    }
}

/// Borrowed identity of a [`DeviceRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceKey<'a> {
    pub vendor_id: &'a str,
    pub product_id: &'a str,
    pub name: &'a str,
}

/// A device under construction by one of the output grammars.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialDevice {
    pub name: Option<String>,
    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub serial_number: Option<String>,
    pub device_id: Option<String>,
}

impl PartialDevice {
    /// Whether name, vendor id and product id are all present and non-empty.
    #[must_use]
    pub fn has_required_fields(&self) -> bool {
        [&self.name, &self.vendor_id, &self.product_id]
            .iter()
            .all(|field| field.as_deref().is_some_and(|value| !value.is_empty()))
    }

    /// Whether no field has been set yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Finish the device, or `None` if a required field is missing.
    #[must_use]
    pub fn build(self) -> Option<DeviceRecord> {
        let record = DeviceRecord::new(self.name?, self.vendor_id?, self.product_id?)?;
        Some(
            record
                .with_product_name(self.product_name)
                .with_serial_number(self.serial_number)
                .with_device_id(self.device_id),
        )
    }
}

/// What happened to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceEventKind {
    Connected,
    Disconnected,
    Error,
}

impl fmt::Display for DeviceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        };
        f.pad(label)
    }
}

/// A single change reported by a monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub kind: DeviceEventKind,
    /// Absent for `Error` events.
    pub device: Option<DeviceRecord>,
    /// Human-readable cause for `Error` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: SystemTime,
}

impl DeviceEvent {
    #[must_use]
    pub fn connected(device: DeviceRecord) -> Self {
        Self::with_device(DeviceEventKind::Connected, device)
    }

    #[must_use]
    pub fn disconnected(device: DeviceRecord) -> Self {
        Self::with_device(DeviceEventKind::Disconnected, device)
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: DeviceEventKind::Error,
            device: None,
            message: Some(message.into()),
            timestamp: SystemTime::now(),
        }
    }

    fn with_device(kind: DeviceEventKind, device: DeviceRecord) -> Self {
        Self { kind, device: Some(device), message: None, timestamp: SystemTime::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> DeviceRecord {
        DeviceRecord::new("Widget", "04d2", "0005").expect("complete record")
    }

    #[test]
    fn test_new_rejects_empty_required_fields() {
        assert!(DeviceRecord::new("", "04d2", "0005").is_none());
        assert!(DeviceRecord::new("Widget", "", "0005").is_none());
        assert!(DeviceRecord::new("Widget", "04d2", "").is_none());
    }

    #[test]
    fn test_same_device_ignores_serial_and_device_id() {
        let a = widget().with_serial_number(Some("A".into())).with_device_id(Some("1:2".into()));
        let b = widget().with_serial_number(Some("B".into()));

        assert!(a.same_device(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_same_device_requires_matching_name() {
        let other = DeviceRecord::new("Gadget", "04d2", "0005").unwrap();
        assert!(!widget().same_device(&other));
    }

    #[test]
    fn test_unknown_record() {
        let unknown = DeviceRecord::unknown();
        assert_eq!(unknown.name(), "Unknown USB Device");
        assert_eq!(unknown.vendor_id(), "0000");
        assert_eq!(unknown.product_id(), "0000");
    }

    #[test]
    fn test_partial_device_build() {
        let mut partial = PartialDevice::default();
        assert!(partial.is_empty());
        assert!(partial.clone().build().is_none());

        partial.name = Some("Widget".into());
        partial.vendor_id = Some("04d2".into());
        assert!(!partial.has_required_fields());

        partial.product_id = Some("0005".into());
        partial.serial_number = Some("SERIAL1".into());
        let record = partial.build().unwrap();
        assert_eq!(record.serial_number(), Some("SERIAL1"));
    }

    #[test]
    fn test_partial_device_rejects_empty_name() {
        let partial = PartialDevice {
            name: Some(String::new()),
            vendor_id: Some("04d2".into()),
            product_id: Some("0005".into()),
            ..PartialDevice::default()
        };
        assert!(!partial.has_required_fields());
        assert!(partial.build().is_none());
    }

    #[test]
    fn test_display() {
        let record = widget().with_serial_number(Some("XYZ".into()));
        assert_eq!(record.to_string(), "04d2:0005 Widget [XYZ]");
    }

    #[test]
    fn test_event_serializes_snake_case_kind() {
        let event = DeviceEvent::connected(widget());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "connected");
        assert_eq!(json["device"]["vendor_id"], "04d2");
        assert!(json.get("message").is_none());
    }
}
