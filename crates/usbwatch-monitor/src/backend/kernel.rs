//! Linux hot-plug events from the udev netlink socket.

use std::ffi::OsStr;
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, info, warn};
use udev::{EventType, MonitorBuilder, MonitorSocket};
use usbwatch_core::device::{UNKNOWN_DEVICE_NAME, UNKNOWN_ID};
use usbwatch_core::{DeviceEventKind, DeviceRecord};

use crate::backend::{spawn_worker, Readiness};
use crate::dispatcher::EventDispatcher;
use crate::error::{MonitorError, MonitorResult};

/// Pause after a failed `poll(2)` so a persistent failure does not spin.
const POLL_ERROR_BACKOFF: Duration = Duration::from_millis(200);

fn open_socket() -> std::io::Result<MonitorSocket> {
    MonitorBuilder::new()?
        .match_subsystem_devtype("usb", "usb_device")?
        .listen()
}

/// Start the udev worker. Returns once the socket is open, or with
/// [`MonitorError::SubsystemUnavailable`] if it could not be opened.
pub(crate) fn spawn(
    mut dispatcher: EventDispatcher,
    timeout: Duration,
    should_stop: Arc<AtomicBool>,
) -> MonitorResult<JoinHandle<()>> {
    spawn_worker("usbwatch-udev", move |ready: Readiness| {
        // The socket is not Send; it lives and dies on this thread.
        let socket = match open_socket() {
            Ok(socket) => socket,
            Err(e) => {
                ready.failed(MonitorError::SubsystemUnavailable(format!(
                    "cannot open udev monitor socket: {e}"
                )));
                return;
            }
        };
        info!("udev USB monitor started");
        ready.ready();

        run(&socket, &mut dispatcher, timeout, &should_stop);
        info!(delivered = dispatcher.delivered(), "udev USB monitor stopped");
    })
}

fn run(
    socket: &MonitorSocket,
    dispatcher: &mut EventDispatcher,
    timeout: Duration,
    should_stop: &AtomicBool,
) {
    let timeout = PollTimeout::try_from(timeout).unwrap_or(PollTimeout::MAX);

    while !should_stop.load(Ordering::Acquire) {
        let mut fds = [PollFd::new(socket.as_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, timeout) {
            Ok(0) | Err(Errno::EINTR) => continue,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Waiting on udev socket failed");
                dispatcher.error(format!("udev poll failed: {e}"));
                std::thread::sleep(POLL_ERROR_BACKOFF);
                continue;
            }
        }

        for event in socket.iter() {
            let kind = match event.event_type() {
                EventType::Add => DeviceEventKind::Connected,
                EventType::Remove => DeviceEventKind::Disconnected,
                other => {
                    debug!(action = %other, sysname = ?event.sysname(), "Ignoring udev event");
                    continue;
                }
            };
            let device = UeventFields::from_device(&event.device()).into_record();
            dispatcher.device_event(kind, device);
        }
    }
}

/// The udev attributes and properties a record is built from.
#[derive(Debug, Default)]
struct UeventFields {
    product: Option<String>,
    id_vendor: Option<String>,
    id_product: Option<String>,
    serial: Option<String>,
    model: Option<String>,
    model_vendor_id: Option<String>,
    model_product_id: Option<String>,
    product_property: Option<String>,
    serial_short: Option<String>,
    sysname: Option<String>,
}

impl UeventFields {
    fn from_device(device: &udev::Device) -> Self {
        Self {
            product: text(device.attribute_value("product")),
            id_vendor: text(device.attribute_value("idVendor")),
            id_product: text(device.attribute_value("idProduct")),
            serial: text(device.attribute_value("serial")),
            model: text(device.property_value("ID_MODEL")),
            model_vendor_id: text(device.property_value("ID_VENDOR_ID")),
            model_product_id: text(device.property_value("ID_MODEL_ID")),
            product_property: text(device.property_value("PRODUCT")),
            serial_short: text(device.property_value("ID_SERIAL_SHORT")),
            sysname: text(Some(device.sysname())),
        }
    }

    /// Sysfs attributes first, then uevent properties (the only thing left
    /// on `remove`), then placeholders.
    fn into_record(self) -> DeviceRecord {
        let (product_vendor, product_product) = self
            .product_property
            .as_deref()
            .and_then(parse_product_property)
            .unzip();

        let name = self
            .product
            .or_else(|| self.model.map(|model| model.replace('_', " ")))
            .unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string());
        let vendor_id = self
            .id_vendor
            .or(self.model_vendor_id)
            .or(product_vendor)
            .unwrap_or_else(|| UNKNOWN_ID.to_string());
        let product_id = self
            .id_product
            .or(self.model_product_id)
            .or(product_product)
            .unwrap_or_else(|| UNKNOWN_ID.to_string());

        DeviceRecord::new(name, vendor_id.to_lowercase(), product_id.to_lowercase())
            .unwrap_or_else(DeviceRecord::unknown)
            .with_serial_number(self.serial.or(self.serial_short))
            .with_device_id(self.sysname)
    }
}

fn text(value: Option<&OsStr>) -> Option<String> {
    value
        .map(|value| value.to_string_lossy().trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Split a `PRODUCT=vid/pid/bcd` uevent value into 4-digit vendor and product ids.
fn parse_product_property(value: &str) -> Option<(String, String)> {
    let mut parts = value.split('/');
    let vendor = u16::from_str_radix(parts.next()?, 16).ok()?;
    let product = u16::from_str_radix(parts.next()?, 16).ok()?;
    Some((format!("{vendor:04x}"), format!("{product:04x}")))
}
