//! macOS hot-plug notifications from IOKit.
//!
//! Matched and terminated notifications for `IOUSBDevice` are delivered on
//! the run loop of the thread that opened the session. The session must be
//! serviced and dropped on that same thread.

#![allow(unsafe_code)]

use std::cell::RefCell;
use std::ffi::{c_char, c_void};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use core_foundation::base::{CFType, TCFType};
use core_foundation::number::CFNumber;
use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop, CFRunLoopSource};
use core_foundation::string::CFString;
use io_kit_sys::keys::{kIOFirstMatchNotification, kIOTerminatedNotification};
use io_kit_sys::ret::kIOReturnSuccess;
use io_kit_sys::types::{io_iterator_t, io_object_t, IO_OBJECT_NULL};
use io_kit_sys::{
    kIOMasterPortDefault, IOIteratorNext, IONotificationPortCreate, IONotificationPortDestroy,
    IONotificationPortGetRunLoopSource, IONotificationPortRef, IOObjectRelease,
    IORegistryEntryCreateCFProperty, IOServiceAddMatchingNotification, IOServiceMatching,
};
use tracing::{debug, info};
use usbwatch_core::device::UNKNOWN_DEVICE_NAME;
use usbwatch_core::{Debouncer, DeviceEventKind, DeviceRecord};

use crate::config::MonitorConfig;
use crate::dispatcher::EventDispatcher;
use crate::error::{MonitorError, MonitorResult};

/// State touched by notification callbacks.
struct Shared {
    debouncer: Debouncer,
    dispatcher: EventDispatcher,
}

/// Handler registered with one subscription; passed to IOKit as the refcon.
struct NotificationContext {
    kind: DeviceEventKind,
    shared: Rc<RefCell<Shared>>,
}

impl NotificationContext {
    /// Drain one notification batch, releasing every service in it.
    fn handle(&self, iterator: io_iterator_t) {
        let services = drain(iterator);
        if services.is_empty() {
            return;
        }

        let mut shared = self.shared.borrow_mut();
        if !shared.debouncer.admit(self.kind, Instant::now()) {
            debug!(
                kind = %self.kind,
                count = services.len(),
                settled = shared.debouncer.is_settled(),
                "Suppressed IOKit notification batch"
            );
            return;
        }

        for service in &services {
            shared.dispatcher.device_event(self.kind, service.record());
        }
    }
}

/// Callback trampoline for `IOServiceAddMatchingNotification`.
unsafe extern "C" fn on_notification(refcon: *mut c_void, iterator: io_iterator_t) {
    // SAFETY: refcon points at a NotificationContext boxed by `subscribe`,
    // which stays alive until after the notification port is destroyed.
    let context = unsafe { &*refcon.cast::<NotificationContext>() };
    context.handle(iterator);
}

/// An IOKit service reference, released on drop.
struct Service(io_object_t);

impl Service {
    fn record(&self) -> DeviceRecord {
        record_from_properties(
            self.string_property("USB Product Name"),
            self.number_property("idVendor"),
            self.number_property("idProduct"),
            self.string_property("USB Serial Number"),
            self.number_property("locationID"),
        )
    }

    fn property(&self, key: &str) -> Option<CFType> {
        let key = CFString::new(key);
        // SAFETY: self.0 is a live registry entry; a null allocator selects the default.
        let raw = unsafe {
            IORegistryEntryCreateCFProperty(self.0, key.as_concrete_TypeRef(), std::ptr::null(), 0)
        };
        if raw.is_null() {
            return None;
        }
        // SAFETY: the Create rule hands us the only reference.
        Some(unsafe { CFType::wrap_under_create_rule(raw) })
    }

    fn string_property(&self, key: &str) -> Option<String> {
        self.property(key)?.downcast::<CFString>().map(|value| value.to_string())
    }

    fn number_property(&self, key: &str) -> Option<i64> {
        self.property(key)?.downcast::<CFNumber>()?.to_i64()
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        // SAFETY: the reference came from IOIteratorNext and is released once.
        unsafe {
            IOObjectRelease(self.0);
        }
    }
}

fn drain(iterator: io_iterator_t) -> Vec<Service> {
    std::iter::from_fn(|| {
        // SAFETY: iterator is a live notification iterator owned by the session.
        let service = unsafe { IOIteratorNext(iterator) };
        (service != IO_OBJECT_NULL).then_some(Service(service))
    })
    .collect()
}

/// Build a record from raw registry values, falling back to the unknown
/// device when the ids cannot be read.
fn record_from_properties(
    product_name: Option<String>,
    vendor_id: Option<i64>,
    product_id: Option<i64>,
    serial_number: Option<String>,
    location_id: Option<i64>,
) -> DeviceRecord {
    let (Some(vendor_id), Some(product_id)) = (vendor_id, product_id) else {
        return DeviceRecord::unknown();
    };
    let name = product_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_DEVICE_NAME.to_string());

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (vendor_id, product_id) = (vendor_id as u16, product_id as u16);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let device_id = location_id.map(|location| format!("0x{:08x}", location as u32));

    DeviceRecord::new(name, format!("{vendor_id:04x}"), format!("{product_id:04x}"))
        .unwrap_or_else(DeviceRecord::unknown)
        .with_product_name(product_name)
        .with_serial_number(serial_number)
        .with_device_id(device_id)
}

struct Subscription {
    iterator: io_iterator_t,
    _context: Box<NotificationContext>,
}

/// An armed pair of matched/terminated subscriptions on one notification port.
pub(crate) struct NotificationSession {
    port: IONotificationPortRef,
    run_loop: CFRunLoop,
    source: Option<CFRunLoopSource>,
    subscriptions: Vec<Subscription>,
    shared: Rc<RefCell<Shared>>,
    timeout: Duration,
}

impl NotificationSession {
    /// Open the port, subscribe to both notification kinds and drain devices
    /// already present. On error everything acquired so far is released.
    pub(crate) fn open(dispatcher: EventDispatcher, config: &MonitorConfig) -> MonitorResult<Self> {
        // SAFETY: plain constructor; null is checked below.
        let port = unsafe { IONotificationPortCreate(kIOMasterPortDefault) };
        if port.is_null() {
            return Err(MonitorError::SubsystemUnavailable(
                "cannot create IOKit notification port".to_string(),
            ));
        }

        let mut session = Self {
            port,
            run_loop: CFRunLoop::get_current(),
            source: None,
            subscriptions: Vec::with_capacity(2),
            shared: Rc::new(RefCell::new(Shared {
                debouncer: Debouncer::new(config.debounce_window),
                dispatcher,
            })),
            timeout: config.native_poll_timeout,
        };

        // SAFETY: port is live; the source belongs to it (Get rule).
        let raw_source = unsafe { IONotificationPortGetRunLoopSource(port) };
        if raw_source.is_null() {
            return Err(MonitorError::SubsystemUnavailable(
                "IOKit notification port has no run loop source".to_string(),
            ));
        }
        // SAFETY: raw_source is non-null and owned by the port; the Get rule
        // takes our own retain, released when `source` drops.
        let source = unsafe { CFRunLoopSource::wrap_under_get_rule(raw_source) };
        // SAFETY: kCFRunLoopDefaultMode is an immutable CoreFoundation constant.
        session.run_loop.add_source(&source, unsafe { kCFRunLoopDefaultMode });
        session.source = Some(source);

        session.subscribe(DeviceEventKind::Connected, kIOFirstMatchNotification)?;
        session.subscribe(DeviceEventKind::Disconnected, kIOTerminatedNotification)?;
        session.shared.borrow_mut().debouncer.settle();

        info!("IOKit USB notifications armed");
        Ok(session)
    }

    fn subscribe(&mut self, kind: DeviceEventKind, notification: *const c_char) -> MonitorResult<()> {
        // SAFETY: the class name is a NUL-terminated literal.
        let matching = unsafe { IOServiceMatching(c"IOUSBDevice".as_ptr()) };
        if matching.is_null() {
            return Err(MonitorError::SubsystemUnavailable(
                "cannot build IOUSBDevice matching dictionary".to_string(),
            ));
        }

        let context = Box::new(NotificationContext { kind, shared: Rc::clone(&self.shared) });
        let refcon = std::ptr::from_ref::<NotificationContext>(&context).cast_mut().cast::<c_void>();
        let mut iterator: io_iterator_t = IO_OBJECT_NULL;

        // SAFETY: the call consumes `matching`; `refcon` stays valid for as long
        // as the port because the context is stored next to it.
        let result = unsafe {
            IOServiceAddMatchingNotification(
                self.port,
                notification.cast_mut(),
                matching.cast_const(),
                on_notification,
                refcon,
                &raw mut iterator,
            )
        };
        if result != kIOReturnSuccess {
            return Err(MonitorError::SubsystemUnavailable(format!(
                "IOKit {kind} subscription failed: {result:#x}"
            )));
        }

        // The iterator must be drained once to arm it; these are devices that
        // were present before monitoring began.
        context.handle(iterator);
        self.subscriptions.push(Subscription { iterator, _context: context });
        Ok(())
    }

    /// Service the run loop in bounded slices until `should_stop` is set.
    pub(crate) fn run_until(&self, should_stop: &AtomicBool) {
        while !should_stop.load(Ordering::Acquire) {
            // SAFETY: see `open`.
            CFRunLoop::run_in_mode(unsafe { kCFRunLoopDefaultMode }, self.timeout, true);
        }
        info!(
            delivered = self.shared.borrow().dispatcher.delivered(),
            "IOKit USB notifications stopped"
        );
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        if let Some(source) = self.source.take() {
            // SAFETY: see `open`.
            self.run_loop.remove_source(&source, unsafe { kCFRunLoopDefaultMode });
        }
        for subscription in &self.subscriptions {
            // SAFETY: each iterator was returned by IOServiceAddMatchingNotification.
            unsafe {
                IOObjectRelease(subscription.iterator);
            }
        }
        // SAFETY: no callback can fire once the port is gone; contexts drop after this.
        unsafe {
            IONotificationPortDestroy(self.port);
        }
    }
}
