//! Delivery of monitor events to the registered callback.

use tracing::{info, warn};
use usbwatch_core::{DeviceEvent, DeviceEventKind, DeviceRecord};

/// Receives device events from a running monitor.
///
/// Called synchronously on the monitor's own thread, so implementations
/// must return promptly; a blocked handler stalls event delivery and `stop()`.
pub trait EventHandler: Send {
    fn handle(&mut self, event: &DeviceEvent);
}

impl<F> EventHandler for F
where
    F: FnMut(&DeviceEvent) + Send,
{
    fn handle(&mut self, event: &DeviceEvent) {
        self(event);
    }
}

/// Logs each event and forwards it to the single registered handler.
pub struct EventDispatcher {
    handler: Box<dyn EventHandler>,
    delivered: u64,
}

impl EventDispatcher {
    #[must_use]
    pub fn new(handler: Box<dyn EventHandler>) -> Self {
        Self { handler, delivered: 0 }
    }

    pub fn connected(&mut self, device: DeviceRecord) {
        self.dispatch(&DeviceEvent::connected(device));
    }

    pub fn disconnected(&mut self, device: DeviceRecord) {
        self.dispatch(&DeviceEvent::disconnected(device));
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.dispatch(&DeviceEvent::error(message));
    }

    /// Emit a device event of the given kind.
    pub fn device_event(&mut self, kind: DeviceEventKind, device: DeviceRecord) {
        match kind {
            DeviceEventKind::Connected => self.connected(device),
            DeviceEventKind::Disconnected => self.disconnected(device),
            DeviceEventKind::Error => self.error(format!("error reported for {device}")),
        }
    }

    pub fn dispatch(&mut self, event: &DeviceEvent) {
        match (event.kind, &event.device) {
            (DeviceEventKind::Connected, Some(device)) => info!(
                vendor_id = %device.vendor_id(),
                product_id = %device.product_id(),
                name = %device.name(),
                serial = ?device.serial_number(),
                "USB device connected"
            ),
            (DeviceEventKind::Disconnected, Some(device)) => info!(
                vendor_id = %device.vendor_id(),
                product_id = %device.product_id(),
                name = %device.name(),
                "USB device disconnected"
            ),
            (kind, _) => warn!(%kind, message = ?event.message, "USB monitor event without device"),
        }

        self.handler.handle(event);
        self.delivered += 1;
    }

    /// Number of events handed to the handler so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher").field("delivered", &self.delivered).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording() -> (EventDispatcher, Arc<Mutex<Vec<DeviceEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let dispatcher = EventDispatcher::new(Box::new(move |event: &DeviceEvent| {
            sink.lock().unwrap().push(event.clone());
        }));
        (dispatcher, seen)
    }

    #[test]
    fn test_events_reach_handler_in_order() {
        let (mut dispatcher, seen) = recording();
        let device = DeviceRecord::new("Widget", "04d2", "0005").unwrap();

        dispatcher.connected(device.clone());
        dispatcher.disconnected(device.clone());
        dispatcher.error("listing failed");

        let seen = seen.lock().unwrap();
        let kinds: Vec<_> = seen.iter().map(|event| event.kind).collect();
        assert_eq!(
            kinds,
            vec![DeviceEventKind::Connected, DeviceEventKind::Disconnected, DeviceEventKind::Error]
        );
        assert_eq!(seen[0].device.as_ref(), Some(&device));
        assert_eq!(seen[2].device, None);
        assert_eq!(seen[2].message.as_deref(), Some("listing failed"));
        assert_eq!(dispatcher.delivered(), 3);
    }

    #[test]
    fn test_device_event_routes_by_kind() {
        let (mut dispatcher, seen) = recording();

        dispatcher.device_event(DeviceEventKind::Disconnected, DeviceRecord::unknown());

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].kind, DeviceEventKind::Disconnected);
        assert_eq!(seen[0].device.as_ref().map(DeviceRecord::name), Some("Unknown USB Device"));
    }
}
