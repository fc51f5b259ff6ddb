//! The device monitor state machine.
//!
//! A [`DeviceMonitor`] picks one [`Strategy`] for its platform and runs it
//! between `start()` and `stop()`. Worker-thread strategies return from
//! `start()` once the backend is live; native notifications run on the
//! calling thread and `start()` only returns after `stop()` is requested
//! from elsewhere.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info};
use usbwatch_core::{Collector, CollectorConfig, DeviceSource, Platform};

use crate::backend::{self, polling::PollingLoop};
use crate::config::MonitorConfig;
use crate::dispatcher::{EventDispatcher, EventHandler};
use crate::error::{MonitorError, MonitorResult};
use crate::state::MonitorState;

/// How a monitor learns about device changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// IOKit matched/terminated notifications on the calling thread (macOS)
    NativeNotifications,
    /// udev netlink events on a worker thread (Linux)
    KernelEvents,
    /// Periodic listing and diffing on a worker thread
    Polling,
}

impl Strategy {
    /// The strategy used for `platform`, or `None` if it cannot be monitored.
    #[must_use]
    pub fn for_platform(platform: Platform, config: &MonitorConfig) -> Option<Self> {
        if !platform.is_supported() {
            return None;
        }
        if config.force_polling {
            return Some(Self::Polling);
        }
        Some(match platform {
            Platform::Mac => Self::NativeNotifications,
            Platform::Linux => Self::KernelEvents,
            Platform::Windows | Platform::Unknown => Self::Polling,
        })
    }
}

/// Live USB connect/disconnect monitoring for one platform.
///
/// Every instance owns its own subsystem handles and worker; several may run
/// side by side.
pub struct DeviceMonitor {
    platform: Platform,
    config: MonitorConfig,
    source: Arc<dyn DeviceSource>,
    state: Mutex<MonitorState>,
    changed: Condvar,
    should_stop: Arc<AtomicBool>,
    /// Set by `shutdown()`; only touched with `state` locked
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceMonitor {
    /// Monitor for the current platform, polling through a [`Collector`] when needed.
    #[must_use]
    pub fn new(config: MonitorConfig, collector_config: CollectorConfig) -> Self {
        let collector = Collector::new(collector_config);
        Self::with_source(collector.platform(), Arc::new(collector), config)
    }

    /// Monitor for `platform` with an explicit listing source for the polling strategy.
    #[must_use]
    pub fn with_source(
        platform: Platform,
        source: Arc<dyn DeviceSource>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            platform,
            config,
            source,
            state: Mutex::new(MonitorState::Stopped),
            changed: Condvar::new(),
            should_stop: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
            worker: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    #[must_use]
    pub fn state(&self) -> MonitorState {
        *self.state.lock()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == MonitorState::Running
    }

    /// Start delivering events to `handler`.
    ///
    /// With [`Strategy::NativeNotifications`] this call blocks until `stop()`
    /// is called from another thread.
    ///
    /// # Errors
    /// - [`MonitorError::PlatformNotSupported`] on an unknown platform
    /// - [`MonitorError::AlreadyRunning`] unless the monitor is stopped
    /// - [`MonitorError::ShutDown`] after [`DeviceMonitor::shutdown`]
    /// - [`MonitorError::SubsystemUnavailable`] if the notification source cannot be opened
    /// - [`MonitorError::WorkerSpawn`] or [`MonitorError::WorkerPanicked`] for worker failures
    pub fn start<H: EventHandler + 'static>(&self, handler: H) -> MonitorResult<()> {
        let strategy = Strategy::for_platform(self.platform, &self.config)
            .ok_or(MonitorError::PlatformNotSupported(self.platform))?;

        {
            let mut state = self.state.lock();
            if self.closed.load(Ordering::Acquire) {
                return Err(MonitorError::ShutDown);
            }
            if *state != MonitorState::Stopped {
                return Err(MonitorError::AlreadyRunning);
            }
            *state = MonitorState::Starting;
            self.should_stop.store(false, Ordering::Release);
        }
        info!(platform = %self.platform, ?strategy, "Starting USB monitor");

        let dispatcher = EventDispatcher::new(Box::new(handler));
        let outcome = match strategy {
            Strategy::Polling => backend::polling::spawn(
                PollingLoop::new(Arc::clone(&self.source), self.config.poll_interval, dispatcher),
                Arc::clone(&self.should_stop),
            )
            .map(Some),
            Strategy::KernelEvents => self.spawn_kernel(dispatcher).map(Some),
            Strategy::NativeNotifications => self.run_native(dispatcher).map(|()| None),
        };

        match outcome {
            Ok(Some(worker)) => {
                *self.worker.lock() = Some(worker);
                self.set_state(MonitorState::Running);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                self.set_state(MonitorState::Stopped);
                Err(e)
            }
        }
    }

    #[cfg(target_os = "linux")]
    fn spawn_kernel(&self, dispatcher: EventDispatcher) -> MonitorResult<JoinHandle<()>> {
        backend::kernel::spawn(
            dispatcher,
            self.config.kernel_poll_timeout,
            Arc::clone(&self.should_stop),
        )
    }

    #[cfg(not(target_os = "linux"))]
    fn spawn_kernel(&self, _dispatcher: EventDispatcher) -> MonitorResult<JoinHandle<()>> {
        Err(MonitorError::SubsystemUnavailable("udev is only available on Linux".to_string()))
    }

    /// Run the IOKit session on this thread until stopped.
    #[cfg(target_os = "macos")]
    fn run_native(&self, dispatcher: EventDispatcher) -> MonitorResult<()> {
        let session = backend::iokit::NotificationSession::open(dispatcher, &self.config)?;
        self.set_state(MonitorState::Running);

        session.run_until(&self.should_stop);
        drop(session);

        self.set_state(MonitorState::Stopped);
        info!("USB monitor stopped");
        Ok(())
    }

    #[cfg(not(target_os = "macos"))]
    fn run_native(&self, _dispatcher: EventDispatcher) -> MonitorResult<()> {
        Err(MonitorError::SubsystemUnavailable("IOKit is only available on macOS".to_string()))
    }

    /// Stop monitoring and wait until every resource acquired by `start()` is released.
    ///
    /// A no-op when already stopped.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        self.stop_locked(&mut state);
    }

    /// Stop and refuse every later `start()`, including one already queued
    /// on another thread that has not taken the state lock yet.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        self.closed.store(true, Ordering::Release);
        self.stop_locked(&mut state);
    }

    fn stop_locked(&self, state: &mut MutexGuard<'_, MonitorState>) {
        if **state == MonitorState::Stopped {
            return;
        }
        // start() clears the flag under the same lock, so a session that is
        // starting or running always sees this.
        self.should_stop.store(true, Ordering::Release);
        self.changed.wait_while(state, |state| *state == MonitorState::Starting);

        match **state {
            MonitorState::Stopped => return,
            MonitorState::Running => {}
            MonitorState::Starting | MonitorState::Stopping => {
                // Someone else is tearing down; wait for them.
                self.changed.wait_while(state, |state| *state != MonitorState::Stopped);
                return;
            }
        }
        **state = MonitorState::Stopping;
        debug!("Stopping USB monitor");

        let worker = self.worker.lock().take();
        match worker {
            Some(worker) => {
                MutexGuard::unlocked(state, || backend::join_worker(worker));
                **state = MonitorState::Stopped;
                self.changed.notify_all();
                info!("USB monitor stopped");
            }
            // The native session owns teardown and reports Stopped itself.
            None => self.changed.wait_while(state, |state| *state != MonitorState::Stopped),
        }
    }

    fn set_state(&self, next: MonitorState) {
        *self.state.lock() = next;
        self.changed.notify_all();
    }
}

impl Drop for DeviceMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DeviceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMonitor")
            .field("platform", &self.platform)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
