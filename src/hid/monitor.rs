//! Monitor thread: enumerates and seizes keyboards, then tracks hot-plug
//! while running the capture run loop.
//!
//! `MonitorHandle::spawn` starts the thread and blocks until it either owns
//! a running setup (every current keyboard seized, both hot-plug
//! subscriptions armed) or reports a setup error. The thread then sits in
//! `CFRunLoopRun` delivering capture and hot-plug callbacks until
//! `shutdown` stops the loop, at which point it closes every captured
//! device, destroys the notification port, and drops its queue writers so
//! a pending `wait_key` unblocks.

use std::collections::HashMap;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use crate::config::GrabOptions;
use crate::error::{GrabError, KernStatus, MonitorError};
use crate::queue::EventWriter;

use super::device::CapturedDevice;
use super::iokit::*;

// ---------------------------------------------------------------------------
// Monitor state (monitor thread only)
// ---------------------------------------------------------------------------

/// State owned by the monitor thread. The hot-plug callbacks receive a raw
/// pointer to it; nothing outside that thread ever touches it.
struct MonitorState {
    /// Captured devices keyed by service handle. Port names are stable per
    /// task, so the handle delivered at termination matches the key stored
    /// at match time.
    registry: HashMap<io_service_t, CapturedDevice>,
    events: EventWriter,
    options: GrabOptions,
    run_loop: CFRunLoopRef,
    notify_port: IONotificationPortRef,
    matched_iter: io_iterator_t,
    terminated_iter: io_iterator_t,
}

impl MonitorState {
    /// Runs the matcher over every service in `iterator` and captures the
    /// accepted ones. Draining the iterator also re-arms its notification.
    unsafe fn open_matching(&mut self, iterator: io_iterator_t) {
        loop {
            let service = IOIteratorNext(iterator);
            if service == 0 {
                break;
            }
            self.try_capture(service);
        }
    }

    /// Matcher decision plus capture for one discovered service. Rejected
    /// and failed services are released here.
    unsafe fn try_capture(&mut self, service: io_service_t) {
        let product = match copy_product_name(service) {
            Some(name) => name,
            None => {
                log::warn!(
                    "monitor: service {:#x} has no readable product name, skipped",
                    service
                );
                IOObjectRelease(service);
                return;
            }
        };

        if !self.options.wants_product(&product) {
            log::debug!("monitor: ignoring {:?}", product);
            IOObjectRelease(service);
            return;
        }

        match CapturedDevice::open(service, product, self.events.clone(), self.run_loop) {
            Some(device) => {
                // A re-announced service replaces (and thereby closes) the
                // previous entry for the same handle.
                self.registry.insert(service, device);
            }
            None => {
                IOObjectRelease(service);
            }
        }
    }

    /// Removes every service in `iterator` from the registry; dropping the
    /// entry closes the device. Unknown handles are a no-op (the device may
    /// have terminated before it was ever captured).
    unsafe fn remove_terminated(&mut self, iterator: io_iterator_t) {
        loop {
            let service = IOIteratorNext(iterator);
            if service == 0 {
                break;
            }
            if let Some(device) = self.registry.remove(&service) {
                log::info!("monitor: {:?} terminated", device.product());
                drop(device);
            }
            IOObjectRelease(service);
        }
    }
}

/// Copies the Product registry property of a HID service.
unsafe fn copy_product_name(service: io_service_t) -> Option<String> {
    let key = cf_string(kIOHIDProductKey);
    let value = IORegistryEntryCreateCFProperty(service, key, std::ptr::null(), 0);
    CFRelease(key);
    if value.is_null() {
        return None;
    }
    let name = string_from_cf(value);
    CFRelease(value);
    name
}

// ---------------------------------------------------------------------------
// Hot-plug callbacks (monitor thread)
// ---------------------------------------------------------------------------

unsafe extern "C" fn matched_callback(refcon: *mut std::ffi::c_void, iterator: io_iterator_t) {
    let state = &mut *(refcon as *mut MonitorState);
    state.open_matching(iterator);
}

unsafe extern "C" fn terminated_callback(refcon: *mut std::ffi::c_void, iterator: io_iterator_t) {
    let state = &mut *(refcon as *mut MonitorState);
    state.remove_terminated(iterator);
}

// ---------------------------------------------------------------------------
// Thread body
// ---------------------------------------------------------------------------

fn monitor_main(
    events: EventWriter,
    options: GrabOptions,
    ready_tx: mpsc::Sender<Result<SendableRunLoop, MonitorError>>,
) {
    unsafe {
        let run_loop = CFRunLoopGetCurrent();

        // The state's address must be stable before any callback can see it.
        let state_ptr = Box::into_raw(Box::new(MonitorState {
            registry: HashMap::new(),
            events,
            options,
            run_loop,
            notify_port: std::ptr::null_mut(),
            matched_iter: 0,
            terminated_iter: 0,
        }));

        match monitor_setup(state_ptr) {
            Ok(()) => {
                log::info!(
                    "monitor: ready, {} device(s) captured",
                    (*state_ptr).registry.len()
                );
                let _ = ready_tx.send(Ok(SendableRunLoop(run_loop)));
            }
            Err(err) => {
                let _ = ready_tx.send(Err(err));
                monitor_teardown(state_ptr);
                return;
            }
        }

        // Deliver capture and hot-plug callbacks until the session stops us.
        CFRunLoopRun();

        log::info!("monitor: run loop exited");
        monitor_teardown(state_ptr);
    }
}

/// Builds the matching criteria and arms both standing subscriptions. The
/// matched subscription's initial iterator doubles as the enumeration pass,
/// so a keyboard arriving mid-setup cannot fall between enumeration and
/// notification.
unsafe fn monitor_setup(state_ptr: *mut MonitorState) -> Result<(), MonitorError> {
    let state = &mut *state_ptr;

    let matching = IOServiceMatching(kIOHIDDeviceKey.as_ptr());
    if matching.is_null() {
        return Err(MonitorError::MatchingDictionary);
    }
    // Narrow matching to keyboard-usage HID devices.
    dict_set_i32(matching, kIOHIDDeviceUsagePageKey, kHIDPage_GenericDesktop);
    dict_set_i32(matching, kIOHIDDeviceUsageKey, kHIDUsage_GD_Keyboard);

    state.notify_port = IONotificationPortCreate(kIOMasterPortDefault);
    if state.notify_port.is_null() {
        CFRelease(matching);
        return Err(MonitorError::NotificationPort);
    }
    CFRunLoopAddSource(
        state.run_loop,
        IONotificationPortGetRunLoopSource(state.notify_port),
        kCFRunLoopDefaultMode,
    );

    // Each registration consumes one dictionary reference; balance with one
    // retain so the second call consumes the last.
    CFRetain(matching);

    let mut matched_iter: io_iterator_t = 0;
    let status = KernStatus(IOServiceAddMatchingNotification(
        state.notify_port,
        kIOMatchedNotification.as_ptr(),
        matching,
        matched_callback,
        state_ptr.cast(),
        &mut matched_iter,
    ));
    if !status.is_success() {
        CFRelease(matching);
        return Err(MonitorError::Subscribe {
            kind: "matched",
            status,
        });
    }
    state.matched_iter = matched_iter;
    // Initial drain: captures the currently-attached keyboards and arms the
    // notification.
    state.open_matching(matched_iter);

    let mut terminated_iter: io_iterator_t = 0;
    let status = KernStatus(IOServiceAddMatchingNotification(
        state.notify_port,
        kIOTerminatedNotification.as_ptr(),
        matching,
        terminated_callback,
        state_ptr.cast(),
        &mut terminated_iter,
    ));
    if !status.is_success() {
        return Err(MonitorError::Subscribe {
            kind: "terminated",
            status,
        });
    }
    state.terminated_iter = terminated_iter;
    state.remove_terminated(terminated_iter);

    Ok(())
}

/// Releases everything the monitor thread owns. Runs on the monitor thread
/// after the run loop exits or after failed setup.
unsafe fn monitor_teardown(state_ptr: *mut MonitorState) {
    let mut state = Box::from_raw(state_ptr);
    let count = state.registry.len();
    state.registry.clear();
    if count > 0 {
        log::info!("monitor: released {} device(s)", count);
    }
    if state.matched_iter != 0 {
        IOObjectRelease(state.matched_iter);
    }
    if state.terminated_iter != 0 {
        IOObjectRelease(state.terminated_iter);
    }
    if !state.notify_port.is_null() {
        IONotificationPortDestroy(state.notify_port);
    }
    // The state box drops here, taking the last queue writer with it.
}

// ---------------------------------------------------------------------------
// Session-side handle
// ---------------------------------------------------------------------------

/// Owning handle for the monitor thread, held by the session.
pub(crate) struct MonitorHandle {
    run_loop: Option<SendableRunLoop>,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Spawns the monitor thread and waits for its setup verdict.
    pub fn spawn(events: EventWriter, options: GrabOptions) -> Result<MonitorHandle, GrabError> {
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = thread::spawn(move || monitor_main(events, options, ready_tx));

        match ready_rx.recv() {
            Ok(Ok(run_loop)) => Ok(MonitorHandle {
                run_loop: Some(run_loop),
                thread: Some(thread),
            }),
            Ok(Err(err)) => {
                // The thread tears itself down after reporting.
                let _ = thread.join();
                Err(GrabError::Monitor(err))
            }
            Err(_) => {
                let _ = thread.join();
                Err(GrabError::MonitorExited)
            }
        }
    }

    /// Stops the run loop and joins the thread. Returns false only if the
    /// thread panicked; a missing thread is logged and counts as clean.
    pub fn shutdown(&mut self) -> bool {
        if self.thread.is_none() {
            log::debug!("monitor: no thread was running");
            return true;
        }
        if let Some(SendableRunLoop(rl)) = self.run_loop.take() {
            unsafe { CFRunLoopStop(rl) };
        }
        match self.thread.take() {
            Some(thread) => match thread.join() {
                Ok(()) => true,
                Err(_) => {
                    log::warn!("monitor: thread panicked during shutdown");
                    false
                }
            },
            None => true,
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
