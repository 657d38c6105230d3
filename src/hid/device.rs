//! Captured keyboard devices: exclusive open plus the input-value bridge,
//! torn down RAII-style.

use std::ffi::c_void;

use crate::error::KernStatus;
use crate::event::KeyEvent;
use crate::queue::EventWriter;

use super::iokit::*;

/// Heap state handed to the input-value callback of one device.
///
/// Allocated with `Box::into_raw` before callback registration and
/// reclaimed by `CapturedDevice::drop` once the device is unscheduled.
struct BridgeContext {
    events: EventWriter,
}

/// One exclusively-opened keyboard.
///
/// Owns the IOKit service reference, the HID device object, and the boxed
/// callback context. Drop unschedules and closes the device, then releases
/// both references and reclaims the context. All of this happens on the
/// monitor thread, which owns every `CapturedDevice`.
pub(crate) struct CapturedDevice {
    service: io_service_t,
    device: IOHIDDeviceRef,
    run_loop: CFRunLoopRef,
    bridge: *mut BridgeContext,
    product: String,
}

impl CapturedDevice {
    /// Seizes `service` and schedules its input callback on `run_loop`.
    ///
    /// Takes ownership of the service reference on success. On failure the
    /// caller keeps ownership (and must release it); the device is excluded
    /// from capture, never fatal.
    pub fn open(
        service: io_service_t,
        product: String,
        events: EventWriter,
        run_loop: CFRunLoopRef,
    ) -> Option<CapturedDevice> {
        unsafe {
            let device = IOHIDDeviceCreate(std::ptr::null(), service);
            if device.is_null() {
                log::warn!("monitor: could not create HID device for {:?}", product);
                return None;
            }

            let bridge = Box::into_raw(Box::new(BridgeContext { events }));
            IOHIDDeviceRegisterInputValueCallback(device, input_value_callback, bridge.cast());

            let status = KernStatus(IOHIDDeviceOpen(device, kIOHIDOptionsTypeSeizeDevice));
            if !status.is_success() {
                log::warn!("monitor: could not seize {:?}: {}", product, status);
                drop(Box::from_raw(bridge));
                CFRelease(device);
                return None;
            }

            IOHIDDeviceScheduleWithRunLoop(device, run_loop, kCFRunLoopDefaultMode);
            log::info!("monitor: capturing {:?}", product);

            Some(CapturedDevice {
                service,
                device,
                run_loop,
                bridge,
                product,
            })
        }
    }

    pub fn product(&self) -> &str {
        &self.product
    }
}

impl Drop for CapturedDevice {
    fn drop(&mut self) {
        unsafe {
            IOHIDDeviceUnscheduleFromRunLoop(self.device, self.run_loop, kCFRunLoopDefaultMode);
            let status = KernStatus(IOHIDDeviceClose(self.device, kIOHIDOptionsTypeSeizeDevice));
            if status.is_success() {
                log::info!("monitor: released {:?}", self.product);
            } else {
                // Expected for devices that terminated before the close.
                log::debug!("monitor: close of {:?} returned {}", self.product, status);
            }
            CFRelease(self.device);
            IOObjectRelease(self.service);
            // No callbacks can arrive once the device is unscheduled.
            drop(Box::from_raw(self.bridge));
        }
    }
}

/// Fired on the monitor thread for every element value change on one
/// captured device.
///
/// Forwards the raw (value, page, usage) triple unfiltered and without
/// coalescing; consumers decide what counts as a key transition.
unsafe extern "C" fn input_value_callback(
    context: *mut c_void,
    _result: IOReturn,
    _sender: *mut c_void,
    value: IOHIDValueRef,
) {
    let bridge = &*(context as *const BridgeContext);
    let element = IOHIDValueGetElement(value);
    let event = KeyEvent {
        value: IOHIDValueGetIntegerValue(value) as u64,
        page: IOHIDElementGetUsagePage(element),
        usage: IOHIDElementGetUsage(element),
    };
    log::trace!("monitor: captured {:?}", event);
    bridge.events.push(event);
}
