//! Connection to the virtual-HID keyboard driver.
//!
//! The driver is reached as a named IOService. A user-client connection
//! accepts struct-method calls: keyboard initialization (carrying a country
//! code), a readiness probe, full-state report posting, and reset. One
//! connection serves all four report categories.

use std::ffi::CString;
use std::time::{Duration, Instant};

use crate::error::{GrabError, KernStatus, SinkError};
use crate::report::InputReport;
use crate::sink::ReportSink;

use super::iokit::*;

// ---------------------------------------------------------------------------
// User-client selectors
// ---------------------------------------------------------------------------

/// Struct-method selectors exposed by the driver's keyboard user client.
const SELECTOR_INITIALIZE_KEYBOARD: u32 = 0;
const SELECTOR_IS_KEYBOARD_READY: u32 = 2;
const SELECTOR_POST_KEYBOARD_REPORT: u32 = 3;
const SELECTOR_RESET_KEYBOARD: u32 = 4;

/// Input struct for `SELECTOR_INITIALIZE_KEYBOARD`.
#[repr(C)]
struct KeyboardInitialization {
    country_code: u8,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Open user-client connection to the virtual keyboard driver.
pub(crate) struct VirtualKeyboard {
    service: io_service_t,
    connection: io_connect_t,
    open: bool,
}

impl VirtualKeyboard {
    /// Looks up the driver service by registry name and opens a connection.
    pub fn open(service_name: &str) -> Result<VirtualKeyboard, GrabError> {
        let name = CString::new(service_name)
            .map_err(|_| GrabError::DriverNotFound(service_name.to_string()))?;
        unsafe {
            let matching = IOServiceNameMatching(name.as_ptr());
            if matching.is_null() {
                return Err(GrabError::DriverNotFound(service_name.to_string()));
            }
            let service = IOServiceGetMatchingService(kIOMasterPortDefault, matching);
            if service == 0 {
                return Err(GrabError::DriverNotFound(service_name.to_string()));
            }

            let mut connection: io_connect_t = 0;
            let status = KernStatus(IOServiceOpen(
                service,
                mach_task_self_,
                kIOHIDServerConnectType,
                &mut connection,
            ));
            if !status.is_success() {
                IOObjectRelease(service);
                return Err(GrabError::DriverOpen(status));
            }

            log::info!("driver: connected to {}", service_name);
            Ok(VirtualKeyboard {
                service,
                connection,
                open: true,
            })
        }
    }

    /// Sends a keyboard initialization carrying `country_code`.
    pub fn initialize(&self, country_code: u8) -> Result<(), GrabError> {
        let properties = KeyboardInitialization { country_code };
        let status = unsafe {
            KernStatus(IOConnectCallStructMethod(
                self.connection,
                SELECTOR_INITIALIZE_KEYBOARD,
                (&properties as *const KeyboardInitialization).cast(),
                std::mem::size_of::<KeyboardInitialization>(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            ))
        };
        if status.is_success() {
            log::debug!("driver: keyboard initialized, country code {}", country_code);
            Ok(())
        } else {
            Err(GrabError::DriverInit(status))
        }
    }

    /// Probes whether the driver has finished bringing the keyboard up.
    pub fn is_ready(&self) -> Result<bool, GrabError> {
        let mut ready: u8 = 0;
        let mut output_len: usize = std::mem::size_of::<u8>();
        let status = unsafe {
            KernStatus(IOConnectCallStructMethod(
                self.connection,
                SELECTOR_IS_KEYBOARD_READY,
                std::ptr::null(),
                0,
                (&mut ready as *mut u8).cast(),
                &mut output_len,
            ))
        };
        if status.is_success() {
            Ok(ready != 0)
        } else {
            Err(GrabError::DriverReady(status))
        }
    }

    /// Polls readiness at `interval` until the driver reports ready,
    /// bounded by `timeout` when set. A rejected probe aborts the wait.
    pub fn wait_ready(
        &self,
        interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<(), GrabError> {
        let started = Instant::now();
        loop {
            if self.is_ready()? {
                log::debug!("driver: keyboard ready after {:?}", started.elapsed());
                return Ok(());
            }
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(GrabError::ReadyTimeout(limit));
                }
            }
            std::thread::sleep(interval);
        }
    }

    /// Clears every pressed key at the driver.
    pub fn reset(&self) -> Result<(), KernStatus> {
        let status = unsafe {
            KernStatus(IOConnectCallStructMethod(
                self.connection,
                SELECTOR_RESET_KEYBOARD,
                std::ptr::null(),
                0,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            ))
        };
        if status.is_success() {
            Ok(())
        } else {
            Err(status)
        }
    }

    /// Closes the connection and releases the service reference, once.
    /// Failed steps come back by name for teardown reporting.
    pub fn shutdown(&mut self) -> Vec<(&'static str, KernStatus)> {
        if !self.open {
            return Vec::new();
        }
        self.open = false;

        let mut failures = Vec::new();
        unsafe {
            let status = KernStatus(IOServiceClose(self.connection));
            if !status.is_success() {
                failures.push(("driver close", status));
            }
            let status = KernStatus(IOObjectRelease(self.service));
            if !status.is_success() {
                failures.push(("driver service release", status));
            }
        }
        if failures.is_empty() {
            log::info!("driver: connection closed");
        }
        failures
    }
}

impl ReportSink for VirtualKeyboard {
    fn post(&mut self, report: &InputReport) -> Result<(), SinkError> {
        let bytes = report.encode();
        let wire = bytes.as_slice();
        let status = unsafe {
            KernStatus(IOConnectCallStructMethod(
                self.connection,
                SELECTOR_POST_KEYBOARD_REPORT,
                wire.as_ptr().cast(),
                wire.len(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            ))
        };
        if status.is_success() {
            Ok(())
        } else {
            Err(SinkError::Post(status))
        }
    }
}

impl Drop for VirtualKeyboard {
    fn drop(&mut self) {
        for (step, status) in self.shutdown() {
            log::warn!("driver: {} failed: {}", step, status);
        }
    }
}
