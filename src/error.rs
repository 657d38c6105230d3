//! Error taxonomy: resource acquisition, driver protocol, malformed events,
//! and teardown reporting.
//!
//! Per-device capture failures never surface here; the monitor logs them and
//! excludes the device.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// IOKit `kern_return_t` wrapped for display.
///
/// Shown in hex, with a name for the codes this crate commonly runs into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernStatus(pub i32);

impl KernStatus {
    pub const SUCCESS: KernStatus = KernStatus(0);

    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    fn name(self) -> Option<&'static str> {
        match self.0 as u32 {
            0 => Some("KERN_SUCCESS"),
            0xE000_02BC => Some("kIOReturnError"),
            0xE000_02BD => Some("kIOReturnNoMemory"),
            0xE000_02C0 => Some("kIOReturnNoDevice"),
            0xE000_02C1 => Some("kIOReturnNotPrivileged"),
            0xE000_02C2 => Some("kIOReturnBadArgument"),
            0xE000_02C5 => Some("kIOReturnExclusiveAccess"),
            0xE000_02C7 => Some("kIOReturnUnsupported"),
            0xE000_02CD => Some("kIOReturnNotOpen"),
            _ => None,
        }
    }
}

impl fmt::Display for KernStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08X})", name, self.0 as u32),
            None => write!(f, "0x{:08X}", self.0 as u32),
        }
    }
}

/// Failure while the monitor thread was setting itself up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MonitorError {
    /// The keyboard matching dictionary could not be created.
    #[error("could not create the keyboard matching dictionary")]
    MatchingDictionary,

    /// The hot-plug notification port could not be created.
    #[error("could not create the hot-plug notification port")]
    NotificationPort,

    /// One of the standing notifications could not be registered.
    #[error("could not subscribe to {kind} notifications: {status}")]
    Subscribe {
        kind: &'static str,
        status: KernStatus,
    },
}

/// Failure to acquire the capture session.
///
/// Every partially-acquired resource is released before one of these is
/// returned; no compensating `release` is needed.
#[derive(Debug, Error)]
pub enum GrabError {
    /// Another session is live in this process.
    #[error("a capture session is already active in this process")]
    SessionActive,

    /// The monitor thread failed during setup.
    #[error("keyboard monitor setup failed: {0}")]
    Monitor(#[from] MonitorError),

    /// The monitor thread exited without reporting its run loop.
    #[error("keyboard monitor exited before becoming ready")]
    MonitorExited,

    /// The virtual keyboard driver service is not registered.
    #[error("virtual keyboard driver service {0:?} not found (is the driver loaded?)")]
    DriverNotFound(String),

    /// Opening the driver user-client connection failed.
    #[error("could not open the virtual keyboard driver: {0}")]
    DriverOpen(KernStatus),

    /// A keyboard initialization call was rejected by the driver.
    #[error("virtual keyboard initialization failed: {0}")]
    DriverInit(KernStatus),

    /// A readiness probe was rejected by the driver.
    #[error("virtual keyboard readiness check failed: {0}")]
    DriverReady(KernStatus),

    /// The driver did not report ready within the configured bound.
    #[error("virtual keyboard not ready after {0:?}")]
    ReadyTimeout(Duration),
}

/// Failure to deliver a report to the injection sink.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The driver rejected the posted report.
    #[error("driver rejected report: {0}")]
    Post(KernStatus),
}

/// Rejection or delivery failure for one injected event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendKeyError {
    /// The usage page maps to none of the four report categories.
    #[error("unrecognized usage page 0x{0:04X}")]
    UnrecognizedPage(u32),

    /// The event value is neither 0 (up) nor 1 (down).
    #[error("invalid key event value {0} (expected 0 or 1)")]
    InvalidValue(u64),

    /// The report was routed but the sink did not accept it.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// One or more teardown steps failed; the remaining steps were still run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("session teardown incomplete, failed steps: {}", .steps.join(", "))]
pub struct ReleaseError {
    steps: Vec<&'static str>,
}

impl ReleaseError {
    /// `None` when every step succeeded.
    pub(crate) fn from_steps(steps: Vec<&'static str>) -> Option<ReleaseError> {
        if steps.is_empty() {
            None
        } else {
            Some(ReleaseError { steps })
        }
    }

    /// Names of the teardown steps that failed, in execution order.
    pub fn steps(&self) -> &[&'static str] {
        &self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kern_status_names_known_codes() {
        let status = KernStatus(0xE000_02C5_u32 as i32);
        assert_eq!(
            status.to_string(),
            "kIOReturnExclusiveAccess (0xE00002C5)"
        );
        assert_eq!(KernStatus(0x1234).to_string(), "0x00001234");
        assert!(KernStatus::SUCCESS.is_success());
    }

    #[test]
    fn release_error_lists_failed_steps() {
        assert_eq!(ReleaseError::from_steps(Vec::new()), None);

        let err = ReleaseError::from_steps(vec!["keyboard reset", "driver close"]).unwrap();
        assert_eq!(err.steps(), ["keyboard reset", "driver close"]);
        assert_eq!(
            err.to_string(),
            "session teardown incomplete, failed steps: keyboard reset, driver close"
        );
    }

    #[test]
    fn send_key_error_wraps_sink_failures() {
        let err = SendKeyError::from(SinkError::Post(KernStatus(0xE000_02CD_u32 as i32)));
        assert_eq!(
            err.to_string(),
            "driver rejected report: kIOReturnNotOpen (0xE00002CD)"
        );
    }
}
