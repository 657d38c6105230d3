//! Capture session lifecycle.
//!
//! `Session::grab` seizes the keyboards and brings up the injection sink;
//! `wait_key`/`send_key` run the capture-inject loop; `release` (or drop)
//! tears everything down best-effort. A process-wide guard keeps the number
//! of live sessions at one.

use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(target_os = "macos")]
use crate::{
    config::GrabOptions,
    error::{GrabError, ReleaseError, SendKeyError},
    event::KeyEvent,
    hid::{driver::VirtualKeyboard, monitor::MonitorHandle},
    queue::{event_channel, EventReader},
    report::ReportRouter,
};

static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Process-wide claim on the single allowed session. Dropping it reopens
/// the slot.
struct SessionGuard;

impl SessionGuard {
    fn acquire() -> Option<SessionGuard> {
        SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .ok()
            .map(|_| SessionGuard)
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        SESSION_ACTIVE.store(false, Ordering::Release);
    }
}

/// One exclusive keyboard-capture session.
///
/// Created by [`Session::grab`]; while it lives, every matching keyboard is
/// seized and its transitions arrive through [`Session::wait_key`]. Events
/// handed to [`Session::send_key`] reach the system through the virtual
/// keyboard. Dropping the session releases everything `release` would.
#[cfg(target_os = "macos")]
pub struct Session {
    events: EventReader,
    monitor: MonitorHandle,
    driver: VirtualKeyboard,
    router: ReportRouter,
    released: bool,
    _guard: SessionGuard,
}

#[cfg(target_os = "macos")]
impl Session {
    /// Seizes every matching keyboard and connects the injection sink.
    ///
    /// The monitor thread is up and capturing when this returns. On error
    /// every partially-acquired resource has been released; no compensating
    /// [`Session::release`] is needed.
    pub fn grab(options: GrabOptions) -> Result<Session, GrabError> {
        let guard = match SessionGuard::acquire() {
            Some(guard) => guard,
            None => return Err(GrabError::SessionActive),
        };

        match &options.product_filter {
            Some(filter) => log::info!("session: grabbing keyboards matching {:?}", filter),
            None => log::info!("session: grabbing all keyboards"),
        }

        let (writer, events) = event_channel();
        let mut monitor = MonitorHandle::spawn(writer, options.clone())?;

        let driver = match Session::connect_driver(&options) {
            Ok(driver) => driver,
            Err(err) => {
                monitor.shutdown();
                return Err(err);
            }
        };

        log::info!("session: active");
        Ok(Session {
            events,
            monitor,
            driver,
            router: ReportRouter::new(),
            released: false,
            _guard: guard,
        })
    }

    /// Opens the sink connection and walks the driver bring-up sequence:
    /// default initialization, readiness poll, locale re-initialization.
    fn connect_driver(options: &GrabOptions) -> Result<VirtualKeyboard, GrabError> {
        let driver = VirtualKeyboard::open(&options.driver_service_name)?;
        driver.initialize(0)?;
        driver.wait_ready(options.ready_poll_interval(), options.ready_timeout())?;
        driver.initialize(options.country_code)?;
        Ok(driver)
    }

    /// Blocks until the next captured transition. `None` once the capture
    /// side has shut down and the queue has drained.
    pub fn wait_key(&mut self) -> Option<KeyEvent> {
        self.events.wait()
    }

    /// Routes one event into the virtual keyboard's report stream.
    ///
    /// Rejected events ([`SendKeyError::UnrecognizedPage`],
    /// [`SendKeyError::InvalidValue`]) change no state; a sink failure
    /// leaves the pressed-key set updated and the caller owns retry policy.
    pub fn send_key(&mut self, event: &KeyEvent) -> Result<(), SendKeyError> {
        self.router.inject(event, &mut self.driver)
    }

    /// Releases every keyboard and the driver connection.
    ///
    /// Teardown is best-effort: every step runs even when an earlier one
    /// fails, and the failures come back in the [`ReleaseError`].
    pub fn release(mut self) -> Result<(), ReleaseError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), ReleaseError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut failed: Vec<&'static str> = Vec::new();

        if !self.monitor.shutdown() {
            failed.push("monitor join");
        }

        if let Err(status) = self.driver.reset() {
            log::warn!("session: keyboard reset failed: {}", status);
            failed.push("keyboard reset");
        }
        for (step, status) in self.driver.shutdown() {
            log::warn!("session: {} failed: {}", step, status);
            failed.push(step);
        }

        match ReleaseError::from_steps(failed) {
            None => {
                log::info!("session: released");
                Ok(())
            }
            Some(err) => Err(err),
        }
    }
}

#[cfg(target_os = "macos")]
impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            log::warn!("session: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Single test so the global flag is never contended across the
    /// parallel test harness.
    #[test]
    fn guard_is_exclusive_until_dropped() {
        let first = SessionGuard::acquire();
        assert!(first.is_some());
        assert!(SessionGuard::acquire().is_none());

        drop(first);
        assert!(SessionGuard::acquire().is_some());
    }
}
