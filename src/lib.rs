//! Exclusive keyboard capture and virtual-HID re-injection for macOS.
//!
//! [`Session::grab`] seizes every attached keyboard at the IOKit HID layer,
//! hot-plugged ones included, and opens a connection to a Karabiner-style
//! virtual keyboard driver. The embedding engine then runs a synchronous
//! loop: [`Session::wait_key`] blocks for the next captured transition, the
//! engine decides what it maps to, and [`Session::send_key`] posts the
//! result into the virtual keyboard's report stream. [`Session::release`]
//! (or dropping the session) returns every keyboard to the system.
//!
//! ```no_run
//! # #[cfg(target_os = "macos")]
//! # fn passthrough() -> Result<(), Box<dyn std::error::Error>> {
//! use keygrab::{GrabOptions, Session};
//!
//! let mut session = Session::grab(GrabOptions::default())?;
//! while let Some(event) = session.wait_key() {
//!     session.send_key(&event)?;
//! }
//! session.release()?;
//! # Ok(())
//! # }
//! ```
//!
//! The event record, routing, report encoding, and options are portable;
//! only the IOKit backend and [`Session`] itself require macOS.

mod config;
mod error;
mod event;
#[cfg(target_os = "macos")]
mod hid;
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod queue;
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod report;
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod session;
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
mod sink;

pub use config::{
    GrabOptions, DEFAULT_COUNTRY_CODE, DEFAULT_DRIVER_SERVICE, DEFAULT_VIRTUAL_PRODUCT,
};
pub use error::{
    GrabError, KernStatus, MonitorError, ReleaseError, SendKeyError, SinkError,
};
pub use event::{KeyEvent, KeyTransition};
pub use report::UsagePage;
#[cfg(target_os = "macos")]
pub use session::Session;
