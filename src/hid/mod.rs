//! macOS capture backend: IOKit keyboard seizure and hot-plug monitoring,
//! plus the virtual-HID driver connection.

pub(crate) mod device;
pub(crate) mod driver;
pub(crate) mod iokit;
pub(crate) mod monitor;
