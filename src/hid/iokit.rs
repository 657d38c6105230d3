//! Raw IOKit and CoreFoundation declarations used by the capture backend.
//!
//! Only what this crate calls is declared. Ownership follows the CF
//! create/copy rule: every reference we create or copy is released here,
//! and IOKit handles are released by their owning wrapper.

#![allow(non_camel_case_types, non_upper_case_globals)]

use std::ffi::{c_char, c_void, CStr, CString};
use std::ptr;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

pub type CFTypeRef = *const c_void;
pub type CFAllocatorRef = *const c_void;
pub type CFStringRef = *const c_void;
pub type CFNumberRef = *const c_void;
pub type CFMutableDictionaryRef = *mut c_void;
pub type CFRunLoopRef = *mut c_void;
pub type CFRunLoopSourceRef = *mut c_void;
pub type CFIndex = isize;
pub type CFNumberType = CFIndex;
pub type CFStringEncoding = u32;
pub type Boolean = u8;

pub type mach_port_t = u32;
pub type kern_return_t = i32;
pub type IOReturn = kern_return_t;
pub type IOOptionBits = u32;
pub type io_object_t = mach_port_t;
pub type io_service_t = io_object_t;
pub type io_iterator_t = io_object_t;
pub type io_connect_t = io_object_t;
pub type io_registry_entry_t = io_object_t;
pub type IONotificationPortRef = *mut c_void;

pub type IOHIDDeviceRef = *mut c_void;
pub type IOHIDValueRef = *mut c_void;
pub type IOHIDElementRef = *mut c_void;

/// Signature required by IOServiceAddMatchingNotification.
pub type IOServiceMatchingCallback =
    unsafe extern "C" fn(refcon: *mut c_void, iterator: io_iterator_t);

/// Signature required by IOHIDDeviceRegisterInputValueCallback.
pub type IOHIDValueCallback = unsafe extern "C" fn(
    context: *mut c_void,
    result: IOReturn,
    sender: *mut c_void,
    value: IOHIDValueRef,
);

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Passing 0 asks IOKit for the default master port.
pub const kIOMasterPortDefault: mach_port_t = 0;

/// Opens the device for exclusive (seized) access.
pub const kIOHIDOptionsTypeSeizeDevice: IOOptionBits = 0x01;

/// Connect type for the HID user client.
pub const kIOHIDServerConnectType: u32 = 0;

/// IOService class HID devices register under.
pub const kIOHIDDeviceKey: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"IOHIDDevice\0") };

/// Matching keys narrowing enumeration to one device usage pair.
pub const kIOHIDDeviceUsagePageKey: &str = "DeviceUsagePage";
pub const kIOHIDDeviceUsageKey: &str = "DeviceUsage";

/// Registry property holding a device's product name.
pub const kIOHIDProductKey: &str = "Product";

/// Generic Desktop page and its Keyboard usage, for the matching dictionary.
pub const kHIDPage_GenericDesktop: i32 = 0x01;
pub const kHIDUsage_GD_Keyboard: i32 = 0x06;

/// Notification types for IOServiceAddMatchingNotification.
pub const kIOMatchedNotification: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"IOServiceMatched\0") };
pub const kIOTerminatedNotification: &CStr =
    unsafe { CStr::from_bytes_with_nul_unchecked(b"IOServiceTerminate\0") };

/// CFNumberType for 32-bit signed integers.
pub const kCFNumberSInt32Type: CFNumberType = 3;

/// CFStringEncoding for UTF-8.
pub const kCFStringEncodingUTF8: CFStringEncoding = 0x0800_0100;

// ---------------------------------------------------------------------------
// IOKit
// ---------------------------------------------------------------------------

#[link(name = "IOKit", kind = "framework")]
extern "C" {
    /// Builds a matching dictionary for an IOService class name.
    pub fn IOServiceMatching(name: *const c_char) -> CFMutableDictionaryRef;

    /// Builds a matching dictionary for an IOService registry name.
    pub fn IOServiceNameMatching(name: *const c_char) -> CFMutableDictionaryRef;

    /// Looks up the first matching service. Consumes one `matching` reference.
    pub fn IOServiceGetMatchingService(
        master_port: mach_port_t,
        matching: CFMutableDictionaryRef,
    ) -> io_service_t;

    /// Registers a standing notification. Consumes one `matching` reference;
    /// draining `iterator` arms the notification.
    pub fn IOServiceAddMatchingNotification(
        notify_port: IONotificationPortRef,
        notification_type: *const c_char,
        matching: CFMutableDictionaryRef,
        callback: IOServiceMatchingCallback,
        refcon: *mut c_void,
        iterator: *mut io_iterator_t,
    ) -> kern_return_t;

    pub fn IOIteratorNext(iterator: io_iterator_t) -> io_object_t;

    pub fn IOObjectRelease(object: io_object_t) -> kern_return_t;

    /// Copies a registry property; the caller releases the returned object.
    pub fn IORegistryEntryCreateCFProperty(
        entry: io_registry_entry_t,
        key: CFStringRef,
        allocator: CFAllocatorRef,
        options: IOOptionBits,
    ) -> CFTypeRef;

    pub fn IONotificationPortCreate(master_port: mach_port_t) -> IONotificationPortRef;

    pub fn IONotificationPortDestroy(notify_port: IONotificationPortRef);

    pub fn IONotificationPortGetRunLoopSource(
        notify_port: IONotificationPortRef,
    ) -> CFRunLoopSourceRef;

    pub fn IOServiceOpen(
        service: io_service_t,
        owning_task: mach_port_t,
        connect_type: u32,
        connect: *mut io_connect_t,
    ) -> kern_return_t;

    pub fn IOServiceClose(connect: io_connect_t) -> kern_return_t;

    pub fn IOConnectCallStructMethod(
        connection: io_connect_t,
        selector: u32,
        input_struct: *const c_void,
        input_struct_cnt: usize,
        output_struct: *mut c_void,
        output_struct_cnt: *mut usize,
    ) -> kern_return_t;

    pub fn IOHIDDeviceCreate(allocator: CFAllocatorRef, service: io_service_t) -> IOHIDDeviceRef;

    pub fn IOHIDDeviceOpen(device: IOHIDDeviceRef, options: IOOptionBits) -> IOReturn;

    pub fn IOHIDDeviceClose(device: IOHIDDeviceRef, options: IOOptionBits) -> IOReturn;

    pub fn IOHIDDeviceRegisterInputValueCallback(
        device: IOHIDDeviceRef,
        callback: IOHIDValueCallback,
        context: *mut c_void,
    );

    pub fn IOHIDDeviceScheduleWithRunLoop(
        device: IOHIDDeviceRef,
        run_loop: CFRunLoopRef,
        run_loop_mode: CFStringRef,
    );

    pub fn IOHIDDeviceUnscheduleFromRunLoop(
        device: IOHIDDeviceRef,
        run_loop: CFRunLoopRef,
        run_loop_mode: CFStringRef,
    );

    pub fn IOHIDValueGetElement(value: IOHIDValueRef) -> IOHIDElementRef;

    pub fn IOHIDValueGetIntegerValue(value: IOHIDValueRef) -> CFIndex;

    pub fn IOHIDElementGetUsagePage(element: IOHIDElementRef) -> u32;

    pub fn IOHIDElementGetUsage(element: IOHIDElementRef) -> u32;
}

// ---------------------------------------------------------------------------
// CoreFoundation
// ---------------------------------------------------------------------------

#[link(name = "CoreFoundation", kind = "framework")]
extern "C" {
    /// Releases a Core Foundation object.
    pub fn CFRelease(cf: CFTypeRef);

    /// Retains a Core Foundation object.
    pub fn CFRetain(cf: CFTypeRef) -> CFTypeRef;

    pub fn CFStringCreateWithCString(
        alloc: CFAllocatorRef,
        c_str: *const c_char,
        encoding: CFStringEncoding,
    ) -> CFStringRef;

    pub fn CFStringGetCString(
        the_string: CFStringRef,
        buffer: *mut c_char,
        buffer_size: CFIndex,
        encoding: CFStringEncoding,
    ) -> Boolean;

    pub fn CFStringGetLength(the_string: CFStringRef) -> CFIndex;

    pub fn CFStringGetMaximumSizeForEncoding(
        length: CFIndex,
        encoding: CFStringEncoding,
    ) -> CFIndex;

    pub fn CFNumberCreate(
        allocator: CFAllocatorRef,
        the_type: CFNumberType,
        value_ptr: *const c_void,
    ) -> CFNumberRef;

    pub fn CFDictionarySetValue(
        the_dict: CFMutableDictionaryRef,
        key: *const c_void,
        value: *const c_void,
    );

    /// Returns the CFRunLoop for the calling thread.
    pub fn CFRunLoopGetCurrent() -> CFRunLoopRef;

    /// Runs the current thread's run loop until CFRunLoopStop is called.
    pub fn CFRunLoopRun();

    /// Stops the specified run loop. Callable from any thread.
    pub fn CFRunLoopStop(rl: CFRunLoopRef);

    pub fn CFRunLoopAddSource(rl: CFRunLoopRef, source: CFRunLoopSourceRef, mode: CFStringRef);

    /// The default run loop mode constant.
    pub static kCFRunLoopDefaultMode: CFStringRef;
}

extern "C" {
    /// Mach port for the current task; `mach_task_self()` expands to this.
    pub static mach_task_self_: mach_port_t;
}

// ---------------------------------------------------------------------------
// Thread-safety wrapper
// ---------------------------------------------------------------------------

/// Wraps CFRunLoopRef for cross-thread transfer.
///
/// Apple's documentation states that CFRunLoopStop may be called from any
/// thread. CFRunLoopRef itself follows CF thread-safety rules (safe to
/// share).
pub struct SendableRunLoop(pub CFRunLoopRef);
unsafe impl Send for SendableRunLoop {}

// ---------------------------------------------------------------------------
// CF helpers
// ---------------------------------------------------------------------------

/// Creates a CFString from a Rust string. The caller releases it.
pub unsafe fn cf_string(s: &str) -> CFStringRef {
    // Interior NULs cannot occur in the registry keys and product names
    // this is fed; an empty string stands in if one ever does.
    let c = CString::new(s).unwrap_or_default();
    CFStringCreateWithCString(ptr::null(), c.as_ptr(), kCFStringEncodingUTF8)
}

/// Copies a CFString's contents into an owned Rust string.
pub unsafe fn string_from_cf(s: CFStringRef) -> Option<String> {
    if s.is_null() {
        return None;
    }
    let length = CFStringGetLength(s);
    let capacity = CFStringGetMaximumSizeForEncoding(length, kCFStringEncodingUTF8) + 1;
    let mut buf = vec![0u8; capacity as usize];
    if CFStringGetCString(s, buf.as_mut_ptr().cast(), capacity, kCFStringEncodingUTF8) == 0 {
        return None;
    }
    let nul = buf.iter().position(|&b| b == 0)?;
    buf.truncate(nul);
    String::from_utf8(buf).ok()
}

/// Stores an i32 CFNumber under `key` in a mutable dictionary.
pub unsafe fn dict_set_i32(dict: CFMutableDictionaryRef, key: &str, value: i32) {
    let key_ref = cf_string(key);
    let value_ref = CFNumberCreate(
        ptr::null(),
        kCFNumberSInt32Type,
        (&value as *const i32).cast(),
    );
    CFDictionarySetValue(dict, key_ref, value_ref);
    // The dictionary retains both; drop the creating references.
    CFRelease(key_ref);
    CFRelease(value_ref);
}
