//! Raw IOKit and IOPowerSources declarations.
//!
//! Everything in this module is macOS-only and unsafe; the rest of the crate
//! reaches the OS exclusively through [`crate::smc::transport::SystemTransport`]
//! and [`crate::power::SystemPowerSources`], which wrap these calls and own
//! the handle lifetimes.

use std::ffi::{c_char, c_void, CStr};

use core_foundation::{array::CFArrayRef, base::CFTypeRef, dictionary::CFDictionaryRef};
use libc::{kern_return_t, mach_port_t};

#[allow(non_camel_case_types)]
pub type io_object_t = mach_port_t;
#[allow(non_camel_case_types)]
pub type io_connect_t = mach_port_t;

pub const KERN_SUCCESS: kern_return_t = 0;

/// Passing 0 as the main port asks IOKit for the default one.
pub const MAIN_PORT_DEFAULT: mach_port_t = 0;

/// Registry name of the SMC kernel extension.
pub const APPLE_SMC: &CStr = c"AppleSMC";

#[link(name = "IOKit", kind = "framework")]
extern "C" {
    pub fn IOServiceMatching(name: *const c_char) -> *mut c_void;
    pub fn IOServiceGetMatchingService(main_port: mach_port_t, matching: *mut c_void) -> io_object_t;
    pub fn IOServiceOpen(
        service: io_object_t,
        owning_task: mach_port_t,
        conn_type: u32,
        connection: *mut io_connect_t,
    ) -> kern_return_t;
    pub fn IOServiceClose(connection: io_connect_t) -> kern_return_t;
    pub fn IOObjectRelease(object: io_object_t) -> kern_return_t;
    pub fn IOConnectCallStructMethod(
        connection: io_connect_t,
        selector: u32,
        input: *const c_void,
        input_len: usize,
        output: *mut c_void,
        output_len: *mut usize,
    ) -> kern_return_t;

    pub fn IOPSCopyPowerSourcesInfo() -> CFTypeRef;
    pub fn IOPSCopyPowerSourcesList(blob: CFTypeRef) -> CFArrayRef;
    pub fn IOPSGetPowerSourceDescription(blob: CFTypeRef, ps: CFTypeRef) -> CFDictionaryRef;
    pub fn IOPSGetTimeRemainingEstimate() -> f64;

    pub fn mach_task_self() -> mach_port_t;
}

unsafe fn release_object(raw: io_object_t) -> kern_return_t {
    unsafe { IOObjectRelease(raw) }
}

/// Owns an `io_object_t` registry handle and releases it exactly once,
/// whether dropped or released explicitly.
#[derive(Debug)]
pub struct ServiceHandle {
    raw: io_object_t,
    release: unsafe fn(io_object_t) -> kern_return_t,
    released: bool,
}

impl ServiceHandle {
    /// Wraps a handle returned by a lookup; `None` for the null handle.
    pub fn new(raw: io_object_t) -> Option<Self> {
        (raw != 0).then_some(Self { raw, release: release_object, released: false })
    }

    pub fn raw(&self) -> io_object_t {
        self.raw
    }

    /// Releases early instead of waiting for drop.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            unsafe { (self.release)(self.raw) };
        }
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// Owns a CoreFoundation object reference obtained from a Copy/Create call
/// and releases it exactly once via `CFRelease`.
pub struct CfHandle {
    ptr: CFTypeRef,
    released: bool,
}

impl CfHandle {
    /// Takes ownership of `ptr`; `None` when the call returned null.
    pub fn new(ptr: CFTypeRef) -> Option<Self> {
        (!ptr.is_null()).then_some(Self { ptr, released: false })
    }

    pub fn as_ptr(&self) -> CFTypeRef {
        self.ptr
    }
}

impl Drop for CfHandle {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            unsafe { core_foundation::base::CFRelease(self.ptr) };
        }
    }
}
