//! The seam between the SMC protocol logic and the operating system.
//!
//! [`SmcClient`](crate::smc::SmcClient) only ever talks to an
//! [`SmcTransport`]; on macOS `SystemTransport` carries the calls to the
//! AppleSMC kernel extension, while tests substitute the generated
//! `MockSmcTransport` or a scripted implementation.

use std::marker::PhantomData;

use crate::error::Result;
use super::wire::KernelRecord;

/// Kernel extension selector for SMC structured calls.
pub const KERNEL_INDEX_SMC: u32 = 2;

/// An open connection to the SMC service.
///
/// Not `Clone`, and deliberately neither `Send` nor `Sync`: the SMC
/// serializes nothing for you, so a connection stays on the thread that
/// opened it. Dropping a connection releases the underlying handle if
/// [`SmcTransport::close`] never ran, but only an explicit close reports
/// teardown failures.
pub struct SmcConnection {
    raw: u32,
    release: Option<unsafe fn(u32) -> i32>,
    _not_sync: PhantomData<*const ()>,
}

impl SmcConnection {
    /// Wraps a raw handle with no teardown action. Intended for transports
    /// whose close path does its own bookkeeping (mocks, mostly).
    pub fn from_raw(raw: u32) -> Self {
        Self { raw, release: None, _not_sync: PhantomData }
    }

    pub(crate) fn with_release(raw: u32, release: unsafe fn(u32) -> i32) -> Self {
        Self { raw, release: Some(release), _not_sync: PhantomData }
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    /// Runs the release action if it has not run yet; returns its code.
    pub(crate) fn release_now(&mut self) -> Option<i32> {
        self.release.take().map(|release| unsafe { release(self.raw) })
    }
}

impl Drop for SmcConnection {
    fn drop(&mut self) {
        self.release_now();
    }
}

impl std::fmt::Debug for SmcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmcConnection").field("raw", &self.raw).finish()
    }
}

/// Carrier for SMC structured calls.
///
/// Implementations map each operation onto whatever actually answers the
/// protocol: IOKit on a real system, canned responses in tests.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait SmcTransport: Send + Sync {
    /// Locates the SMC service and opens a connection to it.
    fn open(&self) -> Result<SmcConnection>;

    /// Issues one structured call and returns the response record.
    fn call(
        &self,
        connection: &SmcConnection,
        selector: u32,
        input: &KernelRecord,
    ) -> Result<KernelRecord>;

    /// Closes a connection. Callers pair this with every successful `open`.
    fn close(&self, connection: SmcConnection) -> Result<()>;
}

#[cfg(target_os = "macos")]
pub use system::SystemTransport;

#[cfg(target_os = "macos")]
mod system {
    use std::ffi::c_void;

    use tracing::{debug, trace};

    use super::{KernelRecord, SmcConnection, SmcTransport};
    use crate::error::{Error, Result};
    use crate::ffi::{self, ServiceHandle};
    use crate::smc::wire::KERNEL_RECORD_LEN;

    /// Transport backed by the AppleSMC kernel extension.
    #[derive(Debug, Default)]
    pub struct SystemTransport;

    unsafe fn close_connection(raw: u32) -> i32 {
        unsafe { ffi::IOServiceClose(raw) }
    }

    impl SmcTransport for SystemTransport {
        fn open(&self) -> Result<SmcConnection> {
            let service = unsafe {
                let matching = ffi::IOServiceMatching(ffi::APPLE_SMC.as_ptr());
                if matching.is_null() {
                    return Err(Error::ServiceUnavailable);
                }
                // The lookup consumes one reference to the matching dict.
                ffi::IOServiceGetMatchingService(ffi::MAIN_PORT_DEFAULT, matching)
            };
            let service = ServiceHandle::new(service).ok_or(Error::ServiceUnavailable)?;

            let mut connection: u32 = 0;
            let code = unsafe {
                ffi::IOServiceOpen(service.raw(), ffi::mach_task_self(), 0, &mut connection)
            };
            if code != ffi::KERN_SUCCESS {
                return Err(Error::ConnectionDenied { code });
            }
            debug!(connection, "opened AppleSMC connection");
            Ok(SmcConnection::with_release(connection, close_connection))
        }

        fn call(
            &self,
            connection: &SmcConnection,
            selector: u32,
            input: &KernelRecord,
        ) -> Result<KernelRecord> {
            let request = input.pack();
            let mut response = [0u8; KERNEL_RECORD_LEN];
            let mut response_len = KERNEL_RECORD_LEN;
            let code = unsafe {
                ffi::IOConnectCallStructMethod(
                    connection.raw(),
                    selector,
                    request.as_ptr() as *const c_void,
                    request.len(),
                    response.as_mut_ptr() as *mut c_void,
                    &mut response_len,
                )
            };
            if code != ffi::KERN_SUCCESS {
                return Err(Error::transport("IOConnectCallStructMethod", code));
            }
            trace!(selector, response_len, "structured call completed");
            Ok(KernelRecord::unpack(&response))
        }

        fn close(&self, mut connection: SmcConnection) -> Result<()> {
            match connection.release_now() {
                Some(code) if code != ffi::KERN_SUCCESS => {
                    Err(Error::transport("IOServiceClose", code))
                }
                _ => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    // Fn pointers cannot capture, so each test counts through its own static.

    #[test]
    fn connection_releases_exactly_once() {
        static RELEASES: AtomicUsize = AtomicUsize::new(0);
        unsafe fn counting_release(_raw: u32) -> i32 {
            RELEASES.fetch_add(1, Ordering::SeqCst);
            0
        }

        let mut connection = SmcConnection::with_release(7, counting_release);
        assert_eq!(connection.raw(), 7);
        assert_eq!(connection.release_now(), Some(0));
        // A second explicit release and the drop are both no-ops.
        assert_eq!(connection.release_now(), None);
        drop(connection);
        assert_eq!(RELEASES.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_connection_releases_as_backstop() {
        static RELEASES: AtomicUsize = AtomicUsize::new(0);
        unsafe fn counting_release(_raw: u32) -> i32 {
            RELEASES.fetch_add(1, Ordering::SeqCst);
            0
        }

        drop(SmcConnection::with_release(7, counting_release));
        assert_eq!(RELEASES.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn raw_connection_has_no_release_action() {
        let mut connection = SmcConnection::from_raw(9);
        assert_eq!(connection.release_now(), None);
    }
}
