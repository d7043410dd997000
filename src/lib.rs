//! Safe Rust access to Apple's SMC sensors and power sources.
//!
//! Two native macOS interfaces live behind this crate:
//!
//! - the **System Management Controller** (SMC), queried key by key for
//!   hardware sensors: CPU temperature, CPU voltage, fan speeds
//!   ([`smc::SmcClient`]);
//! - the **IOPowerSources** API, enumerating attached power sources and the
//!   system-wide battery time estimate ([`power::PowerSources`]).
//!
//! # Design
//!
//! Every OS touchpoint sits behind a small trait: [`smc::transport::SmcTransport`]
//! for the SMC structured calls, [`power::PowerSourceProvider`] for power
//! snapshots. Clients take the implementation by injection. The
//! protocol logic, the wire codec and all tests therefore build and run on
//! any platform; only the system-backed implementations are
//! `cfg(target_os = "macos")`.
//!
//! The SMC wire records are serialized explicitly at named byte offsets
//! ([`smc::wire`]) instead of overlaying a `#[repr(C)]` struct, and every
//! opaque OS handle is held in an ownership wrapper that releases it exactly
//! once.
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(target_os = "macos")]
//! # fn main() -> darwin_sensors::Result<()> {
//! use darwin_sensors::smc::SmcClient;
//!
//! let client = SmcClient::new();
//! println!("CPU temperature: {:.1} °C", client.cpu_temperature()?);
//! for (i, rpm) in client.fan_speeds()?.iter().enumerate() {
//!     println!("fan {i}: {rpm:.0} rpm");
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "macos"))]
//! # fn main() {}
//! ```
//!
//! # Errors
//!
//! All fallible operations return [`Result`] with the crate-level [`Error`]
//! enum; nothing is retried internally and no call at this layer takes a
//! timeout.

pub mod error;
#[cfg(target_os = "macos")]
pub mod ffi;
pub mod power;
pub mod smc;

pub use error::{Error, Result};

/// Commonly used types, re-exported.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::power::{PowerSource, PowerSourceProvider, PowerSources, TimeRemaining};
    pub use crate::smc::transport::{SmcConnection, SmcTransport};
    pub use crate::smc::{keys, KeyInfo, SmcClient, SmcKey, SmcReading, TypeTag};
}
