//! Power source enumeration.
//!
//! A snapshot of the attached power sources comes from three chained
//! IOPowerSources calls: copy the opaque info blob, copy the list of source
//! identifiers out of it, then fetch each source's description dictionary.
//! Field access is by well-known dictionary key (`Name`, `Is Present`,
//! `Current Capacity`, `Max Capacity`). The system-wide battery estimate is
//! a single call with sentinel values, mapped here to [`TimeRemaining`].
//!
//! As with the SMC side, the OS sits behind a trait
//! ([`PowerSourceProvider`]) so everything above it runs anywhere.

use crate::error::Result;

/// Description of one attached power source.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSource {
    pub name: String,
    pub is_present: bool,
    /// Current charge, in the same unit as `max_capacity` (usually percent
    /// of design capacity).
    pub current_capacity: i64,
    pub max_capacity: i64,
}

/// System-wide battery time estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeRemaining {
    /// On external power; the battery is not draining.
    Unlimited,
    /// The OS is still computing the estimate.
    Unknown,
    Minutes(f64),
}

impl TimeRemaining {
    /// Maps the sentinel values of `IOPSGetTimeRemainingEstimate`: -2.0 is
    /// unlimited, -1.0 is unknown, anything else is seconds remaining.
    pub fn from_estimate(seconds: f64) -> Self {
        if seconds == -2.0 {
            TimeRemaining::Unlimited
        } else if seconds == -1.0 {
            TimeRemaining::Unknown
        } else {
            TimeRemaining::Minutes(seconds / 60.0)
        }
    }
}

/// Source of power source snapshots.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait PowerSourceProvider: Send + Sync {
    /// Enumerates the attached power sources.
    fn power_sources(&self) -> Result<Vec<PowerSource>>;

    /// The system-wide battery time estimate.
    fn time_remaining(&self) -> Result<TimeRemaining>;
}

/// Entry point for power source queries, generic over the provider.
pub struct PowerSources {
    provider: Box<dyn PowerSourceProvider>,
}

impl PowerSources {
    /// Queries the real IOPowerSources API.
    #[cfg(target_os = "macos")]
    pub fn new() -> Self {
        Self::with_provider(Box::new(SystemPowerSources))
    }

    pub fn with_provider(provider: Box<dyn PowerSourceProvider>) -> Self {
        Self { provider }
    }

    pub fn sources(&self) -> Result<Vec<PowerSource>> {
        self.provider.power_sources()
    }

    pub fn time_remaining(&self) -> Result<TimeRemaining> {
        self.provider.time_remaining()
    }

    /// Overall charge level across the present sources, as a percentage.
    /// `None` when no source is present or capacities are unusable.
    pub fn charge_percent(&self) -> Result<Option<f64>> {
        let sources = self.provider.power_sources()?;
        let mut current = 0i64;
        let mut max = 0i64;
        for source in sources.iter().filter(|s| s.is_present) {
            current += source.current_capacity;
            max += source.max_capacity;
        }
        if max <= 0 {
            return Ok(None);
        }
        Ok(Some(current as f64 / max as f64 * 100.0))
    }
}

#[cfg(target_os = "macos")]
impl Default for PowerSources {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "macos")]
pub use system::SystemPowerSources;

#[cfg(target_os = "macos")]
mod system {
    use std::ffi::{c_char, c_void, CStr};

    use core_foundation::{
        array::{CFArrayGetCount, CFArrayGetValueAtIndex, CFArrayRef},
        base::{kCFAllocatorDefault, kCFAllocatorNull, CFTypeRef},
        dictionary::{CFDictionaryGetValue, CFDictionaryRef},
        number::{kCFNumberSInt64Type, CFBooleanGetValue, CFBooleanRef, CFNumberGetValue, CFNumberRef},
        string::{kCFStringEncodingUTF8, CFStringCreateWithBytesNoCopy, CFStringGetCString, CFStringRef},
    };
    use tracing::debug;

    use super::{PowerSource, PowerSourceProvider, TimeRemaining};
    use crate::error::{Error, Result};
    use crate::ffi::{self, CfHandle};

    const NAME_KEY: &str = "Name";
    const IS_PRESENT_KEY: &str = "Is Present";
    const CURRENT_CAPACITY_KEY: &str = "Current Capacity";
    const MAX_CAPACITY_KEY: &str = "Max Capacity";

    /// Provider backed by the IOPowerSources API.
    #[derive(Debug, Default)]
    pub struct SystemPowerSources;

    impl PowerSourceProvider for SystemPowerSources {
        fn power_sources(&self) -> Result<Vec<PowerSource>> {
            unsafe {
                let blob = CfHandle::new(ffi::IOPSCopyPowerSourcesInfo())
                    .ok_or(Error::PowerSourcesUnavailable)?;
                let list = CfHandle::new(ffi::IOPSCopyPowerSourcesList(blob.as_ptr()) as CFTypeRef)
                    .ok_or(Error::PowerSourcesUnavailable)?;

                let count = CFArrayGetCount(list.as_ptr() as CFArrayRef);
                let mut sources = Vec::with_capacity(count as usize);
                for index in 0..count {
                    let ps = CFArrayGetValueAtIndex(list.as_ptr() as CFArrayRef, index);
                    // Borrowed from the blob; not ours to release.
                    let description =
                        ffi::IOPSGetPowerSourceDescription(blob.as_ptr(), ps as CFTypeRef);
                    if description.is_null() {
                        continue;
                    }
                    sources.push(describe(description)?);
                }
                debug!(count = sources.len(), "enumerated power sources");
                Ok(sources)
            }
        }

        fn time_remaining(&self) -> Result<TimeRemaining> {
            let estimate = unsafe { ffi::IOPSGetTimeRemainingEstimate() };
            Ok(TimeRemaining::from_estimate(estimate))
        }
    }

    unsafe fn describe(description: CFDictionaryRef) -> Result<PowerSource> {
        let missing = |key: &'static str| Error::MissingDescriptionKey { key };
        Ok(PowerSource {
            name: string_value(description, NAME_KEY).unwrap_or_else(|| "Unknown".to_string()),
            is_present: bool_value(description, IS_PRESENT_KEY)
                .ok_or_else(|| missing(IS_PRESENT_KEY))?,
            current_capacity: number_value(description, CURRENT_CAPACITY_KEY)
                .ok_or_else(|| missing(CURRENT_CAPACITY_KEY))?,
            max_capacity: number_value(description, MAX_CAPACITY_KEY)
                .ok_or_else(|| missing(MAX_CAPACITY_KEY))?,
        })
    }

    /// A CFString view of a `&str`, released on drop. The backing bytes are
    /// borrowed, so the handle must not outlive the `&str`.
    unsafe fn cf_string(text: &str) -> Option<CfHandle> {
        let raw = CFStringCreateWithBytesNoCopy(
            kCFAllocatorDefault,
            text.as_ptr(),
            text.len() as isize,
            kCFStringEncodingUTF8,
            0,
            kCFAllocatorNull,
        );
        CfHandle::new(raw as CFTypeRef)
    }

    unsafe fn dict_value(dict: CFDictionaryRef, key: &str) -> Option<CFTypeRef> {
        let key = cf_string(key)?;
        let value = CFDictionaryGetValue(dict, key.as_ptr() as *const c_void);
        (!value.is_null()).then_some(value as CFTypeRef)
    }

    unsafe fn number_value(dict: CFDictionaryRef, key: &str) -> Option<i64> {
        let value = dict_value(dict, key)?;
        let mut out: i64 = 0;
        let ok = CFNumberGetValue(
            value as CFNumberRef,
            kCFNumberSInt64Type,
            &mut out as *mut i64 as *mut c_void,
        );
        (ok != 0).then_some(out)
    }

    unsafe fn bool_value(dict: CFDictionaryRef, key: &str) -> Option<bool> {
        let value = dict_value(dict, key)?;
        Some(CFBooleanGetValue(value as CFBooleanRef) != 0)
    }

    unsafe fn string_value(dict: CFDictionaryRef, key: &str) -> Option<String> {
        let value = dict_value(dict, key)?;
        let mut buf = [0 as c_char; 128];
        let ok = CFStringGetCString(
            value as CFStringRef,
            buf.as_mut_ptr(),
            buf.len() as isize,
            kCFStringEncodingUTF8,
        );
        if ok == 0 {
            return None;
        }
        Some(CStr::from_ptr(buf.as_ptr()).to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery(present: bool, current: i64, max: i64) -> PowerSource {
        PowerSource {
            name: "InternalBattery-0".to_string(),
            is_present: present,
            current_capacity: current,
            max_capacity: max,
        }
    }

    #[test]
    fn time_remaining_sentinels() {
        assert_eq!(TimeRemaining::from_estimate(-2.0), TimeRemaining::Unlimited);
        assert_eq!(TimeRemaining::from_estimate(-1.0), TimeRemaining::Unknown);
        assert_eq!(
            TimeRemaining::from_estimate(5400.0),
            TimeRemaining::Minutes(90.0)
        );
        assert_eq!(TimeRemaining::from_estimate(0.0), TimeRemaining::Minutes(0.0));
    }

    #[test]
    fn sources_pass_through_provider() {
        let mut mock = MockPowerSourceProvider::new();
        mock.expect_power_sources()
            .times(1)
            .returning(|| Ok(vec![battery(true, 80, 100)]));
        let power = PowerSources::with_provider(Box::new(mock));

        let sources = power.sources().unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "InternalBattery-0");
        assert!(sources[0].is_present);
        assert_eq!(sources[0].current_capacity, 80);
        assert_eq!(sources[0].max_capacity, 100);
    }

    #[test]
    fn charge_percent_sums_present_sources_only() {
        let mut mock = MockPowerSourceProvider::new();
        mock.expect_power_sources().returning(|| {
            Ok(vec![
                battery(true, 80, 100),
                battery(false, 0, 100),
                battery(true, 40, 100),
            ])
        });
        let power = PowerSources::with_provider(Box::new(mock));

        assert_eq!(power.charge_percent().unwrap(), Some(60.0));
    }

    #[test]
    fn charge_percent_is_none_without_present_sources() {
        let mut mock = MockPowerSourceProvider::new();
        mock.expect_power_sources()
            .returning(|| Ok(vec![battery(false, 0, 100)]));
        let power = PowerSources::with_provider(Box::new(mock));

        assert_eq!(power.charge_percent().unwrap(), None);
    }

    #[test]
    fn time_remaining_passes_through_provider() {
        let mut mock = MockPowerSourceProvider::new();
        mock.expect_time_remaining()
            .times(1)
            .returning(|| Ok(TimeRemaining::Minutes(42.0)));
        let power = PowerSources::with_provider(Box::new(mock));

        assert_eq!(power.time_remaining().unwrap(), TimeRemaining::Minutes(42.0));
    }
}
