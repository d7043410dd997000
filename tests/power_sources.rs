//! Power source queries over a stub provider.

use darwin_sensors::power::{PowerSource, PowerSourceProvider, PowerSources, TimeRemaining};
use darwin_sensors::Result;

struct StubProvider {
    sources: Vec<PowerSource>,
    estimate: f64,
}

impl PowerSourceProvider for StubProvider {
    fn power_sources(&self) -> Result<Vec<PowerSource>> {
        Ok(self.sources.clone())
    }

    fn time_remaining(&self) -> Result<TimeRemaining> {
        Ok(TimeRemaining::from_estimate(self.estimate))
    }
}

#[test]
fn enumerates_sources_with_well_known_fields() {
    let power = PowerSources::with_provider(Box::new(StubProvider {
        sources: vec![
            PowerSource {
                name: "InternalBattery-0".to_string(),
                is_present: true,
                current_capacity: 73,
                max_capacity: 100,
            },
            PowerSource {
                name: "AC Adapter".to_string(),
                is_present: false,
                current_capacity: 0,
                max_capacity: 0,
            },
        ],
        estimate: -1.0,
    }));

    let sources = power.sources().unwrap();
    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].name, "InternalBattery-0");
    assert!(sources[0].is_present);
    assert_eq!(sources[0].current_capacity, 73);
    assert_eq!(sources[0].max_capacity, 100);
    assert!(!sources[1].is_present);

    assert_eq!(power.charge_percent().unwrap(), Some(73.0));
    assert_eq!(power.time_remaining().unwrap(), TimeRemaining::Unknown);
}

#[test]
fn on_external_power_the_estimate_is_unlimited() {
    let power = PowerSources::with_provider(Box::new(StubProvider {
        sources: vec![],
        estimate: -2.0,
    }));

    assert_eq!(power.time_remaining().unwrap(), TimeRemaining::Unlimited);
    assert_eq!(power.charge_percent().unwrap(), None);
}

#[test]
fn positive_estimate_converts_seconds_to_minutes() {
    let power = PowerSources::with_provider(Box::new(StubProvider {
        sources: vec![],
        estimate: 5400.0,
    }));

    assert_eq!(
        power.time_remaining().unwrap(),
        TimeRemaining::Minutes(90.0)
    );
}
