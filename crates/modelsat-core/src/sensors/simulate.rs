//! Simulated producers for bench runs without flight hardware
//!
//! Readings are uniformly random within each sensor's physical range,
//! except altitudes which follow a bounded random walk so the flight phase
//! logic has something continuous to chew on.

use super::producer::Producer;
use crate::telemetry::bus::SampleBus;
use crate::telemetry::sample::{round2, GpsFix, NavigationRecord, Orientation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Largest altitude change between two simulated readings
const ALTITUDE_STEP: f64 = 40.0;

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

#[derive(Debug, Clone)]
struct AltitudeWalk {
    altitude: f64,
}

impl AltitudeWalk {
    fn step(&mut self, rng: &mut StdRng) -> f64 {
        self.altitude = (self.altitude + rng.random_range(-ALTITUDE_STEP..=ALTITUDE_STEP)).max(0.0);
        round2(self.altitude)
    }
}

/// Science payload barometer: pressure and altitude
#[derive(Debug)]
pub struct SimulatedBarometer {
    rng: StdRng,
    walk: AltitudeWalk,
}

impl SimulatedBarometer {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: rng_from(seed),
            walk: AltitudeWalk { altitude: 0.0 },
        }
    }
}

impl Producer for SimulatedBarometer {
    fn name(&self) -> &str {
        "barometer-sim"
    }

    fn produce(&mut self, bus: &SampleBus) {
        bus.pressure.put(round2(self.rng.random_range(900.0..1100.0)));
        bus.altitude.put(self.walk.step(&mut self.rng));
    }
}

#[derive(Debug)]
pub struct SimulatedThermometer {
    rng: StdRng,
}

impl SimulatedThermometer {
    pub fn new(seed: Option<u64>) -> Self {
        Self { rng: rng_from(seed) }
    }
}

impl Producer for SimulatedThermometer {
    fn name(&self) -> &str {
        "thermometer-sim"
    }

    fn produce(&mut self, bus: &SampleBus) {
        bus.temperature.put(round2(self.rng.random_range(-20.0..40.0)));
    }
}

/// Container navigation board: pressure, GPS, battery, altitude
#[derive(Debug)]
pub struct SimulatedNavigation {
    rng: StdRng,
    walk: AltitudeWalk,
}

impl SimulatedNavigation {
    pub fn new(seed: Option<u64>) -> Self {
        Self {
            rng: rng_from(seed),
            walk: AltitudeWalk { altitude: 0.0 },
        }
    }

    pub fn record(&mut self) -> NavigationRecord {
        let rng = &mut self.rng;
        NavigationRecord {
            pressure: Some(round2(rng.random_range(900.0..1100.0))),
            gps: GpsFix {
                latitude: Some(format!("{:.7}", rng.random_range(-90.0..90.0))),
                longitude: Some(format!("{:.7}", rng.random_range(-180.0..180.0))),
                altitude: Some(format!("{:.2}", rng.random_range(-100.0..1000.0))),
            },
            battery_voltage: Some(format!("{:.2}", rng.random_range(3.0..4.2))),
            altitude: Some(self.walk.step(&mut self.rng)),
        }
    }
}

impl Producer for SimulatedNavigation {
    fn name(&self) -> &str {
        "navigation-sim"
    }

    fn produce(&mut self, bus: &SampleBus) {
        let record = self.record();
        bus.navigation.put(record);
    }
}

/// Inertial unit: Euler angles in degrees
#[derive(Debug)]
pub struct SimulatedOrientation {
    rng: StdRng,
}

impl SimulatedOrientation {
    pub fn new(seed: Option<u64>) -> Self {
        Self { rng: rng_from(seed) }
    }
}

impl Producer for SimulatedOrientation {
    fn name(&self) -> &str {
        "orientation-sim"
    }

    fn produce(&mut self, bus: &SampleBus) {
        bus.orientation.put(Orientation {
            roll: round2(self.rng.random_range(0.0..360.0)),
            pitch: round2(self.rng.random_range(-90.0..90.0)),
            yaw: round2(self.rng.random_range(-180.0..180.0)),
        });
    }
}

/// Every simulated producer, seeded from the OS
pub fn simulated_producers() -> Vec<Box<dyn Producer>> {
    vec![
        Box::new(SimulatedBarometer::new(None)),
        Box::new(SimulatedThermometer::new(None)),
        Box::new(SimulatedNavigation::new(None)),
        Box::new(SimulatedOrientation::new(None)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::fault::{GPS_ALTITUDE_SENTINEL, GPS_COORDINATE_SENTINEL};

    #[test]
    fn test_barometer_ranges() {
        let bus = SampleBus::new();
        let mut sim = SimulatedBarometer::new(Some(7));
        let mut previous = 0.0;
        for _ in 0..200 {
            sim.produce(&bus);
            let pressure = bus.pressure.drain().unwrap();
            let altitude = bus.altitude.drain().unwrap();
            assert!((900.0..=1100.0).contains(&pressure));
            assert!(altitude >= 0.0);
            assert!((altitude - previous).abs() <= ALTITUDE_STEP + 0.01);
            previous = altitude;
        }
    }

    #[test]
    fn test_navigation_record_shape() {
        let mut sim = SimulatedNavigation::new(Some(3));
        let record = sim.record();
        let latitude = record.gps.latitude.unwrap();
        assert_eq!(latitude.split('.').nth(1).unwrap().len(), 7);
        assert_ne!(latitude, GPS_COORDINATE_SENTINEL);
        assert_ne!(record.gps.altitude.as_deref(), Some(GPS_ALTITUDE_SENTINEL));
        let battery: f64 = record.battery_voltage.unwrap().parse().unwrap();
        assert!((3.0..=4.2).contains(&battery));
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let bus = SampleBus::new();
        let mut a = SimulatedOrientation::new(Some(42));
        let mut b = SimulatedOrientation::new(Some(42));
        a.produce(&bus);
        let first = bus.orientation.drain().unwrap();
        b.produce(&bus);
        let second = bus.orientation.drain().unwrap();
        assert_eq!(first, second);
        assert!((0.0..=360.0).contains(&first.roll));
    }

    #[test]
    fn test_all_simulators_fill_their_mailboxes() {
        let bus = SampleBus::new();
        for mut producer in simulated_producers() {
            producer.produce(&bus);
        }
        let inputs = bus.drain_all();
        assert!(inputs.pressure.is_some());
        assert!(inputs.altitude.is_some());
        assert!(inputs.temperature.is_some());
        assert!(inputs.navigation.is_some());
        assert!(inputs.orientation.is_some());
        assert_eq!(inputs.missing().len(), 2);
    }
}
