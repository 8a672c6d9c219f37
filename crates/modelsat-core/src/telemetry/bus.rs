//! Single-slot sample bus
//!
//! Each sensor category owns one [`Mailbox`]. A `put` always replaces the
//! pending value (no queueing, no backlog) and a `drain` takes whatever is
//! pending without ever waiting for a producer. The telemetry cycle cadence
//! is therefore independent of sensor cadence: a category that produced
//! nothing since the last cycle simply shows up as absent.

use super::sample::{Category, GpsFix, NavigationRecord, Orientation, SensorSample};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Slot<T> {
    pending: Option<T>,
    /// Last value ever written, kept for refill producers
    latest: Option<T>,
}

/// Overwrite-on-write, best-effort-read cell between one producer and the cycle
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Slot<T>>,
    writes: AtomicU64,
}

impl<T: Clone> Mailbox<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                pending: None,
                latest: None,
            }),
            writes: AtomicU64::new(0),
        }
    }

    // A producer that panicked mid-put must not stall the cycle
    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace any unconsumed value with `value`
    pub fn put(&self, value: T) {
        let mut slot = self.lock();
        slot.latest = Some(value.clone());
        slot.pending = Some(value);
        drop(slot);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the pending value, leaving the slot empty for the next cycle
    pub fn drain(&self) -> Option<T> {
        self.lock().pending.take()
    }

    /// Put `value` only if nothing is pending. Returns true if it was put.
    pub fn put_if_empty(&self, value: T) -> bool {
        let mut slot = self.lock();
        if slot.pending.is_some() {
            return false;
        }
        slot.latest = Some(value.clone());
        slot.pending = Some(value);
        true
    }

    /// Re-offer the last written value (or `default`) if nothing is pending
    pub fn refill_latest(&self, default: T) -> bool {
        let mut slot = self.lock();
        if slot.pending.is_some() {
            return false;
        }
        slot.pending = Some(slot.latest.clone().unwrap_or(default));
        true
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_none()
    }

    /// Drop the pending value without reading it
    pub fn clear(&self) {
        self.lock().pending = None;
    }

    /// Total number of producer writes since creation
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl<T: Clone> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything drained from the bus for one cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleInputs {
    pub pressure: Option<f64>,
    pub altitude: Option<f64>,
    pub temperature: Option<f64>,
    pub navigation: Option<NavigationRecord>,
    pub orientation: Option<Orientation>,
    pub iot: Option<String>,
    pub filter_state: Option<String>,
}

impl CycleInputs {
    /// Science payload altitude (the payload barometer)
    pub fn science_payload_altitude(&self) -> Option<f64> {
        self.altitude
    }

    /// Container altitude (derived on the navigation board)
    pub fn container_altitude(&self) -> Option<f64> {
        self.navigation.as_ref().and_then(|n| n.altitude)
    }

    pub fn container_pressure(&self) -> Option<f64> {
        self.navigation.as_ref().and_then(|n| n.pressure)
    }

    pub fn gps(&self) -> Option<&GpsFix> {
        self.navigation.as_ref().map(|n| &n.gps)
    }

    pub fn roll(&self) -> Option<f64> {
        self.orientation.map(|o| o.roll)
    }

    /// Categories that had nothing pending this cycle
    pub fn missing(&self) -> Vec<Category> {
        let present = [
            (Category::Pressure, self.pressure.is_some()),
            (Category::Altitude, self.altitude.is_some()),
            (Category::Temperature, self.temperature.is_some()),
            (Category::Navigation, self.navigation.is_some()),
            (Category::Orientation, self.orientation.is_some()),
            (Category::Iot, self.iot.is_some()),
            (Category::FilterState, self.filter_state.is_some()),
        ];
        present
            .into_iter()
            .filter(|(_, is_present)| !is_present)
            .map(|(category, _)| category)
            .collect()
    }
}

/// One mailbox per sensor category
#[derive(Debug, Default)]
pub struct SampleBus {
    pub pressure: Mailbox<f64>,
    pub altitude: Mailbox<f64>,
    pub temperature: Mailbox<f64>,
    pub navigation: Mailbox<NavigationRecord>,
    pub orientation: Mailbox<Orientation>,
    pub iot: Mailbox<String>,
    pub filter_state: Mailbox<String>,
}

impl SampleBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a sample into its category's mailbox
    pub fn put(&self, sample: SensorSample) {
        match sample {
            SensorSample::Pressure(v) => self.pressure.put(v),
            SensorSample::Altitude(v) => self.altitude.put(v),
            SensorSample::Temperature(v) => self.temperature.put(v),
            SensorSample::Navigation(v) => self.navigation.put(v),
            SensorSample::Orientation(v) => self.orientation.put(v),
            SensorSample::Iot(v) => self.iot.put(v),
            SensorSample::FilterState(v) => self.filter_state.put(v),
        }
    }

    /// Take the pending sample of one category
    pub fn drain(&self, category: Category) -> Option<SensorSample> {
        match category {
            Category::Pressure => self.pressure.drain().map(SensorSample::Pressure),
            Category::Altitude => self.altitude.drain().map(SensorSample::Altitude),
            Category::Temperature => self.temperature.drain().map(SensorSample::Temperature),
            Category::Navigation => self.navigation.drain().map(SensorSample::Navigation),
            Category::Orientation => self.orientation.drain().map(SensorSample::Orientation),
            Category::Iot => self.iot.drain().map(SensorSample::Iot),
            Category::FilterState => self.filter_state.drain().map(SensorSample::FilterState),
        }
    }

    /// Take one value per category for a telemetry cycle
    pub fn drain_all(&self) -> CycleInputs {
        CycleInputs {
            pressure: self.pressure.drain(),
            altitude: self.altitude.drain(),
            temperature: self.temperature.drain(),
            navigation: self.navigation.drain(),
            orientation: self.orientation.drain(),
            iot: self.iot.drain(),
            filter_state: self.filter_state.drain(),
        }
    }

    pub fn clear(&self) {
        self.pressure.clear();
        self.altitude.clear();
        self.temperature.clear();
        self.navigation.clear();
        self.orientation.clear();
        self.iot.clear();
        self.filter_state.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_put_replaces_pending_value() {
        let mailbox = Mailbox::new();
        mailbox.put(1.0);
        mailbox.put(2.0);
        mailbox.put(3.0);
        assert_eq!(mailbox.drain(), Some(3.0));
        assert_eq!(mailbox.drain(), None);
        assert_eq!(mailbox.write_count(), 3);
    }

    #[test]
    fn test_drain_empty_is_absent() {
        let mailbox: Mailbox<String> = Mailbox::new();
        assert!(mailbox.is_empty());
        assert_eq!(mailbox.drain(), None);
    }

    #[test]
    fn test_put_if_empty() {
        let mailbox = Mailbox::new();
        assert!(mailbox.put_if_empty("0N0N".to_string()));
        assert!(!mailbox.put_if_empty("1R2G".to_string()));
        assert_eq!(mailbox.drain().as_deref(), Some("0N0N"));
    }

    #[test]
    fn test_refill_latest_reoffers_last_value() {
        let mailbox = Mailbox::new();
        assert!(mailbox.refill_latest("0".to_string()));
        assert_eq!(mailbox.drain().as_deref(), Some("0"));

        mailbox.put("17".to_string());
        assert_eq!(mailbox.drain().as_deref(), Some("17"));
        assert!(mailbox.refill_latest("0".to_string()));
        assert_eq!(mailbox.drain().as_deref(), Some("17"));
    }

    #[test]
    fn test_bus_routes_by_category() {
        let bus = SampleBus::new();
        bus.put(SensorSample::Pressure(950.0));
        bus.put(SensorSample::Iot("12".into()));

        assert_eq!(bus.drain(Category::Altitude), None);
        assert_eq!(
            bus.drain(Category::Pressure),
            Some(SensorSample::Pressure(950.0))
        );
        assert_eq!(
            bus.drain(Category::Iot),
            Some(SensorSample::Iot("12".into()))
        );
    }

    #[test]
    fn test_drain_all_reports_missing() {
        let bus = SampleBus::new();
        bus.put(SensorSample::Altitude(120.0));
        bus.put(SensorSample::Orientation(Orientation {
            roll: 1.0,
            pitch: 2.0,
            yaw: 3.0,
        }));

        let inputs = bus.drain_all();
        assert_eq!(inputs.altitude, Some(120.0));
        assert_eq!(inputs.roll(), Some(1.0));
        assert_eq!(inputs.missing().len(), 5);
        assert!(!inputs.missing().contains(&Category::Altitude));

        let next = bus.drain_all();
        assert_eq!(next.missing().len(), 7);
    }

    #[test]
    fn test_concurrent_put_and_drain_keeps_latest() {
        let bus = Arc::new(SampleBus::new());
        let producer = {
            let bus = Arc::clone(&bus);
            std::thread::spawn(move || {
                for i in 0..10_000 {
                    bus.put(SensorSample::Temperature(i as f64));
                }
            })
        };

        let mut last_seen = -1.0;
        for _ in 0..1000 {
            if let Some(v) = bus.temperature.drain() {
                assert!(v > last_seen, "values must never go back in time");
                last_seen = v;
            }
        }
        producer.join().unwrap();

        if let Some(v) = bus.temperature.drain() {
            assert_eq!(v, 9999.0);
        }
        assert_eq!(bus.temperature.write_count(), 10_000);
    }
}
