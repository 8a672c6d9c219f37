//! Keep the ground-fed mailboxes populated between ground messages
//!
//! IoT values and filter tokens only arrive when the ground station sends
//! them. Once a second these producers re-offer the last IoT value and the
//! idle filter token so packets do not show them as absent.

use super::producer::Producer;
use crate::telemetry::bus::SampleBus;
use std::time::Duration;

/// IoT value reported before the ground station has sent one
pub const DEFAULT_IOT_VALUE: &str = "0";

/// Filter token meaning "no filter move in progress"
pub const IDLE_FILTER_TOKEN: &str = "0N0N";

pub const REFILL_INTERVAL: Duration = Duration::from_secs(1);

/// Re-offers the most recent IoT value when the mailbox is empty
#[derive(Debug, Default)]
pub struct IotRefill;

impl Producer for IotRefill {
    fn name(&self) -> &str {
        "iot-refill"
    }

    fn produce(&mut self, bus: &SampleBus) {
        bus.iot.refill_latest(DEFAULT_IOT_VALUE.to_string());
    }

    fn interval(&self) -> Option<Duration> {
        Some(REFILL_INTERVAL)
    }
}

/// Puts the idle token in the filter mailbox when it is empty
#[derive(Debug, Default)]
pub struct FilterRefill;

impl Producer for FilterRefill {
    fn name(&self) -> &str {
        "filter-refill"
    }

    fn produce(&mut self, bus: &SampleBus) {
        bus.filter_state.put_if_empty(IDLE_FILTER_TOKEN.to_string());
    }

    fn interval(&self) -> Option<Duration> {
        Some(REFILL_INTERVAL)
    }
}
