//! Sensor producers and altitude derivation

pub mod altitude;
pub mod producer;
pub mod refill;
pub mod serial;
pub mod simulate;

pub use altitude::AltitudeReference;
pub use producer::{Producer, ProducerHandle, ProducerSet};
