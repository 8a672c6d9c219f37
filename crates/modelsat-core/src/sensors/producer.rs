//! Producer threads
//!
//! Every sensor source runs on its own named thread and writes only its own
//! mailbox. A [`ProducerHandle`] owns one such thread; stopping it hands the
//! producer back so the group can be restarted by a later `start` command.

use crate::telemetry::bus::SampleBus;
use crate::telemetry::command::ProducerControl;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// One independent sensor source
pub trait Producer: Send + 'static {
    fn name(&self) -> &str;

    /// Take one reading and put it on the bus
    fn produce(&mut self, bus: &SampleBus);

    /// Delay between readings; None uses the group default
    fn interval(&self) -> Option<Duration> {
        None
    }
}

fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a running producer thread
pub struct ProducerHandle {
    name: String,
    stop_flag: Arc<AtomicBool>,
    /// Readings taken so far, updated by the producer thread
    readings: Arc<AtomicU64>,
    thread: Option<JoinHandle<Option<Box<dyn Producer>>>>,
}

impl ProducerHandle {
    /// Spawn `producer` on its own thread
    pub fn spawn(
        mut producer: Box<dyn Producer>,
        bus: Arc<SampleBus>,
        default_interval: Duration,
    ) -> std::io::Result<Self> {
        let name = producer.name().to_string();
        let interval = producer.interval().unwrap_or(default_interval);
        let stop_flag = Arc::new(AtomicBool::new(false));
        let flag_clone = Arc::clone(&stop_flag);
        let readings = Arc::new(AtomicU64::new(0));
        let readings_clone = Arc::clone(&readings);
        let thread_name = name.clone();

        let thread = std::thread::Builder::new()
            .name(format!("producer-{name}"))
            .spawn(move || {
                tracing::info!(producer = %thread_name, "Producer started");
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    while !flag_clone.load(Ordering::Acquire) {
                        producer.produce(&bus);
                        readings_clone.fetch_add(1, Ordering::Relaxed);

                        let deadline = Instant::now() + interval;
                        loop {
                            if flag_clone.load(Ordering::Acquire) {
                                break;
                            }
                            let now = Instant::now();
                            if now >= deadline {
                                break;
                            }
                            std::thread::park_timeout(deadline - now);
                        }
                    }
                }));
                match result {
                    Ok(()) => {
                        tracing::info!(producer = %thread_name, "Producer stopped");
                        Some(producer)
                    }
                    Err(panic_info) => {
                        let msg = panic_message(panic_info.as_ref());
                        tracing::error!(producer = %thread_name, panic = %msg, "Producer thread PANICKED");
                        None
                    }
                }
            })?;

        Ok(Self {
            name,
            stop_flag,
            readings,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the producer thread is still alive
    pub fn is_alive(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    pub fn readings(&self) -> u64 {
        self.readings.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it; returns the producer unless it panicked
    pub fn stop(&mut self) -> Option<Box<dyn Producer>> {
        self.stop_flag.store(true, Ordering::Release);
        let handle = self.thread.take()?;
        handle.thread().unpark();
        handle.join().ok().flatten()
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Slot {
    Idle(Box<dyn Producer>),
    Running(ProducerHandle),
    /// Producer panicked or its thread could not be spawned
    Lost(String),
}

impl Slot {
    fn name(&self) -> &str {
        match self {
            Slot::Idle(p) => p.name(),
            Slot::Running(h) => h.name(),
            Slot::Lost(name) => name,
        }
    }
}

/// The producers the command channel starts and stops as one group
pub struct ProducerSet {
    bus: Arc<SampleBus>,
    interval: Duration,
    slots: Vec<Slot>,
}

impl ProducerSet {
    pub fn new(bus: Arc<SampleBus>, interval: Duration) -> Self {
        Self {
            bus,
            interval,
            slots: Vec::new(),
        }
    }

    pub fn add(&mut self, producer: Box<dyn Producer>) {
        self.slots.push(Slot::Idle(producer));
    }

    pub fn with(mut self, producer: Box<dyn Producer>) -> Self {
        self.add(producer);
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn running_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Running(h) if h.is_alive()))
            .count()
    }

    pub fn lost_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s, Slot::Lost(_)))
            .count()
    }
}

impl ProducerControl for ProducerSet {
    fn start_all(&mut self) {
        for slot in &mut self.slots {
            let current = std::mem::replace(slot, Slot::Lost(String::new()));
            *slot = match current {
                Slot::Idle(producer) => {
                    let name = producer.name().to_string();
                    match ProducerHandle::spawn(producer, Arc::clone(&self.bus), self.interval) {
                        Ok(handle) => Slot::Running(handle),
                        Err(e) => {
                            tracing::error!(producer = %name, error = %e, "Failed to spawn producer thread");
                            Slot::Lost(name)
                        }
                    }
                }
                other => other,
            };
        }
    }

    fn stop_all(&mut self) {
        for slot in &mut self.slots {
            let current = std::mem::replace(slot, Slot::Lost(String::new()));
            *slot = match current {
                Slot::Running(mut handle) => match handle.stop() {
                    Some(producer) => Slot::Idle(producer),
                    None => Slot::Lost(handle.name().to_string()),
                },
                other => other,
            };
        }
    }
}

impl Drop for ProducerSet {
    fn drop(&mut self) {
        self.stop_all();
    }
}
