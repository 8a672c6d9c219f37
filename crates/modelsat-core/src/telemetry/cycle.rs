//! Telemetry cycle
//!
//! One iteration produces one packet:
//!
//! 1. Drain every mailbox (empty ones become absent fields)
//! 2. Capture the baseline on the first packet of a session
//! 3. Evaluate alarms and the descent rate
//! 4. Advance the flight phase
//! 5. Assemble the packet, append it to the CSV log
//! 6. Check the recovery window and send `stop` once it expires
//! 7. Publish to observers and persist the next packet number
//!
//! Nothing in a cycle is fatal. Persistence and distribution failures are
//! logged and the next cycle runs on schedule.

use super::broadcast::Broadcaster;
use super::bus::SampleBus;
use super::command::{Command, CommandSender};
use super::fault::FaultState;
use super::log::TelemetryLog;
use super::packet::{format_mission_time, TelemetryPacket};
use super::phase::{self, FlightPhase};
use super::sample::round2;
use super::sequencer::PacketSequencer;
use crate::config::MissionConfig;
use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Source of mission time
pub trait Clock: Send {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// One-shot timer armed on entering RECOVERY
#[derive(Debug, Clone)]
pub struct RecoveryTimer {
    window: chrono::Duration,
    deadline: Option<NaiveDateTime>,
    fired: bool,
}

impl RecoveryTimer {
    pub fn new(window: Duration) -> Self {
        Self {
            window: chrono::Duration::seconds(window.as_secs().min(u32::MAX as u64) as i64),
            deadline: None,
            fired: false,
        }
    }

    pub fn deadline(&self) -> Option<NaiveDateTime> {
        self.deadline
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    /// Check the timer once per cycle. Returns true exactly once, on the
    /// first cycle at or after the deadline while still in RECOVERY.
    pub fn poll(&mut self, phase: FlightPhase, now: NaiveDateTime) -> bool {
        if phase != FlightPhase::Recovery || self.fired {
            return false;
        }
        let Some(deadline) = self.deadline else {
            let deadline = now.checked_add_signed(self.window).unwrap_or(NaiveDateTime::MAX);
            tracing::info!(deadline = %deadline, "Recovery timer armed");
            self.deadline = Some(deadline);
            return false;
        };
        if now >= deadline {
            self.fired = true;
            return true;
        }
        false
    }
}

/// Shared endpoints the cycle reads from and writes to
#[derive(Clone)]
pub struct CycleLinks {
    pub bus: Arc<SampleBus>,
    pub broadcaster: Arc<Broadcaster>,
    pub commands: CommandSender,
}

/// Fixed-cadence fusion loop
pub struct TelemetryCycle<C: Clock = SystemClock> {
    links: CycleLinks,
    sequencer: PacketSequencer,
    log: TelemetryLog,
    fault: FaultState,
    phase: FlightPhase,
    previous_roll: Option<f64>,
    recovery: RecoveryTimer,
    interval: Duration,
    clock: C,
    latest: watch::Sender<Option<TelemetryPacket>>,
}

impl<C: Clock> TelemetryCycle<C> {
    pub fn new(
        links: CycleLinks,
        sequencer: PacketSequencer,
        log: TelemetryLog,
        config: &MissionConfig,
        clock: C,
    ) -> Self {
        let phase = sequencer.initial_phase();
        let (latest, _) = watch::channel(None);
        Self {
            links,
            sequencer,
            log,
            fault: FaultState::new().with_recheck(config.recheck_altitude_difference),
            phase,
            previous_roll: None,
            recovery: RecoveryTimer::new(config.recovery_window()),
            interval: config.cycle_interval(),
            clock,
            latest,
        }
    }

    pub fn phase(&self) -> FlightPhase {
        self.phase
    }

    pub fn next_packet(&self) -> u64 {
        self.sequencer.next_packet()
    }

    pub fn recovery(&self) -> &RecoveryTimer {
        &self.recovery
    }

    pub fn fault_state(&self) -> &FaultState {
        &self.fault
    }

    /// Watch the most recently assembled packet
    pub fn subscribe(&self) -> watch::Receiver<Option<TelemetryPacket>> {
        self.latest.subscribe()
    }

    fn roll_delta(&mut self, roll: Option<f64>) -> Option<f64> {
        let current = roll?;
        let delta = self.previous_roll.map(|previous| (current - previous).abs());
        self.previous_roll = Some(current);
        delta
    }

    /// Run one cycle and return the packet it produced
    pub fn step(&mut self) -> TelemetryPacket {
        let now = self.clock.now();
        let inputs = self.links.bus.drain_all();
        let packet_number = self.sequencer.next_packet();

        if packet_number == 0 {
            self.sequencer.capture_baseline(
                inputs.pressure,
                inputs.container_pressure(),
                self.phase,
            );
        }

        let report = self.fault.evaluate(&inputs, self.phase, now);
        let descent_rate = report.descent_rate.map(round2);

        let altitude_difference = round2(
            (inputs.science_payload_altitude().unwrap_or(0.0)
                - inputs.container_altitude().unwrap_or(0.0))
            .abs(),
        );
        let roll_delta = self.roll_delta(inputs.roll());

        let next = phase::advance(
            self.phase,
            inputs.science_payload_altitude(),
            descent_rate,
            Some(altitude_difference),
            roll_delta,
        );
        if next != self.phase {
            tracing::info!(from = %self.phase, to = %next, packet = packet_number, "Flight phase changed");
            self.phase = next;
        }

        let missing = inputs.missing();
        if !missing.is_empty() {
            tracing::debug!(packet = packet_number, ?missing, "Categories absent this cycle");
        }

        let packet = TelemetryPacket {
            packet: packet_number,
            pressure: inputs.pressure,
            altitude: inputs.altitude,
            temperature: inputs.temperature,
            navigation: inputs.navigation,
            orientation: inputs.orientation,
            iot: inputs.iot,
            filter_state: inputs.filter_state,
            descent_rate,
            mission_time: format_mission_time(now),
            altitude_difference,
            error_codes: report.alarms,
            phase: self.phase,
        };

        if let Err(e) = self.log.append(&packet) {
            tracing::error!(error = %e, packet = packet_number, "Failed to append CSV row");
        }

        if self.recovery.poll(self.phase, now) {
            tracing::warn!("Recovery window elapsed, sending stop");
            if self.links.commands.send(Command::Stop).is_err() {
                tracing::warn!("Command processor gone, stop not delivered");
            }
        }

        match self.links.broadcaster.publish(&packet) {
            Ok(delivered) => {
                tracing::trace!(packet = packet_number, delivered, "Packet published");
            }
            Err(e) => tracing::error!(error = %e, "Failed to serialize packet"),
        }

        self.sequencer.advance();
        self.latest.send_replace(Some(packet.clone()));
        packet
    }

    /// Cycle at the configured interval until `shutdown` turns true
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Self {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            packet = self.next_packet(),
            phase = %self.phase,
            "Telemetry cycle running"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.step();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(packet = self.next_packet(), "Telemetry cycle stopped");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::command::command_channel;
    use crate::telemetry::record::RecordFile;
    use crate::telemetry::sample::{GpsFix, NavigationRecord, Orientation};
    use chrono::NaiveDate;
    use std::sync::Mutex;

    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<NaiveDateTime>>);

    impl ManualClock {
        fn new() -> Self {
            let start = NaiveDate::from_ymd_opt(2024, 8, 30)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap();
            Self(Arc::new(Mutex::new(start)))
        }

        fn advance(&self, secs: i64) {
            *self.0.lock().unwrap() += chrono::Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> NaiveDateTime {
            *self.0.lock().unwrap()
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        bus: Arc<SampleBus>,
        broadcaster: Arc<Broadcaster>,
        clock: ManualClock,
        commands: crate::telemetry::command::CommandReceiver,
        cycle: TelemetryCycle<ManualClock>,
        config: MissionConfig,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config = MissionConfig {
            base_dir: dir.path().to_path_buf(),
            ..MissionConfig::default()
        };
        let clock = ManualClock::new();
        let (sequencer, session) = PacketSequencer::open(RecordFile::new(config.record_path()));
        let log = TelemetryLog::open(
            config.csv_path(),
            config.backup_path(),
            config.mission_id,
            &session,
            clock.now(),
        );
        let bus = Arc::new(SampleBus::new());
        let broadcaster = Arc::new(Broadcaster::default());
        let (tx, rx) = command_channel();
        let links = CycleLinks {
            bus: Arc::clone(&bus),
            broadcaster: Arc::clone(&broadcaster),
            commands: tx,
        };
        let cycle = TelemetryCycle::new(links, sequencer, log, &config, clock.clone());
        Harness {
            _dir: dir,
            bus,
            broadcaster,
            clock,
            commands: rx,
            cycle,
            config,
        }
    }

    fn container(altitude: f64) -> NavigationRecord {
        NavigationRecord {
            pressure: Some(960.0),
            gps: GpsFix {
                latitude: Some("39.9208000".into()),
                longitude: Some("32.8541000".into()),
                altitude: Some("950.00".into()),
            },
            battery_voltage: Some("3.90".into()),
            altitude: Some(altitude),
        }
    }

    fn roll(value: f64) -> Orientation {
        Orientation {
            roll: value,
            pitch: 0.0,
            yaw: 0.0,
        }
    }

    #[test]
    fn test_recovery_timer_fires_once() {
        let mut timer = RecoveryTimer::new(Duration::from_secs(30));
        let t0 = ManualClock::new().now();
        assert!(!timer.poll(FlightPhase::SciencePayloadDescent, t0));
        assert!(timer.deadline().is_none());

        assert!(!timer.poll(FlightPhase::Recovery, t0));
        assert_eq!(timer.deadline(), Some(t0 + chrono::Duration::seconds(30)));
        assert!(!timer.poll(FlightPhase::Recovery, t0 + chrono::Duration::seconds(29)));
        assert!(timer.poll(FlightPhase::Recovery, t0 + chrono::Duration::seconds(31)));
        assert!(!timer.poll(FlightPhase::Recovery, t0 + chrono::Duration::seconds(60)));
        assert!(timer.has_fired());
    }

    #[test]
    fn test_empty_bus_still_produces_packets() {
        let mut h = harness();
        let first = h.cycle.step();
        let second = h.cycle.step();
        assert_eq!(first.packet, 0);
        assert_eq!(second.packet, 1);
        assert!(first.pressure.is_none());
        assert!(first.navigation.is_none());
        assert_eq!(first.error_codes.to_string(), "00111");
        assert_eq!(first.altitude_difference, 0.0);
        assert_eq!(h.cycle.phase(), FlightPhase::ReadyToFlight);

        // Baseline written as zeros, then the count advanced
        let record = std::fs::read_to_string(h.config.record_path()).unwrap();
        assert_eq!(record, "2,0,0,0");
    }

    #[test]
    fn test_descent_rate_rounded_to_two_decimals() {
        let mut h = harness();
        h.bus.altitude.put(300.0);
        assert_eq!(h.cycle.step().descent_rate, None);

        h.clock.advance(3);
        h.bus.altitude.put(280.0);
        let packet = h.cycle.step();
        assert_eq!(packet.descent_rate, Some(-6.67));

        let json: serde_json::Value = serde_json::from_str(&packet.to_json().unwrap()).unwrap();
        assert_eq!(json["Descent_Rate"], -6.67);
        let csv = std::fs::read_to_string(h.config.csv_path()).unwrap();
        assert_eq!(csv.lines().nth(2).unwrap().split(',').nth(9), Some("-6.67"));
    }

    #[test]
    fn test_first_packet_captures_baseline() {
        let mut h = harness();
        h.bus.pressure.put(1013.25);
        let mut nav = container(0.0);
        nav.pressure = Some(1009.5);
        h.bus.navigation.put(nav);
        h.cycle.step();

        let record = std::fs::read_to_string(h.config.record_path()).unwrap();
        assert_eq!(record, "1,1013.25,1009.5,0");
    }

    #[test]
    fn test_flight_scenario_sends_stop_once() {
        let mut h = harness();
        let (_, mut observer) = h.broadcaster.register();

        h.bus.altitude.put(50.0);
        h.cycle.step();
        assert_eq!(h.cycle.phase(), FlightPhase::Ascent);

        h.clock.advance(1);
        h.bus.altitude.put(510.0);
        h.cycle.step();
        assert_eq!(h.cycle.phase(), FlightPhase::Ascent);

        h.clock.advance(1);
        h.bus.altitude.put(500.0);
        let packet = h.cycle.step();
        approx::assert_relative_eq!(packet.descent_rate.unwrap(), -10.0);
        assert_eq!(h.cycle.phase(), FlightPhase::ModelSatelliteDescent);

        h.clock.advance(1);
        h.bus.altitude.put(440.0);
        h.bus.navigation.put(container(470.0));
        let packet = h.cycle.step();
        assert_eq!(packet.altitude_difference, 30.0);
        assert_eq!(h.cycle.phase(), FlightPhase::Release);

        h.clock.advance(1);
        h.bus.altitude.put(380.0);
        h.bus.orientation.put(roll(5.0));
        h.cycle.step();
        assert_eq!(h.cycle.phase(), FlightPhase::SciencePayloadDescent);

        h.clock.advance(1);
        h.bus.altitude.put(10.0);
        h.bus.orientation.put(roll(5.1));
        let packet = h.cycle.step();
        assert_eq!(packet.phase, FlightPhase::Recovery);
        assert!(h.commands.try_recv().is_err());

        h.clock.advance(29);
        h.cycle.step();
        assert!(h.commands.try_recv().is_err(), "stop sent before window elapsed");

        h.clock.advance(1);
        h.cycle.step();
        assert_eq!(h.commands.try_recv().unwrap(), Command::Stop);

        h.clock.advance(1);
        h.cycle.step();
        h.clock.advance(60);
        h.cycle.step();
        assert!(h.commands.try_recv().is_err(), "stop must be sent exactly once");
        assert_eq!(h.cycle.phase(), FlightPhase::Recovery);

        // Every packet reached the observer, numbered in order
        let mut numbers = Vec::new();
        while let Ok(frame) = observer.try_recv() {
            let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
            numbers.push(json["Packet"].as_u64().unwrap());
        }
        assert_eq!(numbers, (0..10).collect::<Vec<_>>());

        let csv = std::fs::read_to_string(h.config.csv_path()).unwrap();
        assert_eq!(csv.lines().count(), 11);
    }

    #[test]
    fn test_phase_never_regresses() {
        let mut h = harness();
        let altitudes = [50.0, 900.0, 600.0, 5.0, 700.0, 12.0, 300.0, 0.0];
        let mut last = h.cycle.phase();
        for altitude in altitudes {
            h.clock.advance(1);
            h.bus.altitude.put(altitude);
            h.bus.navigation.put(container(altitude + 40.0));
            h.cycle.step();
            assert!(h.cycle.phase() >= last);
            last = h.cycle.phase();
        }
    }

    #[test]
    fn test_resumed_session_continues_numbering() {
        let mut h = harness();
        h.bus.pressure.put(1000.0);
        h.cycle.step();
        h.cycle.step();
        drop(h.cycle);

        let (sequencer, session) =
            PacketSequencer::open(RecordFile::new(h.config.record_path()));
        assert!(session.is_resumed());
        let log = TelemetryLog::open(
            h.config.csv_path(),
            h.config.backup_path(),
            h.config.mission_id,
            &session,
            h.clock.now(),
        );
        let (tx, _rx) = command_channel();
        let links = CycleLinks {
            bus: Arc::clone(&h.bus),
            broadcaster: Arc::clone(&h.broadcaster),
            commands: tx,
        };
        let mut resumed = TelemetryCycle::new(links, sequencer, log, &h.config, h.clock.clone());
        assert_eq!(resumed.step().packet, 2);

        let csv = std::fs::read_to_string(h.config.csv_path()).unwrap();
        assert_eq!(csv.lines().count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let h = harness();
        let latest = h.cycle.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(h.cycle.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        shutdown_tx.send(true).unwrap();
        let cycle = task.await.unwrap();

        assert_eq!(cycle.next_packet(), 4);
        assert_eq!(latest.borrow().as_ref().map(|p| p.packet), Some(3));
    }
}
