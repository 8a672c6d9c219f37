//! Ground command processing
//!
//! Text tokens arrive from the command channel (and from the telemetry cycle
//! when the recovery window expires). `start` resumes every hardware-facing
//! producer, `stop` halts them and latches the fault indicator on. Anything
//! else is logged and switches the indicator off.

use std::fmt;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long the indicator blinks to acknowledge `start`
pub const START_BLINK: Duration = Duration::from_secs(4);

/// A parsed command token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Unknown(String),
}

impl Command {
    /// Parse one token. Surrounding whitespace is ignored, case is significant.
    pub fn parse(token: &str) -> Self {
        match token.trim() {
            "start" => Command::Start,
            "stop" => Command::Stop,
            other => Command::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Unknown(token) => token,
        }
    }
}

impl From<&str> for Command {
    fn from(token: &str) -> Self {
        Command::parse(token)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sending half of the command channel
pub type CommandSender = mpsc::UnboundedSender<Command>;
/// Receiving half of the command channel
pub type CommandReceiver = mpsc::UnboundedReceiver<Command>;

pub fn command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_channel()
}

/// Something that can start and stop the sensor producers as a group
pub trait ProducerControl {
    fn start_all(&mut self);
    fn stop_all(&mut self);
}

/// Audible/visual fault indicator (the buzzer on the flight board)
pub trait Indicator {
    fn blink(&mut self, duration: Duration);
    fn latch_on(&mut self);
    fn off(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndicatorState {
    #[default]
    Off,
    Blinking,
    On,
}

/// Indicator that only records and logs its state
#[derive(Debug, Default)]
pub struct LogIndicator {
    state: IndicatorState,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> IndicatorState {
        self.state
    }
}

impl Indicator for LogIndicator {
    fn blink(&mut self, duration: Duration) {
        tracing::info!(?duration, "Indicator blinking");
        self.state = IndicatorState::Blinking;
    }

    fn latch_on(&mut self) {
        tracing::info!("Indicator latched on");
        self.state = IndicatorState::On;
    }

    fn off(&mut self) {
        tracing::debug!("Indicator off");
        self.state = IndicatorState::Off;
    }
}

/// Applies commands to the producer group and the indicator
pub struct CommandProcessor<P, I> {
    producers: P,
    indicator: I,
    handled: u64,
}

impl<P: ProducerControl, I: Indicator> CommandProcessor<P, I> {
    pub fn new(producers: P, indicator: I) -> Self {
        Self {
            producers,
            indicator,
            handled: 0,
        }
    }

    pub fn producers(&self) -> &P {
        &self.producers
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    /// Number of commands applied so far
    pub fn handled(&self) -> u64 {
        self.handled
    }

    /// Start producers right away when resuming after power loss
    pub fn boot(&mut self, resumed: bool) {
        if resumed {
            tracing::info!("Packet record present, starting sensors without ground command");
            self.producers.start_all();
        } else {
            tracing::info!("Waiting for start command");
        }
    }

    pub fn handle(&mut self, command: &Command) {
        self.handled += 1;
        match command {
            Command::Start => {
                tracing::info!("Start command received");
                self.indicator.blink(START_BLINK);
                self.producers.start_all();
            }
            Command::Stop => {
                tracing::info!("Stop command received");
                self.producers.stop_all();
                self.indicator.latch_on();
            }
            Command::Unknown(token) => {
                tracing::warn!(%token, "Unknown command");
                self.indicator.off();
            }
        }
    }

    /// Apply commands until every sender is gone
    ///
    /// Blocks the calling thread, since stopping producers joins their
    /// threads. Must not be called from inside an async runtime.
    pub fn run(mut self, mut rx: CommandReceiver) -> Self {
        while let Some(command) = rx.blocking_recv() {
            self.handle(&command);
        }
        tracing::debug!("Command channel closed");
        self
    }
}

impl<P, I> CommandProcessor<P, I>
where
    P: ProducerControl + Send + 'static,
    I: Indicator + Send + 'static,
{
    /// Run the processor on its own named thread
    pub fn spawn(self, rx: CommandReceiver) -> std::io::Result<JoinHandle<Self>> {
        std::thread::Builder::new()
            .name("command-processor".to_string())
            .spawn(move || self.run(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Producer group that only counts calls
    #[derive(Debug, Default)]
    struct CountingProducers {
        running: bool,
        starts: u32,
        stops: u32,
    }

    impl ProducerControl for CountingProducers {
        fn start_all(&mut self) {
            self.running = true;
            self.starts += 1;
        }

        fn stop_all(&mut self) {
            self.running = false;
            self.stops += 1;
        }
    }

    fn processor() -> CommandProcessor<CountingProducers, LogIndicator> {
        CommandProcessor::new(CountingProducers::default(), LogIndicator::new())
    }

    #[test]
    fn test_parse_tokens() {
        assert_eq!(Command::parse("start"), Command::Start);
        assert_eq!(Command::parse(" stop\n"), Command::Stop);
        assert_eq!(Command::parse("STOP"), Command::Unknown("STOP".into()));
        assert_eq!(Command::from("servo").as_str(), "servo");
    }

    #[test]
    fn test_start_then_stop() {
        let mut p = processor();
        p.handle(&Command::Start);
        assert!(p.producers().running);
        assert_eq!(p.indicator().state(), IndicatorState::Blinking);

        p.handle(&Command::Stop);
        assert!(!p.producers().running);
        assert_eq!(p.indicator().state(), IndicatorState::On);
    }

    #[test]
    fn test_unknown_token_turns_indicator_off() {
        let mut p = processor();
        p.handle(&Command::Stop);
        p.handle(&Command::parse("buzz"));
        assert_eq!(p.indicator().state(), IndicatorState::Off);
        assert_eq!(p.producers().stops, 1);
        assert_eq!(p.producers().starts, 0);
        assert_eq!(p.handled(), 2);
    }

    #[test]
    fn test_boot_starts_only_when_resumed() {
        let mut fresh = processor();
        fresh.boot(false);
        assert!(!fresh.producers().running);

        let mut resumed = processor();
        resumed.boot(true);
        assert!(resumed.producers().running);
    }

    #[test]
    fn test_run_until_channel_closes() {
        let (tx, rx) = command_channel();
        tx.send(Command::Start).unwrap();
        tx.send(Command::Stop).unwrap();
        drop(tx);

        let p = processor().run(rx);
        assert_eq!(p.handled(), 2);
        assert_eq!(p.producers().starts, 1);
        assert_eq!(p.producers().stops, 1);
    }

    /// Producer group whose stop hangs until released, like a source
    /// blocked in a read
    struct StuckProducers {
        release: std::sync::mpsc::Receiver<()>,
        stopped: bool,
    }

    impl ProducerControl for StuckProducers {
        fn start_all(&mut self) {}

        fn stop_all(&mut self) {
            let _ = self.release.recv();
            self.stopped = true;
        }
    }

    #[tokio::test]
    async fn test_slow_stop_does_not_hold_the_runtime() {
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let stuck = StuckProducers {
            release: release_rx,
            stopped: false,
        };
        let (tx, rx) = command_channel();
        let thread = CommandProcessor::new(stuck, LogIndicator::new())
            .spawn(rx)
            .unwrap();
        tx.send(Command::Stop).unwrap();

        // Timers still fire on this current-thread runtime while stop hangs
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!thread.is_finished());

        release_tx.send(()).unwrap();
        drop(tx);
        let p = thread.join().unwrap();
        assert!(p.producers().stopped);
        assert_eq!(p.indicator().state(), IndicatorState::On);
        assert_eq!(p.handled(), 1);
    }
}
