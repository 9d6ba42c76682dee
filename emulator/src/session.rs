use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::ops::Add;
use std::path::Path;
use std::time::Duration;

use loadshed_core::console::catalog::{COMMANDS, CommandSpec};
use loadshed_core::console::commands::{CommandError, CommandExecutor, CommandOutcome};
use loadshed_core::console::status::StatusFormatter;
use loadshed_core::controller::{ControllerConfig, Decision, LoadMirror, StepOutcome};
use loadshed_core::gateway::{
    Admission, DequeueError, EnqueueError, Lane, TriggerEvent, TriggerQueueConsumer,
    TriggerQueueProducer,
};
use loadshed_core::loads::MaskBits;
use loadshed_core::pipeline::{Dispatch, LoadShedPipeline, VerdictForwarding};
use loadshed_core::stability::StabilityConfig;
use loadshed_core::telemetry::{EventId, TelemetryInstant, TelemetryPayload, TelemetryRecorder};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Session,
    UnderFrequency,
    RateOfChange,
    Maintenance,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Session => "transcripts/emulator-session.log",
            TranscriptProfile::UnderFrequency => "transcripts/emulator-under-frequency.log",
            TranscriptProfile::RateOfChange => "transcripts/emulator-rate-of-change.log",
            TranscriptProfile::Maintenance => "transcripts/emulator-maintenance.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Session => "Load-shedding emulator session transcript",
            TranscriptProfile::UnderFrequency => {
                "Load-shedding emulator under-frequency episode transcript"
            }
            TranscriptProfile::RateOfChange => {
                "Load-shedding emulator rate-of-change episode transcript"
            }
            TranscriptProfile::Maintenance => "Load-shedding emulator maintenance transcript",
        }
    }

    /// Commands replayed before the prompt opens. The plain session has none.
    pub fn script(self) -> &'static [&'static str] {
        match self {
            TranscriptProfile::Session => &[],
            TranscriptProfile::UnderFrequency => &UNDER_FREQUENCY,
            TranscriptProfile::RateOfChange => &RATE_OF_CHANGE,
            TranscriptProfile::Maintenance => &MAINTENANCE,
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("session") {
            Ok(Self::Session)
        } else if tag.eq_ignore_ascii_case("under-frequency") {
            Ok(Self::UnderFrequency)
        } else if tag.eq_ignore_ascii_case("roc") || tag.eq_ignore_ascii_case("rate-of-change") {
            Ok(Self::RateOfChange)
        } else if tag.eq_ignore_ascii_case("maintenance") {
            Ok(Self::Maintenance)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }
}

const UNDER_FREQUENCY: [&str; 10] = [
    "help",
    "switches 0b11111",
    "sample 50.0",
    "sample 48.5",
    "advance 1200ms",
    "status",
    "advance 2s",
    "button stable",
    "advance 3s",
    "status",
];

const RATE_OF_CHANGE: [&str; 9] = [
    "switches 0b01111",
    "threshold roc 5.0",
    "sample 50.0",
    "sample 50.2",
    "sample 50.2",
    "advance 500ms",
    "status",
    "advance 1s",
    "status",
];

const MAINTENANCE: [&str; 10] = [
    "switches 0b11111",
    "count 330",
    "advance 600ms",
    "button maintenance",
    "count 340",
    "status",
    "switches 0b00111",
    "button maintenance",
    "advance 1s",
    "status",
];

/// Simulated monotonic clock reading; only `advance` moves it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct SimInstant(Duration);

impl SimInstant {
    pub const START: Self = Self(Duration::ZERO);

    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

impl TelemetryInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

pub struct Session {
    executor: CommandExecutor<HostLanes>,
    pipeline: LoadShedPipeline<SimInstant, LedConsole>,
    telemetry: TelemetryRecorder<SimInstant>,
    now: SimInstant,
    next_record: EventId,
    transcript: Option<TranscriptLogger>,
}

impl Session {
    /// Session without a transcript file.
    pub fn new() -> Self {
        let config = ControllerConfig::default();
        let pipeline = LoadShedPipeline::with_mirror(
            config,
            StabilityConfig::default(),
            LedConsole::new(config.load_count()),
        )
        .with_forwarding(VerdictForwarding::OnChange);

        Self {
            executor: CommandExecutor::new(HostLanes::new()),
            pipeline,
            telemetry: TelemetryRecorder::new(),
            now: SimInstant::START,
            next_record: 0,
            transcript: None,
        }
    }

    /// Session that appends every exchange to the profile's transcript.
    pub fn recording(profile: TranscriptProfile) -> io::Result<Self> {
        let mut session = Self::new();
        session.transcript = Some(TranscriptLogger::new(profile)?);
        Ok(session)
    }

    pub fn now(&self) -> SimInstant {
        self.now
    }

    pub fn pipeline(&self) -> &LoadShedPipeline<SimInstant, LedConsole> {
        &self.pipeline
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        self.record(TranscriptRole::Host, &[trimmed.to_string()])?;

        let lines = match self.executor.execute(trimmed, self.now) {
            Ok(CommandOutcome::Queued { event, admission }) => {
                let mut lines = vec![describe_admission(&event, admission)];
                self.drain(&mut lines);
                lines
            }
            Ok(CommandOutcome::Advance(duration)) => self.advance(duration),
            Ok(CommandOutcome::Status) => self.status_lines(),
            Ok(CommandOutcome::Help(topic)) => help_lines(topic),
            Err(CommandError::UnknownTopic(topic)) => vec![
                format!("No help available for `{topic}`."),
                format!("Available topics: {}", help_topic_list()),
            ],
            Err(err) => vec![format!("ERR {err}")],
        };

        self.record(TranscriptRole::Emulator, &lines)?;
        Ok(lines)
    }

    /// Hands queued events to the pipeline, control lane first.
    fn drain(&mut self, lines: &mut Vec<String>) {
        loop {
            let lanes = self.executor.gateway_mut().producer_mut();
            let Ok(Some(event)) = lanes.try_dequeue() else {
                break;
            };

            let dispatch = self.pipeline.dispatch(event, &mut self.telemetry);
            lines.push(describe_dispatch(dispatch));
            self.collect_side_effects(lines);
        }
    }

    fn advance(&mut self, duration: Duration) -> Vec<String> {
        let target = self.now + duration;
        let mut lines = Vec::new();

        while let Some(deadline) = self.pipeline.next_deadline() {
            if deadline > target {
                break;
            }
            self.now = deadline;
            let decision = self.pipeline.expire(deadline, &mut self.telemetry);
            lines.push(format!(
                "timer expired at={}: {}",
                format_offset(deadline),
                describe_decision(decision)
            ));
            self.collect_side_effects(&mut lines);
        }

        self.now = target;
        lines.insert(0, format!("OK clock={}", format_offset(self.now)));
        lines
    }

    fn status_lines(&self) -> Vec<String> {
        let snapshot = self.pipeline.snapshot(self.now);
        let formatter = StatusFormatter::new(&snapshot);
        let mut lines: Vec<String> = formatter.render().lines().map(str::to_string).collect();
        let stats = self.executor.gateway().stats();
        lines.push(format!(
            "lanes queued={} evicted={} rejected={}",
            stats.queued, stats.evicted, stats.rejected
        ));
        lines
    }

    fn collect_side_effects(&mut self, lines: &mut Vec<String>) {
        lines.extend(self.pipeline.mirror_mut().take_updates());

        let width = self.pipeline.controller().config().load_count();
        for record in self.telemetry.iter_oldest_first() {
            if record.id.wrapping_sub(self.next_record) >= EventId::MAX / 2 {
                continue;
            }
            self.next_record = record.id.wrapping_add(1);

            let mut line = format!(
                "event #{} {} at={}",
                record.id,
                record.event,
                format_offset(record.timestamp)
            );
            match record.details {
                TelemetryPayload::Load(load) => {
                    line.push_str(&format!(
                        " active={} shed={}",
                        MaskBits {
                            bits: load.active,
                            width,
                        },
                        MaskBits {
                            bits: load.shed,
                            width,
                        }
                    ));
                    if let Some(gap) = load.elapsed_since_previous {
                        line.push_str(&format!(" gap={}", format_duration_short(gap)));
                    }
                }
                TelemetryPayload::Stability(measurement) => {
                    line.push_str(&format!(
                        " freq={}mHz roc={}mHz/s",
                        measurement.frequency_mhz, measurement.roc_mhz_per_s
                    ));
                }
                TelemetryPayload::Thresholds(thresholds) => {
                    line.push_str(&format!(
                        " min={}mHz max-roc={}mHz/s",
                        thresholds.min_frequency_mhz, thresholds.roc_threshold_mhz_per_s
                    ));
                }
                TelemetryPayload::None => {}
            }
            lines.push(line);
        }
    }

    fn record(&mut self, role: TranscriptRole, lines: &[String]) -> io::Result<()> {
        let Some(transcript) = self.transcript.as_mut() else {
            return Ok(());
        };
        for line in lines {
            transcript.append_line(self.now.since_start(), &role, line)?;
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints the red (active) and green (shed) LED banks.
pub struct LedConsole {
    width: u8,
    updates: Vec<String>,
}

impl LedConsole {
    fn new(width: u8) -> Self {
        Self {
            width,
            updates: Vec::new(),
        }
    }

    fn take_updates(&mut self) -> Vec<String> {
        std::mem::take(&mut self.updates)
    }
}

impl LoadMirror for LedConsole {
    fn mirror_load_state(&mut self, active: u32, shed: u32) {
        self.updates.push(format!(
            "leds red={} green={}",
            MaskBits {
                bits: active,
                width: self.width,
            },
            MaskBits {
                bits: shed,
                width: self.width,
            }
        ));
    }
}

/// Both trigger lanes, bounded like the firmware channels.
struct HostLanes {
    samples: VecDeque<TriggerEvent<SimInstant>>,
    control: VecDeque<TriggerEvent<SimInstant>>,
}

impl HostLanes {
    fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(Lane::Samples.depth()),
            control: VecDeque::with_capacity(Lane::Control.depth()),
        }
    }

    fn lane_mut(&mut self, lane: Lane) -> &mut VecDeque<TriggerEvent<SimInstant>> {
        match lane {
            Lane::Samples => &mut self.samples,
            Lane::Control => &mut self.control,
        }
    }
}

impl TriggerQueueProducer for HostLanes {
    type Instant = SimInstant;
    type Error = ();

    fn try_enqueue(
        &mut self,
        event: TriggerEvent<Self::Instant>,
    ) -> Result<(), EnqueueError<Self::Error>> {
        let lane = event.lane();
        let queue = self.lane_mut(lane);
        if queue.len() >= lane.depth() {
            return Err(EnqueueError::QueueFull);
        }

        queue.push_back(event);
        Ok(())
    }

    fn evict_oldest(&mut self, lane: Lane) -> bool {
        self.lane_mut(lane).pop_front().is_some()
    }

    fn capacity(&self, lane: Lane) -> Option<usize> {
        Some(lane.depth())
    }

    fn len(&self, lane: Lane) -> Option<usize> {
        Some(match lane {
            Lane::Samples => self.samples.len(),
            Lane::Control => self.control.len(),
        })
    }
}

impl TriggerQueueConsumer for HostLanes {
    type Instant = SimInstant;
    type Error = ();

    fn try_dequeue(
        &mut self,
    ) -> Result<Option<TriggerEvent<Self::Instant>>, DequeueError<Self::Error>> {
        Ok(self
            .control
            .pop_front()
            .or_else(|| self.samples.pop_front()))
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are simulated milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: &TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

fn help_lines(topic: Option<&'static CommandSpec>) -> Vec<String> {
    match topic {
        Some(spec) => vec![format!("{}  - {}", spec.usage, spec.summary)],
        None => {
            let mut lines = vec!["Available commands:".to_string()];
            for spec in &COMMANDS {
                lines.push(format!("  {:<42} - {}", spec.usage, spec.summary));
            }
            lines.push("Type `help <command>` for a specific command.".to_string());
            lines
        }
    }
}

fn help_topic_list() -> String {
    COMMANDS
        .iter()
        .map(|spec| spec.name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_admission(event: &TriggerEvent<SimInstant>, admission: Admission) -> String {
    let detail = match event {
        TriggerEvent::FrequencySample { sample, .. } => format!("sample {sample}"),
        TriggerEvent::MaintenanceButton { .. } => "button maintenance".to_string(),
        TriggerEvent::VolatilityButton {
            make_volatile: true,
            ..
        } => "button volatile".to_string(),
        TriggerEvent::VolatilityButton {
            make_volatile: false,
            ..
        } => "button stable".to_string(),
        TriggerEvent::SwitchInputs { raw, .. } => format!("switches raw={raw:#b}"),
        TriggerEvent::ThresholdUpdate { update, .. } => format!("threshold {update}"),
    };

    match admission {
        Admission::Queued => format!("OK queued {detail} lane={}", event.lane()),
        Admission::QueuedAfterEviction => format!(
            "OK queued {detail} lane={} (oldest sample dropped)",
            event.lane()
        ),
    }
}

fn describe_dispatch(dispatch: Dispatch) -> String {
    match dispatch {
        Dispatch::Controller(decision) => format!("controller {}", describe_decision(decision)),
        Dispatch::Filtered(verdict) => format!("controller unchanged verdict={verdict}"),
        Dispatch::ThresholdsUpdated => "thresholds updated".to_string(),
    }
}

fn describe_decision(decision: Decision) -> String {
    match decision {
        Decision::Step(step) => describe_step(step),
        Decision::Absorbed => "absorbed (settle window extended)".to_string(),
        Decision::Suspended => "suspended (maintenance)".to_string(),
        Decision::MaintenanceEntered { cleared } => {
            format!("maintenance entered cleared={cleared:#b}")
        }
        Decision::MaintenanceExited(step) => {
            format!("maintenance exited then {}", describe_step(step))
        }
        Decision::Stale => "stale timer ignored".to_string(),
        Decision::InputsUpdated { changed: true } => "switch inputs updated".to_string(),
        Decision::InputsUpdated { changed: false } => "switch inputs unchanged".to_string(),
    }
}

fn describe_step(step: StepOutcome) -> String {
    match step {
        StepOutcome::Shed(load) => format!("shed {load}"),
        StepOutcome::Restored {
            load,
            episode_complete: true,
        } => format!("restored {load} (episode complete)"),
        StepOutcome::Restored { load, .. } => format!("restored {load}"),
        StepOutcome::Exhausted => "exhausted (every load already shed)".to_string(),
        StepOutcome::EpisodeComplete => "episode complete".to_string(),
        StepOutcome::Idle => "idle".to_string(),
    }
}

fn format_offset(instant: SimInstant) -> String {
    format!("+{}ms", instant.since_start().as_millis())
}

fn format_duration_short(duration: Duration) -> String {
    if duration.as_secs() == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadshed_core::controller::ControllerState;

    fn run(session: &mut Session, line: &str) -> Vec<String> {
        session.handle_command(line).expect("in-memory session")
    }

    #[test]
    fn under_frequency_episode_sheds_then_restores() {
        let mut session = Session::new();
        run(&mut session, "switches 0b11111");
        run(&mut session, "sample 50.0");

        let lines = run(&mut session, "sample 48.5");
        assert!(lines.contains(&"controller shed L0".to_string()));
        assert!(lines.contains(&"leds red=0b11110 green=0b00001".to_string()));

        let lines = run(&mut session, "advance 3s");
        assert_eq!(lines[0], "OK clock=+3000ms");
        assert!(lines.iter().any(|line| line.ends_with("shed L4")));
        assert!(
            lines
                .iter()
                .any(|line| line == "timer expired at=+2500ms: exhausted (every load already shed)")
        );

        run(&mut session, "button stable");
        let lines = run(&mut session, "advance 2s");
        assert!(
            lines
                .iter()
                .any(|line| line.ends_with("restored L0 (episode complete)"))
        );
        assert_eq!(
            session.pipeline().controller().state(),
            ControllerState::Settled
        );
        assert_eq!(session.now(), SimInstant::START + Duration::from_secs(5));
    }

    #[test]
    fn status_reports_lane_counters() {
        let mut session = Session::new();
        run(&mut session, "switches 0b00011");
        let lines = run(&mut session, "status");
        assert_eq!(lines[0], "mode normal.settled");
        assert_eq!(lines[1], "loads present=0b00011 active=0b00011 shed=0b00000");
        assert_eq!(lines.last().map(String::as_str), Some("lanes queued=1 evicted=0 rejected=0"));
    }

    #[test]
    fn help_lists_every_command() {
        let mut session = Session::new();
        let lines = run(&mut session, "help");
        assert_eq!(lines[0], "Available commands:");
        assert_eq!(lines.len(), COMMANDS.len() + 2);

        let lines = run(&mut session, "help advance");
        assert_eq!(
            lines,
            vec!["advance <duration>  - move the clock forward (e.g. 250ms, 2s)".to_string()]
        );

        let lines = run(&mut session, "help reboot");
        assert_eq!(lines[0], "No help available for `reboot`.");
    }

    #[test]
    fn invalid_input_reports_an_error() {
        let mut session = Session::new();
        let lines = run(&mut session, "count 0");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ERR "));

        let lines = run(&mut session, "sample");
        assert!(lines[0].starts_with("ERR "));
    }

    #[test]
    fn profile_scripts_run_without_errors() {
        for profile in [
            TranscriptProfile::UnderFrequency,
            TranscriptProfile::RateOfChange,
            TranscriptProfile::Maintenance,
        ] {
            let mut session = Session::new();
            for line in profile.script() {
                let lines = run(&mut session, line);
                assert!(
                    lines.iter().all(|line| !line.starts_with("ERR ")),
                    "{profile:?} `{line}`: {lines:?}"
                );
            }
            assert!(session.now() > SimInstant::START);
        }
        assert!(TranscriptProfile::Session.script().is_empty());
    }

    #[test]
    fn maintenance_suspends_samples() {
        let mut session = Session::new();
        run(&mut session, "switches 0b11111");
        run(&mut session, "sample 48.0");
        let lines = run(&mut session, "button maintenance");
        assert!(lines.contains(&"controller maintenance entered cleared=0b1".to_string()));

        let lines = run(&mut session, "sample 47.0");
        assert!(lines.contains(&"controller suspended (maintenance)".to_string()));
    }
}
