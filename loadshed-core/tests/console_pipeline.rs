mod support;

use core::time::Duration;

use heapless::Deque;
use loadshed_core::console::commands::{CommandError, CommandExecutor, CommandOutcome};
use loadshed_core::console::status::StatusFormatter;
use loadshed_core::controller::{ControllerConfig, ControllerState};
use loadshed_core::gateway::{
    Admission, DequeueError, EnqueueError, GatewayError, Lane, TriggerEvent,
    TriggerQueueConsumer, TriggerQueueProducer,
};
use loadshed_core::pipeline::LoadShedPipeline;
use loadshed_core::telemetry::{TelemetryEventKind, TelemetryRecorder};

use support::MockInstant;

/// Host lanes sized like the firmware channels.
#[derive(Default)]
struct HostLanes {
    samples: Deque<TriggerEvent<MockInstant>, 16>,
    control: Deque<TriggerEvent<MockInstant>, 8>,
}

impl TriggerQueueProducer for HostLanes {
    type Instant = MockInstant;
    type Error = ();

    fn try_enqueue(&mut self, event: TriggerEvent<MockInstant>) -> Result<(), EnqueueError> {
        let pushed = match event.lane() {
            Lane::Samples => self.samples.push_back(event),
            Lane::Control => self.control.push_back(event),
        };
        pushed.map_err(|_| EnqueueError::QueueFull)
    }

    fn evict_oldest(&mut self, lane: Lane) -> bool {
        match lane {
            Lane::Samples => self.samples.pop_front().is_some(),
            Lane::Control => self.control.pop_front().is_some(),
        }
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
    type Instant = MockInstant;
    type Error = ();

    fn try_dequeue(&mut self) -> Result<Option<TriggerEvent<MockInstant>>, DequeueError> {
        Ok(self.control.pop_front().or_else(|| self.samples.pop_front()))
    }
}

struct Rig {
    executor: CommandExecutor<HostLanes>,
    pipeline: LoadShedPipeline<MockInstant>,
    telemetry: TelemetryRecorder<MockInstant>,
    now: MockInstant,
}

impl Rig {
    fn new() -> Self {
        Self {
            executor: CommandExecutor::new(HostLanes::default()),
            pipeline: LoadShedPipeline::new(ControllerConfig::default()),
            telemetry: TelemetryRecorder::new(),
            now: MockInstant::millis(0),
        }
    }

    fn run(&mut self, line: &str) {
        match self.executor.execute(line, self.now) {
            Ok(CommandOutcome::Advance(duration)) => self.advance(duration),
            Ok(_) => {}
            Err(err) => panic!("`{line}` failed: {err:?}"),
        }
        self.drain();
    }

    fn drain(&mut self) {
        let lanes = self.executor.gateway_mut().producer_mut();
        while let Ok(Some(event)) = lanes.try_dequeue() {
            self.pipeline.dispatch(event, &mut self.telemetry);
        }
    }

    fn advance(&mut self, duration: Duration) {
        let target = self.now + duration;
        while let Some(deadline) = self.pipeline.next_deadline() {
            if deadline > target {
                break;
            }
            self.now = deadline;
            self.pipeline.expire(deadline, &mut self.telemetry);
        }
        self.now = target;
    }
}

#[test]
fn console_session_sheds_and_restores() {
    let mut rig = Rig::new();
    rig.run("switches 0b11111");
    rig.run("sample 50.0");
    rig.run("sample 48.5");
    assert_eq!(rig.pipeline.controller().mask().shed(), 0b0_0001);

    rig.run("advance 3s");
    let snapshot = rig.pipeline.snapshot(rig.now);
    assert_eq!(snapshot.shed, 0b1_1111);
    assert_eq!(
        snapshot.state,
        ControllerState::Shedding { timer_armed: false }
    );

    rig.run("button stable");
    rig.run("advance 2s");
    let snapshot = rig.pipeline.snapshot(rig.now);
    assert_eq!(snapshot.shed, 0);
    assert_eq!(snapshot.state, ControllerState::Settled);
    assert_eq!(
        rig.telemetry.latest().map(|record| record.event),
        Some(TelemetryEventKind::EpisodeComplete)
    );
}

#[test]
fn status_lines_reflect_console_inputs() {
    let mut rig = Rig::new();
    rig.run("switches 0b00111");
    rig.run("threshold freq 48.0");
    rig.run("count 320");
    rig.run("button volatile");
    rig.run("advance 100ms");

    let snapshot = rig.pipeline.snapshot(rig.now);
    let formatter = StatusFormatter::new(&snapshot);
    let mut text: heapless::String<256> = heapless::String::new();
    formatter.write_all(&mut text).unwrap();

    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("mode normal.shedding (timer armed)"));
    assert_eq!(
        lines.next(),
        Some("loads present=0b00111 active=0b00110 shed=0b00001")
    );
    assert_eq!(
        lines.next(),
        Some("stability unstable freq=50.000Hz roc=0.000Hz/s min=48.0Hz max-roc=10.0Hz/s")
    );
    assert_eq!(lines.next(), Some("timer remaining=+400ms"));
}

#[test]
fn sample_burst_keeps_only_the_newest_readings() {
    let mut executor = CommandExecutor::new(HostLanes::default());
    let now = MockInstant::millis(0);

    for _ in 0..16 {
        assert!(matches!(
            executor.execute("sample 50.0", now),
            Ok(CommandOutcome::Queued {
                admission: Admission::Queued,
                ..
            })
        ));
    }
    assert!(matches!(
        executor.execute("sample 47.0", now),
        Ok(CommandOutcome::Queued {
            admission: Admission::QueuedAfterEviction,
            ..
        })
    ));
    assert_eq!(executor.gateway().producer().remaining(Lane::Samples), Some(0));
    assert_eq!(executor.gateway().stats().evicted, 1);
}

#[test]
fn control_burst_rejects_the_newest_press() {
    let mut executor = CommandExecutor::new(HostLanes::default());
    let now = MockInstant::millis(0);

    for _ in 0..8 {
        executor.execute("button maintenance", now).unwrap();
    }
    assert_eq!(
        executor.execute("button maintenance", now),
        Err(CommandError::Gateway(GatewayError::Rejected(Lane::Control)))
    );
    assert_eq!(executor.gateway().producer().len(Lane::Control), Some(8));
}

#[test]
fn control_events_overtake_queued_samples() {
    let mut executor = CommandExecutor::new(HostLanes::default());
    executor.execute("sample 50.0", MockInstant::millis(1)).unwrap();
    executor.execute("button maintenance", MockInstant::millis(2)).unwrap();

    let lanes = executor.gateway_mut().producer_mut();
    assert!(matches!(
        lanes.try_dequeue(),
        Ok(Some(TriggerEvent::MaintenanceButton { .. }))
    ));
    assert!(matches!(
        lanes.try_dequeue(),
        Ok(Some(TriggerEvent::FrequencySample { .. }))
    ));
}
