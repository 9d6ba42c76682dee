//! Synchronous half of the controller task.
//!
//! [`ControllerWorker`] owns the pipeline and the telemetry ring. The async
//! task only decides *when* to call it (next event or settle deadline); every
//! state change, log line and status update happens here so it can be
//! exercised on the host.

use loadshed_core::controller::{ControllerConfig, Decision, LoadMirror, StepOutcome};
use loadshed_core::pipeline::{Dispatch, LoadShedPipeline, VerdictForwarding};
use loadshed_core::stability::StabilityConfig;

use crate::lanes::{FirmwareEvent, FirmwareInstant};
use crate::status;
use crate::telemetry::{self, FirmwareTelemetry, LogCursor};

/// Single consumer behind the trigger lanes.
pub struct ControllerWorker<'t, M> {
    pipeline: LoadShedPipeline<FirmwareInstant, M>,
    telemetry: &'t mut FirmwareTelemetry,
    cursor: LogCursor,
}

impl<'t, M> ControllerWorker<'t, M>
where
    M: LoadMirror,
{
    /// Builds the worker around a load mirror and telemetry ring.
    pub fn new(mirror: M, telemetry: &'t mut FirmwareTelemetry) -> Self {
        let pipeline = LoadShedPipeline::with_mirror(
            ControllerConfig::default(),
            StabilityConfig::default(),
            mirror,
        )
        .with_forwarding(VerdictForwarding::OnChange);

        Self {
            pipeline,
            telemetry,
            cursor: LogCursor::new(),
        }
    }

    /// Deadline the task should wake up for, if any.
    pub fn next_deadline(&self) -> Option<FirmwareInstant> {
        self.pipeline.next_deadline()
    }

    /// Handles one event taken from a lane.
    pub fn on_event(&mut self, event: FirmwareEvent) -> Dispatch {
        let at = event.at();
        let dispatch = self.pipeline.dispatch(event, self.telemetry);
        if let Dispatch::Controller(decision) = dispatch {
            self.note(decision, at);
        }
        self.publish(at);
        dispatch
    }

    /// Handles a settle deadline reached at `now`.
    pub fn on_deadline(&mut self, now: FirmwareInstant) -> Decision {
        let decision = self.pipeline.expire(now, self.telemetry);
        self.note(decision, now);
        self.publish(now);
        decision
    }

    /// Read-only access to the pipeline.
    pub const fn pipeline(&self) -> &LoadShedPipeline<FirmwareInstant, M> {
        &self.pipeline
    }

    fn note(&self, decision: Decision, at: FirmwareInstant) {
        if matches!(
            decision,
            Decision::Step(StepOutcome::Exhausted)
                | Decision::MaintenanceExited(StepOutcome::Exhausted)
        ) {
            telemetry::log_exhausted(at);
        }
    }

    fn publish(&mut self, now: FirmwareInstant) {
        let snapshot = self.pipeline.snapshot(now);
        self.cursor.flush(self.telemetry, snapshot.load_count);
        status::publish(&snapshot);
    }
}
