//! Single consumer behind the trigger lanes.
//!
//! [`LoadShedPipeline`] owns the stability estimator and the controller. It
//! turns each [`TriggerEvent`] into estimator and controller calls, records
//! the interesting outcomes in a [`TelemetryRecorder`], and reports the next
//! settle deadline so the surrounding executor can wait for "next event or
//! deadline, whichever comes first".

use core::ops::Add;
use core::time::Duration;

use crate::console::status::{StabilitySnapshot, StatusSnapshot};
use crate::controller::{
    ControllerConfig, ControllerEvent, Decision, LoadMirror, LoadShedController, NoopLoadMirror,
    StepOutcome,
};
use crate::gateway::TriggerEvent;
use crate::stability::{StabilityConfig, StabilityEstimator, StabilityVerdict};
use crate::telemetry::{
    StabilityTelemetry, TelemetryEventKind, TelemetryInstant, TelemetryPayload, TelemetryRecorder,
    ThresholdTelemetry,
};

/// Which verdicts reach the controller.
///
/// The controller restarts an armed settle timer on every verdict it
/// receives. Under continuous sampling `EveryVerdict` therefore keeps the
/// timer from ever expiring, so only `OnChange` paces shedding and
/// restoration by the settle period.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum VerdictForwarding {
    /// Only verdict transitions are delivered, plus the first sample after a
    /// manual override.
    #[default]
    OnChange,
    /// Every sample's verdict is delivered.
    EveryVerdict,
}

/// Outcome of dispatching one trigger event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Dispatch {
    /// The controller handled a derived event.
    Controller(Decision),
    /// A sample was recorded but its verdict was filtered out.
    Filtered(StabilityVerdict),
    /// Thresholds were replaced.
    ThresholdsUpdated,
}

/// Estimator plus controller, driven by one consumer.
pub struct LoadShedPipeline<Instant, M = NoopLoadMirror> {
    estimator: StabilityEstimator,
    controller: LoadShedController<Instant, M>,
    forwarding: VerdictForwarding,
    last_measured: Option<StabilityVerdict>,
    overridden: bool,
}

impl<Instant> LoadShedPipeline<Instant, NoopLoadMirror>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant> + TelemetryInstant,
{
    /// Creates a pipeline with default thresholds and no output mirror.
    #[must_use]
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_mirror(config, StabilityConfig::default(), NoopLoadMirror::new())
    }
}

impl<Instant, M> LoadShedPipeline<Instant, M>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant> + TelemetryInstant,
    M: LoadMirror,
{
    /// Creates a pipeline with explicit configuration and output mirror.
    pub fn with_mirror(config: ControllerConfig, stability: StabilityConfig, mirror: M) -> Self {
        Self {
            estimator: StabilityEstimator::new(stability),
            controller: LoadShedController::with_mirror(config, mirror),
            forwarding: VerdictForwarding::default(),
            last_measured: None,
            overridden: false,
        }
    }

    /// Selects which verdicts are forwarded to the controller.
    #[must_use]
    pub fn with_forwarding(mut self, forwarding: VerdictForwarding) -> Self {
        self.forwarding = forwarding;
        self
    }

    /// Handles one trigger event to completion.
    pub fn dispatch<const CAP: usize>(
        &mut self,
        event: TriggerEvent<Instant>,
        telemetry: &mut TelemetryRecorder<Instant, CAP>,
    ) -> Dispatch {
        match event {
            TriggerEvent::FrequencySample { sample, at } => {
                let verdict = self.estimator.ingest(sample);
                let changed = self.last_measured != Some(verdict);
                self.last_measured = Some(verdict);

                if changed {
                    let (stored, roc) = self
                        .estimator
                        .history()
                        .latest()
                        .unwrap_or((sample, 0.0));
                    let kind = if verdict.is_unstable() {
                        TelemetryEventKind::StabilityLost
                    } else {
                        TelemetryEventKind::StabilityRegained
                    };
                    telemetry.record_stability(
                        kind,
                        StabilityTelemetry::from_measurement(stored, roc),
                        at,
                    );
                }

                // A button override holds only until the next measurement.
                let overridden = core::mem::replace(&mut self.overridden, false);
                if !changed && !overridden && self.forwarding == VerdictForwarding::OnChange {
                    return Dispatch::Filtered(verdict);
                }

                self.drive(ControllerEvent::Verdict(verdict), at, telemetry)
            }
            TriggerEvent::VolatilityButton { make_volatile, at } => {
                let verdict = StabilityVerdict::from_volatile(make_volatile);
                self.overridden = true;
                self.drive(ControllerEvent::Verdict(verdict), at, telemetry)
            }
            TriggerEvent::MaintenanceButton { at } => {
                self.drive(ControllerEvent::MaintenanceToggle, at, telemetry)
            }
            TriggerEvent::SwitchInputs { raw, at } => {
                self.drive(ControllerEvent::SwitchInputs(raw), at, telemetry)
            }
            TriggerEvent::ThresholdUpdate { update, at } => {
                self.estimator.apply(update);
                telemetry.record(
                    TelemetryEventKind::ThresholdsChanged,
                    TelemetryPayload::Thresholds(ThresholdTelemetry::from_config(
                        self.estimator.config(),
                    )),
                    at,
                );
                Dispatch::ThresholdsUpdated
            }
        }
    }

    /// Delivers a timer expiry observed at `now`.
    pub fn expire<const CAP: usize>(
        &mut self,
        now: Instant,
        telemetry: &mut TelemetryRecorder<Instant, CAP>,
    ) -> Decision {
        match self.drive(ControllerEvent::TimerExpired, now, telemetry) {
            Dispatch::Controller(decision) => decision,
            Dispatch::Filtered(_) | Dispatch::ThresholdsUpdated => Decision::Stale,
        }
    }

    /// Deadline of the pending settle period, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.controller.next_deadline()
    }

    /// Read-only access to the estimator.
    pub const fn estimator(&self) -> &StabilityEstimator {
        &self.estimator
    }

    /// Read-only access to the controller.
    pub const fn controller(&self) -> &LoadShedController<Instant, M> {
        &self.controller
    }

    /// Mutable access to the controller's output mirror.
    pub fn mirror_mut(&mut self) -> &mut M {
        self.controller.mirror_mut()
    }

    /// Captures the state surfaced by the `status` command.
    pub fn snapshot(&self, now: Instant) -> StatusSnapshot {
        let mask = self.controller.mask();
        let config = self.estimator.config();
        let latest = self.estimator.history().latest();

        StatusSnapshot {
            state: self.controller.state(),
            load_count: mask.load_count(),
            present: mask.present(),
            active: mask.active(),
            shed: mask.shed(),
            stability: StabilitySnapshot {
                verdict: self.controller.last_verdict(),
                frequency_hz: latest.map(|(sample, _)| sample.hz()),
                roc_hz_per_s: latest.map(|(_, roc)| roc),
                min_frequency_hz: config.min_frequency_hz(),
                roc_threshold_hz_per_s: config.roc_threshold_hz_per_s(),
            },
            timer_remaining: self
                .controller
                .next_deadline()
                .map(|deadline| deadline.saturating_duration_since(now)),
        }
    }

    fn drive<const CAP: usize>(
        &mut self,
        event: ControllerEvent,
        now: Instant,
        telemetry: &mut TelemetryRecorder<Instant, CAP>,
    ) -> Dispatch {
        let decision = self.controller.handle(event, now);
        self.record(decision, now, telemetry);
        Dispatch::Controller(decision)
    }

    fn record<const CAP: usize>(
        &self,
        decision: Decision,
        now: Instant,
        telemetry: &mut TelemetryRecorder<Instant, CAP>,
    ) {
        let mask = self.controller.mask();
        match decision {
            Decision::Step(step) => self.record_step(step, now, telemetry),
            Decision::MaintenanceEntered { .. } => {
                telemetry.record(
                    TelemetryEventKind::MaintenanceEntered,
                    TelemetryPayload::None,
                    now,
                );
            }
            Decision::MaintenanceExited(step) => {
                telemetry.record(
                    TelemetryEventKind::MaintenanceExited,
                    TelemetryPayload::None,
                    now,
                );
                self.record_step(step, now, telemetry);
            }
            Decision::InputsUpdated { changed: true } => {
                telemetry.record_load_change(
                    TelemetryEventKind::SwitchInputsChanged,
                    mask.active(),
                    mask.shed(),
                    now,
                );
            }
            Decision::InputsUpdated { changed: false }
            | Decision::Absorbed
            | Decision::Suspended
            | Decision::Stale => {}
        }
    }

    fn record_step<const CAP: usize>(
        &self,
        step: StepOutcome,
        now: Instant,
        telemetry: &mut TelemetryRecorder<Instant, CAP>,
    ) {
        let mask = self.controller.mask();
        match step {
            StepOutcome::Shed(load) => {
                telemetry.record_load_change(
                    TelemetryEventKind::LoadShed(load),
                    mask.active(),
                    mask.shed(),
                    now,
                );
            }
            StepOutcome::Restored {
                load,
                episode_complete,
            } => {
                telemetry.record_load_change(
                    TelemetryEventKind::LoadRestored(load),
                    mask.active(),
                    mask.shed(),
                    now,
                );
                if episode_complete {
                    telemetry.record(
                        TelemetryEventKind::EpisodeComplete,
                        TelemetryPayload::None,
                        now,
                    );
                }
            }
            StepOutcome::EpisodeComplete => {
                telemetry.record(
                    TelemetryEventKind::EpisodeComplete,
                    TelemetryPayload::None,
                    now,
                );
            }
            StepOutcome::Exhausted | StepOutcome::Idle => {}
        }
    }
}
