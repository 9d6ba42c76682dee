//! Load-shedding state machine.
//!
//! [`LoadShedController`] owns the [`LoadMask`], the [`DebounceTimer`] and the
//! [`ControllerMode`]. Every trigger is handled to completion by
//! [`LoadShedController::handle`]; callers serialize access so that exactly one
//! event mutates the state at a time.
//!
//! Shedding is paced one load per settle period. A verdict that arrives while
//! the timer is armed only pushes the deadline out; when the timer expires the
//! controller acts on the last verdict it saw.

use core::fmt;
use core::ops::Add;
use core::time::Duration;

use crate::debounce::DebounceTimer;
use crate::loads::{DEFAULT_LOAD_COUNT, LoadId, LoadMask};
use crate::stability::StabilityVerdict;

/// Settle period between consecutive shed or restore steps.
pub const DEFAULT_SETTLE_PERIOD: Duration = Duration::from_millis(500);

/// Interval at which switch inputs are sampled by the polling collaborator.
pub const SWITCH_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Static controller configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ControllerConfig {
    settle_period: Duration,
    load_count: u8,
}

impl ControllerConfig {
    /// Creates a configuration with an explicit settle period and load count.
    #[must_use]
    pub const fn new(settle_period: Duration, load_count: u8) -> Self {
        Self {
            settle_period,
            load_count,
        }
    }

    /// Returns the debounce settle period.
    #[must_use]
    pub const fn settle_period(&self) -> Duration {
        self.settle_period
    }

    /// Returns the number of managed loads.
    #[must_use]
    pub const fn load_count(&self) -> u8 {
        self.load_count
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_PERIOD, DEFAULT_LOAD_COUNT)
    }
}

/// Operator-selected mode.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum ControllerMode {
    #[default]
    Normal,
    Maintenance,
}

/// Observable controller state.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControllerState {
    /// No load-management episode is in progress.
    Settled,
    /// At least one load was shed since the controller last settled.
    Shedding { timer_armed: bool },
    /// Automatic shedding is suspended.
    Maintenance,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Settled => f.write_str("normal.settled"),
            ControllerState::Shedding { timer_armed: true } => {
                f.write_str("normal.shedding (timer armed)")
            }
            ControllerState::Shedding { timer_armed: false } => {
                f.write_str("normal.shedding (timer idle)")
            }
            ControllerState::Maintenance => f.write_str("maintenance"),
        }
    }
}

/// Inputs understood by the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControllerEvent {
    /// Maintenance button edge.
    MaintenanceToggle,
    /// Fresh stability verdict (measured or manually injected).
    Verdict(StabilityVerdict),
    /// The settle period may have elapsed.
    TimerExpired,
    /// Raw switch bank reading.
    SwitchInputs(u32),
}

/// Result of evaluating the last verdict against the load mask.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StepOutcome {
    /// A load was disconnected and the timer armed.
    Shed(LoadId),
    /// A load was reconnected. The timer is re-armed unless the episode ended.
    Restored { load: LoadId, episode_complete: bool },
    /// Unstable, but every present load is already shed.
    Exhausted,
    /// Stable with nothing left to restore; the open episode was closed.
    EpisodeComplete,
    /// Stable with nothing shed and no episode open.
    Idle,
}

/// What the controller did with one event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Decision {
    /// The last verdict was evaluated.
    Step(StepOutcome),
    /// A verdict arrived inside the settle window; the deadline moved out.
    Absorbed,
    /// Ignored because the controller is in maintenance.
    Suspended,
    /// Maintenance started. `cleared` lists loads that were reconnected.
    MaintenanceEntered { cleared: u32 },
    /// Maintenance ended and the cached verdict was evaluated.
    MaintenanceExited(StepOutcome),
    /// Timer notification without a matching expiry.
    Stale,
    /// Switch inputs were applied.
    InputsUpdated { changed: bool },
}

/// Output hook mirroring the mask onto indicators or actuators.
pub trait LoadMirror {
    /// Called after every mask mutation.
    fn mirror_load_state(&mut self, active: u32, shed: u32);
}

impl<T> LoadMirror for &mut T
where
    T: LoadMirror + ?Sized,
{
    fn mirror_load_state(&mut self, active: u32, shed: u32) {
        (**self).mirror_load_state(active, shed);
    }
}

/// Mirror that discards every update.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopLoadMirror;

impl NoopLoadMirror {
    /// Creates a new no-op mirror.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LoadMirror for NoopLoadMirror {
    fn mirror_load_state(&mut self, _: u32, _: u32) {}
}

/// Source of the physical load switch positions.
pub trait SwitchReader {
    /// Returns one bit per load; set means switched on.
    fn read_switch_inputs(&mut self) -> u32;
}

/// Priority load-shedding state machine.
pub struct LoadShedController<Instant, M = NoopLoadMirror> {
    config: ControllerConfig,
    mask: LoadMask,
    timer: DebounceTimer<Instant>,
    mode: ControllerMode,
    episode_open: bool,
    last_verdict: StabilityVerdict,
    mirror: M,
}

impl<Instant> LoadShedController<Instant, NoopLoadMirror>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant>,
{
    /// Creates a controller without an output mirror.
    #[must_use]
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_mirror(config, NoopLoadMirror::new())
    }
}

impl<Instant, M> LoadShedController<Instant, M>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant>,
    M: LoadMirror,
{
    /// Creates a controller that reports mask changes to `mirror`.
    pub fn with_mirror(config: ControllerConfig, mirror: M) -> Self {
        Self {
            config,
            mask: LoadMask::new(config.load_count()),
            timer: DebounceTimer::new(),
            mode: ControllerMode::Normal,
            episode_open: false,
            last_verdict: StabilityVerdict::Stable,
            mirror,
        }
    }

    /// Applies one event and reports the resulting decision.
    pub fn handle(&mut self, event: ControllerEvent, now: Instant) -> Decision {
        match event {
            ControllerEvent::MaintenanceToggle => self.toggle_maintenance(now),
            ControllerEvent::Verdict(verdict) => self.on_verdict(verdict, now),
            ControllerEvent::TimerExpired => self.on_timer(now),
            ControllerEvent::SwitchInputs(raw) => self.on_switch_inputs(raw),
        }
    }

    /// Current configuration.
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Read-only view of the load mask.
    pub const fn mask(&self) -> &LoadMask {
        &self.mask
    }

    /// Current operator mode.
    pub const fn mode(&self) -> ControllerMode {
        self.mode
    }

    /// Last verdict delivered to the controller.
    pub const fn last_verdict(&self) -> StabilityVerdict {
        self.last_verdict
    }

    /// Deadline of the pending settle period, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Observable state derived from mode, episode and timer.
    pub fn state(&self) -> ControllerState {
        match self.mode {
            ControllerMode::Maintenance => ControllerState::Maintenance,
            ControllerMode::Normal if self.episode_open => ControllerState::Shedding {
                timer_armed: self.timer.is_armed(),
            },
            ControllerMode::Normal => ControllerState::Settled,
        }
    }

    /// Borrow the output mirror.
    pub const fn mirror(&self) -> &M {
        &self.mirror
    }

    /// Mutably borrow the output mirror.
    pub fn mirror_mut(&mut self) -> &mut M {
        &mut self.mirror
    }

    fn toggle_maintenance(&mut self, now: Instant) -> Decision {
        match self.mode {
            ControllerMode::Normal => {
                self.mode = ControllerMode::Maintenance;
                self.timer.cancel();
                self.episode_open = false;
                let cleared = self.mask.clear_shed();
                self.publish();
                Decision::MaintenanceEntered { cleared }
            }
            ControllerMode::Maintenance => {
                self.mode = ControllerMode::Normal;
                Decision::MaintenanceExited(self.evaluate(now))
            }
        }
    }

    fn on_verdict(&mut self, verdict: StabilityVerdict, now: Instant) -> Decision {
        self.last_verdict = verdict;

        if self.mode == ControllerMode::Maintenance {
            return Decision::Suspended;
        }

        // A deadline that already passed counts as expired even if the
        // timer notification has not been delivered yet.
        if self.timer.is_armed() && !self.timer.poll_expired(now) {
            self.timer.reset(now, self.config.settle_period);
            return Decision::Absorbed;
        }

        Decision::Step(self.evaluate(now))
    }

    fn on_timer(&mut self, now: Instant) -> Decision {
        if self.mode == ControllerMode::Maintenance || !self.timer.poll_expired(now) {
            return Decision::Stale;
        }

        Decision::Step(self.evaluate(now))
    }

    fn on_switch_inputs(&mut self, raw: u32) -> Decision {
        let changed = if self.episode_open {
            self.mask.restrict_present(raw)
        } else {
            self.mask.replace_present(raw)
        };

        if changed {
            self.publish();
        }

        Decision::InputsUpdated { changed }
    }

    fn evaluate(&mut self, now: Instant) -> StepOutcome {
        match self.last_verdict {
            StabilityVerdict::Unstable => match self.mask.shed_lowest_priority_active() {
                Some(load) => {
                    self.episode_open = true;
                    self.timer.arm(now, self.config.settle_period);
                    self.publish();
                    StepOutcome::Shed(load)
                }
                None => StepOutcome::Exhausted,
            },
            StabilityVerdict::Stable => match self.mask.restore_highest_priority_shed() {
                Some(load) => {
                    let episode_complete = self.mask.shed_count() == 0;
                    if episode_complete {
                        self.episode_open = false;
                    } else {
                        self.timer.arm(now, self.config.settle_period);
                    }
                    self.publish();
                    StepOutcome::Restored {
                        load,
                        episode_complete,
                    }
                }
                None if self.episode_open => {
                    self.episode_open = false;
                    StepOutcome::EpisodeComplete
                }
                None => StepOutcome::Idle,
            },
        }
    }

    fn publish(&mut self) {
        self.mirror
            .mirror_load_state(self.mask.active(), self.mask.shed());
    }
}
