//! Single-shot settle timer used to pace shed and restore steps.
//!
//! The timer holds a deadline only; waiting for it is left to whichever
//! executor drives the controller (an embassy `Timer::at` on the MCU, a
//! simulated clock in the emulator).

use core::ops::Add;
use core::time::Duration;

/// Timer lifecycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimerState<Instant> {
    Idle,
    Armed { deadline: Instant },
}

/// One-shot deadline that can be re-armed without stacking.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DebounceTimer<Instant> {
    state: TimerState<Instant>,
}

impl<Instant> DebounceTimer<Instant>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant>,
{
    /// Creates an idle timer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: TimerState::Idle,
        }
    }

    /// Arms the timer to expire `period` after `now`.
    pub fn arm(&mut self, now: Instant, period: Duration) {
        self.state = TimerState::Armed {
            deadline: now + period,
        };
    }

    /// Replaces any pending deadline with `now + period`.
    pub fn reset(&mut self, now: Instant, period: Duration) {
        self.arm(now, period);
    }

    /// Drops the pending deadline, if any. Returns `true` when one was pending.
    pub fn cancel(&mut self) -> bool {
        let was_armed = self.is_armed();
        self.state = TimerState::Idle;
        was_armed
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TimerState<Instant> {
        self.state
    }

    /// Returns `true` while a deadline is pending.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        matches!(self.state, TimerState::Armed { .. })
    }

    /// Pending deadline, if armed.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            TimerState::Armed { deadline } => Some(deadline),
            TimerState::Idle => None,
        }
    }

    /// Consumes the expiry once `now` reaches the deadline.
    ///
    /// Returns `true` at most once per arm or reset; the timer is idle
    /// afterwards.
    pub fn poll_expired(&mut self, now: Instant) -> bool {
        match self.state {
            TimerState::Armed { deadline } if now >= deadline => {
                self.state = TimerState::Idle;
                true
            }
            _ => false,
        }
    }
}

impl<Instant> Default for DebounceTimer<Instant>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant>,
{
    fn default() -> Self {
        Self::new()
    }
}
