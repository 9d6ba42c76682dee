//! Shared status storage for the firmware target.
//!
//! The controller task publishes a [`StatusSnapshot`] after every event, and
//! the heartbeat task reads it back without touching the pipeline.

use core::time::Duration;

use loadshed_core::console::status::{StabilitySnapshot, StatusSnapshot};
use loadshed_core::controller::ControllerState;
use loadshed_core::loads::DEFAULT_LOAD_COUNT;
use loadshed_core::stability::StabilityVerdict;
use portable_atomic::{AtomicU8, AtomicU32, Ordering};

const STATE_SETTLED: u8 = 0;
const STATE_SHEDDING_ARMED: u8 = 1;
const STATE_SHEDDING_IDLE: u8 = 2;
const STATE_MAINTENANCE: u8 = 3;

/// Sentinel for "no value" in the `f32` bit slots.
const UNKNOWN: u32 = u32::MAX;

const fn encode_state(state: ControllerState) -> u8 {
    match state {
        ControllerState::Settled => STATE_SETTLED,
        ControllerState::Shedding { timer_armed: true } => STATE_SHEDDING_ARMED,
        ControllerState::Shedding { timer_armed: false } => STATE_SHEDDING_IDLE,
        ControllerState::Maintenance => STATE_MAINTENANCE,
    }
}

const fn decode_state(raw: u8) -> ControllerState {
    match raw {
        STATE_SHEDDING_ARMED => ControllerState::Shedding { timer_armed: true },
        STATE_SHEDDING_IDLE => ControllerState::Shedding { timer_armed: false },
        STATE_MAINTENANCE => ControllerState::Maintenance,
        _ => ControllerState::Settled,
    }
}

fn encode_f32(value: Option<f32>) -> u32 {
    value.map_or(UNKNOWN, f32::to_bits)
}

fn decode_f32(raw: u32) -> Option<f32> {
    if raw == UNKNOWN {
        None
    } else {
        Some(f32::from_bits(raw))
    }
}

fn encode_remaining(remaining: Option<Duration>) -> u32 {
    match remaining {
        None => 0,
        Some(value) => u32::try_from(value.as_millis())
            .unwrap_or(u32::MAX - 1)
            .min(u32::MAX - 1)
            + 1,
    }
}

fn decode_remaining(raw: u32) -> Option<Duration> {
    if raw == 0 {
        None
    } else {
        Some(Duration::from_millis(u64::from(raw - 1)))
    }
}

/// Atomic copy of the latest [`StatusSnapshot`].
pub struct StatusCell {
    state: AtomicU8,
    load_count: AtomicU8,
    present: AtomicU32,
    active: AtomicU32,
    shed: AtomicU32,
    unstable: AtomicU8,
    frequency_bits: AtomicU32,
    roc_bits: AtomicU32,
    min_frequency_bits: AtomicU32,
    roc_threshold_bits: AtomicU32,
    /// Remaining settle time in milliseconds, +1 (0 == no timer).
    timer_remaining_ms: AtomicU32,
}

impl StatusCell {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_SETTLED),
            load_count: AtomicU8::new(DEFAULT_LOAD_COUNT),
            present: AtomicU32::new(0),
            active: AtomicU32::new(0),
            shed: AtomicU32::new(0),
            unstable: AtomicU8::new(0),
            frequency_bits: AtomicU32::new(UNKNOWN),
            roc_bits: AtomicU32::new(UNKNOWN),
            min_frequency_bits: AtomicU32::new(0),
            roc_threshold_bits: AtomicU32::new(0),
            timer_remaining_ms: AtomicU32::new(0),
        }
    }

    /// Stores `snapshot`.
    pub fn store(&self, snapshot: &StatusSnapshot) {
        self.state
            .store(encode_state(snapshot.state), Ordering::Relaxed);
        self.load_count.store(snapshot.load_count, Ordering::Relaxed);
        self.present.store(snapshot.present, Ordering::Relaxed);
        self.active.store(snapshot.active, Ordering::Relaxed);
        self.shed.store(snapshot.shed, Ordering::Relaxed);

        let stability = &snapshot.stability;
        self.unstable
            .store(u8::from(stability.verdict.is_unstable()), Ordering::Relaxed);
        self.frequency_bits
            .store(encode_f32(stability.frequency_hz), Ordering::Relaxed);
        self.roc_bits
            .store(encode_f32(stability.roc_hz_per_s), Ordering::Relaxed);
        self.min_frequency_bits
            .store(stability.min_frequency_hz.to_bits(), Ordering::Relaxed);
        self.roc_threshold_bits
            .store(stability.roc_threshold_hz_per_s.to_bits(), Ordering::Relaxed);

        self.timer_remaining_ms
            .store(encode_remaining(snapshot.timer_remaining), Ordering::Relaxed);
    }

    /// Rebuilds a [`StatusSnapshot`] from the stored values.
    ///
    /// Fields are read one at a time, so a load taken while the controller
    /// stores may mix two consecutive states.
    pub fn load(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: decode_state(self.state.load(Ordering::Relaxed)),
            load_count: self.load_count.load(Ordering::Relaxed),
            present: self.present.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            shed: self.shed.load(Ordering::Relaxed),
            stability: StabilitySnapshot {
                verdict: StabilityVerdict::from_volatile(
                    self.unstable.load(Ordering::Relaxed) != 0,
                ),
                frequency_hz: decode_f32(self.frequency_bits.load(Ordering::Relaxed)),
                roc_hz_per_s: decode_f32(self.roc_bits.load(Ordering::Relaxed)),
                min_frequency_hz: f32::from_bits(self.min_frequency_bits.load(Ordering::Relaxed)),
                roc_threshold_hz_per_s: f32::from_bits(
                    self.roc_threshold_bits.load(Ordering::Relaxed),
                ),
            },
            timer_remaining: decode_remaining(self.timer_remaining_ms.load(Ordering::Relaxed)),
        }
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

static STATUS: StatusCell = StatusCell::new();

/// Stores the latest controller snapshot.
pub fn publish(snapshot: &StatusSnapshot) {
    STATUS.store(snapshot);
}

/// Returns the most recently published snapshot.
pub fn snapshot() -> StatusSnapshot {
    STATUS.load()
}
