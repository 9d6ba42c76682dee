//! Telemetry event catalog and bounded recorder shared by firmware and host targets.
//!
//! Event kinds serialize to compact numeric codes so they can be forwarded
//! over diagnostics channels. Payloads carry integer-only measurements,
//! keeping records `Eq` and `no_std` friendly.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::loads::LoadId;
use crate::stability::{FrequencySample, StabilityConfig};

/// Identifier assigned to each recorded event.
pub type EventId = u32;

/// Default number of records retained by [`TelemetryRecorder`].
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Monotonic clock abstraction used to compute elapsed times.
pub trait TelemetryInstant: Copy {
    /// Returns the time elapsed since `earlier`, or zero if `earlier` is later.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    LoadShed(LoadId),
    LoadRestored(LoadId),
    EpisodeComplete,
    MaintenanceEntered,
    MaintenanceExited,
    StabilityLost,
    StabilityRegained,
    SwitchInputsChanged,
    ThresholdsChanged,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::LoadShed(load) => write!(f, "load-shed {load}"),
            TelemetryEventKind::LoadRestored(load) => write!(f, "load-restored {load}"),
            TelemetryEventKind::EpisodeComplete => f.write_str("episode-complete"),
            TelemetryEventKind::MaintenanceEntered => f.write_str("maintenance-entered"),
            TelemetryEventKind::MaintenanceExited => f.write_str("maintenance-exited"),
            TelemetryEventKind::StabilityLost => f.write_str("stability-lost"),
            TelemetryEventKind::StabilityRegained => f.write_str("stability-regained"),
            TelemetryEventKind::SwitchInputsChanged => f.write_str("switch-inputs-changed"),
            TelemetryEventKind::ThresholdsChanged => f.write_str("thresholds-changed"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const LOAD_SHED_BASE: u16 = 0x0000;
    const LOAD_RESTORED_BASE: u16 = 0x0020;
    const EPISODE_COMPLETE_CODE: u16 = 0x0040;
    const MAINTENANCE_ENTERED_CODE: u16 = 0x0041;
    const MAINTENANCE_EXITED_CODE: u16 = 0x0042;
    const STABILITY_LOST_CODE: u16 = 0x0043;
    const STABILITY_REGAINED_CODE: u16 = 0x0044;
    const SWITCH_INPUTS_CODE: u16 = 0x0045;
    const THRESHOLDS_CODE: u16 = 0x0046;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            // Load indices are below 32, so the bases never overlap.
            TelemetryEventKind::LoadShed(load) => Self::LOAD_SHED_BASE + load.index() as u16,
            TelemetryEventKind::LoadRestored(load) => {
                Self::LOAD_RESTORED_BASE + load.index() as u16
            }
            TelemetryEventKind::EpisodeComplete => Self::EPISODE_COMPLETE_CODE,
            TelemetryEventKind::MaintenanceEntered => Self::MAINTENANCE_ENTERED_CODE,
            TelemetryEventKind::MaintenanceExited => Self::MAINTENANCE_EXITED_CODE,
            TelemetryEventKind::StabilityLost => Self::STABILITY_LOST_CODE,
            TelemetryEventKind::StabilityRegained => Self::STABILITY_REGAINED_CODE,
            TelemetryEventKind::SwitchInputsChanged => Self::SWITCH_INPUTS_CODE,
            TelemetryEventKind::ThresholdsChanged => Self::THRESHOLDS_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`TelemetryEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        match code {
            Self::EPISODE_COMPLETE_CODE => TelemetryEventKind::EpisodeComplete,
            Self::MAINTENANCE_ENTERED_CODE => TelemetryEventKind::MaintenanceEntered,
            Self::MAINTENANCE_EXITED_CODE => TelemetryEventKind::MaintenanceExited,
            Self::STABILITY_LOST_CODE => TelemetryEventKind::StabilityLost,
            Self::STABILITY_REGAINED_CODE => TelemetryEventKind::StabilityRegained,
            Self::SWITCH_INPUTS_CODE => TelemetryEventKind::SwitchInputsChanged,
            Self::THRESHOLDS_CODE => TelemetryEventKind::ThresholdsChanged,
            _ => Self::decode_load(code).unwrap_or(TelemetryEventKind::Custom(code)),
        }
    }

    fn decode_load(code: u16) -> Option<Self> {
        let index = u8::try_from(code & 0x1F).ok()?;
        let load = LoadId::new(index)?;
        match code & !0x1F {
            Self::LOAD_SHED_BASE => Some(TelemetryEventKind::LoadShed(load)),
            Self::LOAD_RESTORED_BASE => Some(TelemetryEventKind::LoadRestored(load)),
            _ => None,
        }
    }
}

/// Mask snapshot attached to load events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LoadTelemetry {
    pub active: u32,
    pub shed: u32,
    pub elapsed_since_previous: Option<Duration>,
}

/// Measurement attached to stability transitions.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StabilityTelemetry {
    pub frequency_mhz: u32,
    pub roc_mhz_per_s: i32,
}

impl StabilityTelemetry {
    /// Converts a floating-point measurement to integer milli-units.
    #[must_use]
    pub fn from_measurement(sample: FrequencySample, roc: f32) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let roc_mhz_per_s = (roc * 1_000.0) as i32;
        Self {
            frequency_mhz: sample.millihertz(),
            roc_mhz_per_s,
        }
    }
}

/// Threshold snapshot attached to configuration changes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ThresholdTelemetry {
    pub min_frequency_mhz: u32,
    pub roc_threshold_mhz_per_s: u32,
}

impl ThresholdTelemetry {
    /// Captures the thresholds of `config` in milli-units.
    #[must_use]
    pub fn from_config(config: &StabilityConfig) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let roc_threshold_mhz_per_s = (config.roc_threshold_hz_per_s() * 1_000.0) as u32;
        Self {
            min_frequency_mhz: FrequencySample::new(config.min_frequency_hz()).millihertz(),
            roc_threshold_mhz_per_s,
        }
    }
}

/// Event-specific details.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryPayload {
    None,
    Load(LoadTelemetry),
    Stability(StabilityTelemetry),
    Thresholds(ThresholdTelemetry),
}

/// Stored telemetry entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TelemetryRecord<TInstant> {
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Ring buffer retaining the most recent telemetry records.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>,
    next_event_id: EventId,
    last_load_event: Option<TInstant>,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    /// Creates an empty recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
            last_load_event: None,
        }
    }

    /// Most recent record.
    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    /// Iterates records from the oldest retained to the newest.
    pub fn iter_oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records a shed or restore together with the resulting masks.
    pub fn record_load_change(
        &mut self,
        event: TelemetryEventKind,
        active: u32,
        shed: u32,
        timestamp: TInstant,
    ) -> EventId {
        let elapsed_since_previous = self
            .last_load_event
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_load_event = Some(timestamp);

        self.record(
            event,
            TelemetryPayload::Load(LoadTelemetry {
                active,
                shed,
                elapsed_since_previous,
            }),
            timestamp,
        )
    }

    /// Records a stability transition with the measurement that caused it.
    pub fn record_stability(
        &mut self,
        event: TelemetryEventKind,
        measurement: StabilityTelemetry,
        timestamp: TInstant,
    ) -> EventId {
        self.record(event, TelemetryPayload::Stability(measurement), timestamp)
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}
