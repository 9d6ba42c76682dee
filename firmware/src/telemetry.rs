//! Telemetry ring and logging helpers.
//!
//! The controller task owns a [`FirmwareTelemetry`] ring and mirrors each new
//! record to defmt (target) or stdout (host), along with gateway drops and
//! the status heartbeat.

use core::fmt;

use loadshed_core::console::status::{StatusFormatter, StatusSnapshot};
use loadshed_core::gateway::GatewayError;
#[cfg(target_os = "none")]
use loadshed_core::gateway::Lane;
use loadshed_core::loads::MaskBits;
use loadshed_core::telemetry::{
    EventId, TELEMETRY_RING_CAPACITY, TelemetryPayload, TelemetryRecord, TelemetryRecorder,
};

use crate::lanes::FirmwareInstant;

/// Telemetry ring type used by the controller task.
pub type FirmwareTelemetry = TelemetryRecorder<FirmwareInstant, TELEMETRY_RING_CAPACITY>;

/// Tracks which records have already been logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogCursor {
    next_id: EventId,
}

impl LogCursor {
    pub const fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Logs every record newer than the previous call. Returns how many were
    /// logged.
    pub fn flush(&mut self, telemetry: &FirmwareTelemetry, load_count: u8) -> usize {
        let mut logged = 0;
        for record in telemetry.iter_oldest_first() {
            // Ids wrap; anything within half the id space ahead is new.
            if record.id.wrapping_sub(self.next_id) < EventId::MAX / 2 {
                log_record(record, load_count);
                self.next_id = record.id.wrapping_add(1);
                logged += 1;
            }
        }
        logged
    }
}

fn log_record(record: &TelemetryRecord<FirmwareInstant>, load_count: u8) {
    let timestamp_us = record.timestamp.as_micros();
    match record.details {
        TelemetryPayload::Load(load) => {
            let elapsed_us = load
                .elapsed_since_previous
                .map(|value| u64::try_from(value.as_micros()).unwrap_or(u64::MAX));
            emit_load(
                &record.event,
                MaskBits {
                    bits: load.active,
                    width: load_count,
                },
                MaskBits {
                    bits: load.shed,
                    width: load_count,
                },
                timestamp_us,
                elapsed_us,
            );
        }
        TelemetryPayload::Stability(measurement) => emit_measurement(
            &record.event,
            measurement.frequency_mhz,
            measurement.roc_mhz_per_s,
            timestamp_us,
        ),
        TelemetryPayload::Thresholds(thresholds) => emit_thresholds(
            thresholds.min_frequency_mhz,
            thresholds.roc_threshold_mhz_per_s,
            timestamp_us,
        ),
        TelemetryPayload::None => emit_plain(&record.event, timestamp_us),
    }
}

#[cfg(target_os = "none")]
fn emit_load<E: fmt::Display>(
    event: &E,
    active: MaskBits,
    shed: MaskBits,
    timestamp_us: u64,
    elapsed_us: Option<u64>,
) {
    let event = defmt::Display2Format(event);
    let active = defmt::Display2Format(&active);
    let shed = defmt::Display2Format(&shed);
    match elapsed_us {
        Some(delta) => defmt::info!(
            "telemetry:{} active={} shed={} t={}us Δ={}us",
            event,
            active,
            shed,
            timestamp_us,
            delta
        ),
        None => defmt::info!(
            "telemetry:{} active={} shed={} t={}us",
            event,
            active,
            shed,
            timestamp_us
        ),
    }
}

#[cfg(not(target_os = "none"))]
fn emit_load<E: fmt::Display>(
    event: &E,
    active: MaskBits,
    shed: MaskBits,
    timestamp_us: u64,
    elapsed_us: Option<u64>,
) {
    match elapsed_us {
        Some(delta) => println!(
            "telemetry:{event} active={active} shed={shed} t={timestamp_us}us Δ={delta}us"
        ),
        None => println!("telemetry:{event} active={active} shed={shed} t={timestamp_us}us"),
    }
}

#[cfg(target_os = "none")]
fn emit_measurement<E: fmt::Display>(
    event: &E,
    frequency_mhz: u32,
    roc_mhz_per_s: i32,
    timestamp_us: u64,
) {
    defmt::info!(
        "telemetry:{} freq={}mHz roc={}mHz/s t={}us",
        defmt::Display2Format(event),
        frequency_mhz,
        roc_mhz_per_s,
        timestamp_us
    );
}

#[cfg(not(target_os = "none"))]
fn emit_measurement<E: fmt::Display>(
    event: &E,
    frequency_mhz: u32,
    roc_mhz_per_s: i32,
    timestamp_us: u64,
) {
    println!(
        "telemetry:{event} freq={frequency_mhz}mHz roc={roc_mhz_per_s}mHz/s t={timestamp_us}us"
    );
}

#[cfg(target_os = "none")]
fn emit_thresholds(min_frequency_mhz: u32, roc_threshold_mhz_per_s: u32, timestamp_us: u64) {
    defmt::info!(
        "telemetry:thresholds-changed min={}mHz max-roc={}mHz/s t={}us",
        min_frequency_mhz,
        roc_threshold_mhz_per_s,
        timestamp_us
    );
}

#[cfg(not(target_os = "none"))]
fn emit_thresholds(min_frequency_mhz: u32, roc_threshold_mhz_per_s: u32, timestamp_us: u64) {
    println!(
        "telemetry:thresholds-changed min={min_frequency_mhz}mHz max-roc={roc_threshold_mhz_per_s}mHz/s t={timestamp_us}us"
    );
}

#[cfg(target_os = "none")]
fn emit_plain<E: fmt::Display>(event: &E, timestamp_us: u64) {
    defmt::info!("telemetry:{} t={}us", defmt::Display2Format(event), timestamp_us);
}

#[cfg(not(target_os = "none"))]
fn emit_plain<E: fmt::Display>(event: &E, timestamp_us: u64) {
    println!("telemetry:{event} t={timestamp_us}us");
}

/// Reports an event that never reached the controller.
#[cfg(target_os = "none")]
pub fn log_dropped<E: fmt::Debug>(source: &'static str, error: &GatewayError<E>) {
    match error {
        GatewayError::Rejected(Lane::Control) => {
            defmt::warn!("loadshed:{} control lane full, event rejected", source);
        }
        GatewayError::Rejected(Lane::Samples) => {
            defmt::warn!("loadshed:{} sample lane full, event rejected", source);
        }
        GatewayError::Queue(err) => {
            defmt::warn!("loadshed:{} {}", source, defmt::Debug2Format(err));
        }
    }
}

/// Reports an event that never reached the controller.
#[cfg(not(target_os = "none"))]
pub fn log_dropped<E: fmt::Debug>(source: &'static str, error: &GatewayError<E>) {
    println!("loadshed:{source} {error}");
}

/// Notes an unstable verdict that found nothing left to shed.
#[cfg(target_os = "none")]
pub fn log_exhausted(timestamp: FirmwareInstant) {
    defmt::warn!(
        "loadshed: unstable with every load shed t={}us",
        timestamp.as_micros()
    );
}

/// Notes an unstable verdict that found nothing left to shed.
#[cfg(not(target_os = "none"))]
pub fn log_exhausted(timestamp: FirmwareInstant) {
    println!(
        "loadshed: unstable with every load shed t={}us",
        timestamp.as_micros()
    );
}

/// Writes the periodic status lines.
#[cfg(target_os = "none")]
pub fn log_heartbeat(snapshot: &StatusSnapshot) {
    let formatter = StatusFormatter::new(snapshot);
    defmt::info!("status: {}", defmt::Display2Format(&StatusLines(formatter)));
}

/// Writes the periodic status lines.
#[cfg(not(target_os = "none"))]
pub fn log_heartbeat(snapshot: &StatusSnapshot) {
    let formatter = StatusFormatter::new(snapshot);
    println!("status: {}", StatusLines(formatter));
}

/// Renders every status line separated by ` | `.
struct StatusLines<'a>(StatusFormatter<'a>);

impl fmt::Display for StatusLines<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.write_mode_line(f)?;
        f.write_str(" | ")?;
        self.0.write_loads_line(f)?;
        f.write_str(" | ")?;
        self.0.write_stability_line(f)?;
        f.write_str(" | ")?;
        self.0.write_timer_line(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadshed_core::loads::LoadId;
    use loadshed_core::telemetry::TelemetryEventKind;

    #[test]
    fn cursor_logs_each_record_once() {
        let mut telemetry = FirmwareTelemetry::new();
        let mut cursor = LogCursor::new();

        telemetry.record_load_change(
            TelemetryEventKind::LoadShed(LoadId::new(0).unwrap()),
            0b1_1110,
            0b0_0001,
            FirmwareInstant::from_millis(10),
        );
        telemetry.record(
            TelemetryEventKind::MaintenanceEntered,
            TelemetryPayload::None,
            FirmwareInstant::from_millis(20),
        );

        assert_eq!(cursor.flush(&telemetry, 5), 2);
        assert_eq!(cursor.flush(&telemetry, 5), 0);

        telemetry.record(
            TelemetryEventKind::MaintenanceExited,
            TelemetryPayload::None,
            FirmwareInstant::from_millis(30),
        );
        assert_eq!(cursor.flush(&telemetry, 5), 1);
    }
}
