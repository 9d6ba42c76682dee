//! Shared status surface for the operator console.
//!
//! The pipeline captures a [`StatusSnapshot`] and [`StatusFormatter`] renders
//! it, so the firmware heartbeat and the emulator print identical lines.

use core::fmt;
use core::time::Duration;

use crate::controller::ControllerState;
use crate::loads::MaskBits;
use crate::stability::StabilityVerdict;

/// Stability half of a status snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StabilitySnapshot {
    /// Verdict the controller last acted on.
    pub verdict: StabilityVerdict,
    /// Most recent stored frequency, if any sample arrived.
    pub frequency_hz: Option<f32>,
    /// Rate of change computed for that sample.
    pub roc_hz_per_s: Option<f32>,
    pub min_frequency_hz: f32,
    pub roc_threshold_hz_per_s: f32,
}

/// Snapshot of the controller surfaced by the `status` command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub state: ControllerState,
    pub load_count: u8,
    pub present: u32,
    pub active: u32,
    pub shed: u32,
    pub stability: StabilitySnapshot,
    /// Time left before the settle period elapses.
    pub timer_remaining: Option<Duration>,
}

/// Helper that renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    /// Creates a new formatter for the provided snapshot.
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes the mode line (e.g. `mode normal.settled`).
    pub fn write_mode_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(writer, "mode {}", self.snapshot.state)
    }

    /// Writes the loads line (e.g. `loads present=0b11111 active=0b11100 shed=0b00011`).
    pub fn write_loads_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let width = self.snapshot.load_count;
        write!(
            writer,
            "loads present={} active={} shed={}",
            MaskBits {
                bits: self.snapshot.present,
                width,
            },
            MaskBits {
                bits: self.snapshot.active,
                width,
            },
            MaskBits {
                bits: self.snapshot.shed,
                width,
            },
        )
    }

    /// Writes the stability line (e.g. `stability stable freq=50.000Hz roc=0.000Hz/s min=49.0Hz max-roc=10.0Hz/s`).
    pub fn write_stability_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let stability = &self.snapshot.stability;
        write!(writer, "stability {} freq=", stability.verdict)?;
        match stability.frequency_hz {
            Some(hz) => write!(writer, "{hz:.3}Hz")?,
            None => writer.write_str("n/a")?,
        }

        writer.write_str(" roc=")?;
        match stability.roc_hz_per_s {
            Some(roc) => write!(writer, "{roc:.3}Hz/s")?,
            None => writer.write_str("n/a")?,
        }

        write!(
            writer,
            " min={:.1}Hz max-roc={:.1}Hz/s",
            stability.min_frequency_hz, stability.roc_threshold_hz_per_s
        )
    }

    /// Writes the timer line (e.g. `timer remaining=+250ms`).
    pub fn write_timer_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("timer remaining=")?;
        write_duration(writer, self.snapshot.timer_remaining)
    }

    /// Writes all status lines separated by `\n`.
    pub fn write_all<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        self.write_mode_line(writer)?;
        writer.write_char('\n')?;
        self.write_loads_line(writer)?;
        writer.write_char('\n')?;
        self.write_stability_line(writer)?;
        writer.write_char('\n')?;
        self.write_timer_line(writer)
    }

    /// Renders every status line into an owned string.
    #[cfg(feature = "alloc")]
    #[must_use]
    pub fn render(&self) -> alloc::string::String {
        let mut text = alloc::string::String::new();
        // Writing into a String cannot fail.
        let _ = self.write_all(&mut text);
        text
    }
}

fn write_duration<W: fmt::Write>(writer: &mut W, duration: Option<Duration>) -> fmt::Result {
    match duration {
        None => writer.write_str("n/a"),
        Some(value) if value >= Duration::from_secs(1) => {
            let millis = value.as_millis();
            let seconds = millis / 1_000;
            let tenths = (millis % 1_000) / 100;
            write!(writer, "+{seconds}.{tenths}s")
        }
        Some(value) => write!(writer, "+{}ms", value.as_millis()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::String;

    fn snapshot() -> StatusSnapshot {
        StatusSnapshot {
            state: ControllerState::Shedding { timer_armed: true },
            load_count: 5,
            present: 0b1_1111,
            active: 0b1_1100,
            shed: 0b0_0011,
            stability: StabilitySnapshot {
                verdict: StabilityVerdict::Unstable,
                frequency_hz: Some(48.5),
                roc_hz_per_s: Some(0.25),
                min_frequency_hz: 49.0,
                roc_threshold_hz_per_s: 10.0,
            },
            timer_remaining: Some(Duration::from_millis(250)),
        }
    }

    #[test]
    fn renders_mode_and_loads() {
        let snapshot = snapshot();
        let formatter = StatusFormatter::new(&snapshot);
        let mut text: String<96> = String::new();
        formatter.write_mode_line(&mut text).unwrap();
        assert_eq!(text.as_str(), "mode normal.shedding (timer armed)");

        text.clear();
        formatter.write_loads_line(&mut text).unwrap();
        assert_eq!(
            text.as_str(),
            "loads present=0b11111 active=0b11100 shed=0b00011"
        );
    }

    #[test]
    fn renders_stability_and_timer() {
        let snapshot = snapshot();
        let formatter = StatusFormatter::new(&snapshot);
        let mut text: String<128> = String::new();
        formatter.write_stability_line(&mut text).unwrap();
        assert_eq!(
            text.as_str(),
            "stability unstable freq=48.500Hz roc=0.250Hz/s min=49.0Hz max-roc=10.0Hz/s"
        );

        text.clear();
        formatter.write_timer_line(&mut text).unwrap();
        assert_eq!(text.as_str(), "timer remaining=+250ms");
    }

    #[test]
    fn renders_missing_measurements() {
        let mut snapshot = snapshot();
        snapshot.stability.frequency_hz = None;
        snapshot.stability.roc_hz_per_s = None;
        snapshot.timer_remaining = Some(Duration::from_millis(1_500));

        let formatter = StatusFormatter::new(&snapshot);
        let mut text: String<128> = String::new();
        formatter.write_stability_line(&mut text).unwrap();
        assert!(text.starts_with("stability unstable freq=n/a roc=n/a"));

        text.clear();
        formatter.write_timer_line(&mut text).unwrap();
        assert_eq!(text.as_str(), "timer remaining=+1.5s");
    }
}
