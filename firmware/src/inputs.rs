//! Capture-side helpers shared by the interrupt tasks.
//!
//! The tasks under `runtime` only wait for edges and read the clock; turning
//! an edge into a gateway submission happens here so it runs on the host too.

use loadshed_core::console::status::StatusSnapshot;
use loadshed_core::controller::ControllerState;
use loadshed_core::gateway::{Admission, EventGateway, GatewayError, TriggerQueueProducer};
use loadshed_core::loads::LoadMask;
use loadshed_core::stability::FrequencySample;

use crate::lanes::FirmwareInstant;

const MICROS_PER_SECOND: f32 = 1_000_000.0;

/// Converts the time between two rising edges of the mains signal into a
/// frequency sample. A zero period means two edges in the same tick and is
/// discarded.
pub fn sample_from_period(period_us: u64) -> Option<FrequencySample> {
    if period_us == 0 {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let hz = MICROS_PER_SECOND / period_us as f32;
    Some(FrequencySample::new(hz))
}

/// Tracks the previous rising edge of the frequency input.
#[derive(Clone, Copy, Debug, Default)]
pub struct EdgePeriod {
    last: Option<FirmwareInstant>,
}

impl EdgePeriod {
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Records an edge and returns the sample it completes, if any.
    pub fn on_edge(&mut self, at: FirmwareInstant) -> Option<FrequencySample> {
        let previous = self.last.replace(at)?;
        let period = at.into_embassy().saturating_duration_since(previous.into_embassy());
        sample_from_period(period.as_micros())
    }
}

/// What a physical push button does when pressed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ButtonRole {
    /// Toggles maintenance mode.
    Maintenance,
    /// Forces an unstable verdict.
    Volatile,
    /// Forces a stable verdict.
    Stable,
}

impl ButtonRole {
    /// Name used in log lines.
    pub const fn label(self) -> &'static str {
        match self {
            ButtonRole::Maintenance => "button-maintenance",
            ButtonRole::Volatile => "button-volatile",
            ButtonRole::Stable => "button-stable",
        }
    }

    /// Hands a press to the gateway.
    pub fn submit<P>(
        self,
        gateway: &mut EventGateway<P>,
        at: FirmwareInstant,
    ) -> Result<Admission, GatewayError<P::Error>>
    where
        P: TriggerQueueProducer<Instant = FirmwareInstant>,
    {
        match self {
            ButtonRole::Maintenance => gateway.on_maintenance_button_edge(at),
            ButtonRole::Volatile => gateway.on_volatility_button_edge(true, at),
            ButtonRole::Stable => gateway.on_volatility_button_edge(false, at),
        }
    }
}

/// Packs switch levels into a raw input word, bit `i` for switch `i`.
pub fn pack_switches<I>(levels: I) -> u32
where
    I: IntoIterator<Item = bool>,
{
    levels
        .into_iter()
        .take(32)
        .enumerate()
        .fold(0, |raw, (index, on)| if on { raw | (1 << index) } else { raw })
}

/// Decides which switch readings the poller hands to the gateway.
///
/// A new reading is always forwarded. An unchanged one is forwarded again
/// outside an episode when the published `present` set disagrees with it,
/// which happens when a switch was turned on while shedding and the
/// controller only narrowed the set.
#[derive(Clone, Copy, Debug, Default)]
pub struct SwitchFilter {
    accepted: Option<u32>,
}

impl SwitchFilter {
    pub const fn new() -> Self {
        Self { accepted: None }
    }

    /// Returns the reading to forward, if any.
    pub fn poll(&self, raw: u32, published: &StatusSnapshot) -> Option<u32> {
        if self.accepted != Some(raw) {
            return Some(raw);
        }

        let universe = LoadMask::new(published.load_count).universe();
        let stale = raw & universe != published.present;
        (stale && published.state == ControllerState::Settled).then_some(raw)
    }

    /// Records a reading the gateway admitted.
    pub fn accepted(&mut self, raw: u32) {
        self.accepted = Some(raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lanes::TriggerLanes;
    use loadshed_core::gateway::{TriggerEvent, TriggerQueueConsumer};

    fn at(millis: u64) -> FirmwareInstant {
        FirmwareInstant::from_millis(millis)
    }

    #[test]
    fn mains_period_becomes_frequency() {
        let sample = sample_from_period(20_000).unwrap();
        assert!((sample.hz() - 50.0).abs() < 1e-4);
        assert_eq!(sample_from_period(0), None);
        assert_eq!(sample_from_period(1).unwrap().hz(), 16_000.0);
    }

    #[test]
    fn first_edge_only_primes_the_period() {
        let mut edges = EdgePeriod::new();
        assert_eq!(edges.on_edge(at(0)), None);

        let sample = edges.on_edge(at(20)).unwrap();
        assert!((sample.hz() - 50.0).abs() < 1e-4);

        let sample = edges.on_edge(at(41)).unwrap();
        assert!(sample.hz() < 49.0);
    }

    #[test]
    fn buttons_map_to_gateway_events() {
        let lanes = TriggerLanes::new();
        let mut gateway = EventGateway::new(lanes.producer());

        ButtonRole::Volatile.submit(&mut gateway, at(1)).unwrap();
        ButtonRole::Stable.submit(&mut gateway, at(2)).unwrap();
        ButtonRole::Maintenance.submit(&mut gateway, at(3)).unwrap();

        let mut consumer = lanes.consumer();
        assert!(matches!(
            consumer.try_dequeue(),
            Ok(Some(TriggerEvent::VolatilityButton {
                make_volatile: true,
                ..
            }))
        ));
        assert!(matches!(
            consumer.try_dequeue(),
            Ok(Some(TriggerEvent::VolatilityButton {
                make_volatile: false,
                ..
            }))
        ));
        assert!(matches!(
            consumer.try_dequeue(),
            Ok(Some(TriggerEvent::MaintenanceButton { .. }))
        ));
    }

    fn published(state: ControllerState, present: u32) -> StatusSnapshot {
        let mut snapshot = crate::status::StatusCell::default().load();
        snapshot.state = state;
        snapshot.load_count = 5;
        snapshot.present = present;
        snapshot
    }

    #[test]
    fn switch_turned_on_while_shedding_is_resent_after_the_episode() {
        let shedding = ControllerState::Shedding { timer_armed: true };
        let settled = ControllerState::Settled;
        let mut filter = SwitchFilter::new();

        assert_eq!(filter.poll(0b0_0011, &published(settled, 0)), Some(0b0_0011));
        filter.accepted(0b0_0011);
        assert_eq!(filter.poll(0b0_0011, &published(shedding, 0b0_0011)), None);

        assert_eq!(filter.poll(0b0_0111, &published(shedding, 0b0_0011)), Some(0b0_0111));
        filter.accepted(0b0_0111);
        assert_eq!(filter.poll(0b0_0111, &published(shedding, 0b0_0011)), None);

        assert_eq!(filter.poll(0b0_0111, &published(settled, 0b0_0011)), Some(0b0_0111));
        filter.accepted(0b0_0111);
        assert_eq!(filter.poll(0b0_0111, &published(settled, 0b0_0111)), None);
    }

    #[test]
    fn switch_filter_ignores_bits_outside_the_universe() {
        let mut filter = SwitchFilter::new();
        filter.accepted(0b10_0111);
        let settled = published(ControllerState::Settled, 0b0_0111);
        assert_eq!(filter.poll(0b10_0111, &settled), None);
    }

    #[test]
    fn rejected_switch_reading_is_retried() {
        let filter = SwitchFilter::new();
        let settled = published(ControllerState::Settled, 0);
        assert_eq!(filter.poll(0b1, &settled), Some(0b1));
        assert_eq!(filter.poll(0b1, &settled), Some(0b1));
    }

    #[test]
    fn switch_levels_pack_lowest_first() {
        assert_eq!(pack_switches([true, false, true, false, false]), 0b0_0101);
        assert_eq!(pack_switches([false; 5]), 0);
    }
}
