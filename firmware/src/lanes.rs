//! Trigger lanes bridging firmware tasks with `loadshed-core`.
//!
//! Each lane is a static embassy channel. [`LaneProducer`] and
//! [`LaneConsumer`] expose the pair through the core queue traits so the
//! shared [`EventGateway`](loadshed_core::gateway::EventGateway) and pipeline
//! run unchanged on the MCU.

use core::ops::Add;
use core::time::Duration as CoreDuration;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use embassy_time::{Duration, Instant};
use loadshed_core::gateway::{
    CONTROL_QUEUE_DEPTH, DequeueError, EnqueueError, Lane, SAMPLE_QUEUE_DEPTH, TriggerEvent,
    TriggerQueueConsumer, TriggerQueueProducer,
};
use loadshed_core::telemetry::TelemetryInstant;

#[cfg(target_os = "none")]
pub type LaneMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
pub type LaneMutex = NoopRawMutex;

/// Monotonic instant used throughout the firmware.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    /// Reads the embassy time driver.
    pub fn now() -> Self {
        Self(Instant::now())
    }

    /// Builds an instant from milliseconds since boot.
    pub const fn from_millis(millis: u64) -> Self {
        Self(Instant::from_millis(millis))
    }

    /// Returns the wrapped embassy instant.
    pub const fn into_embassy(self) -> Instant {
        self.0
    }

    /// Microseconds since boot.
    pub fn as_micros(self) -> u64 {
        self.0.as_micros()
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl Add<CoreDuration> for FirmwareInstant {
    type Output = Self;

    fn add(self, rhs: CoreDuration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(
            self.0
                .checked_add(Duration::from_micros(micros))
                .unwrap_or(Instant::MAX),
        )
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> CoreDuration {
        CoreDuration::from_micros(self.0.saturating_duration_since(earlier.0).as_micros())
    }
}

/// Trigger event stamped with the firmware clock.
pub type FirmwareEvent = TriggerEvent<FirmwareInstant>;

/// Channel carrying frequency samples.
pub type SampleChannel = Channel<LaneMutex, FirmwareEvent, SAMPLE_QUEUE_DEPTH>;

/// Channel carrying buttons, switch readings and threshold updates.
pub type ControlChannel = Channel<LaneMutex, FirmwareEvent, CONTROL_QUEUE_DEPTH>;

/// Both lanes feeding the controller task.
pub struct TriggerLanes {
    samples: SampleChannel,
    control: ControlChannel,
}

impl TriggerLanes {
    /// Creates empty lanes; usable in a `static`.
    pub const fn new() -> Self {
        Self {
            samples: Channel::new(),
            control: Channel::new(),
        }
    }

    /// Producer handle for an interrupt-side task.
    pub const fn producer(&self) -> LaneProducer<'_> {
        LaneProducer { lanes: self }
    }

    /// Consumer handle for the controller task.
    pub const fn consumer(&self) -> LaneConsumer<'_> {
        LaneConsumer { lanes: self }
    }
}

impl Default for TriggerLanes {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapter that exposes the lane channels as a `loadshed-core` producer.
#[derive(Clone, Copy)]
pub struct LaneProducer<'a> {
    lanes: &'a TriggerLanes,
}

impl TriggerQueueProducer for LaneProducer<'_> {
    type Instant = FirmwareInstant;
    type Error = TrySendError<FirmwareEvent>;

    fn try_enqueue(&mut self, event: FirmwareEvent) -> Result<(), EnqueueError<Self::Error>> {
        let sent = match event.lane() {
            Lane::Samples => self.lanes.samples.try_send(event),
            Lane::Control => self.lanes.control.try_send(event),
        };

        match sent {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(EnqueueError::QueueFull),
        }
    }

    fn evict_oldest(&mut self, lane: Lane) -> bool {
        match lane {
            Lane::Samples => self.lanes.samples.try_receive().is_ok(),
            Lane::Control => self.lanes.control.try_receive().is_ok(),
        }
    }

    fn capacity(&self, lane: Lane) -> Option<usize> {
        Some(lane.depth())
    }

    fn len(&self, lane: Lane) -> Option<usize> {
        Some(match lane {
            Lane::Samples => self.lanes.samples.len(),
            Lane::Control => self.lanes.control.len(),
        })
    }
}

/// Adapter that drains both lanes, control first.
pub struct LaneConsumer<'a> {
    lanes: &'a TriggerLanes,
}

impl LaneConsumer<'_> {
    /// Waits for the next control event.
    pub async fn next_control(&self) -> FirmwareEvent {
        self.lanes.control.receive().await
    }

    /// Waits for the next frequency sample.
    pub async fn next_sample(&self) -> FirmwareEvent {
        self.lanes.samples.receive().await
    }
}

impl TriggerQueueConsumer for LaneConsumer<'_> {
    type Instant = FirmwareInstant;
    type Error = ();

    fn try_dequeue(&mut self) -> Result<Option<FirmwareEvent>, DequeueError> {
        if let Ok(event) = self.lanes.control.try_receive() {
            return Ok(Some(event));
        }

        Ok(self.lanes.samples.try_receive().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadshed_core::gateway::{Admission, EventGateway, GatewayError};
    use loadshed_core::stability::FrequencySample;

    fn at(millis: u64) -> FirmwareInstant {
        FirmwareInstant::from_millis(millis)
    }

    #[test]
    fn sample_lane_evicts_oldest_reading() {
        let lanes = TriggerLanes::new();
        let mut gateway = EventGateway::new(lanes.producer());

        for millis in 0..SAMPLE_QUEUE_DEPTH as u64 {
            gateway
                .on_frequency_sample(FrequencySample::new(50.0), at(millis))
                .unwrap();
        }
        assert_eq!(
            gateway.on_frequency_sample(FrequencySample::new(48.0), at(99)),
            Ok(Admission::QueuedAfterEviction)
        );

        let mut consumer = lanes.consumer();
        let first = consumer.try_dequeue().unwrap().unwrap();
        assert_eq!(first.at(), at(1));
        assert_eq!(gateway.producer().len(Lane::Samples), Some(SAMPLE_QUEUE_DEPTH - 1));
    }

    #[test]
    fn control_lane_rejects_when_full() {
        let lanes = TriggerLanes::new();
        let mut gateway = EventGateway::new(lanes.producer());

        for millis in 0..CONTROL_QUEUE_DEPTH as u64 {
            gateway.on_maintenance_button_edge(at(millis)).unwrap();
        }
        assert_eq!(
            gateway.on_switch_inputs(0b1_1111, at(50)),
            Err(GatewayError::Rejected(Lane::Control))
        );
        assert_eq!(gateway.producer().remaining(Lane::Control), Some(0));
    }

    #[test]
    fn consumer_prefers_control_events() {
        let lanes = TriggerLanes::new();
        let mut gateway = EventGateway::new(lanes.producer());
        gateway
            .on_frequency_sample(FrequencySample::new(50.0), at(1))
            .unwrap();
        gateway.on_volatility_button_edge(true, at(2)).unwrap();

        let mut consumer = lanes.consumer();
        assert!(matches!(
            consumer.try_dequeue(),
            Ok(Some(TriggerEvent::VolatilityButton { .. }))
        ));
        assert!(matches!(
            consumer.try_dequeue(),
            Ok(Some(TriggerEvent::FrequencySample { .. }))
        ));
        assert_eq!(consumer.try_dequeue(), Ok(None));
    }

    #[test]
    fn instant_addition_saturates() {
        let late = FirmwareInstant::from(Instant::MAX);
        assert_eq!(late + CoreDuration::from_millis(5), late);
        assert_eq!(
            (at(10) + CoreDuration::from_millis(490)).saturating_duration_since(at(0)),
            CoreDuration::from_millis(500)
        );
    }
}
