//! Trigger boundary between asynchronous producers and the controller.
//!
//! Producers (frequency edge capture, buttons, the switch poller, operator
//! tooling) call the non-blocking `on_*` methods of [`EventGateway`]. Each
//! event is routed to one of two bounded [`Lane`]s, and the single consumer
//! behind them drains events in arrival order. Queue implementations stay
//! platform specific: the firmware wraps embassy channels, the emulator and
//! tests use plain deques.

use core::fmt;

use crate::stability::{FrequencySample, ThresholdUpdate};

/// Depth of the sample lane. Sixteen cycles at 50 Hz span 320 ms, longer
/// than any expected stall of the consumer.
pub const SAMPLE_QUEUE_DEPTH: usize = 16;

/// Depth of the control lane (buttons, switches, threshold updates).
pub const CONTROL_QUEUE_DEPTH: usize = 8;

/// Asynchronous input captured at the boundary.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TriggerEvent<TInstant> {
    FrequencySample {
        sample: FrequencySample,
        at: TInstant,
    },
    MaintenanceButton {
        at: TInstant,
    },
    VolatilityButton {
        make_volatile: bool,
        at: TInstant,
    },
    SwitchInputs {
        raw: u32,
        at: TInstant,
    },
    ThresholdUpdate {
        update: ThresholdUpdate,
        at: TInstant,
    },
}

impl<TInstant: Copy> TriggerEvent<TInstant> {
    /// Timestamp captured by the producer.
    pub fn at(&self) -> TInstant {
        match *self {
            TriggerEvent::FrequencySample { at, .. }
            | TriggerEvent::MaintenanceButton { at }
            | TriggerEvent::VolatilityButton { at, .. }
            | TriggerEvent::SwitchInputs { at, .. }
            | TriggerEvent::ThresholdUpdate { at, .. } => at,
        }
    }

    /// Lane the event travels on.
    pub const fn lane(&self) -> Lane {
        match self {
            TriggerEvent::FrequencySample { .. } => Lane::Samples,
            _ => Lane::Control,
        }
    }
}

/// Bounded queue carrying a class of trigger events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Lane {
    Samples,
    Control,
}

impl Lane {
    /// Configured depth of the lane.
    #[must_use]
    pub const fn depth(self) -> usize {
        match self {
            Lane::Samples => SAMPLE_QUEUE_DEPTH,
            Lane::Control => CONTROL_QUEUE_DEPTH,
        }
    }

    /// What happens when the lane is full.
    #[must_use]
    pub const fn overflow_policy(self) -> OverflowPolicy {
        match self {
            Lane::Samples => OverflowPolicy::DropOldest,
            Lane::Control => OverflowPolicy::RejectNewest,
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lane::Samples => f.write_str("samples"),
            Lane::Control => f.write_str("control"),
        }
    }
}

/// Overflow handling for a full lane.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OverflowPolicy {
    /// Evict the oldest queued event to make room; only the newest matters.
    DropOldest,
    /// Refuse the new event and report it to the producer.
    RejectNewest,
}

/// Error surfaced when an event cannot be enqueued.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EnqueueError<E = ()> {
    /// Queue has reached its maximum capacity.
    QueueFull,
    /// Queue has been disconnected from its consumer.
    Disconnected,
    /// Transport-specific failure.
    Other(E),
}

impl<E> EnqueueError<E> {
    /// Maps the inner error type.
    pub fn map_other<F, M>(self, mapper: M) -> EnqueueError<F>
    where
        M: FnOnce(E) -> F,
    {
        match self {
            EnqueueError::QueueFull => EnqueueError::QueueFull,
            EnqueueError::Disconnected => EnqueueError::Disconnected,
            EnqueueError::Other(err) => EnqueueError::Other(mapper(err)),
        }
    }
}

impl<E: fmt::Debug> fmt::Display for EnqueueError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnqueueError::QueueFull => f.write_str("queue full"),
            EnqueueError::Disconnected => f.write_str("queue disconnected"),
            EnqueueError::Other(err) => write!(f, "queue error: {err:?}"),
        }
    }
}

/// Error surfaced when dequeueing fails.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DequeueError<E = ()> {
    /// Queue has been disconnected from its producers.
    Disconnected,
    /// Transport-specific failure.
    Other(E),
}

impl<E> DequeueError<E> {
    /// Maps the inner error type.
    pub fn map_other<F, M>(self, mapper: M) -> DequeueError<F>
    where
        M: FnOnce(E) -> F,
    {
        match self {
            DequeueError::Disconnected => DequeueError::Disconnected,
            DequeueError::Other(err) => DequeueError::Other(mapper(err)),
        }
    }
}

/// Trait implemented by producers that push events towards the controller.
pub trait TriggerQueueProducer {
    /// Monotonic timestamp type attached to events.
    type Instant: Copy;
    /// Transport-specific error type.
    type Error;

    /// Attempts to enqueue an event on its lane without blocking.
    fn try_enqueue(
        &mut self,
        event: TriggerEvent<Self::Instant>,
    ) -> Result<(), EnqueueError<Self::Error>>;

    /// Removes the oldest queued event from `lane`. Returns `true` when an
    /// event was evicted. Producers that cannot evict return `false`.
    fn evict_oldest(&mut self, lane: Lane) -> bool {
        let _ = lane;
        false
    }

    /// Returns the lane capacity if it is known.
    fn capacity(&self, lane: Lane) -> Option<usize> {
        let _ = lane;
        None
    }

    /// Returns the current lane depth if it can be observed.
    fn len(&self, lane: Lane) -> Option<usize> {
        let _ = lane;
        None
    }

    /// Returns `true` when the lane reports that it currently holds no items.
    fn is_empty(&self, lane: Lane) -> Option<bool> {
        self.len(lane).map(|current| current == 0)
    }

    /// Remaining slots when both capacity and length are observable.
    fn remaining(&self, lane: Lane) -> Option<usize> {
        match (self.capacity(lane), self.len(lane)) {
            (Some(capacity), Some(len)) => Some(capacity.saturating_sub(len)),
            _ => None,
        }
    }
}

/// Trait implemented by the consumer that drains both lanes.
pub trait TriggerQueueConsumer {
    /// Monotonic timestamp type attached to events.
    type Instant: Copy;
    /// Transport-specific error type.
    type Error;

    /// Attempts to dequeue the next event without blocking.
    ///
    /// Control events are returned before samples so button edges are never
    /// stuck behind a burst of readings.
    fn try_dequeue(
        &mut self,
    ) -> Result<Option<TriggerEvent<Self::Instant>>, DequeueError<Self::Error>>;
}

/// How an event entered its lane.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Admission {
    Queued,
    /// The lane was full and its oldest event was dropped.
    QueuedAfterEviction,
}

/// Error returned to producers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GatewayError<E> {
    /// The control lane was full; the event was not queued.
    Rejected(Lane),
    /// The queue refused the event for another reason.
    Queue(EnqueueError<E>),
}

impl<E: fmt::Debug> fmt::Display for GatewayError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Rejected(lane) => write!(f, "{lane} lane full, event rejected"),
            GatewayError::Queue(err) => err.fmt(f),
        }
    }
}

/// Counters kept by a gateway.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct GatewayStats {
    pub queued: u32,
    pub evicted: u32,
    pub rejected: u32,
}

/// Producer-side entry point for trigger events.
pub struct EventGateway<P> {
    producer: P,
    stats: GatewayStats,
}

impl<P> EventGateway<P>
where
    P: TriggerQueueProducer,
{
    /// Wraps a queue producer.
    pub const fn new(producer: P) -> Self {
        Self {
            producer,
            stats: GatewayStats {
                queued: 0,
                evicted: 0,
                rejected: 0,
            },
        }
    }

    /// A new instantaneous-frequency reading is available.
    pub fn on_frequency_sample(
        &mut self,
        sample: FrequencySample,
        at: P::Instant,
    ) -> Result<Admission, GatewayError<P::Error>> {
        self.submit(TriggerEvent::FrequencySample { sample, at })
    }

    /// The maintenance button produced an edge.
    pub fn on_maintenance_button_edge(
        &mut self,
        at: P::Instant,
    ) -> Result<Admission, GatewayError<P::Error>> {
        self.submit(TriggerEvent::MaintenanceButton { at })
    }

    /// The volatility override button produced an edge.
    pub fn on_volatility_button_edge(
        &mut self,
        make_volatile: bool,
        at: P::Instant,
    ) -> Result<Admission, GatewayError<P::Error>> {
        self.submit(TriggerEvent::VolatilityButton { make_volatile, at })
    }

    /// The switch poller sampled the load switches.
    pub fn on_switch_inputs(
        &mut self,
        raw: u32,
        at: P::Instant,
    ) -> Result<Admission, GatewayError<P::Error>> {
        self.submit(TriggerEvent::SwitchInputs { raw, at })
    }

    /// An operator changed a stability threshold.
    pub fn on_threshold_update(
        &mut self,
        update: ThresholdUpdate,
        at: P::Instant,
    ) -> Result<Admission, GatewayError<P::Error>> {
        self.submit(TriggerEvent::ThresholdUpdate { update, at })
    }

    /// Enqueues an event, applying its lane's overflow policy.
    pub fn submit(
        &mut self,
        event: TriggerEvent<P::Instant>,
    ) -> Result<Admission, GatewayError<P::Error>> {
        let lane = event.lane();
        match self.producer.try_enqueue(event) {
            Ok(()) => {
                self.stats.queued = self.stats.queued.wrapping_add(1);
                Ok(Admission::Queued)
            }
            Err(EnqueueError::QueueFull) => match lane.overflow_policy() {
                OverflowPolicy::DropOldest if self.producer.evict_oldest(lane) => {
                    self.stats.evicted = self.stats.evicted.wrapping_add(1);
                    self.producer
                        .try_enqueue(event)
                        .map_err(GatewayError::Queue)?;
                    self.stats.queued = self.stats.queued.wrapping_add(1);
                    Ok(Admission::QueuedAfterEviction)
                }
                _ => {
                    self.stats.rejected = self.stats.rejected.wrapping_add(1);
                    Err(GatewayError::Rejected(lane))
                }
            },
            Err(err) => Err(GatewayError::Queue(err)),
        }
    }

    /// Counters accumulated since creation.
    pub const fn stats(&self) -> GatewayStats {
        self.stats
    }

    /// Accesses the underlying queue producer.
    pub fn producer(&self) -> &P {
        &self.producer
    }

    /// Mutably accesses the underlying queue producer.
    pub fn producer_mut(&mut self) -> &mut P {
        &mut self.producer
    }

    /// Consumes the gateway and returns the producer.
    pub fn into_inner(self) -> P {
        self.producer
    }
}
