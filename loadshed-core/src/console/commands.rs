//! High-level console command dispatcher.
//!
//! Parsed commands that simulate an input are turned into trigger events and
//! pushed through an [`EventGateway`], exactly like the hardware producers do.
//! Commands that concern the host session (`advance`, `status`, `help`) are
//! returned to the caller, which owns the clock and the pipeline.

use core::fmt;
use core::time::Duration;

use crate::gateway::{Admission, EventGateway, GatewayError, TriggerEvent, TriggerQueueProducer};
use crate::stability::FrequencySample;

use super::catalog::{self, CommandSpec};
use super::grammar::{self, ButtonCommand, Command};

/// Command execution successes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CommandOutcome<Instant> {
    /// An input event entered its lane.
    Queued {
        event: TriggerEvent<Instant>,
        admission: Admission,
    },
    /// The caller should move its clock forward.
    Advance(Duration),
    /// The caller should print a status snapshot.
    Status,
    /// Help was requested, optionally for one command.
    Help(Option<&'static CommandSpec>),
}

/// Errors surfaced while executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandError<'a, E> {
    Parse(grammar::ParseError<'a>),
    Rejected(&'static str),
    Gateway(GatewayError<E>),
    UnknownTopic(&'a str),
}

impl<'a, E> From<grammar::ParseError<'a>> for CommandError<'a, E> {
    fn from(error: grammar::ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl<E> From<GatewayError<E>> for CommandError<'_, E> {
    fn from(error: GatewayError<E>) -> Self {
        Self::Gateway(error)
    }
}

impl<E: fmt::Debug> fmt::Display for CommandError<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(err) => write!(f, "parse error: {err}"),
            CommandError::Rejected(reason) => write!(f, "rejected: {reason}"),
            CommandError::Gateway(err) => write!(f, "not queued: {err}"),
            CommandError::UnknownTopic(topic) => write!(f, "no help for `{topic}`"),
        }
    }
}

type CommandResult<'a, P> = Result<
    CommandOutcome<<P as TriggerQueueProducer>::Instant>,
    CommandError<'a, <P as TriggerQueueProducer>::Error>,
>;

/// Dispatches console commands into the trigger lanes.
pub struct CommandExecutor<P> {
    gateway: EventGateway<P>,
}

impl<P> CommandExecutor<P>
where
    P: TriggerQueueProducer,
{
    /// Creates a new executor around the provided queue producer.
    pub const fn new(producer: P) -> Self {
        Self {
            gateway: EventGateway::new(producer),
        }
    }

    /// Returns the gateway the executor submits through.
    pub fn gateway(&self) -> &EventGateway<P> {
        &self.gateway
    }

    /// Returns a mutable reference to the gateway.
    pub fn gateway_mut(&mut self) -> &mut EventGateway<P> {
        &mut self.gateway
    }

    /// Consumes the executor and yields the inner producer.
    pub fn into_inner(self) -> P {
        self.gateway.into_inner()
    }

    /// Parses and executes a console command.
    pub fn execute<'a>(&mut self, line: &'a str, now: P::Instant) -> CommandResult<'a, P> {
        let command = grammar::parse(line)?;
        self.dispatch(command, now)
    }

    fn dispatch<'a>(&mut self, command: Command<'a>, now: P::Instant) -> CommandResult<'a, P> {
        let event = match command {
            Command::Sample(hz) => {
                if !hz.is_finite() {
                    return Err(CommandError::Rejected("frequency must be finite"));
                }
                TriggerEvent::FrequencySample {
                    sample: FrequencySample::new(hz),
                    at: now,
                }
            }
            Command::Count(count) => {
                let Some(sample) = FrequencySample::from_sample_count(count) else {
                    return Err(CommandError::Rejected("sample count must be non-zero"));
                };
                TriggerEvent::FrequencySample { sample, at: now }
            }
            Command::Switches(raw) => TriggerEvent::SwitchInputs { raw, at: now },
            Command::Button(ButtonCommand::Maintenance) => {
                TriggerEvent::MaintenanceButton { at: now }
            }
            Command::Button(ButtonCommand::Volatile) => TriggerEvent::VolatilityButton {
                make_volatile: true,
                at: now,
            },
            Command::Button(ButtonCommand::Stable) => TriggerEvent::VolatilityButton {
                make_volatile: false,
                at: now,
            },
            Command::Threshold(update) => TriggerEvent::ThresholdUpdate { update, at: now },
            Command::Advance(duration) => return Ok(CommandOutcome::Advance(duration)),
            Command::Status => return Ok(CommandOutcome::Status),
            Command::Help(help) => {
                return match help.topic {
                    None => Ok(CommandOutcome::Help(None)),
                    Some(topic) => catalog::find(topic)
                        .map(|spec| CommandOutcome::Help(Some(spec)))
                        .ok_or(CommandError::UnknownTopic(topic)),
                };
            }
        };

        let admission = self.gateway.submit(event)?;
        Ok(CommandOutcome::Queued { event, admission })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{EnqueueError, Lane};
    use crate::stability::ThresholdUpdate;
    use heapless::Vec;

    #[derive(Default)]
    struct RecordingProducer {
        events: Vec<TriggerEvent<u32>, 4>,
    }

    impl TriggerQueueProducer for RecordingProducer {
        type Instant = u32;
        type Error = ();

        fn try_enqueue(&mut self, event: TriggerEvent<u32>) -> Result<(), EnqueueError> {
            self.events.push(event).map_err(|_| EnqueueError::QueueFull)
        }
    }

    fn executor() -> CommandExecutor<RecordingProducer> {
        CommandExecutor::new(RecordingProducer::default())
    }

    #[test]
    fn sample_command_queues_frequency_event() {
        let mut executor = executor();
        let outcome = executor.execute("sample 48.2", 7).unwrap();
        assert!(matches!(
            outcome,
            CommandOutcome::Queued {
                event: TriggerEvent::FrequencySample { at: 7, .. },
                admission: Admission::Queued,
            }
        ));
        assert_eq!(executor.gateway().producer().events.len(), 1);
    }

    #[test]
    fn count_command_converts_to_frequency() {
        let mut executor = executor();
        let outcome = executor.execute("count 320", 0).unwrap();
        match outcome {
            CommandOutcome::Queued {
                event: TriggerEvent::FrequencySample { sample, .. },
                ..
            } => assert!((sample.hz() - 50.0).abs() < f32::EPSILON),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn zero_count_is_rejected() {
        let mut executor = executor();
        assert_eq!(
            executor.execute("count 0", 0),
            Err(CommandError::Rejected("sample count must be non-zero"))
        );
        assert!(executor.gateway().producer().events.is_empty());
    }

    #[test]
    fn buttons_and_thresholds_use_control_lane() {
        let mut executor = executor();
        executor.execute("button volatile", 1).unwrap();
        executor.execute("threshold roc 2.5", 2).unwrap();

        let events = &executor.gateway().producer().events;
        assert_eq!(
            events[0],
            TriggerEvent::VolatilityButton {
                make_volatile: true,
                at: 1
            }
        );
        assert_eq!(
            events[1],
            TriggerEvent::ThresholdUpdate {
                update: ThresholdUpdate::RateOfChange(2.5),
                at: 2
            }
        );
        assert!(events.iter().all(|event| event.lane() == Lane::Control));
    }

    #[test]
    fn full_control_lane_is_reported() {
        let mut executor = executor();
        for at in 0..4 {
            executor.execute("switches 0b111", at).unwrap();
        }
        assert_eq!(
            executor.execute("button maintenance", 5),
            Err(CommandError::Gateway(GatewayError::Rejected(Lane::Control)))
        );
    }

    #[test]
    fn session_commands_are_returned_to_caller() {
        let mut executor = executor();
        assert_eq!(
            executor.execute("advance 500ms", 0),
            Ok(CommandOutcome::Advance(Duration::from_millis(500)))
        );
        assert_eq!(executor.execute("status", 0), Ok(CommandOutcome::Status));
        assert!(matches!(
            executor.execute("help count", 0),
            Ok(CommandOutcome::Help(Some(spec))) if spec.name == "count"
        ));
        assert_eq!(
            executor.execute("help frobnicate", 0),
            Err(CommandError::UnknownTopic("frobnicate"))
        );
        assert!(executor.gateway().producer().events.is_empty());
    }
}
