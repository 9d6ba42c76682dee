use embassy_stm32::exti::ExtiInput;
use loadshed_core::gateway::EventGateway;

use crate::inputs::EdgePeriod;
use crate::lanes::{FirmwareInstant, LaneProducer};
use crate::telemetry;

/// Times rising edges of the conditioned mains signal.
#[embassy_executor::task]
pub async fn run(mut input: ExtiInput<'static>, producer: LaneProducer<'static>) -> ! {
    let mut gateway = EventGateway::new(producer);
    let mut edges = EdgePeriod::new();

    loop {
        input.wait_for_rising_edge().await;
        let at = FirmwareInstant::now();
        let Some(sample) = edges.on_edge(at) else {
            continue;
        };

        if let Err(error) = gateway.on_frequency_sample(sample, at) {
            telemetry::log_dropped("sampler", &error);
        }
    }
}
