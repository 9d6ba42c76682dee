use embassy_time::{Duration, Ticker};
use loadshed_core::controller::{SWITCH_POLL_INTERVAL, SwitchReader};
use loadshed_core::gateway::EventGateway;

use crate::hw::SwitchBank;
use crate::inputs::SwitchFilter;
use crate::lanes::{FirmwareInstant, LaneProducer};
use crate::{status, telemetry};

/// Polls the load switches and forwards readings the controller has not
/// taken in yet.
#[embassy_executor::task]
pub async fn run(mut switches: SwitchBank<'static>, producer: LaneProducer<'static>) -> ! {
    let mut gateway = EventGateway::new(producer);
    let period = u64::try_from(SWITCH_POLL_INTERVAL.as_millis()).unwrap_or(100);
    let mut ticker = Ticker::every(Duration::from_millis(period));
    let mut filter = SwitchFilter::new();

    loop {
        let raw = switches.read_switch_inputs();
        if let Some(raw) = filter.poll(raw, &status::snapshot()) {
            match gateway.on_switch_inputs(raw, FirmwareInstant::now()) {
                Ok(_) => filter.accepted(raw),
                Err(error) => telemetry::log_dropped("switches", &error),
            }
        }

        ticker.next().await;
    }
}
