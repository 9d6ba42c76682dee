use embassy_stm32::exti::ExtiInput;
use embassy_time::{Duration, Timer};
use loadshed_core::gateway::EventGateway;

use crate::inputs::ButtonRole;
use crate::lanes::{FirmwareInstant, LaneProducer};
use crate::telemetry;

/// Contact bounce window ignored after a press.
const BOUNCE_LOCKOUT: Duration = Duration::from_millis(30);

#[embassy_executor::task(pool_size = 3)]
pub async fn run(
    role: ButtonRole,
    mut input: ExtiInput<'static>,
    producer: LaneProducer<'static>,
) -> ! {
    let mut gateway = EventGateway::new(producer);

    loop {
        input.wait_for_falling_edge().await;
        if let Err(error) = role.submit(&mut gateway, FirmwareInstant::now()) {
            telemetry::log_dropped(role.label(), &error);
        }

        Timer::after(BOUNCE_LOCKOUT).await;
        input.wait_for_high().await;
    }
}
