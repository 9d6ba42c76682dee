use embassy_futures::select::{Either3, select3};
use embassy_time::Timer;

use crate::hw::LedBanks;
use crate::lanes::{FirmwareInstant, LaneConsumer};
use crate::worker::ControllerWorker;

/// Sleeps until `deadline`, or forever when no timer is armed.
async fn wait_until(deadline: Option<FirmwareInstant>) {
    match deadline {
        Some(deadline) => Timer::at(deadline.into_embassy()).await,
        None => core::future::pending::<()>().await,
    }
}

#[embassy_executor::task]
pub async fn run(
    mut worker: ControllerWorker<'static, LedBanks<'static>>,
    consumer: LaneConsumer<'static>,
) -> ! {
    defmt::info!("loadshed: controller ready");
    loop {
        let deadline = worker.next_deadline();
        match select3(
            consumer.next_control(),
            consumer.next_sample(),
            wait_until(deadline),
        )
        .await
        {
            Either3::First(event) | Either3::Second(event) => {
                worker.on_event(event);
            }
            Either3::Third(()) => {
                worker.on_deadline(FirmwareInstant::now());
            }
        }
    }
}
