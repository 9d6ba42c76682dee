use embassy_time::{Duration, Ticker};

use crate::status;
use crate::telemetry;

const HEARTBEAT_PERIOD: Duration = Duration::from_secs(5);

#[embassy_executor::task]
pub async fn run() -> ! {
    let mut ticker = Ticker::every(HEARTBEAT_PERIOD);
    loop {
        ticker.next().await;
        telemetry::log_heartbeat(&status::snapshot());
    }
}
