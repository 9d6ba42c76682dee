use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use static_cell::StaticCell;

use crate::hw::{LedBanks, SwitchBank};
use crate::inputs::ButtonRole;
use crate::lanes::TriggerLanes;
use crate::telemetry::FirmwareTelemetry;
use crate::worker::ControllerWorker;

mod button_task;
mod controller_task;
mod heartbeat_task;
mod sampler_task;
mod switch_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

static LANES: TriggerLanes = TriggerLanes::new();
static TELEMETRY: StaticCell<FirmwareTelemetry> = StaticCell::new();

fn led(pin: hal::Peri<'static, impl hal::gpio::Pin>) -> Output<'static> {
    Output::new(pin, Level::Low, Speed::Low)
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA6,
        PA7,
        PA2,
        PA3,
        PA4,
        PA5,
        PB3,
        PA8,
        PA9,
        PA10,
        PA11,
        PA12,
        PB0,
        PB1,
        PB4,
        PB5,
        PB6,
        EXTI0,
        EXTI1,
        EXTI6,
        EXTI7,
        ..
    } = hal::init(config);

    let leds = LedBanks::new(
        [led(PA8), led(PA9), led(PA10), led(PA11), led(PA12)],
        [led(PB0), led(PB1), led(PB4), led(PB5), led(PB6)],
    );
    let switches = SwitchBank::new([
        Input::new(PA2, Pull::Down),
        Input::new(PA3, Pull::Down),
        Input::new(PA4, Pull::Down),
        Input::new(PA5, Pull::Down),
        Input::new(PB3, Pull::Down),
    ]);

    let telemetry = TELEMETRY.init(FirmwareTelemetry::new());
    let worker = ControllerWorker::new(leds, telemetry);

    spawner
        .spawn(controller_task::run(worker, LANES.consumer()))
        .expect("failed to spawn controller task");

    spawner
        .spawn(sampler_task::run(
            ExtiInput::new(PA0, EXTI0, Pull::None),
            LANES.producer(),
        ))
        .expect("failed to spawn frequency sampler task");

    for (role, input) in [
        (ButtonRole::Maintenance, ExtiInput::new(PA1, EXTI1, Pull::Up)),
        (ButtonRole::Volatile, ExtiInput::new(PA6, EXTI6, Pull::Up)),
        (ButtonRole::Stable, ExtiInput::new(PA7, EXTI7, Pull::Up)),
    ] {
        spawner
            .spawn(button_task::run(role, input, LANES.producer()))
            .expect("failed to spawn button task");
    }

    spawner
        .spawn(switch_task::run(switches, LANES.producer()))
        .expect("failed to spawn switch poller task");

    spawner
        .spawn(heartbeat_task::run())
        .expect("failed to spawn heartbeat task");

    core::future::pending::<()>().await;
}
