mod support;

use loadshed_core::controller::{
    ControllerConfig, ControllerEvent, ControllerState, Decision, LoadShedController, StepOutcome,
};
use loadshed_core::loads::LoadId;
use loadshed_core::stability::StabilityVerdict;

use support::MockInstant;

const UNSTABLE: ControllerEvent = ControllerEvent::Verdict(StabilityVerdict::Unstable);
const STABLE: ControllerEvent = ControllerEvent::Verdict(StabilityVerdict::Stable);

fn controller() -> LoadShedController<MockInstant> {
    let mut controller = LoadShedController::new(ControllerConfig::default());
    controller.handle(ControllerEvent::SwitchInputs(0b1_1111), MockInstant::millis(0));
    controller
}

fn load(index: u8) -> LoadId {
    LoadId::new(index).unwrap()
}

#[test]
fn full_shed_and_restore_episode() {
    let mut controller = controller();

    let expected_shed = [0b0_0001, 0b0_0011, 0b0_0111, 0b0_1111, 0b1_1111];
    for (step, expected) in expected_shed.iter().enumerate() {
        let at = MockInstant::millis(step as u64 * 600);
        assert_eq!(
            controller.handle(UNSTABLE, at),
            Decision::Step(StepOutcome::Shed(load(step as u8))),
            "step {step}"
        );
        assert_eq!(controller.mask().shed(), *expected);
    }

    assert_eq!(
        controller.handle(UNSTABLE, MockInstant::millis(3_000)),
        Decision::Step(StepOutcome::Exhausted)
    );
    assert_eq!(controller.mask().shed(), 0b1_1111);
    assert_eq!(
        controller.state(),
        ControllerState::Shedding { timer_armed: false }
    );

    let expected_restore = [(4, 0b0_1111), (3, 0b0_0111), (2, 0b0_0011), (1, 0b0_0001), (0, 0)];
    for (step, (index, expected)) in expected_restore.iter().enumerate() {
        let at = MockInstant::millis(3_600 + step as u64 * 600);
        assert_eq!(
            controller.handle(STABLE, at),
            Decision::Step(StepOutcome::Restored {
                load: load(*index),
                episode_complete: *expected == 0,
            }),
            "step {step}"
        );
        assert_eq!(controller.mask().shed(), *expected);
    }

    assert_eq!(controller.state(), ControllerState::Settled);
    assert_eq!(controller.next_deadline(), None);
}

#[test]
fn timer_expiry_paces_one_shed_per_settle_period() {
    let mut controller = controller();
    controller.handle(UNSTABLE, MockInstant::millis(0));

    for round in 1..=4_u64 {
        let deadline = MockInstant::millis(round * 500);
        assert_eq!(controller.next_deadline(), Some(deadline));
        assert_eq!(
            controller.handle(ControllerEvent::TimerExpired, MockInstant::millis(round * 500 - 1)),
            Decision::Stale
        );
        assert_eq!(controller.mask().shed_count(), round as u32);
        assert!(matches!(
            controller.handle(ControllerEvent::TimerExpired, deadline),
            Decision::Step(StepOutcome::Shed(_))
        ));
    }

    assert_eq!(controller.mask().shed(), 0b1_1111);
    assert_eq!(
        controller.handle(ControllerEvent::TimerExpired, MockInstant::millis(2_500)),
        Decision::Step(StepOutcome::Exhausted)
    );
    assert_eq!(controller.next_deadline(), None);
}

#[test]
fn unstable_verdicts_within_one_window_shed_once() {
    let mut controller = controller();

    controller.handle(UNSTABLE, MockInstant::millis(100));
    assert_eq!(
        controller.handle(UNSTABLE, MockInstant::millis(400)),
        Decision::Absorbed
    );
    assert_eq!(controller.mask().shed(), 0b0_0001);
    assert_eq!(controller.next_deadline(), Some(MockInstant::millis(900)));
}

#[test]
fn shedding_skips_switched_off_loads() {
    let mut controller = LoadShedController::<MockInstant>::new(ControllerConfig::default());
    controller.handle(ControllerEvent::SwitchInputs(0b1_0100), MockInstant::millis(0));

    controller.handle(UNSTABLE, MockInstant::millis(0));
    controller.handle(UNSTABLE, MockInstant::millis(500));
    assert_eq!(controller.mask().shed(), 0b1_0100);
    assert_eq!(
        controller.handle(UNSTABLE, MockInstant::millis(1_000)),
        Decision::Step(StepOutcome::Exhausted)
    );
}
