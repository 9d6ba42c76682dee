mod support;

use loadshed_core::controller::{
    ControllerConfig, ControllerEvent, ControllerMode, Decision, LoadShedController, StepOutcome,
};
use loadshed_core::stability::StabilityVerdict;

use support::{Lcg, MockInstant};

fn random_event(rng: &mut Lcg) -> ControllerEvent {
    match rng.below(10) {
        0 => ControllerEvent::MaintenanceToggle,
        1 => ControllerEvent::SwitchInputs(rng.next_u32()),
        2..=4 => ControllerEvent::TimerExpired,
        5..=7 => ControllerEvent::Verdict(StabilityVerdict::Unstable),
        _ => ControllerEvent::Verdict(StabilityVerdict::Stable),
    }
}

#[test]
fn mask_invariants_hold_under_random_events() {
    for seed in 0..32 {
        let mut rng = Lcg::new(seed);
        let mut controller = LoadShedController::<MockInstant>::new(ControllerConfig::default());
        let mut now = 0_u64;

        for _ in 0..500 {
            now += u64::from(rng.below(400));
            let at = MockInstant::millis(now);
            let event = random_event(&mut rng);

            let before = *controller.mask();
            let decision = controller.handle(event, at);
            let after = *controller.mask();

            assert_eq!(after.shed() & !after.present(), 0, "seed {seed}");
            assert_eq!(after.present() & !after.universe(), 0, "seed {seed}");

            if controller.mode() == ControllerMode::Maintenance {
                assert_eq!(after.shed(), 0, "seed {seed}");
                assert_eq!(controller.next_deadline(), None, "seed {seed}");
            }

            match decision {
                Decision::Step(StepOutcome::Shed(load))
                | Decision::MaintenanceExited(StepOutcome::Shed(load)) => {
                    let lowest_active = before.active() & before.active().wrapping_neg();
                    assert_eq!(load.bit(), lowest_active, "seed {seed}");
                    assert_eq!(after.shed(), before.shed() | load.bit(), "seed {seed}");
                    assert_eq!(
                        controller.next_deadline(),
                        Some(at + ControllerConfig::default().settle_period()),
                        "seed {seed}"
                    );
                }
                Decision::Step(StepOutcome::Restored { load, .. })
                | Decision::MaintenanceExited(StepOutcome::Restored { load, .. }) => {
                    let highest_shed = 1_u32 << (31 - before.shed().leading_zeros());
                    assert_eq!(load.bit(), highest_shed, "seed {seed}");
                    assert_eq!(after.shed(), before.shed() & !load.bit(), "seed {seed}");
                }
                Decision::Absorbed | Decision::Stale | Decision::Suspended => {
                    assert_eq!(after, before, "seed {seed}");
                }
                _ => {}
            }
        }
    }
}

#[test]
fn absorbed_verdicts_never_change_the_mask() {
    let mut rng = Lcg::new(0x5eed);
    let mut controller = LoadShedController::<MockInstant>::new(ControllerConfig::default());
    controller.handle(ControllerEvent::SwitchInputs(0b1_1111), MockInstant::millis(0));
    controller.handle(
        ControllerEvent::Verdict(StabilityVerdict::Unstable),
        MockInstant::millis(0),
    );

    // Verdicts every <500 ms keep pushing the deadline out.
    let mut now = 0;
    for _ in 0..200 {
        now += u64::from(rng.below(499)) + 1;
        let verdict = if rng.below(2) == 0 {
            StabilityVerdict::Unstable
        } else {
            StabilityVerdict::Stable
        };
        assert_eq!(
            controller.handle(ControllerEvent::Verdict(verdict), MockInstant::millis(now)),
            Decision::Absorbed
        );
    }
    assert_eq!(controller.mask().shed(), 0b0_0001);
}
