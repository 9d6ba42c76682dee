//! Board adapters implementing the `loadshed-core` I/O traits.
//!
//! Load `i` owns one red LED (active), one green LED (shed) and one switch
//! input. All three banks are indexed lowest priority first.

use embassy_stm32::gpio::{Input, Output};
use loadshed_core::controller::{LoadMirror, SwitchReader};

use crate::inputs::pack_switches;

/// Loads wired on this board.
pub const BOARD_LOADS: usize = 5;

/// Drives the red and green LED banks from the load mask.
pub struct LedBanks<'d> {
    red: [Output<'d>; BOARD_LOADS],
    green: [Output<'d>; BOARD_LOADS],
}

impl<'d> LedBanks<'d> {
    pub fn new(red: [Output<'d>; BOARD_LOADS], green: [Output<'d>; BOARD_LOADS]) -> Self {
        Self { red, green }
    }
}

fn drive(led: &mut Output<'_>, on: bool) {
    if on {
        led.set_high();
    } else {
        led.set_low();
    }
}

impl LoadMirror for LedBanks<'_> {
    fn mirror_load_state(&mut self, active: u32, shed: u32) {
        for (index, (red, green)) in self.red.iter_mut().zip(self.green.iter_mut()).enumerate() {
            let bit = 1u32 << index;
            drive(red, active & bit != 0);
            drive(green, shed & bit != 0);
        }
    }
}

/// Load switch inputs; a high level means the load is switched on.
pub struct SwitchBank<'d> {
    switches: [Input<'d>; BOARD_LOADS],
}

impl<'d> SwitchBank<'d> {
    pub fn new(switches: [Input<'d>; BOARD_LOADS]) -> Self {
        Self { switches }
    }
}

impl SwitchReader for SwitchBank<'_> {
    fn read_switch_inputs(&mut self) -> u32 {
        pack_switches(self.switches.iter().map(Input::is_high))
    }
}
