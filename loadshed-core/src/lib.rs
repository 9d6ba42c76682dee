#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

// Frequency-responsive load shedding shared by the firmware and host tooling.
//
// The crate stays portable across the MCU and the emulator by avoiding the
// Rust standard library. Hardware and executor concerns are reached only
// through the traits exposed here.

pub mod console;
pub mod controller;
pub mod debounce;
pub mod gateway;
pub mod loads;
pub mod pipeline;
pub mod stability;
pub mod telemetry;
