//! Operator console shared between firmware and emulator targets.
//!
//! Lines are tokenized and parsed by [`grammar`], dispatched into the trigger
//! lanes by [`commands`], and controller state is rendered by [`status`].

pub mod catalog;
pub mod commands;
pub mod grammar;
pub mod status;
