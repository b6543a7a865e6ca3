//! Platform-agnostic core logic for the BrickPico PWM controller
//!
//! Everything here is shared by all boards and runs on the host for tests.
//! It has NO hardware dependencies: boards plug in through the traits in
//! `hal-abstractions`.
//!
//! - [`pwm`]: timing derivation and the channel driver
//! - [`effects`]: per-channel duty-cycle transforms
//! - [`output`]: the per-tick controller tying the two together
//! - [`pmem`], [`ringbuffer`], [`crc32`]: the reboot-surviving log block
//! - [`lock`], [`logger`]: cross-core bounded locking and the diagnostic log

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod config;
pub mod crc32;
pub mod effects;
pub mod lock;
pub mod logger;
pub mod output;
pub mod pmem;
pub mod pwm;
pub mod ringbuffer;
