//! Hardware abstraction traits for the PWM controller firmware
//!
//! This crate defines traits that abstract over hardware differences
//! between boards. BSPs implement these traits; `brickpico-core` consumes
//! them and never touches a register directly.

#![no_std]
#![deny(unsafe_code)]
#![deny(warnings)]

/// Free-running microsecond time source.
///
/// Must be monotonic (never decreasing) and readable from every
/// execution context.
pub trait MonotonicClock {
    /// Microseconds since boot.
    fn now_micros(&self) -> u64;
}

/// Identifies the execution context ("core") the caller runs on.
pub trait CoreIdentity {
    fn core_id(&self) -> u8;
}

/// A raw cross-context lock that can only be *tried*.
///
/// Implementations must be usable from every execution context at the same
/// time (a hardware spinlock, an atomic flag, ...). Waiting with a timeout
/// is layered on top by `brickpico_core::lock::BoundedMutex`.
pub trait RawBoundedLock {
    /// Attempt to take the lock without waiting.
    ///
    /// Returns `true` if the caller now owns the lock.
    fn try_acquire(&self) -> bool;

    /// Release a lock previously taken with [`try_acquire`](Self::try_acquire).
    fn release(&self);
}

/// Line-oriented text console.
///
/// Shared by all execution contexts, so writes take `&self`.
pub trait Console {
    /// Write one line. The implementation appends the line terminator.
    fn write_line(&self, line: &str);
}

/// Remote (syslog-style) log destination.
pub trait RemoteLogSink {
    /// Forward one message with its syslog priority (0 = EMERG .. 7 = DEBUG).
    fn forward(&self, priority: u8, message: &str);
}

/// Sink that drops everything; used when no remote logging is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRemoteLog;

impl RemoteLogSink for NoRemoteLog {
    fn forward(&self, _priority: u8, _message: &str) {}
}

/// PWM timer hardware addressed by GPIO pin number.
///
/// Pins are grouped into slices; both outputs (A/B) of a slice share the
/// slice's clock divider and wrap value.
pub trait PwmHardware {
    /// Timer slice that drives `pin`.
    fn slice_of(&self, pin: u8) -> u8;

    /// Route `pin` to its PWM slice.
    fn attach_pin(&mut self, pin: u8);

    /// Program a slice for phase-correct operation and start it.
    fn configure_slice(&mut self, slice: u8, clock_divider: u8, wrap: u16);

    /// Set the compare level of the output driving `pin`.
    ///
    /// A level of `wrap + 1` holds the output permanently high.
    fn set_level(&mut self, pin: u8, level: u32);

    /// Read back the compare level of the output driving `pin`.
    fn level(&self, pin: u8) -> u32;
}
