//! RP2040 implementations of the `hal-abstractions` platform traits

use cortex_m::asm;
use embassy_rp::pac;
use embassy_time::Instant;
use hal_abstractions::{Console, CoreIdentity, MonotonicClock, RawBoundedLock};

/// SIO spinlock guarding the persistent memory block.
///
/// embassy-rp's critical-section implementation owns spinlock 31.
pub const PMEM_SPINLOCK: usize = 24;

pub type PmemLock = RpSpinlock<PMEM_SPINLOCK>;

/// Time, core id and console for both cores.
#[derive(Debug, Default, Clone, Copy)]
pub struct RpPlatform;

impl MonotonicClock for RpPlatform {
    fn now_micros(&self) -> u64 {
        Instant::now().as_micros()
    }
}

impl CoreIdentity for RpPlatform {
    fn core_id(&self) -> u8 {
        pac::SIO.cpuid().read() as u8
    }
}

impl Console for RpPlatform {
    fn write_line(&self, line: &str) {
        defmt::println!("{=str}", line);
    }
}

/// One of the 32 RP2040 hardware spinlocks.
///
/// Reading the lock register claims it (non-zero means claimed), writing
/// any value releases it.
#[derive(Debug)]
pub struct RpSpinlock<const N: usize>(());

impl<const N: usize> RpSpinlock<N> {
    pub const fn new() -> Self {
        Self(())
    }

    /// Release the lock regardless of owner.
    ///
    /// Spinlocks are not cleared by a core reset, so a lock held when the
    /// watchdog fired would otherwise stay taken forever. Call once at boot
    /// before core 1 is started.
    pub fn force_release(&self) {
        pac::SIO.spinlock(N).write_value(1);
    }
}

impl<const N: usize> RawBoundedLock for RpSpinlock<N> {
    fn try_acquire(&self) -> bool {
        if pac::SIO.spinlock(N).read() != 0 {
            asm::dmb();
            true
        } else {
            false
        }
    }

    fn release(&self) {
        asm::dmb();
        pac::SIO.spinlock(N).write_value(1);
    }
}
