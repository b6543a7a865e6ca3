//! Reboot-surviving RAM
//!
//! This module is the **ONLY** place in the firmware that places data in the
//! `.uninit` linker section. cortex-m-rt neither zeroes nor initializes that
//! section at reset, so the RP2040 SRAM content survives a watchdog or
//! software reset and is lost only on power-off.
//!
//! # Current Allocations
//!
//! - **PMEM**: the [`PersistentMemoryBlock`] holding uptime bookkeeping and
//!   the persistent log ring (~8 KB)
//!
//! # Safety Requirements
//!
//! - Everything placed here must be valid for any bit pattern. The block is
//!   plain integers and bytes, and [`PersistentMemoryBlock::boot`] checks
//!   its magic and CRC before trusting any of it.
//! - The block is handed out exactly once, see [`take`].

#![allow(unsafe_code)]

use core::cell::Cell;
use core::mem::MaybeUninit;
use core::ptr::addr_of_mut;

use brickpico_core::pmem::PersistentMemoryBlock;
use critical_section::Mutex;

#[link_section = ".uninit.pmem"]
static mut PMEM: MaybeUninit<PersistentMemoryBlock> = MaybeUninit::uninit();

static TAKEN: Mutex<Cell<bool>> = Mutex::new(Cell::new(false));

/// Claim the persistent block. Returns `None` after the first call.
///
/// The content is whatever the previous session left behind (or noise after
/// power-on); run [`PersistentMemoryBlock::boot`] on it before use.
pub fn take() -> Option<&'static mut PersistentMemoryBlock> {
    let first = critical_section::with(|cs| !TAKEN.borrow(cs).replace(true));
    if !first {
        return None;
    }
    // SAFETY: `TAKEN` guarantees this is the only reference ever created to
    // PMEM, and every bit pattern is a valid PersistentMemoryBlock.
    Some(unsafe { (*addr_of_mut!(PMEM)).assume_init_mut() })
}
