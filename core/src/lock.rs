//! Bounded-wait mutual exclusion across execution contexts
//!
//! This module is the **ONLY** place in `brickpico-core` that uses `unsafe`:
//! [`BoundedMutex`] hands out `&mut T` from a shared reference once the raw
//! lock is held.
//!
//! Acquisition never blocks forever. [`BoundedMutex::lock_timeout`] spins on
//! [`RawBoundedLock::try_acquire`] until it succeeds or the timeout measured
//! on a [`MonotonicClock`] elapses. The returned guard releases the raw lock
//! when dropped, so every exit path out of a critical section releases it.
//!
//! # Safety Requirements
//!
//! A `RawBoundedLock` implementation must guarantee that at most one caller
//! at a time observes `try_acquire() == true` until the matching `release()`.

#![allow(unsafe_code)]

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};

use hal_abstractions::{MonotonicClock, RawBoundedLock};

/// Lock acquisition timed out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LockTimeout {
    /// Microseconds spent waiting before giving up
    pub waited_us: u64,
}

impl fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock timeout after {} us", self.waited_us)
    }
}

impl core::error::Error for LockTimeout {}

/// Data guarded by a [`RawBoundedLock`].
pub struct BoundedMutex<R, T> {
    raw: R,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `raw`, which is shared between
// contexts; `T` itself moves between contexts only as `&mut T`.
unsafe impl<R: RawBoundedLock + Sync, T: Send> Sync for BoundedMutex<R, T> {}

impl<R: RawBoundedLock, T> BoundedMutex<R, T> {
    pub const fn new(raw: R, data: T) -> Self {
        Self {
            raw,
            data: UnsafeCell::new(data),
        }
    }

    /// Take the lock if it is free right now.
    pub fn try_lock(&self) -> Option<BoundedGuard<'_, R, T>> {
        if self.raw.try_acquire() {
            Some(BoundedGuard { mutex: self })
        } else {
            None
        }
    }

    /// Take the lock, waiting at most `timeout_us` microseconds.
    ///
    /// The lock is always tried at least once, so a zero timeout behaves
    /// like [`try_lock`](Self::try_lock).
    pub fn lock_timeout<C>(
        &self,
        clock: &C,
        timeout_us: u64,
    ) -> Result<BoundedGuard<'_, R, T>, LockTimeout>
    where
        C: MonotonicClock + ?Sized,
    {
        let start = clock.now_micros();
        loop {
            if self.raw.try_acquire() {
                return Ok(BoundedGuard { mutex: self });
            }
            let waited_us = clock.now_micros().saturating_sub(start);
            if waited_us >= timeout_us {
                return Err(LockTimeout { waited_us });
            }
            core::hint::spin_loop();
        }
    }

    /// Exclusive access without locking; `&mut self` already proves it.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

/// Scoped access to the data of a [`BoundedMutex`]; releases on drop.
pub struct BoundedGuard<'a, R: RawBoundedLock, T> {
    mutex: &'a BoundedMutex<R, T>,
}

impl<R: RawBoundedLock, T> Deref for BoundedGuard<'_, R, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard exists only while `raw` is held.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<R: RawBoundedLock, T> DerefMut for BoundedGuard<'_, R, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard exists only while `raw` is held, and `&mut self`
        // prevents a second borrow through the same guard.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<R: RawBoundedLock, T> Drop for BoundedGuard<'_, R, T> {
    fn drop(&mut self) {
        self.mutex.raw.release();
    }
}

/// [`RawBoundedLock`] over an atomic flag.
///
/// Needs compare-and-swap, so it is unavailable on targets without it
/// (Cortex-M0+); those boards use a hardware spinlock instead.
#[cfg(target_has_atomic = "8")]
#[derive(Debug, Default)]
pub struct AtomicFlagLock {
    locked: core::sync::atomic::AtomicBool,
}

#[cfg(target_has_atomic = "8")]
impl AtomicFlagLock {
    pub const fn new() -> Self {
        Self {
            locked: core::sync::atomic::AtomicBool::new(false),
        }
    }
}

#[cfg(target_has_atomic = "8")]
impl RawBoundedLock for AtomicFlagLock {
    fn try_acquire(&self) -> bool {
        use core::sync::atomic::Ordering;
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn release(&self) {
        self.locked
            .store(false, core::sync::atomic::Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    /// Clock that advances by one microsecond on every read.
    struct StepClock(Cell<u64>);

    impl MonotonicClock for StepClock {
        fn now_micros(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }
    }

    #[test]
    fn guard_releases_on_drop() {
        let mutex = BoundedMutex::new(AtomicFlagLock::new(), 5u32);
        {
            let mut guard = mutex.try_lock().unwrap();
            *guard += 1;
            assert!(mutex.try_lock().is_none());
        }
        assert_eq!(*mutex.try_lock().unwrap(), 6);
    }

    #[test]
    fn lock_timeout_gives_up_after_timeout() {
        let mutex = BoundedMutex::new(AtomicFlagLock::new(), ());
        let clock = StepClock(Cell::new(0));
        let _held = mutex.try_lock().unwrap();
        let err = mutex.lock_timeout(&clock, 100).err().unwrap();
        assert!(err.waited_us >= 100);
    }

    #[test]
    fn lock_timeout_succeeds_when_free() {
        let mutex = BoundedMutex::new(AtomicFlagLock::new(), 1u8);
        let clock = StepClock(Cell::new(0));
        let guard = mutex.lock_timeout(&clock, 0).unwrap();
        assert_eq!(*guard, 1);
    }

    #[test]
    fn timeout_path_leaves_lock_usable() {
        let mutex = BoundedMutex::new(AtomicFlagLock::new(), 0u8);
        let clock = StepClock(Cell::new(0));
        let held = mutex.try_lock().unwrap();
        assert!(mutex.lock_timeout(&clock, 10).is_err());
        drop(held);
        assert!(mutex.lock_timeout(&clock, 10).is_ok());
    }

    #[test]
    fn contended_counter_has_no_lost_updates() {
        let mutex = BoundedMutex::new(AtomicFlagLock::new(), 0u32);
        let clock = StdClock::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        let mut guard = mutex.lock_timeout(&clock, 1_000_000).unwrap();
                        *guard += 1;
                    }
                });
            }
        });
        assert_eq!(mutex.into_inner(), 4000);
    }

    struct StdClock(std::time::Instant);

    impl StdClock {
        fn new() -> Self {
            Self(std::time::Instant::now())
        }
    }

    impl MonotonicClock for StdClock {
        fn now_micros(&self) -> u64 {
            self.0.elapsed().as_micros() as u64
        }
    }
}
