//! Kernel Spinlock
//!
//! Spinlocks provide mutual exclusion for short critical sections. While
//! a CPU holds one, interrupts stay disabled on that CPU so an interrupt
//! handler can never spin on a lock its own CPU already owns.
//!
//! The lock word itself is a `spin::Mutex`; this wrapper adds the
//! interrupt nesting through the CPU's [`Prcb`] and remembers which CPU
//! owns the lock, so acquiring it twice on one CPU stops the kernel
//! instead of deadlocking it.
//!
//! # Usage
//! ```ignore
//! let guard = lock.lock(prcb, &platform);
//! // ... critical section ...
//! // guard dropped, lock released, interrupts restored
//! ```

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicUsize, Ordering};

use super::bugcheck::{codes, ke_bug_check_ex};
use super::prcb::Prcb;
use crate::platform::Interrupts;

/// No CPU holds the lock
const NO_OWNER: usize = 0;

/// A named spinlock protecting `T`
pub struct SpinLock<T> {
    name: &'static str,
    /// Owning CPU number plus one, or [`NO_OWNER`]
    owner: AtomicUsize,
    data: spin::Mutex<T>,
}

impl<T> SpinLock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            owner: AtomicUsize::new(NO_OWNER),
            data: spin::Mutex::new(data),
        }
    }

    /// Acquire the lock on behalf of `prcb`'s CPU
    pub fn lock<'a>(&'a self, prcb: &'a Prcb, intr: &'a dyn Interrupts) -> SpinLockGuard<'a, T> {
        prcb.push_off(intr);
        if self.holding(prcb) {
            ke_bug_check_ex(codes::SPIN_LOCK_ALREADY_OWNED, prcb.number as u64, self.name);
        }

        let guard = self.data.lock();
        self.owner.store(prcb.number + 1, Ordering::Relaxed);

        SpinLockGuard {
            lock: self,
            guard: ManuallyDrop::new(guard),
            prcb,
            intr,
        }
    }

    /// Does `prcb`'s CPU hold this lock?
    ///
    /// Only meaningful with interrupts disabled on that CPU.
    #[inline]
    pub fn holding(&self, prcb: &Prcb) -> bool {
        self.owner.load(Ordering::Relaxed) == prcb.number + 1
    }
}

/// RAII guard for [`SpinLock`]
///
/// Releases the lock and pops one interrupt-disable level when dropped.
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
    guard: ManuallyDrop<spin::MutexGuard<'a, T>>,
    prcb: &'a Prcb,
    intr: &'a dyn Interrupts,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.owner.store(NO_OWNER, Ordering::Relaxed);
        // SAFETY: the inner guard is dropped exactly once, here.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        self.prcb.pop_off(self.intr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimPlatform;

    #[test]
    fn test_lock_disables_and_restores_interrupts() {
        let platform = SimPlatform::new();
        let prcb = Prcb::new(0);
        let lock = SpinLock::new("test", 5u32);
        platform.intr_on(0);

        {
            let mut guard = lock.lock(&prcb, &platform);
            *guard += 1;
            assert!(lock.holding(&prcb));
            assert!(!platform.intr_get(0));
        }

        assert!(!lock.holding(&prcb));
        assert!(platform.intr_get(0));
        assert_eq!(*lock.lock(&prcb, &platform), 6);
    }

    #[test]
    fn test_two_locks_nest() {
        let platform = SimPlatform::new();
        let prcb = Prcb::new(2);
        let outer = SpinLock::new("outer", ());
        let inner = SpinLock::new("inner", ());
        platform.intr_on(2);

        let a = outer.lock(&prcb, &platform);
        let b = inner.lock(&prcb, &platform);
        assert_eq!(prcb.nesting(), 2);
        // Released out of order, as sleep does.
        drop(a);
        assert!(!platform.intr_get(2));
        drop(b);
        assert!(platform.intr_get(2));
    }

    #[test]
    fn test_other_cpu_is_not_holder() {
        let platform = SimPlatform::new();
        let cpu0 = Prcb::new(0);
        let cpu1 = Prcb::new(1);
        let lock = SpinLock::new("ptable", ());

        let _guard = lock.lock(&cpu0, &platform);
        assert!(lock.holding(&cpu0));
        assert!(!lock.holding(&cpu1));
    }

    #[test]
    #[should_panic(expected = "SPIN_LOCK_ALREADY_OWNED")]
    fn test_reacquire_on_same_cpu_is_fatal() {
        let platform = SimPlatform::new();
        let prcb = Prcb::new(0);
        let lock = SpinLock::new("ptable", ());

        let _first = lock.lock(&prcb, &platform);
        let _second = lock.lock(&prcb, &platform);
    }
}
