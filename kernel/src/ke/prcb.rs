//! Processor Control Block (PRCB)
//!
//! Per-CPU state that is only ever touched by the CPU it describes:
//! - Interrupt-disable nesting depth and the interrupt state to restore
//! - Context switch counter
//!
//! Which process a CPU is running is scheduling state and lives in the
//! process table, under its lock.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use super::bugcheck::{codes, ke_bug_check_ex};
use crate::platform::{CpuId, Interrupts};

/// Processor Control Block
pub struct Prcb {
    /// Processor number
    pub number: CpuId,
    /// Depth of nested interrupt-disable sections
    ncli: AtomicU32,
    /// Were interrupts enabled before the outermost disable?
    intena: AtomicBool,
    /// Number of processes dispatched on this processor
    context_switches: AtomicU64,
}

impl Prcb {
    pub const fn new(number: CpuId) -> Self {
        Self {
            number,
            ncli: AtomicU32::new(0),
            intena: AtomicBool::new(false),
            context_switches: AtomicU64::new(0),
        }
    }

    /// Disable interrupts, remembering the state of the outermost call
    ///
    /// Matched by [`Prcb::pop_off`]; it takes two pops to undo two pushes.
    pub fn push_off(&self, intr: &dyn Interrupts) {
        let old = intr.intr_get(self.number);
        intr.intr_off(self.number);
        if self.ncli.load(Ordering::Relaxed) == 0 {
            self.intena.store(old, Ordering::Relaxed);
        }
        self.ncli.fetch_add(1, Ordering::Relaxed);
    }

    /// Undo one [`Prcb::push_off`]
    pub fn pop_off(&self, intr: &dyn Interrupts) {
        if intr.intr_get(self.number) {
            ke_bug_check_ex(
                codes::INTERRUPTIBLE_WITH_LOCK,
                self.number as u64,
                "pop_off: interruptible",
            );
        }
        let depth = self.ncli.load(Ordering::Relaxed);
        if depth == 0 {
            ke_bug_check_ex(codes::SPIN_LOCK_NOT_OWNED, self.number as u64, "pop_off: not pushed");
        }
        self.ncli.store(depth - 1, Ordering::Relaxed);
        if depth == 1 && self.intena.load(Ordering::Relaxed) {
            intr.intr_on(self.number);
        }
    }

    /// Current interrupt-disable nesting depth
    #[inline]
    pub fn nesting(&self) -> u32 {
        self.ncli.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn count_switch(&self) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    /// Processes dispatched on this processor so far
    #[inline]
    pub fn context_switches(&self) -> u64 {
        self.context_switches.load(Ordering::Relaxed)
    }
}
