//! x86_64 interrupt control
//!
//! Backs the [`Interrupts`] collaborator with the local CPU's IF flag.
//! The `cpu` argument is ignored: the instructions always act on the CPU
//! that executes them, which is the CPU the caller runs on.

use x86_64::instructions::interrupts;

use crate::platform::{CpuId, Interrupts};

/// Interrupt control of the executing CPU
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalInterrupts;

impl Interrupts for LocalInterrupts {
    #[inline]
    fn intr_on(&self, _cpu: CpuId) {
        interrupts::enable();
    }

    #[inline]
    fn intr_off(&self, _cpu: CpuId) {
        interrupts::disable();
    }

    #[inline]
    fn intr_get(&self, _cpu: CpuId) -> bool {
        interrupts::are_enabled()
    }
}
