//! Aging
//!
//! Every `aging_step` clock ticks the aging sweep walks levels 1 and
//! below. Each runnable process there grows one year older; one that
//! reaches `age_limit` is moved up a level and starts over at age 0.
//! Dispatch also resets the age, so only processes that keep losing to
//! higher levels are promoted. Level 0 is never swept.

use crate::kernel::Kernel;
use crate::param::PLEVELS;
use crate::platform::{CpuId, Platform};
use crate::ps::ProcTable;

impl ProcTable {
    /// Age every process on levels 1.., promoting those at `age_limit`
    ///
    /// Returns the number of promotions.
    pub(crate) fn age_levels(&mut self, age_limit: u32) -> usize {
        let mut promoted = 0;

        for level in 1..PLEVELS {
            let mut cursor = self.levels[level].head;
            while let Some(slot) = cursor {
                cursor = self.procs[slot].next;

                let p = &mut self.procs[slot];
                p.age += 1;
                if p.age < age_limit {
                    continue;
                }

                self.remove_from_level(slot);
                self.raise_priority(slot);
                self.procs[slot].age = 0;
                self.enqueue(slot);
                promoted += 1;
                log::trace!("aging: pid {} promoted to level {}", self.procs[slot].pid, level - 1);
            }
        }

        promoted
    }
}

impl<P: Platform> Kernel<P> {
    /// Run one aging sweep; returns the number of processes promoted
    pub fn age_processes(&self, cpu: CpuId) -> usize {
        let promoted = self.lock_ptable(cpu).age_levels(self.config().age_limit);

        Self::count(&self.counters.aging_sweeps);
        self.counters
            .aging_promotions
            .fetch_add(promoted as u64, core::sync::atomic::Ordering::Relaxed);
        if promoted > 0 {
            log::debug!("aging sweep promoted {} processes", promoted);
        }
        promoted
    }
}
