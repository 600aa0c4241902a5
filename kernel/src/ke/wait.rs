//! Sleep and Wakeup
//!
//! A process blocks by naming a [`Channel`] and giving up the CPU; any
//! other execution context makes every sleeper on that channel runnable
//! again. Sleepers always re-check their condition after waking, so a
//! wakeup is a hint, never a handoff.
//!
//! No wakeup can be lost between the check and the sleep: the caller holds
//! the lock guarding its condition, and [`Kernel::sleep`] takes the process
//! table lock before letting go of it. Wakeup needs the process table lock,
//! so it runs either before the condition was checked or after the
//! sleeper is SLEEPING.
//!
//! A woken process is raised one priority level: processes that block
//! keep the CPU responsive for interactive work.

use crate::kernel::Kernel;
use crate::ke::semaphore::SemId;
use crate::ke::spinlock::SpinLockGuard;
use crate::platform::{CpuId, Platform};
use crate::ps::{Pid, ProcState, ProcTable};

/// What a sleeping process waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// A child of this process changed state
    Process(Pid),
    /// The value of a semaphore rose
    Semaphore(SemId),
    /// The global tick counter advanced
    Ticks,
    /// Any other kernel object, by address
    Address(usize),
}

impl ProcTable {
    /// Make every process sleeping on `chan` runnable
    ///
    /// Returns the number of processes woken.
    pub(crate) fn wakeup1(&mut self, chan: Channel) -> usize {
        let mut woken = 0;
        for slot in 0..self.procs.len() {
            let p = &self.procs[slot];
            if p.state != ProcState::Sleeping || p.chan != Some(chan) {
                continue;
            }
            self.procs[slot].chan = None;
            self.raise_priority(slot);
            self.enqueue(slot);
            woken += 1;
        }
        if woken > 0 {
            log::trace!("wakeup {:?}: {} woken", chan, woken);
        }
        woken
    }
}

impl<P: Platform> Kernel<P> {
    /// Sleep on `chan`, releasing `guard`
    ///
    /// `guard` protects the condition the caller just found false. It is
    /// released only once the process table lock is held. The process is
    /// SLEEPING when this returns and no longer owns the CPU; the caller
    /// reports `Poll::Pending` and re-checks its condition, under the same
    /// lock, when it is dispatched again.
    ///
    /// A caller that already holds the process table lock uses
    /// [`Kernel::sleep_locked`] instead.
    pub fn sleep<T>(&self, cpu: CpuId, chan: Channel, guard: SpinLockGuard<'_, T>) {
        let mut table = self.lock_ptable(cpu);
        drop(guard);
        self.sleep_locked(cpu, &mut table, chan);
    }

    /// Sleep on `chan` with the process table lock held
    pub fn sleep_locked(&self, cpu: CpuId, table: &mut SpinLockGuard<'_, ProcTable>, chan: Channel) {
        let slot = table.myproc(cpu);
        let p = table.proc_mut(slot);
        p.chan = Some(chan);
        p.state = ProcState::Sleeping;
        log::trace!("pid {} sleeps on {:?}", p.pid, chan);

        self.sched(cpu, table);
    }

    /// Wake every process sleeping on `chan`
    pub fn wakeup(&self, cpu: CpuId, chan: Channel) -> usize {
        self.lock_ptable(cpu).wakeup1(chan)
    }
}
