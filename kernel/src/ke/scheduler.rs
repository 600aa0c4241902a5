//! MLFQ Scheduler
//!
//! Each CPU runs [`Kernel::scheduler`] forever. One pass:
//! - enable interrupts, so an idle CPU still takes ticks
//! - under the process table lock, find the highest non-empty level and
//!   take its oldest process
//! - mark it RUNNING, load its address space and hand it to the
//!   [`Dispatcher`]
//!
//! The dispatched process keeps the CPU until it changes its own state
//! under the process table lock and calls [`Kernel::sched`], which is the
//! switch back to the loop. Every kernel operation that gives up the CPU
//! does both steps in one critical section and then reports
//! `Poll::Pending` to its caller.
//!
//! Priority feedback:
//! - a process that uses its whole quantum yields and drops one level
//! - a process woken from sleep rises one level
//! - a process left runnable for `age_limit` aging sweeps rises one level

use core::fmt;
use core::sync::atomic::Ordering;

use crate::arch::Context;
use crate::kernel::Kernel;
use crate::ke::bugcheck::{codes, ke_bug_check_ex};
use crate::ke::spinlock::SpinLockGuard;
use crate::param::PLEVELS;
use crate::platform::{CpuId, Platform};
use crate::ps::{Pid, ProcError, ProcState, ProcTable};

/// Runs a dispatched process
///
/// `run` returns once the process has given up the CPU: a kernel
/// operation it called reported `Poll::Pending`, or it was preempted by
/// [`Kernel::clock_tick`]. Returning while the process still owns the CPU
/// stops the kernel.
pub trait Dispatcher<P: Platform> {
    fn run(&mut self, kernel: &Kernel<P>, cpu: CpuId, pid: Pid, context: &Context);
}

impl<P: Platform, F> Dispatcher<P> for F
where
    F: FnMut(&Kernel<P>, CpuId, Pid),
{
    fn run(&mut self, kernel: &Kernel<P>, cpu: CpuId, pid: Pid, _context: &Context) {
        self(kernel, cpu, pid)
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Snapshot of the scheduling counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedStats {
    /// Processes dispatched, over all CPUs
    pub context_switches: u64,
    /// Aging sweeps run
    pub aging_sweeps: u64,
    /// Processes promoted by aging
    pub aging_promotions: u64,
    /// Yields forced by an expired quantum
    pub quantum_expirations: u64,
    /// Runnable processes per level
    pub ready: [usize; PLEVELS],
}

impl fmt::Display for SchedStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Scheduler Statistics:")?;
        writeln!(f, "  Context switches:    {}", self.context_switches)?;
        writeln!(f, "  Aging sweeps:        {}", self.aging_sweeps)?;
        writeln!(f, "  Aging promotions:    {}", self.aging_promotions)?;
        writeln!(f, "  Quantum expirations: {}", self.quantum_expirations)?;
        for (level, count) in self.ready.iter().enumerate() {
            writeln!(f, "  Level {} ready:       {}", level, count)?;
        }
        Ok(())
    }
}

// ============================================================================
// Dispatch
// ============================================================================

impl<P: Platform> Kernel<P> {
    /// One pass of the scheduler loop on `cpu`
    ///
    /// Returns the pid that ran, or `None` if nothing was runnable.
    pub fn schedule_once<D: Dispatcher<P>>(&self, cpu: CpuId, dispatcher: &mut D) -> Option<Pid> {
        self.platform().intr_on(cpu);

        let (pid, context) = {
            let mut table = self.lock_ptable(cpu);
            let level = table.first_ready_level()?;
            let slot = table.dequeue(level);

            let p = table.proc_mut(slot);
            p.state = ProcState::Running;
            p.age = 0;
            p.ticks = 0;
            let (pid, context, pgdir, kstack) = (p.pid, p.context, p.pgdir, p.kstack);
            table.running[cpu] = Some(slot);

            if let (Some(pgdir), Some(kstack)) = (pgdir, kstack) {
                self.platform().switch_user(cpu, pgdir, kstack);
            }
            self.prcb(cpu).count_switch();
            log::trace!("cpu{}: dispatch pid {} from level {}", cpu, pid, level);
            (pid, context)
        };

        dispatcher.run(self, cpu, pid, &context);

        let table = self.lock_ptable(cpu);
        self.platform().switch_kernel(cpu);
        if table.running[cpu].is_some() {
            ke_bug_check_ex(codes::DISPATCH_STILL_RUNNING, pid as u64, "dispatcher returned");
        }
        Some(pid)
    }

    /// Per-CPU scheduler loop
    pub fn scheduler<D: Dispatcher<P>>(&self, cpu: CpuId, dispatcher: &mut D) -> ! {
        log::info!("cpu{}: scheduler starting", cpu);
        loop {
            if self.schedule_once(cpu, dispatcher).is_none() {
                self.platform().idle(cpu);
            }
        }
    }

    /// Switch from the current process back to the scheduler loop
    ///
    /// The caller holds exactly the process table lock and has already
    /// moved the current process out of RUNNING. After this the CPU has no
    /// current process.
    pub fn sched(&self, cpu: CpuId, table: &mut SpinLockGuard<'_, ProcTable>) {
        let prcb = self.prcb(cpu);
        let slot = table.myproc(cpu);

        if !self.ptable.holding(prcb) {
            ke_bug_check_ex(codes::SCHED_LOCKS, cpu as u64, "sched: ptable not held");
        }
        if prcb.nesting() != 1 {
            ke_bug_check_ex(codes::SCHED_LOCKS, prcb.nesting() as u64, "sched: locks");
        }
        if table.proc(slot).state == ProcState::Running {
            ke_bug_check_ex(codes::SCHED_RUNNING, table.proc(slot).pid as u64, "sched: running");
        }
        if self.platform().intr_get(cpu) {
            ke_bug_check_ex(codes::SCHED_INTERRUPTIBLE, cpu as u64, "sched: interruptible");
        }

        table.running[cpu] = None;
    }

    /// Give up the CPU for one scheduling round, dropping one level
    pub fn yield_cpu(&self, cpu: CpuId) {
        let mut table = self.lock_ptable(cpu);
        let slot = table.myproc(cpu);
        table.proc_mut(slot).ticks = 0;
        table.lower_priority(slot);
        table.enqueue(slot);
        self.sched(cpu, &mut table);
    }
}

// ============================================================================
// Priority and Process Queries
// ============================================================================

impl<P: Platform> Kernel<P> {
    /// Shift the caller's priority level by `delta`; returns the new level
    pub fn nice(&self, cpu: CpuId, delta: i32) -> Result<usize, ProcError> {
        let mut table = self.lock_ptable(cpu);
        let slot = table.myproc(cpu);
        let p = table.proc_mut(slot);

        let level = p.level as i64 + delta as i64;
        if level < 0 || level >= PLEVELS as i64 {
            return Err(ProcError::LevelOutOfRange);
        }
        p.level = level as usize;
        log::debug!("pid {} nice {} -> level {}", p.pid, delta, p.level);
        Ok(p.level)
    }

    /// Pid of the process running on `cpu`
    pub fn getpid(&self, cpu: CpuId) -> Pid {
        let table = self.lock_ptable(cpu);
        let slot = table.myproc(cpu);
        table.proc(slot).pid
    }

    /// Slot of the process running on `cpu`
    ///
    /// Only that process changes which slot a CPU runs, so the answer
    /// stays valid after the lock is dropped.
    pub(crate) fn current_slot(&self, cpu: CpuId) -> usize {
        self.lock_ptable(cpu).myproc(cpu)
    }

    /// Current scheduling counters
    pub fn stats(&self, cpu: CpuId) -> SchedStats {
        let mut ready = [0; PLEVELS];
        {
            let table = self.lock_ptable(cpu);
            for (level, count) in ready.iter_mut().enumerate() {
                *count = table.level(level).len();
            }
        }

        SchedStats {
            context_switches: self.context_switches(),
            aging_sweeps: self.counters.aging_sweeps.load(Ordering::Relaxed),
            aging_promotions: self.counters.aging_promotions.load(Ordering::Relaxed),
            quantum_expirations: self.counters.quantum_expirations.load(Ordering::Relaxed),
            ready,
        }
    }

    /// Print the scheduling counters to the console
    pub fn dump_stats(&self, cpu: CpuId) {
        let stats = self.stats(cpu);
        crate::cprint!(self.platform(), "{}", stats);
    }
}
