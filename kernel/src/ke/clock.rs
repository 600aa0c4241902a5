//! Clock Tick
//!
//! The periodic timer interrupt drives three things:
//! - the global tick counter, kept by CPU 0 under the tick lock
//! - the aging sweep, every `aging_step` ticks
//! - quantum accounting of whatever process each CPU is running
//!
//! Timed sleeps are built on the tick counter: a sleeper records the tick
//! it started at and waits on [`Channel::Ticks`] until enough have passed.

use core::task::Poll;

use crate::kernel::Kernel;
use crate::ke::wait::Channel;
use crate::platform::{CpuId, Platform};
use crate::ps::ProcError;

/// A timed sleep in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    /// Tick count when the sleep began
    pub start: u32,
    /// Ticks to wait
    pub ticks: u32,
}

impl Deadline {
    /// Has `now` reached the deadline? Correct across counter wrap.
    #[inline]
    pub fn expired(&self, now: u32) -> bool {
        now.wrapping_sub(self.start) >= self.ticks
    }
}

impl<P: Platform> Kernel<P> {
    /// Timer interrupt on `cpu`
    ///
    /// Returns `Poll::Pending` when the running process used up its
    /// quantum and yielded.
    pub fn clock_tick(&self, cpu: CpuId) -> Poll<()> {
        if cpu == 0 {
            let mut ticks = self.lock_ticks(cpu);
            *ticks = ticks.wrapping_add(1);
            let now = *ticks;
            self.wakeup(cpu, Channel::Ticks);
            drop(ticks);

            if now % self.config().aging_step == 0 {
                self.age_processes(cpu);
            }
        }

        let expired = {
            let mut table = self.lock_ptable(cpu);
            match table.current(cpu) {
                Some(slot) => {
                    let p = table.proc_mut(slot);
                    p.ticks += 1;
                    p.ticks >= self.config().quantum
                }
                None => false,
            }
        };

        if expired {
            Self::count(&self.counters.quantum_expirations);
            self.yield_cpu(cpu);
            return Poll::Pending;
        }
        Poll::Ready(())
    }

    /// Ticks since boot
    pub fn uptime(&self, cpu: CpuId) -> u32 {
        *self.lock_ticks(cpu)
    }

    /// Start a timed sleep of `n` ticks
    ///
    /// A non-positive `n` gives a deadline that has already expired.
    pub fn deadline(&self, cpu: CpuId, n: i32) -> Deadline {
        Deadline {
            start: self.uptime(cpu),
            ticks: n.max(0) as u32,
        }
    }

    /// Sleep until `deadline` expires
    ///
    /// Fails if the caller is killed while it waits.
    pub fn sleep_until(&self, cpu: CpuId, deadline: Deadline) -> Poll<Result<(), ProcError>> {
        let ticks = self.lock_ticks(cpu);
        if deadline.expired(*ticks) {
            return Poll::Ready(Ok(()));
        }
        if self.killed(cpu) {
            return Poll::Ready(Err(ProcError::Killed));
        }

        self.sleep(cpu, Channel::Ticks, ticks);
        Poll::Pending
    }
}
