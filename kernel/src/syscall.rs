//! System Call Interface
//!
//! Decodes a trap's system call number and argument registers into a
//! [`Syscall`] and runs it against the kernel, mapping results to the
//! integer return convention: non-negative on success, `-1` on failure,
//! and the semaphore error codes (-2, -3, -4) for semaphore calls.
//!
//! A call that blocks returns `Poll::Pending`; the trap layer issues the
//! same `Syscall` again when the process is next dispatched. Calls that
//! need to remember progress across a restart (a timed sleep) rewrite
//! themselves in place.

use core::task::Poll;

use crate::kernel::Kernel;
use crate::ke::clock::Deadline;
use crate::platform::{CpuId, Platform};
use crate::ps::Pid;

/// System call numbers
pub mod numbers {
    pub const SYS_FORK: u64 = 1;
    pub const SYS_EXIT: u64 = 2;
    pub const SYS_WAIT: u64 = 3;
    pub const SYS_KILL: u64 = 6;
    pub const SYS_GETPID: u64 = 11;
    pub const SYS_SBRK: u64 = 12;
    pub const SYS_SLEEP: u64 = 13;
    pub const SYS_UPTIME: u64 = 14;
    pub const SYS_PROCSTAT: u64 = 22;
    pub const SYS_PLEVELSTAT: u64 = 23;
    pub const SYS_NICE: u64 = 24;
    pub const SYS_SEMGET: u64 = 25;
    pub const SYS_SEMFREE: u64 = 26;
    pub const SYS_SEMDOWN: u64 = 27;
    pub const SYS_SEMUP: u64 = 28;
}

/// System call arguments (up to 6 arguments in x86_64)
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallArgs {
    pub arg0: u64, // rdi
    pub arg1: u64, // rsi
    pub arg2: u64, // rdx
    pub arg3: u64, // r10
    pub arg4: u64, // r8
    pub arg5: u64, // r9
}

impl SyscallArgs {
    pub const fn new(arg0: u64, arg1: u64) -> Self {
        Self {
            arg0,
            arg1,
            arg2: 0,
            arg3: 0,
            arg4: 0,
            arg5: 0,
        }
    }

    /// Argument `n` as a C `int`
    fn int(&self, n: usize) -> i32 {
        let raw = match n {
            0 => self.arg0,
            1 => self.arg1,
            2 => self.arg2,
            3 => self.arg3,
            4 => self.arg4,
            _ => self.arg5,
        };
        raw as i32
    }
}

/// A decoded system call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syscall {
    Fork,
    Exit,
    Wait,
    Kill(Pid),
    Getpid,
    Sbrk(isize),
    Sleep(i32),
    /// A `Sleep` that has already recorded its starting tick
    SleepUntil(Deadline),
    Uptime,
    Procstat,
    Plevelstat,
    Nice(i32),
    Semget { key: i32, init: i32 },
    Semfree(i32),
    Semdown(i32),
    Semup(i32),
}

impl Syscall {
    /// Decode a system call; `None` for an unknown number
    pub fn decode(number: u64, args: &SyscallArgs) -> Option<Self> {
        use numbers::*;

        let call = match number {
            SYS_FORK => Syscall::Fork,
            SYS_EXIT => Syscall::Exit,
            SYS_WAIT => Syscall::Wait,
            SYS_KILL => Syscall::Kill(args.int(0) as Pid),
            SYS_GETPID => Syscall::Getpid,
            SYS_SBRK => Syscall::Sbrk(args.int(0) as isize),
            SYS_SLEEP => Syscall::Sleep(args.int(0)),
            SYS_UPTIME => Syscall::Uptime,
            SYS_PROCSTAT => Syscall::Procstat,
            SYS_PLEVELSTAT => Syscall::Plevelstat,
            SYS_NICE => Syscall::Nice(args.int(0)),
            SYS_SEMGET => Syscall::Semget {
                key: args.int(0),
                init: args.int(1),
            },
            SYS_SEMFREE => Syscall::Semfree(args.int(0)),
            SYS_SEMDOWN => Syscall::Semdown(args.int(0)),
            SYS_SEMUP => Syscall::Semup(args.int(0)),
            _ => {
                log::warn!("unknown sys call {}", number);
                return None;
            }
        };
        Some(call)
    }
}

/// Return value of a failed call
const FAILED: i32 = -1;

impl<P: Platform> Kernel<P> {
    /// Run `call` for the process on `cpu`
    ///
    /// A killed caller exits before the call runs.
    pub fn syscall(&self, cpu: CpuId, call: &mut Syscall) -> Poll<i32> {
        if self.checkpoint(cpu).is_pending() {
            return Poll::Pending;
        }

        let ret = match *call {
            Syscall::Fork => self.fork(cpu).map_or(FAILED, |pid| pid as i32),
            Syscall::Exit => {
                self.exit(cpu);
                return Poll::Pending;
            }
            Syscall::Wait => match self.wait(cpu) {
                Poll::Ready(r) => r.map_or(FAILED, |pid| pid as i32),
                Poll::Pending => return Poll::Pending,
            },
            Syscall::Kill(pid) => self.kill(cpu, pid).map_or(FAILED, |_| 0),
            Syscall::Getpid => self.getpid(cpu) as i32,
            Syscall::Sbrk(n) => self.sbrk(cpu, n).map_or(FAILED, |old| old as i32),
            Syscall::Sleep(n) => {
                let deadline = self.deadline(cpu, n);
                *call = Syscall::SleepUntil(deadline);
                return self.syscall_sleep(cpu, deadline);
            }
            Syscall::SleepUntil(deadline) => return self.syscall_sleep(cpu, deadline),
            Syscall::Uptime => self.uptime(cpu) as i32,
            Syscall::Procstat => {
                self.procstat(cpu);
                0
            }
            Syscall::Plevelstat => {
                self.plevelstat(cpu);
                0
            }
            Syscall::Nice(delta) => self.nice(cpu, delta).map_or(FAILED, |level| level as i32),
            Syscall::Semget { key, init } => match self.semget(cpu, key, init) {
                Ok(id) => id as i32,
                Err(e) => e.code(),
            },
            Syscall::Semfree(id) => self.semfree(cpu, id).map_or_else(|e| e.code(), |_| 0),
            Syscall::Semdown(id) => match self.semdown(cpu, id) {
                Poll::Ready(r) => r.map_or_else(|e| e.code(), |_| 0),
                Poll::Pending => return Poll::Pending,
            },
            Syscall::Semup(id) => self.semup(cpu, id).map_or_else(|e| e.code(), |_| 0),
        };
        Poll::Ready(ret)
    }

    fn syscall_sleep(&self, cpu: CpuId, deadline: Deadline) -> Poll<i32> {
        self.sleep_until(cpu, deadline)
            .map(|r| r.map_or(FAILED, |_| 0))
    }
}
