//! Process Manager (ps)
//!
//! The process table is a fixed array of slots. A slot index is how the
//! kernel refers to a process internally (queue links, parent links, the
//! per-CPU running slot); the pid is the stable external name and is never
//! reused while the slot is alive or a zombie.
//!
//! - `level` - the MLFQ ready structure threaded through the table
//! - `create` - `userinit`, `fork`, `sbrk`
//! - `exit` - `exit`, `wait`, `kill`, the kill checkpoint
//! - `dump` - `procstat` / `plevelstat` console listings

pub mod level;
pub mod create;
pub mod exit;
pub mod dump;

use core::fmt;

use bitflags::bitflags;
use x86_64::{PhysAddr, VirtAddr};

use crate::arch::Context;
use crate::ke::bugcheck::{codes, ke_bug_check_ex};
use crate::ke::wait::Channel;
use crate::param::{NCPU, NOFILE, NPROC, PLEVELS, PROC_NAME_LEN};
use crate::platform::{CpuId, FileRef, InodeRef};

pub use level::Level;

/// Process identifier
pub type Pid = u32;

/// Process lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcState {
    /// Slot is free
    Unused = 0,
    /// Slot reserved, process being built
    Embryo = 1,
    /// Blocked on a channel
    Sleeping = 2,
    /// Linked into its priority level, waiting for a CPU
    Runnable = 3,
    /// Executing on a CPU
    Running = 4,
    /// Exited, waiting to be reaped by its parent
    Zombie = 5,
}

impl ProcState {
    /// Fixed-width name used by the console listings
    pub fn name(self) -> &'static str {
        match self {
            ProcState::Unused => "unused  ",
            ProcState::Embryo => "embryo  ",
            ProcState::Sleeping => "sleep   ",
            ProcState::Runnable => "RUNNABLE",
            ProcState::Running => "running ",
            ProcState::Zombie => "zombie  ",
        }
    }
}

bitflags! {
    /// Per-process flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ProcFlags: u8 {
        /// Killed; exits at its next checkpoint
        const KILLED = 1 << 0;
    }
}

/// Process name, NUL padded
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ProcName([u8; PROC_NAME_LEN]);

impl ProcName {
    pub const fn empty() -> Self {
        Self([0; PROC_NAME_LEN])
    }

    /// Copy `name`, truncated to fit with a terminating NUL
    pub fn new(name: &str) -> Self {
        let mut bytes = [0; PROC_NAME_LEN];
        let mut len = name.len().min(PROC_NAME_LEN - 1);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self(bytes)
    }

    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(PROC_NAME_LEN);
        core::str::from_utf8(&self.0[..len]).unwrap_or("???")
    }
}

impl fmt::Display for ProcName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ProcName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

/// One slot of the process table
#[derive(Debug, Clone, Copy)]
pub struct Proc {
    pub pid: Pid,
    pub name: ProcName,
    pub state: ProcState,
    /// Parent slot; a relation only, the parent reaps but does not own
    pub parent: Option<usize>,
    /// Priority level index (0 = highest)
    pub level: usize,
    /// Aging sweeps spent runnable without being dispatched
    pub age: u32,
    /// Clock ticks consumed in the current quantum
    pub ticks: u32,
    pub flags: ProcFlags,
    /// What the process sleeps on, if anything
    pub chan: Option<Channel>,
    /// Register context restored on dispatch
    pub context: Context,
    /// Top of the kernel stack
    pub kstack: Option<VirtAddr>,
    /// Root of the user page table
    pub pgdir: Option<PhysAddr>,
    /// Size of the user image in bytes
    pub sz: usize,
    pub ofile: [Option<FileRef>; NOFILE],
    pub cwd: Option<InodeRef>,
    /// Toward the head of the level (more recently enqueued)
    pub(crate) back: Option<usize>,
    /// Toward the tail of the level (enqueued earlier)
    pub(crate) next: Option<usize>,
}

impl Proc {
    pub const fn new() -> Self {
        Self {
            pid: 0,
            name: ProcName::empty(),
            state: ProcState::Unused,
            parent: None,
            level: 0,
            age: 0,
            ticks: 0,
            flags: ProcFlags::empty(),
            chan: None,
            context: Context::new(),
            kstack: None,
            pgdir: None,
            sz: 0,
            ofile: [None; NOFILE],
            cwd: None,
            back: None,
            next: None,
        }
    }

    #[inline]
    pub fn killed(&self) -> bool {
        self.flags.contains(ProcFlags::KILLED)
    }
}

impl Default for Proc {
    fn default() -> Self {
        Self::new()
    }
}

/// The process table and the priority levels threaded through it
///
/// Guarded as a whole by the process table lock.
pub struct ProcTable {
    pub(crate) procs: [Proc; NPROC],
    pub(crate) levels: [Level; PLEVELS],
    /// Slot each CPU is running
    pub(crate) running: [Option<usize>; NCPU],
    /// Slot of the init process
    pub(crate) init: Option<usize>,
    next_pid: Pid,
}

impl ProcTable {
    pub const fn new() -> Self {
        const UNUSED: Proc = Proc::new();
        const EMPTY: Level = Level::new();

        Self {
            procs: [UNUSED; NPROC],
            levels: [EMPTY; PLEVELS],
            running: [None; NCPU],
            init: None,
            next_pid: 1,
        }
    }

    #[inline]
    pub fn proc(&self, slot: usize) -> &Proc {
        &self.procs[slot]
    }

    #[inline]
    pub fn proc_mut(&mut self, slot: usize) -> &mut Proc {
        &mut self.procs[slot]
    }

    /// Slot of the live or zombie process `pid`
    pub fn find(&self, pid: Pid) -> Option<usize> {
        self.procs
            .iter()
            .position(|p| p.state != ProcState::Unused && p.pid == pid)
    }

    /// Slot running on `cpu`
    #[inline]
    pub fn current(&self, cpu: CpuId) -> Option<usize> {
        self.running[cpu]
    }

    /// Slot running on `cpu`; stops the kernel if there is none
    pub fn myproc(&self, cpu: CpuId) -> usize {
        match self.running[cpu] {
            Some(slot) => slot,
            None => ke_bug_check_ex(codes::NO_CURRENT_PROCESS, cpu as u64, "no process on cpu"),
        }
    }

    /// Slot of the init process, once it exists
    #[inline]
    pub fn init_slot(&self) -> Option<usize> {
        self.init
    }

    /// Reserve an UNUSED slot as EMBRYO with a fresh pid
    pub fn allocate(&mut self, level: usize) -> Option<(usize, Pid)> {
        let slot = self.procs.iter().position(|p| p.state == ProcState::Unused)?;
        let pid = self.next_pid;
        self.next_pid += 1;

        let p = &mut self.procs[slot];
        *p = Proc::new();
        p.state = ProcState::Embryo;
        p.pid = pid;
        p.level = level;
        Some((slot, pid))
    }

    /// Return a slot to UNUSED, clearing its identity
    pub fn release(&mut self, slot: usize) {
        if self.is_linked(slot) {
            ke_bug_check_ex(codes::PROCESS_ALREADY_QUEUED, slot as u64, "release of queued process");
        }
        self.procs[slot] = Proc::new();
    }

    /// Slots whose parent is `parent`
    pub fn children(&self, parent: usize) -> impl Iterator<Item = usize> + '_ {
        self.procs
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.state != ProcState::Unused && p.parent == Some(parent))
            .map(|(slot, _)| slot)
    }

    /// Number of slots not UNUSED
    pub fn live_count(&self) -> usize {
        self.procs.iter().filter(|p| p.state != ProcState::Unused).count()
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Recoverable process-management failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcError {
    /// No UNUSED slot in the process table
    NoFreeSlot,
    /// Kernel stack or address space could not be allocated
    OutOfMemory,
    /// `wait` with no children
    NoChildren,
    /// The caller was killed while it waited
    Killed,
    /// No process with that pid
    NotFound,
    /// `nice` would leave the level range
    LevelOutOfRange,
    /// The memory collaborator refused to resize the image
    GrowFailed,
}

impl fmt::Display for ProcError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProcError::NoFreeSlot => write!(f, "process table full"),
            ProcError::OutOfMemory => write!(f, "out of memory"),
            ProcError::NoChildren => write!(f, "no children"),
            ProcError::Killed => write!(f, "killed"),
            ProcError::NotFound => write!(f, "no such process"),
            ProcError::LevelOutOfRange => write!(f, "priority level out of range"),
            ProcError::GrowFailed => write!(f, "cannot resize process image"),
        }
    }
}
