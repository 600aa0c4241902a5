//! Kernel Counting Semaphores
//!
//! A fixed system table of counting semaphores shared between processes.
//! A process attaches to a semaphore through one of its descriptors; the
//! semaphore's reference count is the number of descriptors pointing at
//! it, over all processes. A semaphore with no references is free and its
//! slot is reused by the next `semget(-1, ..)`.
//!
//! Descriptors are kept here, indexed by process slot, so the semaphore
//! lock alone guards both sides of every reference.
//!
//! # Usage
//! ```ignore
//! let id = kernel.semget(cpu, SEM_NEW, 1)?;
//! // Poll::Pending: asleep, re-issue when dispatched again
//! kernel.semdown(cpu, id)
//! kernel.semup(cpu, id)?;
//! kernel.semfree(cpu, id)?;
//! ```
//!
//! Lock order: the semaphore lock may be held while taking the process
//! table lock (to sleep or wake), never the other way round.

use core::fmt;
use core::task::Poll;

use crate::kernel::Kernel;
use crate::ke::wait::Channel;
use crate::param::{NPROC, PROCESSMAXSEM, SYSMAXSEM};
use crate::platform::{CpuId, Platform};

/// Semaphore identifier: an index into the system table
pub type SemId = usize;

/// `semget` key requesting a new semaphore
pub const SEM_NEW: i32 = -1;

/// Semaphore operation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemError {
    /// Out of range, unused, or not attached to the caller
    InvalidKey,
    /// The caller already holds `PROCESSMAXSEM` descriptors
    ProcessLimit,
    /// All `SYSMAXSEM` semaphores are in use
    SystemLimit,
    /// `semup` on a semaphore already at `i32::MAX`
    Overflow,
}

impl SemError {
    /// System call return value
    pub const fn code(self) -> i32 {
        match self {
            SemError::InvalidKey => -2,
            SemError::ProcessLimit => -3,
            SemError::SystemLimit => -4,
            SemError::Overflow => -1,
        }
    }
}

impl fmt::Display for SemError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SemError::InvalidKey => write!(f, "invalid semaphore key"),
            SemError::ProcessLimit => write!(f, "too many semaphores in this process"),
            SemError::SystemLimit => write!(f, "too many semaphores in the system"),
            SemError::Overflow => write!(f, "semaphore value overflow"),
        }
    }
}

/// One semaphore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Semaphore {
    pub value: i32,
    /// Attached descriptors; 0 means free
    pub refs: u32,
}

/// Semaphore descriptors of one process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Descriptors {
    ids: [Option<SemId>; PROCESSMAXSEM],
}

impl Descriptors {
    pub const fn new() -> Self {
        Self {
            ids: [None; PROCESSMAXSEM],
        }
    }

    /// Attached semaphore ids, in descriptor order
    pub fn iter(&self) -> impl Iterator<Item = SemId> + '_ {
        self.ids.iter().flatten().copied()
    }

    pub fn count(&self) -> usize {
        self.ids.iter().filter(|id| id.is_some()).count()
    }

    pub fn contains(&self, id: SemId) -> bool {
        self.ids.contains(&Some(id))
    }

    fn attach(&mut self, id: SemId) -> Result<(), SemError> {
        let free = self
            .ids
            .iter_mut()
            .find(|d| d.is_none())
            .ok_or(SemError::ProcessLimit)?;
        *free = Some(id);
        Ok(())
    }

    fn detach(&mut self, id: SemId) -> Result<(), SemError> {
        let slot = self
            .ids
            .iter_mut()
            .find(|d| **d == Some(id))
            .ok_or(SemError::InvalidKey)?;
        *slot = None;
        Ok(())
    }

    fn is_full(&self) -> bool {
        self.ids.iter().all(|d| d.is_some())
    }
}

// ============================================================================
// System Semaphore Table
// ============================================================================

/// The system semaphore table and every process's descriptors
pub struct SemTable {
    sems: [Semaphore; SYSMAXSEM],
    descriptors: [Descriptors; NPROC],
}

impl SemTable {
    pub const fn new() -> Self {
        const FREE: Semaphore = Semaphore { value: 0, refs: 0 };
        const NONE: Descriptors = Descriptors::new();

        Self {
            sems: [FREE; SYSMAXSEM],
            descriptors: [NONE; NPROC],
        }
    }

    /// Create or attach for process `slot`
    pub fn get(&mut self, slot: usize, key: i32, init: i32) -> Result<SemId, SemError> {
        if key == SEM_NEW {
            if self.descriptors[slot].is_full() {
                return Err(SemError::ProcessLimit);
            }
            let id = self
                .sems
                .iter()
                .position(|s| s.refs == 0)
                .ok_or(SemError::SystemLimit)?;
            self.descriptors[slot].attach(id)?;
            self.sems[id] = Semaphore { value: init, refs: 1 };
            return Ok(id);
        }

        let id = self.live(key)?;
        self.descriptors[slot].attach(id)?;
        self.sems[id].refs += 1;
        Ok(id)
    }

    /// Detach `id` from process `slot`, freeing it with the last reference
    pub fn free(&mut self, slot: usize, id: i32) -> Result<(), SemError> {
        let id = self.attached(slot, id)?;
        self.descriptors[slot].detach(id)?;
        self.sems[id].refs -= 1;
        Ok(())
    }

    /// Validate `id` for process `slot`
    pub fn attached(&self, slot: usize, id: i32) -> Result<SemId, SemError> {
        let id = self.live(id)?;
        if !self.descriptors[slot].contains(id) {
            return Err(SemError::InvalidKey);
        }
        Ok(id)
    }

    fn live(&self, key: i32) -> Result<SemId, SemError> {
        let id = usize::try_from(key).map_err(|_| SemError::InvalidKey)?;
        match self.sems.get(id) {
            Some(sem) if sem.refs > 0 => Ok(id),
            _ => Err(SemError::InvalidKey),
        }
    }

    /// Give `child` every descriptor of `parent`
    pub fn copy(&mut self, parent: usize, child: usize) {
        self.descriptors[child] = self.descriptors[parent];
        for id in self.descriptors[parent].ids.iter().flatten() {
            self.sems[*id].refs += 1;
        }
    }

    /// Drop every descriptor of process `slot`; returns how many
    pub fn release_all(&mut self, slot: usize) -> usize {
        let mut released = 0;
        for id in self.descriptors[slot].ids.iter_mut() {
            if let Some(sem) = id.take() {
                self.sems[sem].refs -= 1;
                released += 1;
            }
        }
        released
    }

    #[inline]
    pub fn semaphore(&self, id: SemId) -> Option<&Semaphore> {
        self.sems.get(id).filter(|s| s.refs > 0)
    }

    #[inline]
    pub fn descriptors(&self, slot: usize) -> &Descriptors {
        &self.descriptors[slot]
    }

    /// Semaphores in use
    pub fn in_use(&self) -> usize {
        self.sems.iter().filter(|s| s.refs > 0).count()
    }
}

impl Default for SemTable {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Semaphore Operations
// ============================================================================

impl<P: Platform> Kernel<P> {
    /// Create (`key == SEM_NEW`) or attach to a semaphore
    pub fn semget(&self, cpu: CpuId, key: i32, init: i32) -> Result<SemId, SemError> {
        let slot = self.current_slot(cpu);
        let id = self.lock_semtable(cpu).get(slot, key, init)?;
        log::debug!("semget key {} init {} -> sem {}", key, init, id);
        Ok(id)
    }

    /// Detach the caller from semaphore `id`
    pub fn semfree(&self, cpu: CpuId, id: i32) -> Result<(), SemError> {
        let slot = self.current_slot(cpu);
        self.lock_semtable(cpu).free(slot, id)?;
        log::debug!("semfree sem {}", id);
        Ok(())
    }

    /// Take one unit of semaphore `id`, sleeping while none is available
    pub fn semdown(&self, cpu: CpuId, id: i32) -> Poll<Result<(), SemError>> {
        let slot = self.current_slot(cpu);
        let mut table = self.lock_semtable(cpu);
        let id = match table.attached(slot, id) {
            Ok(id) => id,
            Err(e) => return Poll::Ready(Err(e)),
        };

        if table.sems[id].value <= 0 {
            self.sleep(cpu, Channel::Semaphore(id), table);
            return Poll::Pending;
        }
        table.sems[id].value -= 1;
        Poll::Ready(Ok(()))
    }

    /// Return one unit to semaphore `id` and wake its sleepers
    ///
    /// A semaphore at `i32::MAX` is left unchanged.
    pub fn semup(&self, cpu: CpuId, id: i32) -> Result<(), SemError> {
        let slot = self.current_slot(cpu);
        let mut table = self.lock_semtable(cpu);
        let id = table.attached(slot, id)?;

        let sem = &mut table.sems[id];
        sem.value = sem.value.checked_add(1).ok_or(SemError::Overflow)?;
        self.wakeup(cpu, Channel::Semaphore(id));
        Ok(())
    }

    /// Share every semaphore of `parent` with `child`
    pub(crate) fn semcopy(&self, cpu: CpuId, parent: usize, child: usize) {
        self.lock_semtable(cpu).copy(parent, child);
    }

    /// Drop every semaphore reference held by process `slot`
    pub(crate) fn release_semaphores(&self, cpu: CpuId, slot: usize) {
        let released = self.lock_semtable(cpu).release_all(slot);
        if released > 0 {
            log::debug!("released {} semaphores of slot {}", released, slot);
        }
    }

    /// Value and reference count of semaphore `id`, if it is in use
    pub fn semstat(&self, cpu: CpuId, id: SemId) -> Option<Semaphore> {
        self.lock_semtable(cpu).semaphore(id).copied()
    }
}
