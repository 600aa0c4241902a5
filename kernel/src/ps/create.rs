//! Process Creation
//!
//! - `userinit`: build the init process
//! - `fork`: duplicate the calling process
//! - `sbrk`: grow or shrink the caller's image
//!
//! A new slot is reserved as EMBRYO under the process table lock. Its
//! kernel stack and address space are then built with the lock released
//! (nobody else touches an EMBRYO slot), and it becomes RUNNABLE by
//! being enqueued under the lock again.

use x86_64::VirtAddr;

use crate::kernel::Kernel;
use crate::ke::bugcheck::{codes, ke_bug_check, ke_bug_check_ex};
use crate::param::PGSIZE;
use crate::platform::{CpuId, Platform};
use super::{Pid, ProcError, ProcName};

// ============================================================================
// Slot Allocation
// ============================================================================

impl<P: Platform> Kernel<P> {
    /// Reserve a slot with a kernel stack and a fresh context
    fn allocproc(&self, cpu: CpuId) -> Result<(usize, Pid, VirtAddr), ProcError> {
        let level = self.config().default_level;
        let (slot, pid) = self
            .lock_ptable(cpu)
            .allocate(level)
            .ok_or(ProcError::NoFreeSlot)?;

        let Some(kstack) = self.platform().alloc_kstack() else {
            self.lock_ptable(cpu).release(slot);
            return Err(ProcError::OutOfMemory);
        };
        let context = self.platform().new_context(kstack);

        let mut table = self.lock_ptable(cpu);
        let p = table.proc_mut(slot);
        p.kstack = Some(kstack);
        p.context = context;
        Ok((slot, pid, kstack))
    }

    /// Undo [`Kernel::allocproc`]
    fn freeproc(&self, cpu: CpuId, slot: usize, kstack: VirtAddr) {
        self.platform().free_kstack(kstack);
        self.lock_ptable(cpu).release(slot);
    }
}

// ============================================================================
// Process Creation
// ============================================================================

impl<P: Platform> Kernel<P> {
    /// Create the init process
    ///
    /// Runs once at boot, before any scheduler loop. Failure stops the
    /// kernel.
    pub fn userinit(&self, cpu: CpuId) -> Pid {
        if self.lock_ptable(cpu).init_slot().is_some() {
            ke_bug_check(codes::INIT_SETUP_FAILED, "userinit: init already exists");
        }

        let (slot, pid, kstack) = match self.allocproc(cpu) {
            Ok(created) => created,
            Err(_) => ke_bug_check(codes::INIT_SETUP_FAILED, "userinit: out of slots"),
        };
        let Some(pgdir) = self.platform().setup_init_space() else {
            ke_bug_check(codes::INIT_SETUP_FAILED, "userinit: out of memory");
        };
        self.platform().init_trapframe(kstack);
        let cwd = self.platform().root();

        let mut table = self.lock_ptable(cpu);
        let p = table.proc_mut(slot);
        p.name = ProcName::new("initcode");
        p.pgdir = Some(pgdir);
        p.sz = PGSIZE;
        p.cwd = Some(cwd);
        table.init = Some(slot);
        table.enqueue(slot);

        log::info!("userinit: init is pid {}", pid);
        pid
    }

    /// Duplicate the calling process
    ///
    /// The child shares the parent's address space copy-on-write, holds
    /// duplicates of its open files and working directory, and is attached
    /// to every semaphore the parent holds. It starts at the default level.
    /// Returns the child's pid; the child itself sees 0 through its trap
    /// frame.
    pub fn fork(&self, cpu: CpuId) -> Result<Pid, ProcError> {
        let parent = self.current_slot(cpu);
        let (child, pid, kstack) = self.allocproc(cpu)?;

        let parent_proc = *self.lock_ptable(cpu).proc(parent);
        let copied = parent_proc
            .pgdir
            .and_then(|pgdir| self.platform().copy_on_write(pgdir, parent_proc.sz));
        let Some(pgdir) = copied else {
            self.freeproc(cpu, child, kstack);
            log::warn!("fork: pid {} out of memory", parent_proc.pid);
            return Err(ProcError::OutOfMemory);
        };
        if let Some(parent_kstack) = parent_proc.kstack {
            self.platform().fork_trapframe(parent_kstack, kstack);
        }

        let mut ofile = parent_proc.ofile;
        for file in ofile.iter_mut().flatten() {
            *file = self.platform().file_dup(*file);
        }
        let cwd = parent_proc.cwd.map(|inode| self.platform().inode_dup(inode));

        self.semcopy(cpu, parent, child);

        let mut table = self.lock_ptable(cpu);
        let p = table.proc_mut(child);
        p.name = parent_proc.name;
        p.parent = Some(parent);
        p.pgdir = Some(pgdir);
        p.sz = parent_proc.sz;
        p.ofile = ofile;
        p.cwd = cwd;
        table.enqueue(child);

        log::debug!("fork: pid {} -> pid {}", parent_proc.pid, pid);
        Ok(pid)
    }

    /// Grow the caller's image by `n` bytes (shrink if negative)
    ///
    /// Returns the previous size.
    pub fn sbrk(&self, cpu: CpuId, n: isize) -> Result<usize, ProcError> {
        let slot = self.current_slot(cpu);
        let (pgdir, kstack, old) = {
            let table = self.lock_ptable(cpu);
            let p = table.proc(slot);
            (p.pgdir, p.kstack, p.sz)
        };
        let (Some(pgdir), Some(kstack)) = (pgdir, kstack) else {
            ke_bug_check_ex(codes::NULL_PROCESS, slot as u64, "sbrk: no address space");
        };

        let target = old.checked_add_signed(n).ok_or(ProcError::GrowFailed)?;
        let new = self
            .platform()
            .resize(pgdir, old, target)
            .ok_or(ProcError::GrowFailed)?;

        self.lock_ptable(cpu).proc_mut(slot).sz = new;
        self.platform().switch_user(cpu, pgdir, kstack);
        Ok(old)
    }
}
