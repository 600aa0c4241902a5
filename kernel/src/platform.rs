//! Collaborator Interfaces
//!
//! The process core does not own memory management, the file layer, the
//! console or the register-level context switch. It reaches them through
//! the traits below; a kernel image supplies one value implementing all of
//! them (see [`Platform`]).

use x86_64::{PhysAddr, VirtAddr};

use crate::arch::Context;

/// Index of an execution unit (0..NCPU)
pub type CpuId = usize;

/// Open file handle owned by the file layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRef(pub u32);

/// In-memory inode handle owned by the file layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeRef(pub u32);

/// Per-CPU interrupt flag
pub trait Interrupts {
    /// Enable interrupts on `cpu`
    fn intr_on(&self, cpu: CpuId);
    /// Disable interrupts on `cpu`
    fn intr_off(&self, cpu: CpuId);
    /// Are interrupts enabled on `cpu`?
    fn intr_get(&self, cpu: CpuId) -> bool;
}

/// Register-level machine support
pub trait Machine: Interrupts {
    /// Build the context a new process starts from: the first dispatch
    /// enters the fork-return trampoline on `kstack`.
    fn new_context(&self, kstack: VirtAddr) -> Context;

    /// Copy the parent's trap frame into the child's kernel stack and clear
    /// the child's return register so `fork` returns 0 there.
    fn fork_trapframe(&self, parent_kstack: VirtAddr, child_kstack: VirtAddr);

    /// Build the user trap frame of the first process (entry 0, stack at the
    /// top of its single page).
    fn init_trapframe(&self, kstack: VirtAddr);

    /// Called by an idle scheduler loop between two scans
    fn idle(&self, _cpu: CpuId) {
        core::hint::spin_loop();
    }
}

/// Virtual memory and kernel stack allocation
pub trait Memory {
    /// Allocate one kernel stack; returns its top
    fn alloc_kstack(&self) -> Option<VirtAddr>;
    fn free_kstack(&self, kstack: VirtAddr);

    /// Create the address space of the first process with the init code
    /// loaded into its single page
    fn setup_init_space(&self) -> Option<PhysAddr>;

    /// Duplicate `size` bytes of `parent` copy-on-write
    fn copy_on_write(&self, parent: PhysAddr, size: usize) -> Option<PhysAddr>;

    /// Grow or shrink a user image; returns the new size
    fn resize(&self, pgdir: PhysAddr, old_size: usize, new_size: usize) -> Option<usize>;

    fn free_space(&self, pgdir: PhysAddr);

    /// Load a process's address space and kernel stack on `cpu`
    fn switch_user(&self, cpu: CpuId, pgdir: PhysAddr, kstack: VirtAddr);

    /// Return `cpu` to the kernel-only address space
    fn switch_kernel(&self, cpu: CpuId);
}

/// Open files and directory references
pub trait FileSystem {
    /// The root directory, with a fresh reference
    fn root(&self) -> InodeRef;
    fn file_dup(&self, file: FileRef) -> FileRef;
    fn file_close(&self, file: FileRef);
    fn inode_dup(&self, inode: InodeRef) -> InodeRef;
    /// Drop a directory reference inside a log transaction
    fn inode_put(&self, inode: InodeRef);
}

/// Console sink for diagnostic listings
pub trait Console {
    fn write_str(&self, s: &str);
}

/// Everything the process core needs from the rest of the kernel
pub trait Platform: Machine + Memory + FileSystem + Console {}

impl<T: Machine + Memory + FileSystem + Console> Platform for T {}
