//! Simulated platform for unit tests
//!
//! [`SimPlatform`] implements every collaborator trait with counters in
//! place of real memory, files and devices, plus switches that make the
//! next allocation fail. The helpers boot a kernel on it and run one
//! scheduling pass at a time with a closure standing in for the process.

use core::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::string::String;

use x86_64::{PhysAddr, VirtAddr};

use crate::arch::Context;
use crate::kernel::Kernel;
use crate::param::{Config, NCPU, PGSIZE};
use crate::platform::{Console, CpuId, FileRef, FileSystem, InodeRef, Interrupts, Machine, Memory};
use crate::ps::{Pid, ProcState};

const KSTACK_BASE: u64 = 0xffff_8000_0010_0000;
const KSTACK_SIZE: u64 = 0x2000;
const FORKRET: u64 = 0xffff_8000_0000_1000;

/// Counting stand-in for the rest of the kernel
pub struct SimPlatform {
    intr: [AtomicBool; NCPU],
    next_kstack: AtomicU64,
    live_kstacks: AtomicI64,
    next_space: AtomicU64,
    live_spaces: AtomicI64,
    cow_copies: AtomicUsize,
    user_switches: AtomicUsize,
    file_dups: AtomicUsize,
    file_closes: AtomicUsize,
    inode_refs: AtomicI64,
    fail_kstack: AtomicBool,
    fail_cow: AtomicBool,
    fail_resize: AtomicBool,
    console: spin::Mutex<String>,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            intr: core::array::from_fn(|_| AtomicBool::new(false)),
            next_kstack: AtomicU64::new(0),
            live_kstacks: AtomicI64::new(0),
            next_space: AtomicU64::new(1),
            live_spaces: AtomicI64::new(0),
            cow_copies: AtomicUsize::new(0),
            user_switches: AtomicUsize::new(0),
            file_dups: AtomicUsize::new(0),
            file_closes: AtomicUsize::new(0),
            inode_refs: AtomicI64::new(0),
            fail_kstack: AtomicBool::new(false),
            fail_cow: AtomicBool::new(false),
            fail_resize: AtomicBool::new(false),
            console: spin::Mutex::new(String::new()),
        }
    }

    pub fn fail_kstack(&self, fail: bool) {
        self.fail_kstack.store(fail, Ordering::Relaxed);
    }

    pub fn fail_cow(&self, fail: bool) {
        self.fail_cow.store(fail, Ordering::Relaxed);
    }

    pub fn fail_resize(&self, fail: bool) {
        self.fail_resize.store(fail, Ordering::Relaxed);
    }

    pub fn live_kstacks(&self) -> i64 {
        self.live_kstacks.load(Ordering::Relaxed)
    }

    pub fn live_spaces(&self) -> i64 {
        self.live_spaces.load(Ordering::Relaxed)
    }

    pub fn cow_copies(&self) -> usize {
        self.cow_copies.load(Ordering::Relaxed)
    }

    pub fn user_switches(&self) -> usize {
        self.user_switches.load(Ordering::Relaxed)
    }

    pub fn file_dups(&self) -> usize {
        self.file_dups.load(Ordering::Relaxed)
    }

    pub fn file_closes(&self) -> usize {
        self.file_closes.load(Ordering::Relaxed)
    }

    /// Directory references handed out and not yet put
    pub fn inode_refs(&self) -> i64 {
        self.inode_refs.load(Ordering::Relaxed)
    }

    pub fn console_output(&self) -> String {
        self.console.lock().clone()
    }

    fn new_space(&self) -> PhysAddr {
        let n = self.next_space.fetch_add(1, Ordering::Relaxed);
        self.live_spaces.fetch_add(1, Ordering::Relaxed);
        PhysAddr::new(n * PGSIZE as u64)
    }
}

impl Interrupts for SimPlatform {
    fn intr_on(&self, cpu: CpuId) {
        self.intr[cpu].store(true, Ordering::Relaxed);
    }

    fn intr_off(&self, cpu: CpuId) {
        self.intr[cpu].store(false, Ordering::Relaxed);
    }

    fn intr_get(&self, cpu: CpuId) -> bool {
        self.intr[cpu].load(Ordering::Relaxed)
    }
}

impl Machine for SimPlatform {
    fn new_context(&self, kstack: VirtAddr) -> Context {
        Context::with_entry(kstack, FORKRET)
    }

    fn fork_trapframe(&self, _parent_kstack: VirtAddr, _child_kstack: VirtAddr) {}

    fn init_trapframe(&self, _kstack: VirtAddr) {}
}

impl Memory for SimPlatform {
    fn alloc_kstack(&self) -> Option<VirtAddr> {
        if self.fail_kstack.load(Ordering::Relaxed) {
            return None;
        }
        let n = self.next_kstack.fetch_add(1, Ordering::Relaxed);
        self.live_kstacks.fetch_add(1, Ordering::Relaxed);
        Some(VirtAddr::new(KSTACK_BASE + (n + 1) * KSTACK_SIZE))
    }

    fn free_kstack(&self, _kstack: VirtAddr) {
        self.live_kstacks.fetch_sub(1, Ordering::Relaxed);
    }

    fn setup_init_space(&self) -> Option<PhysAddr> {
        Some(self.new_space())
    }

    fn copy_on_write(&self, _parent: PhysAddr, _size: usize) -> Option<PhysAddr> {
        if self.fail_cow.load(Ordering::Relaxed) {
            return None;
        }
        self.cow_copies.fetch_add(1, Ordering::Relaxed);
        Some(self.new_space())
    }

    fn resize(&self, _pgdir: PhysAddr, _old_size: usize, new_size: usize) -> Option<usize> {
        if self.fail_resize.load(Ordering::Relaxed) {
            return None;
        }
        Some(new_size)
    }

    fn free_space(&self, _pgdir: PhysAddr) {
        self.live_spaces.fetch_sub(1, Ordering::Relaxed);
    }

    fn switch_user(&self, _cpu: CpuId, _pgdir: PhysAddr, _kstack: VirtAddr) {
        self.user_switches.fetch_add(1, Ordering::Relaxed);
    }

    fn switch_kernel(&self, _cpu: CpuId) {}
}

impl FileSystem for SimPlatform {
    fn root(&self) -> InodeRef {
        self.inode_refs.fetch_add(1, Ordering::Relaxed);
        InodeRef(1)
    }

    fn file_dup(&self, file: FileRef) -> FileRef {
        self.file_dups.fetch_add(1, Ordering::Relaxed);
        file
    }

    fn file_close(&self, _file: FileRef) {
        self.file_closes.fetch_add(1, Ordering::Relaxed);
    }

    fn inode_dup(&self, inode: InodeRef) -> InodeRef {
        self.inode_refs.fetch_add(1, Ordering::Relaxed);
        inode
    }

    fn inode_put(&self, _inode: InodeRef) {
        self.inode_refs.fetch_sub(1, Ordering::Relaxed);
    }
}

impl Console for SimPlatform {
    fn write_str(&self, s: &str) {
        self.console.lock().push_str(s);
    }
}

// ============================================================================
// Kernel helpers
// ============================================================================

/// A kernel with default tunables and init created
pub fn boot() -> Kernel<SimPlatform> {
    boot_with(Config::default())
}

pub fn boot_with(config: Config) -> Kernel<SimPlatform> {
    let kernel = Kernel::new(SimPlatform::new(), config).unwrap();
    kernel.userinit(0);
    kernel
}

/// One scheduling pass on `cpu`, running the dispatched process as `body`
pub fn run_next<F>(kernel: &Kernel<SimPlatform>, cpu: CpuId, body: F) -> Option<Pid>
where
    F: FnOnce(&Kernel<SimPlatform>, CpuId, Pid),
{
    let mut body = Some(body);
    kernel.schedule_once(cpu, &mut |k: &Kernel<SimPlatform>, cpu: CpuId, pid: Pid| {
        let body = body.take().unwrap();
        body(k, cpu, pid)
    })
}

/// Dispatch init, fork once and yield; returns the child's pid
///
/// Init must be the next process to run.
pub fn fork_from_init(kernel: &Kernel<SimPlatform>) -> Pid {
    let mut child = None;
    let ran = run_next(kernel, 0, |k, cpu, _| {
        child = Some(k.fork(cpu).unwrap());
        k.yield_cpu(cpu);
    });
    assert_eq!(ran, Some(1), "init was not next to run");
    child.unwrap()
}

pub fn slot_of(kernel: &Kernel<SimPlatform>, pid: Pid) -> usize {
    kernel.lock_ptable(0).find(pid).unwrap()
}

pub fn state_of(kernel: &Kernel<SimPlatform>, pid: Pid) -> ProcState {
    let table = kernel.lock_ptable(0);
    table.proc(table.find(pid).unwrap()).state
}

pub fn level_of(kernel: &Kernel<SimPlatform>, pid: Pid) -> usize {
    let table = kernel.lock_ptable(0);
    table.proc(table.find(pid).unwrap()).level
}
