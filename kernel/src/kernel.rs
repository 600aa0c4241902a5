//! The Kernel Instance
//!
//! [`Kernel`] owns every piece of shared scheduling state: the process
//! table with its priority levels, the semaphore table, the tick counter
//! and one [`Prcb`] per CPU. Entry points are methods taking `&self` and
//! the number of the CPU they run on, so one instance can be shared by
//! every scheduler loop.
//!
//! Three locks, acquired in this order only:
//! 1. `tickslock` or `semtable`
//! 2. `ptable`
//!
//! The process table lock also protects the priority levels.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::ke::prcb::Prcb;
use crate::ke::semaphore::SemTable;
use crate::ke::spinlock::{SpinLock, SpinLockGuard};
use crate::param::{Config, ConfigError, NCPU};
use crate::platform::{CpuId, Platform};
use crate::ps::ProcTable;

/// Kernel-wide scheduling counters
#[derive(Debug, Default)]
pub(crate) struct SchedCounters {
    pub aging_sweeps: AtomicU64,
    pub aging_promotions: AtomicU64,
    pub quantum_expirations: AtomicU64,
}

/// One kernel instance
pub struct Kernel<P: Platform> {
    platform: P,
    config: Config,
    cpus: [Prcb; NCPU],
    pub(crate) ptable: SpinLock<ProcTable>,
    pub(crate) semtable: SpinLock<SemTable>,
    pub(crate) tickslock: SpinLock<u32>,
    pub(crate) counters: SchedCounters,
}

impl<P: Platform> Kernel<P> {
    /// Build a kernel over `platform` with validated tunables
    pub fn new(platform: P, config: Config) -> Result<Self, ConfigError> {
        config.validate()?;

        log::info!(
            "kernel: {} cpus, quantum {} ticks, aging every {} ticks, age limit {}",
            NCPU,
            config.quantum,
            config.aging_step,
            config.age_limit
        );

        Ok(Self {
            platform,
            config,
            cpus: core::array::from_fn(Prcb::new),
            ptable: SpinLock::new("ptable", ProcTable::new()),
            semtable: SpinLock::new("semtable", SemTable::new()),
            tickslock: SpinLock::new("time", 0),
            counters: SchedCounters::default(),
        })
    }

    #[inline]
    pub fn platform(&self) -> &P {
        &self.platform
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Processor control block of `cpu`
    #[inline]
    pub fn prcb(&self, cpu: CpuId) -> &Prcb {
        &self.cpus[cpu]
    }

    pub(crate) fn lock_ptable(&self, cpu: CpuId) -> SpinLockGuard<'_, ProcTable> {
        self.ptable.lock(&self.cpus[cpu], &self.platform)
    }

    pub(crate) fn lock_semtable(&self, cpu: CpuId) -> SpinLockGuard<'_, SemTable> {
        self.semtable.lock(&self.cpus[cpu], &self.platform)
    }

    pub(crate) fn lock_ticks(&self, cpu: CpuId) -> SpinLockGuard<'_, u32> {
        self.tickslock.lock(&self.cpus[cpu], &self.platform)
    }

    /// Total dispatches over every CPU
    pub fn context_switches(&self) -> u64 {
        self.cpus.iter().map(Prcb::context_switches).sum()
    }

    #[inline]
    pub(crate) fn count(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
