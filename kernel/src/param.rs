//! Kernel Parameters
//!
//! Compile-time capacities size the fixed tables; the scheduling tunables
//! can be chosen per kernel instance through [`Config`].

use core::fmt;

/// Maximum number of processes
pub const NPROC: usize = 64;

/// Maximum number of CPUs
pub const NCPU: usize = 8;

/// Open files per process
pub const NOFILE: usize = 16;

/// Length of a process name, including the terminating NUL
pub const PROC_NAME_LEN: usize = 16;

/// Number of priority levels (0 = highest)
pub const PLEVELS: usize = 4;

/// Maximum semaphores attached to one process
pub const PROCESSMAXSEM: usize = 5;

/// Maximum semaphores on the system
pub const SYSMAXSEM: usize = 20;

/// Size of the initial user image created by `userinit`
pub const PGSIZE: usize = 4096;

/// Default scheduling tunables
pub mod defaults {
    /// Ticks a process may run before it yields and decays
    pub const QUANTUM: u32 = 3;
    /// Ticks between aging sweeps
    pub const AGING_STEP: u32 = 50;
    /// Sweeps a runnable process may wait before promotion
    pub const AGE_LIMIT: u32 = 5;
    /// Starting priority level of every process
    pub const DEFAULT_LEVEL: usize = 0;
}

/// Scheduling tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Ticks per scheduling quantum
    pub quantum: u32,
    /// Clock ticks between two aging sweeps
    pub aging_step: u32,
    /// Age at which a waiting process is promoted one level
    pub age_limit: u32,
    /// Level assigned to new processes
    pub default_level: usize,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            quantum: defaults::QUANTUM,
            aging_step: defaults::AGING_STEP,
            age_limit: defaults::AGE_LIMIT,
            default_level: defaults::DEFAULT_LEVEL,
        }
    }

    /// Check that every tunable is usable by the scheduler
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quantum == 0 {
            return Err(ConfigError::ZeroQuantum);
        }
        if self.aging_step == 0 {
            return Err(ConfigError::ZeroAgingStep);
        }
        if self.age_limit == 0 {
            return Err(ConfigError::ZeroAgeLimit);
        }
        if self.default_level >= PLEVELS {
            return Err(ConfigError::DefaultLevelOutOfRange(self.default_level));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejected scheduling configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    ZeroQuantum,
    ZeroAgingStep,
    ZeroAgeLimit,
    DefaultLevelOutOfRange(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::ZeroQuantum => write!(f, "quantum must be at least one tick"),
            ConfigError::ZeroAgingStep => write!(f, "aging step must be at least one tick"),
            ConfigError::ZeroAgeLimit => write!(f, "age limit must be at least one sweep"),
            ConfigError::DefaultLevelOutOfRange(level) => {
                write!(f, "default level {} outside 0..{}", level, PLEVELS)
            }
        }
    }
}
