//! MLFQ Process Core
//!
//! The process-management core of a small multiprocessor kernel:
//!
//! - **ke** - Kernel Executive: MLFQ scheduler, aging, sleep/wakeup,
//!   counting semaphores, spinlocks, bug check
//! - **ps** - Process Manager: process table, priority levels, fork,
//!   exit/wait/kill, listings
//! - **syscall** - system call decoding and return conventions
//! - **platform** - the collaborators the core relies on (memory, files,
//!   console, context switch)
//!
//! # Boot
//!
//! ```ignore
//! let kernel = Kernel::new(platform, Config::default())?;
//! kernel.userinit(0);
//! // on every CPU
//! kernel.scheduler(cpu, &mut dispatcher);
//! ```

#![cfg_attr(not(test), no_std)]
#![allow(clippy::new_without_default)]
#![allow(clippy::needless_range_loop)]

pub mod arch;
pub mod console;
pub mod ke;
pub mod kernel;
pub mod param;
pub mod platform;
pub mod ps;
pub mod syscall;

#[cfg(test)]
mod testing;

pub use kernel::Kernel;
pub use param::{Config, ConfigError};
pub use platform::{CpuId, Platform};
pub use ps::{Pid, ProcError, ProcState};
pub use syscall::{Syscall, SyscallArgs};
