//! Kernel Executive (ke)
//!
//! Scheduling and synchronization:
//!
//! - **Scheduler**: MLFQ dispatch loop, `sched`, yield and nice
//! - **Aging**: periodic promotion of processes that keep waiting
//! - **Clock**: tick counter, quantum accounting, timed sleep
//! - **Wait**: sleep/wakeup on channels
//! - **Semaphores**: system-wide counting semaphores
//! - **Spinlocks**: interrupt-disabling locks with per-CPU nesting
//!
//! # Lock Order
//!
//! `time` or `semtable` before `ptable`. Nothing is acquired while
//! `ptable` is held.

// Core modules
pub mod bugcheck;
pub mod prcb;
pub mod scheduler;
pub mod balance;
pub mod clock;

// Synchronization primitives
pub mod spinlock;
pub mod wait;
pub mod semaphore;

// Re-export key types
pub use bugcheck::{ke_bug_check, ke_bug_check_ex};
pub use clock::Deadline;
pub use prcb::Prcb;
pub use scheduler::{Dispatcher, SchedStats};
pub use semaphore::{SemError, SemId, SEM_NEW};
pub use spinlock::{SpinLock, SpinLockGuard};
pub use wait::Channel;
