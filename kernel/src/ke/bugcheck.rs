//! Kernel Bug Check
//!
//! A bug check halts the kernel when it detects that its own shared state
//! can no longer be trusted: a broken queue, a lock used out of order, a
//! process scheduled twice. These are never turned into error codes.
//!
//! Every stop carries a code from [`codes`] and one parameter (usually a
//! pid or a slot index). The stop line is logged at error level and then
//! raised as a panic, so the platform's panic handler decides how to halt.

/// Bug check codes
pub mod codes {
    /// Operation on a process slot that holds no process
    pub const NULL_PROCESS: u32 = 0x01;
    /// Dequeue from a priority level with no processes
    pub const EMPTY_LEVEL_DEQUEUE: u32 = 0x02;
    /// Removal of a process that is not linked into its level
    pub const PROCESS_NOT_QUEUED: u32 = 0x03;
    /// Enqueue of a process that is already linked
    pub const PROCESS_ALREADY_QUEUED: u32 = 0x04;
    /// Priority level index outside the level table
    pub const INVALID_PRIORITY_LEVEL: u32 = 0x05;
    /// Spinlock acquired twice by the same CPU
    pub const SPIN_LOCK_ALREADY_OWNED: u32 = 0x06;
    /// Interrupt nesting released more often than taken
    pub const SPIN_LOCK_NOT_OWNED: u32 = 0x07;
    /// Interrupts were enabled while a spinlock was held
    pub const INTERRUPTIBLE_WITH_LOCK: u32 = 0x08;
    /// `sched` entered with other locks still held
    pub const SCHED_LOCKS: u32 = 0x09;
    /// `sched` entered by a process that is still RUNNING
    pub const SCHED_RUNNING: u32 = 0x0A;
    /// `sched` entered with interrupts enabled
    pub const SCHED_INTERRUPTIBLE: u32 = 0x0B;
    /// The init process tried to exit
    pub const INIT_EXITING: u32 = 0x0C;
    /// `userinit` called when init already exists, or init could not be built
    pub const INIT_SETUP_FAILED: u32 = 0x0D;
    /// A kernel entry point ran on a CPU with no current process
    pub const NO_CURRENT_PROCESS: u32 = 0x0E;
    /// The dispatcher returned while its process still owned the CPU
    pub const DISPATCH_STILL_RUNNING: u32 = 0x0F;
}

/// Human-readable name for a bug check code
pub fn bugcheck_code_name(code: u32) -> &'static str {
    match code {
        codes::NULL_PROCESS => "NULL_PROCESS",
        codes::EMPTY_LEVEL_DEQUEUE => "EMPTY_LEVEL_DEQUEUE",
        codes::PROCESS_NOT_QUEUED => "PROCESS_NOT_QUEUED",
        codes::PROCESS_ALREADY_QUEUED => "PROCESS_ALREADY_QUEUED",
        codes::INVALID_PRIORITY_LEVEL => "INVALID_PRIORITY_LEVEL",
        codes::SPIN_LOCK_ALREADY_OWNED => "SPIN_LOCK_ALREADY_OWNED",
        codes::SPIN_LOCK_NOT_OWNED => "SPIN_LOCK_NOT_OWNED",
        codes::INTERRUPTIBLE_WITH_LOCK => "INTERRUPTIBLE_WITH_LOCK",
        codes::SCHED_LOCKS => "SCHED_LOCKS",
        codes::SCHED_RUNNING => "SCHED_RUNNING",
        codes::SCHED_INTERRUPTIBLE => "SCHED_INTERRUPTIBLE",
        codes::INIT_EXITING => "INIT_EXITING",
        codes::INIT_SETUP_FAILED => "INIT_SETUP_FAILED",
        codes::NO_CURRENT_PROCESS => "NO_CURRENT_PROCESS",
        codes::DISPATCH_STILL_RUNNING => "DISPATCH_STILL_RUNNING",
        _ => "UNKNOWN_BUGCHECK",
    }
}

/// Halt the kernel with a bug check code
#[cold]
#[track_caller]
pub fn ke_bug_check(code: u32, detail: &str) -> ! {
    ke_bug_check_ex(code, 0, detail)
}

/// Halt the kernel with a bug check code and one parameter
#[cold]
#[track_caller]
pub fn ke_bug_check_ex(code: u32, parameter: u64, detail: &str) -> ! {
    let name = bugcheck_code_name(code);
    log::error!(
        "*** STOP: 0x{:08X} ({}) parameter 0x{:X}: {}",
        code, name, parameter, detail
    );
    panic!("*** STOP: 0x{:08X} ({}) {}", code, name, detail);
}
