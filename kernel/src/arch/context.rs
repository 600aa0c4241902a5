//! Saved process context
//!
//! Holds the callee-saved registers the context-switch primitive restores
//! when a process is dispatched. The core never interprets these values;
//! it stores what the machine collaborator builds for a new process and
//! hands it back on every dispatch.

use x86_64::VirtAddr;

/// Saved kernel register context of a process
///
/// The x86-64 ABI requires preserving RBX, RBP, R12-R15 and RSP across
/// the switch; RIP is the resume address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Context {
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    /// Kernel stack pointer at the switch point
    pub rsp: u64,
    /// Resume address (the first-dispatch trampoline for new processes)
    pub rip: u64,
}

impl Context {
    pub const fn new() -> Self {
        Self {
            rbx: 0,
            rbp: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rsp: 0,
            rip: 0,
        }
    }

    /// Context that resumes at `entry` on the stack ending at `stack_top`
    pub fn with_entry(stack_top: VirtAddr, entry: u64) -> Self {
        Self {
            rsp: stack_top.as_u64(),
            rip: entry,
            ..Self::new()
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
