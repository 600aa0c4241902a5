//! Architecture-specific code
//!
//! The saved register context is plain data and is available on every
//! target; the hardware interrupt controls exist only on x86_64.

pub mod context;

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

pub use context::Context;
