//! Console output and kernel logging
//!
//! [`ConsoleWriter`] adapts any [`Console`] sink to `core::fmt::Write` so
//! the diagnostic listings can use formatting macros. [`KernelLogger`]
//! routes the `log` facade to a console sink once one is installed.

use core::fmt;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Once;

use crate::platform::Console;

/// Formatting adapter over a console sink
pub struct ConsoleWriter<'a, C: Console + ?Sized>(pub &'a C);

impl<C: Console + ?Sized> fmt::Write for ConsoleWriter<'_, C> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

/// Print to a console sink
#[macro_export]
macro_rules! cprint {
    ($console:expr, $($arg:tt)*) => {{
        let _ = core::fmt::Write::write_fmt(
            &mut $crate::console::ConsoleWriter($console),
            format_args!($($arg)*),
        );
    }};
}

/// Print to a console sink with a trailing newline
#[macro_export]
macro_rules! cprintln {
    ($console:expr) => ($crate::cprint!($console, "\n"));
    ($console:expr, $($arg:tt)*) => ($crate::cprint!($console, "{}\n", format_args!($($arg)*)));
}

/// `log` backend writing one line per record to a console sink
pub struct KernelLogger {
    sink: Once<&'static (dyn Console + Sync)>,
}

impl KernelLogger {
    pub const fn new() -> Self {
        Self { sink: Once::new() }
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(sink) = self.sink.get() {
            cprintln!(*sink, "[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger::new();

/// Install the kernel logger over `sink`
///
/// Fails if another logger was installed first.
pub fn init_logger(sink: &'static (dyn Console + Sync), level: LevelFilter) -> Result<(), SetLoggerError> {
    LOGGER.sink.call_once(|| sink);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    log::info!("kernel logger online at {}", level);
    Ok(())
}
