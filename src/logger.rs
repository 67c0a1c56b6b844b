//! Kernel logger over COM1
//!
//! Structured logs go to the serial line; the framebuffer stays reserved for
//! user-visible status and diagnostics.

use core::fmt::Write;

use ember_arch::serial;
use log::{LevelFilter, Log, Metadata, Record};

struct SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut port = serial::COM1_PORT.lock();
        let _ = writeln!(port, "[{:5}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Bring up COM1 and install the logger. Called once from `kernel_main`.
pub fn init() {
    serial::init();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Debug);
    }
}
