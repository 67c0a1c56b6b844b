//! Fatal-stop path
//!
//! Every fatal condition funnels here: interrupts off, one diagnostic line
//! on the framebuffer, the same line on serial, then a permanent halt. The
//! scheduler is bypassed entirely.

use core::fmt;
use core::fmt::Write as _;
use core::panic::PanicInfo;

use ember_arch::cpu;
use ember_console::{console, LineWriter};

/// Framebuffer row reserved for the panic line
const PANIC_ROW: usize = 24;

pub fn kernel_panic(args: fmt::Arguments<'_>) -> ! {
    cpu::disable_interrupts();
    {
        let mut vga = console();
        let mut line = LineWriter::new(&mut vga, PANIC_ROW);
        let _ = write!(line, "KERNEL PANIC: {}", args);
    }
    log::error!("kernel panic: {}", args);
    cpu::halt_forever()
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kernel_panic(format_args!("{}", info))
}
